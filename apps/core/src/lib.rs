//! textsense core: turns free text into structured analysis results
//! (sentiment, confidence, topic, summary) using a local Ollama model server.

pub mod actors;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod models;
pub mod preflight;

pub use config::EngineConfig;
pub use error::{AppError, ModelError};

#[cfg(test)]
mod tests;
