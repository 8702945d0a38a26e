//! The analysis orchestration engine.
//!
//! Leaf-first: `prompt` and `parser` are pure, `analyzer` drives one request
//! through the model client with retries, `batch` fans requests out under a
//! concurrency cap.

pub mod analyzer;
pub mod batch;
pub mod language;
pub mod parser;
pub mod prompt;

pub use analyzer::Analyzer;
pub use batch::BatchOrchestrator;
pub use language::{detect_language, Language};
pub use parser::ResponseParser;
pub use prompt::PromptBuilder;
