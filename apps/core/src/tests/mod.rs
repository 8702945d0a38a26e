//! Test Module
//!
//! Cross-module test suite for the textsense engine.
//!
//! ## Test Categories
//! - `mocks`: in-process model clients shared by the suites below
//! - `analyzer_tests`: retry policy, error classification, history recording
//! - `batch_tests`: ordering, per-item independence, concurrency cap, cancellation
//! - `integration_tests`: end-to-end against a wiremock Ollama server

pub mod analyzer_tests;
