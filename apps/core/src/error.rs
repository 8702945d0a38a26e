use serde::Serialize;
use std::io;
use thiserror::Error;

/// Application-wide error type, consolidating all possible errors into a single enum.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input text rejected before any model call (length bounds, empty after sanitizing).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-transient failure signaled by the model server (unknown model, malformed request).
    #[error("Configuration error (status {status}): {message}")]
    Configuration { status: u16, message: String },

    /// Represents process configuration errors (e.g., unparseable environment variables).
    #[error("Config error: {0}")]
    Config(String),

    /// A classified failure from a single model call.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Represents errors specific to the actor system, such as communication failures.
    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// Represents standard input/output errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Represents errors from operations that did not complete in time.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Represents unexpected internal errors that indicate a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            AppError::Validation(s) => AppError::Validation(s.clone()),
            AppError::Configuration { status, message } => AppError::Configuration {
                status: *status,
                message: message.clone(),
            },
            AppError::Config(s) => AppError::Config(s.clone()),
            AppError::Model(e) => AppError::Model(e.clone()),
            AppError::Actor(e) => AppError::Actor(e.clone()),
            AppError::Io(e) => AppError::Io(io::Error::new(e.kind(), e.to_string())),
            AppError::Timeout(s) => AppError::Timeout(s.clone()),
            AppError::Internal(s) => AppError::Internal(s.clone()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(format!("Operation timed out: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Config(format!("URL parse error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Config(format!("Invalid configuration: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Model(ModelError::from(err))
    }
}

/// Classified outcome of one failed call to the model server.
///
/// The model client never retries; these variants let the analyzer decide.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelError {
    /// Connection refused, DNS failure, reset mid-request.
    #[error("model server unreachable: {reason}")]
    Unreachable { reason: String },
    /// The call did not complete within the configured timeout.
    #[error("model request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    /// The server answered with a non-2xx status.
    #[error("model server returned status {status}: {body}")]
    NonOkStatus { status: u16, body: String },
    /// The server answered 2xx but produced no text.
    #[error("model server returned an empty response")]
    EmptyResponse,
}

impl ModelError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// 5xx answers are treated like transport failures: the local server is
    /// usually overloaded or still loading the model.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Unreachable { .. } | ModelError::Timeout { .. } => true,
            ModelError::NonOkStatus { status, .. } => *status >= 500,
            ModelError::EmptyResponse => false,
        }
    }

    /// 4xx answers: the request itself is wrong (unknown model, bad payload).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ModelError::NonOkStatus { status, .. } if (400..500).contains(status))
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout { after_ms: 0 }
        } else if let Some(status) = err.status() {
            ModelError::NonOkStatus {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            ModelError::Unreachable {
                reason: err.to_string(),
            }
        }
    }
}

/// Defines errors that can occur within the actor system.
#[derive(Debug, Error, Serialize, Clone, PartialEq, Eq)]
pub enum ActorError {
    /// The actor's mailbox is closed; its task has stopped.
    #[error("Actor mailbox closed: {0}")]
    MailboxClosed(String),
    /// The actor dropped the reply channel before answering.
    #[error("Actor dropped the reply: {0}")]
    NoReply(String),
}
