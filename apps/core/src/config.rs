//! Engine configuration.
//!
//! Loaded once at startup from the process environment (a `.env` file in the
//! working directory is honored). Every value has a default so the engine runs
//! against a stock local Ollama install with no setup.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use validator::{Validate, ValidationError};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "mistral";

/// Upper bound for a single backoff sleep, whatever the attempt number.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Log output style for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" | "bunyan" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!("Unknown LOG_FORMAT '{}'", other))),
        }
    }
}

/// Accepted input length, in characters after sanitizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLimits {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            min_chars: 3,
            max_chars: 10_000,
        }
    }
}

/// Retry schedule for transient model failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all; handy for tests that want one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_text_bounds"))]
pub struct EngineConfig {
    /// Base URL of the model server.
    #[validate(url)]
    pub ollama_url: String,
    /// Model used when a request does not name one.
    #[validate(length(min = 1))]
    pub default_model: String,
    /// Sampling temperature used when a request does not set one.
    #[validate(range(min = 0.0, max = 2.0))]
    pub default_temperature: f32,
    /// Timeout for a single model call, in seconds.
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Concurrent in-flight model calls during a batch.
    #[validate(range(min = 1))]
    pub max_concurrency: usize,
    /// Entries kept by the history store.
    #[validate(range(min = 1))]
    pub history_capacity: usize,
    #[validate(range(min = 1))]
    pub min_text_length: usize,
    pub max_text_length: usize,
    pub log_format: LogFormat,
}

fn validate_text_bounds(config: &EngineConfig) -> Result<(), ValidationError> {
    if config.min_text_length > config.max_text_length {
        return Err(ValidationError::new("min_text_length_exceeds_max"));
    }
    Ok(())
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = TextLimits::default();
        let retry = RetryPolicy::default();
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_temperature: 0.7,
            request_timeout_secs: 120,
            max_retries: retry.max_retries,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            max_concurrency: 4,
            history_capacity: 100,
            min_text_length: limits.min_chars,
            max_text_length: limits.max_chars,
            log_format: LogFormat::Pretty,
        }
    }
}

impl EngineConfig {
    /// Loads `.env` (if present) and then reads the environment.
    pub fn load() -> Result<Self, AppError> {
        // A missing .env file is the normal case outside development.
        let _ = dotenv::dotenv();
        Self::from_env()
    }

    /// Reads the configuration from environment variables only.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let config = Self {
            ollama_url: env_or("OLLAMA_URL", defaults.ollama_url)?,
            default_model: env_or("DEFAULT_MODEL", defaults.default_model)?,
            default_temperature: env_or("DEFAULT_TEMPERATURE", defaults.default_temperature)?,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            max_retries: env_or("MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms)?,
            max_concurrency: env_or("MAX_CONCURRENCY", defaults.max_concurrency)?,
            history_capacity: env_or("HISTORY_CAPACITY", defaults.history_capacity)?,
            min_text_length: env_or("MIN_TEXT_LENGTH", defaults.min_text_length)?,
            max_text_length: env_or("MAX_TEXT_LENGTH", defaults.max_text_length)?,
            log_format: match env::var("LOG_FORMAT") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.log_format,
            },
        };
        config.validate()?;
        debug!(?config, "Engine configuration loaded");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn text_limits(&self) -> TextLimits {
        TextLimits {
            min_chars: self.min_text_length,
            max_chars: self.max_text_length,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 11] = [
        "OLLAMA_URL",
        "DEFAULT_MODEL",
        "DEFAULT_TEMPERATURE",
        "REQUEST_TIMEOUT_SECS",
        "MAX_RETRIES",
        "RETRY_BASE_DELAY_MS",
        "MAX_CONCURRENCY",
        "HISTORY_CAPACITY",
        "MIN_TEXT_LENGTH",
        "MAX_TEXT_LENGTH",
        "LOG_FORMAT",
    ];

    fn env_with(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
        KEYS.iter()
            .map(|key| {
                let value = overrides.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
                (*key, value)
            })
            .collect()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        temp_env::with_vars(env_with(&[]), || {
            let config = EngineConfig::from_env().expect("defaults are valid");
            assert_eq!(config.ollama_url, DEFAULT_OLLAMA_URL);
            assert_eq!(config.default_model, DEFAULT_MODEL);
            assert_eq!(config.max_concurrency, 4);
            assert_eq!(config.retry_policy(), RetryPolicy::default());
            assert_eq!(config.text_limits(), TextLimits::default());
            assert_eq!(config.log_format, LogFormat::Pretty);
        });
    }

    #[test]
    fn test_environment_overrides() {
        let vars = env_with(&[
            ("OLLAMA_URL", "http://gpu-box:11434"),
            ("DEFAULT_MODEL", "llama3"),
            ("MAX_CONCURRENCY", "8"),
            ("MAX_RETRIES", "5"),
            ("LOG_FORMAT", "json"),
        ]);
        temp_env::with_vars(vars, || {
            let config = EngineConfig::from_env().expect("valid overrides");
            assert_eq!(config.ollama_url, "http://gpu-box:11434");
            assert_eq!(config.default_model, "llama3");
            assert_eq!(config.max_concurrency, 8);
            assert_eq!(config.retry_policy().max_retries, 5);
            assert_eq!(config.log_format, LogFormat::Json);
        });
    }

    #[test]
    fn test_unparseable_value_is_config_error() {
        let vars = env_with(&[("MAX_CONCURRENCY", "lots")]);
        temp_env::with_vars(vars, || {
            let err = EngineConfig::from_env().unwrap_err();
            assert!(matches!(err, AppError::Config(msg) if msg.contains("MAX_CONCURRENCY")));
        });
    }

    #[test]
    fn test_validation_rejects_zero_concurrency_and_inverted_bounds() {
        let config = EngineConfig {
            max_concurrency: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            min_text_length: 500,
            max_text_length: 100,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(9), MAX_BACKOFF);
    }
}
