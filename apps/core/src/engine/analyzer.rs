use super::parser::ResponseParser;
use super::prompt::PromptBuilder;
use crate::actors::HistoryHandle;
use crate::config::{EngineConfig, RetryPolicy};
use crate::error::{AppError, ModelError};
use crate::llm::ModelClient;
use crate::models::{AnalysisRequest, AnalysisResult, HistoryEntry, RequestSummary};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

const PROMPT_LOG_CHARS: usize = 120;
const EMPTY_RESPONSE_PLACEHOLDER: &str = "<empty model response>";

/// Runs one request through prompt building, the model call and parsing.
///
/// Transient model failures are retried with exponential backoff. Once the
/// retries are spent the request still yields a result, with status
/// `failed` and a placeholder in place of the model reply. Every produced
/// result is recorded in the history store.
pub struct Analyzer<C: ModelClient> {
    client: Arc<C>,
    history: HistoryHandle,
    builder: PromptBuilder,
    parser: ResponseParser,
    retry: RetryPolicy,
    request_timeout: Duration,
    default_model: String,
    default_temperature: f32,
}

impl<C: ModelClient> Analyzer<C> {
    pub fn new(client: Arc<C>, history: HistoryHandle, config: &EngineConfig) -> Self {
        Self {
            client,
            history,
            builder: PromptBuilder::new(config.text_limits()),
            parser: ResponseParser::new(),
            retry: config.retry_policy(),
            request_timeout: config.request_timeout(),
            default_model: config.default_model.clone(),
            default_temperature: config.default_temperature,
        }
    }

    pub fn history(&self) -> &HistoryHandle {
        &self.history
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Model name a request resolves to.
    pub fn model_for(&self, request: &AnalysisRequest) -> String {
        request
            .options
            .model_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.default_model.as_str())
            .to_string()
    }

    /// Analyzes a single text.
    ///
    /// # Errors
    ///
    /// * `AppError::Validation` when the text is out of bounds; the model is not called.
    /// * `AppError::Configuration` when the server rejects the request with a 4xx status.
    ///
    /// Unreachable servers, timeouts and unparseable replies are not errors.
    #[instrument(skip(self, request), fields(mode = %request.mode, text_chars = request.text.chars().count()))]
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AppError> {
        let prompt = self
            .builder
            .build(&request.text, request.mode, &request.options)?;
        let model = self.model_for(request);
        let temperature = request
            .options
            .temperature
            .unwrap_or(self.default_temperature)
            .clamp(0.0, 2.0);
        debug!(prompt = %truncate(&prompt, PROMPT_LOG_CHARS), %model, temperature, "Prompt built");

        let mut attempts: u32 = 0;
        let mut result = loop {
            attempts += 1;
            let outcome = self
                .client
                .invoke(&prompt, &model, temperature, self.request_timeout)
                .await;

            match outcome {
                Ok(raw) => break self.parser.parse(&raw, request.mode),
                Err(ModelError::NonOkStatus { status, body }) if (400..500).contains(&status) => {
                    error!(status, %model, "Model server rejected the request: {}", body);
                    return Err(AppError::Configuration {
                        status,
                        message: body,
                    });
                }
                Err(ModelError::EmptyResponse) => {
                    warn!(%model, attempts, "Model returned an empty response");
                    break AnalysisResult::failed(request.mode, EMPTY_RESPONSE_PLACEHOLDER);
                }
                Err(e) if e.is_transient() && attempts <= self.retry.max_retries => {
                    let delay = self.retry.backoff(attempts);
                    warn!(
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Model call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempts, "Model call failed, giving up: {}", e);
                    break AnalysisResult::failed(request.mode, placeholder(&e));
                }
            }
        };

        result.model = model.clone();
        result.attempts = attempts;
        info!(
            request_id = %result.request_id,
            status = ?result.parse_status,
            attempts,
            "Analysis complete"
        );

        let entry = HistoryEntry {
            timestamp: Utc::now(),
            request: RequestSummary::new(request, &model),
            result: result.clone(),
        };
        if let Err(e) = self.history.append(entry).await {
            warn!("Failed to record analysis in history: {}", e);
        }

        Ok(result)
    }
}

/// Stand-in for `raw_model_output` when no reply was obtained.
fn placeholder(err: &ModelError) -> String {
    match err {
        ModelError::Unreachable { reason } => format!("<model unreachable: {}>", reason),
        ModelError::Timeout { after_ms } => format!("<model timed out after {} ms>", after_ms),
        ModelError::NonOkStatus { status, body } => {
            format!("<model server error {}: {}>", status, body)
        }
        ModelError::EmptyResponse => EMPTY_RESPONSE_PLACEHOLDER.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_bracketed() {
        let unreachable = placeholder(&ModelError::Unreachable {
            reason: "connection refused".into(),
        });
        assert_eq!(unreachable, "<model unreachable: connection refused>");
        assert_eq!(
            placeholder(&ModelError::Timeout { after_ms: 1500 }),
            "<model timed out after 1500 ms>"
        );
        assert_eq!(placeholder(&ModelError::EmptyResponse), "<empty model response>");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("short", 10), "short");
    }
}
