//! Client for the local model server.
//!
//! Speaks the Ollama text-completion protocol (`POST /api/generate`,
//! non-streaming). One `invoke` is exactly one HTTP call: no retries happen
//! here, every failure is classified into a [`ModelError`] and handed back.

use crate::config::EngineConfig;
use crate::error::{AppError, ModelError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Longest server error body carried inside a [`ModelError`].
const MAX_ERROR_BODY_CHARS: usize = 500;
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Defines the interface to a text-completion model backend.
///
/// This trait abstracts the model server so the analyzer can run against the
/// real HTTP client or an in-process stub.
#[async_trait]
pub trait ModelClient: Send + Sync + 'static {
    /// Sends one prompt and returns the raw completion text.
    async fn invoke(
        &self,
        prompt: &str,
        model_name: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    error: String,
}

/// A model installed on the server, as listed by `GET /api/tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
}

impl ModelInfo {
    /// `mistral` matches both `mistral` and `mistral:latest`.
    pub fn matches(&self, model_name: &str) -> bool {
        self.name == model_name
            || self
                .name
                .strip_prefix(model_name)
                .is_some_and(|rest| rest.starts_with(':'))
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// HTTP client for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join drops the last path segment unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            client: Client::new(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, AppError> {
        Self::new(&config.ollama_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    /// Lists the models installed on the server.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, AppError> {
        let url = self.endpoint("api/tags")?;
        let res = timeout(HEALTH_TIMEOUT, self.client.get(url).send())
            .await
            .map_err(|_| ModelError::Timeout {
                after_ms: HEALTH_TIMEOUT.as_millis() as u64,
            })??;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ModelError::NonOkStatus {
                status: status.as_u16(),
                body: error_message(&body),
            }
            .into());
        }

        let tags: TagsResponse = res.json().await?;
        info!("Model server lists {} models", tags.models.len());
        Ok(tags.models)
    }

    /// Whether the server answers its model listing endpoint.
    pub async fn health(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Model server health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    #[instrument(skip(self, prompt), fields(prompt_chars = prompt.len()))]
    async fn invoke(
        &self,
        prompt: &str,
        model_name: &str,
        temperature: f32,
        limit: Duration,
    ) -> Result<String, ModelError> {
        let url = self.endpoint("api/generate").map_err(|e| ModelError::Unreachable {
            reason: format!("invalid endpoint: {}", e),
        })?;
        let payload = GenerateRequest {
            model: model_name,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };

        let call = async {
            let res = self.client.post(url).json(&payload).send().await?;
            let status = res.status();
            let body = res.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match timeout(limit, call).await {
            Err(_) => {
                return Err(ModelError::Timeout {
                    after_ms: limit.as_millis() as u64,
                })
            }
            Ok(Err(e)) => return Err(classify_transport(e, limit)),
            Ok(Ok(answer)) => answer,
        };

        if !status.is_success() {
            return Err(ModelError::NonOkStatus {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }

        let text = completion_text(body);
        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        debug!(reply_chars = text.len(), "Model call completed");
        Ok(text)
    }
}

fn classify_transport(err: reqwest::Error, limit: Duration) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout {
            after_ms: limit.as_millis() as u64,
        }
    } else {
        ModelError::from(err)
    }
}

/// The `response` field of a generate reply; a non-JSON body is used as-is.
fn completion_text(body: String) -> String {
    match serde_json::from_str::<GenerateResponse>(&body) {
        Ok(parsed) => parsed.response,
        Err(_) => body,
    }
}

/// Prefers Ollama's `{"error": "..."}` message over the raw body.
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<ServerError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string());
    message.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_invoke_returns_response_field() {
        // 1. Arrange
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "mistral",
                "stream": false,
                "options": { "temperature": 0.0 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mistral",
                "response": "Sentiment: Positive\nConfidence: 0.9",
                "done": true
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        // 2. Act
        let result = client.invoke("Rate this", "mistral", 0.0, TIMEOUT).await;

        // 3. Assert
        assert_eq!(result.unwrap(), "Sentiment: Positive\nConfidence: 0.9");
    }

    #[tokio::test]
    async fn test_invoke_keeps_base_path_prefix() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&format!("{}/ollama", mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/ollama/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "Topic: Battery" })))
            .mount(&mock_server)
            .await;

        let result = client.invoke("Topic?", "mistral", 0.7, TIMEOUT).await;

        assert_eq!(result.unwrap(), "Topic: Battery");
    }

    #[tokio::test]
    async fn test_invoke_client_error_status_is_classified() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "model 'nope' not found" })))
            .mount(&mock_server)
            .await;

        let result = client.invoke("Hello", "nope", 0.7, TIMEOUT).await;

        match result {
            Err(err @ ModelError::NonOkStatus { status: 404, .. }) => {
                assert!(err.is_client_error());
                assert!(err.to_string().contains("model 'nope' not found"));
            }
            other => panic!("Expected NonOkStatus 404, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoke_server_error_status_is_transient() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let err = client.invoke("Hello", "mistral", 0.7, TIMEOUT).await.unwrap_err();

        assert!(matches!(err, ModelError::NonOkStatus { status: 500, ref body } if body == "Internal Server Error"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_invoke_empty_response() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "   ", "done": true })))
            .mount(&mock_server)
            .await;

        let err = client.invoke("Hello", "mistral", 0.7, TIMEOUT).await.unwrap_err();

        assert_eq!(err, ModelError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_invoke_non_json_body_is_taken_verbatim() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("negative, clearly"))
            .mount(&mock_server)
            .await;

        let result = client.invoke("Hello", "mistral", 0.7, TIMEOUT).await;

        assert_eq!(result.unwrap(), "negative, clearly");
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let err = client
            .invoke("Hello", "mistral", 0.7, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(err, ModelError::Timeout { after_ms: 50 });
    }

    #[tokio::test]
    async fn test_invoke_unreachable_server() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = OllamaClient::new(&format!("http://127.0.0.1:{}", port)).unwrap();

        let err = client.invoke("Hello", "mistral", 0.7, TIMEOUT).await.unwrap_err();

        assert!(matches!(err, ModelError::Unreachable { .. }), "got {:?}", err);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_list_models_and_health() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    { "name": "mistral:latest", "size": 4109865159u64, "modified_at": "2024-05-01T10:00:00Z" },
                    { "name": "llama2:7b" }
                ]
            })))
            .mount(&mock_server)
            .await;

        let models = client.list_models().await.unwrap();

        assert_eq!(models.len(), 2);
        assert!(models[0].matches("mistral"));
        assert!(!models[1].matches("llama"));
        assert!(models[1].matches("llama2:7b"));
        assert!(client.health().await);
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = OllamaClient::new("not a url").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
