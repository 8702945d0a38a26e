use super::mocks::{test_config, MockModelClient};
use crate::actors::HistoryHandle;
use crate::engine::Analyzer;
use crate::error::{AppError, ModelError};
use crate::models::{AnalysisMode, AnalysisOptions, AnalysisRequest, ParseStatus};
use std::sync::Arc;
use std::time::Duration;

fn analyzer_with(mock: Arc<MockModelClient>) -> Analyzer<MockModelClient> {
    let config = test_config();
    Analyzer::new(mock, HistoryHandle::new(config.history_capacity), &config)
}

fn unreachable() -> ModelError {
    ModelError::Unreachable {
        reason: "connection refused".into(),
    }
}

#[tokio::test]
async fn test_analyze_sentiment_success() {
    // 1. Arrange
    let mock = Arc::new(MockModelClient::replying("Sentiment: positive\nConfidence: 0.87"));
    let analyzer = analyzer_with(mock.clone());
    let request = AnalysisRequest::new("I love this phone, the camera is superb.", AnalysisMode::Sentiment);

    // 2. Act
    let result = analyzer.analyze(&request).await.unwrap();

    // 3. Assert
    assert_eq!(result.parse_status, ParseStatus::Ok);
    assert_eq!(result.label.as_deref(), Some("positive"));
    assert_eq!(result.confidence, Some(0.87));
    assert_eq!(result.model, "mistral");
    assert_eq!(result.attempts, 1);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_validation_error_never_reaches_model() {
    let mock = Arc::new(MockModelClient::replying("Sentiment: positive"));
    let analyzer = analyzer_with(mock.clone());

    let err = analyzer
        .analyze(&AnalysisRequest::new(" \u{0002} ", AnalysisMode::Sentiment))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(mock.call_count(), 0);
    assert_eq!(analyzer.history().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried_then_succeed() {
    // Fails twice, answers on the third call.
    let mock = Arc::new(MockModelClient::new(|_, call| {
        if call < 2 {
            Err(ModelError::Timeout { after_ms: 10 })
        } else {
            Ok("Topic: Battery".to_string())
        }
    }));
    let analyzer = analyzer_with(mock.clone());

    let result = analyzer
        .analyze(&AnalysisRequest::new("Battery drains in two hours.", AnalysisMode::Topic))
        .await
        .unwrap();

    assert_eq!(result.parse_status, ParseStatus::Ok);
    assert_eq!(result.topic.as_deref(), Some("Battery"));
    assert_eq!(result.attempts, 3);
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_yield_failed_result() {
    let mock = Arc::new(MockModelClient::failing(unreachable()));
    let analyzer = analyzer_with(mock.clone());

    let result = analyzer
        .analyze(&AnalysisRequest::new("Screen cracked on day one.", AnalysisMode::Sentiment))
        .await
        .unwrap();

    // max_retries = 2, so three calls in total.
    assert_eq!(mock.call_count(), 3);
    assert_eq!(result.parse_status, ParseStatus::Failed);
    assert_eq!(result.label, None);
    assert_eq!(result.confidence, None);
    assert_eq!(result.raw_model_output, "<model unreachable: connection refused>");
    assert_eq!(result.attempts, 3);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock = Arc::new(MockModelClient::new(|_, call| {
        if call == 0 {
            Err(ModelError::NonOkStatus {
                status: 503,
                body: "loading model".into(),
            })
        } else {
            Ok("Sentiment: negative\nConfidence: 0.9".to_string())
        }
    }));
    let analyzer = analyzer_with(mock.clone());

    let result = analyzer
        .analyze(&AnalysisRequest::new("Never buying again.", AnalysisMode::Sentiment))
        .await
        .unwrap();

    assert_eq!(result.label.as_deref(), Some("negative"));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_client_error_fails_immediately() {
    let mock = Arc::new(MockModelClient::failing(ModelError::NonOkStatus {
        status: 404,
        body: "model 'nope' not found".into(),
    }));
    let analyzer = analyzer_with(mock.clone());

    let err = analyzer
        .analyze(&AnalysisRequest::new("Works as advertised.", AnalysisMode::Sentiment))
        .await
        .unwrap_err();

    match err {
        AppError::Configuration { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("not found"));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
    assert_eq!(mock.call_count(), 1);
    assert_eq!(analyzer.history().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_response_is_not_retried() {
    let mock = Arc::new(MockModelClient::failing(ModelError::EmptyResponse));
    let analyzer = analyzer_with(mock.clone());

    let result = analyzer
        .analyze(&AnalysisRequest::new("Decent value overall.", AnalysisMode::Summary))
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(result.parse_status, ParseStatus::Failed);
    assert_eq!(result.raw_model_output, "<empty model response>");
}

#[tokio::test]
async fn test_request_options_override_defaults() {
    let mock = Arc::new(MockModelClient::replying("Summary: Short and sweet."));
    let analyzer = analyzer_with(mock.clone());
    let request = AnalysisRequest::new("A long review about a blender.", AnalysisMode::Summary)
        .with_options(AnalysisOptions {
            model_name: Some("llama3:8b".into()),
            temperature: Some(0.2),
            ..AnalysisOptions::default()
        });

    let result = analyzer.analyze(&request).await.unwrap();

    assert_eq!(result.model, "llama3:8b");
    let seen = mock.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "llama3:8b");
    assert_eq!(seen[0].1, 0.2);
}

#[tokio::test]
async fn test_configured_timeout_is_passed_to_every_call() {
    // 1. Arrange
    let mock = Arc::new(MockModelClient::new(|_, call| {
        if call == 0 {
            Err(ModelError::Timeout { after_ms: 7000 })
        } else {
            Ok("Sentiment: positive".to_string())
        }
    }));
    let config = crate::config::EngineConfig {
        request_timeout_secs: 7,
        ..test_config()
    };
    let analyzer = Analyzer::new(mock.clone(), HistoryHandle::new(10), &config);

    // 2. Act
    analyzer
        .analyze(&AnalysisRequest::new("Happy with it.", AnalysisMode::Sentiment))
        .await
        .unwrap();

    // 3. Assert
    let timeouts: Vec<Duration> = mock.seen.lock().unwrap().iter().map(|s| s.2).collect();
    assert_eq!(timeouts, vec![Duration::from_secs(7); 2]);
    assert_eq!(timeouts[0], config.request_timeout());
}

#[tokio::test]
async fn test_every_result_is_recorded_in_history() {
    let mock = Arc::new(MockModelClient::new(|_, call| {
        if call == 0 {
            Ok("Sentiment: neutral".to_string())
        } else {
            Ok("no idea".to_string())
        }
    }));
    let config = crate::config::EngineConfig {
        max_retries: 0,
        ..test_config()
    };
    let analyzer = Analyzer::new(mock, HistoryHandle::new(10), &config);

    let first = analyzer
        .analyze(&AnalysisRequest::new("It is fine I guess.", AnalysisMode::Sentiment))
        .await
        .unwrap();
    let second = analyzer
        .analyze(&AnalysisRequest::new("12345 67890", AnalysisMode::Sentiment))
        .await
        .unwrap();

    let history = analyzer.history().snapshot().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].result, first);
    assert_eq!(history[1].result, second);
    assert_eq!(history[1].result.parse_status, ParseStatus::Failed);
    assert_eq!(history[0].request.model, "mistral");
    assert_eq!(history[0].request.text_preview, "It is fine I guess.");
}
