use crate::engine::prompt::sanitize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What the model is asked to produce for one text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Sentiment label plus a confidence score.
    Sentiment,
    /// Free-text summary, shaped by [`DetailLevel`].
    Summary,
    /// Main topic in one to three words.
    Topic,
    /// Sentiment, topic and summary in a single call, as used for CSV rows.
    BatchItem,
}

impl AnalysisMode {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMode::Sentiment => "sentiment",
            AnalysisMode::Summary => "summary",
            AnalysisMode::Topic => "topic",
            AnalysisMode::BatchItem => "batch_item",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How much the summary should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Two to three sentences.
    #[default]
    Brief,
    /// All main points.
    Detailed,
    /// One `- ` bullet per point.
    Bullets,
}

/// Per-request options. Unset values fall back to the engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// What the text is about, e.g. a product name ("review for the iPhone 15").
    #[serde(default)]
    pub subject: Option<String>,
}

/// One text to analyze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    pub mode: AnalysisMode,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, mode: AnalysisMode) -> Self {
        Self {
            text: text.into(),
            mode,
            options: AnalysisOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }
}

/// How well the model's reply matched the requested output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Every required field was found at its template marker.
    Ok,
    /// At least one field was recovered by a fallback heuristic.
    Degraded,
    /// Nothing usable; semantic fields are empty.
    Failed,
}

/// Structured analysis of one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub request_id: Uuid,
    pub mode: AnalysisMode,
    /// Model that produced the reply (empty when the parser ran standalone).
    #[serde(default)]
    pub model: String,
    pub label: Option<String>,
    /// Always within `[0, 1]` when present.
    pub confidence: Option<f32>,
    pub topic: Option<String>,
    pub summary: Option<String>,
    /// The model's reply, verbatim, or a `<...>` placeholder when no reply was obtained.
    pub raw_model_output: String,
    pub parse_status: ParseStatus,
    /// Model calls made to obtain this result.
    #[serde(default)]
    pub attempts: u32,
}

impl AnalysisResult {
    /// A result carrying no semantic fields.
    pub fn failed(mode: AnalysisMode, raw_model_output: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            mode,
            model: String::new(),
            label: None,
            confidence: None,
            topic: None,
            summary: None,
            raw_model_output: raw_model_output.into(),
            parse_status: ParseStatus::Failed,
            attempts: 0,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.parse_status != ParseStatus::Failed
    }
}

/// Why a batch item produced no [`AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Configuration,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one batch row: a result or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ItemOutcome {
    Completed(AnalysisResult),
    Error(ErrorDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Zero-based position in the submitted sequence.
    pub index: usize,
    pub input: String,
    pub result: ItemOutcome,
}

impl BatchItem {
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.result, ItemOutcome::Error(e) if e.kind == ErrorKind::Cancelled)
    }

    pub fn is_success(&self) -> bool {
        matches!(&self.result, ItemOutcome::Completed(r) if r.is_usable())
    }
}

/// Per-row outcomes of a batch, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub items: Vec<BatchItem>,
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Set when at least one row never started because the batch was cancelled.
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn from_items(items: Vec<BatchItem>) -> Self {
        let total = items.len();
        let success_count = items.iter().filter(|item| item.is_success()).count();
        let cancelled = items.iter().any(BatchItem::is_cancelled);
        Self {
            items,
            total,
            success_count,
            error_count: total - success_count,
            cancelled,
        }
    }
}

/// What the history keeps about the request behind a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub mode: AnalysisMode,
    pub model: String,
    pub text_preview: String,
    pub text_length: usize,
}

impl RequestSummary {
    const PREVIEW_CHARS: usize = 80;

    /// Preview and length describe the text as sent to the model, after sanitizing.
    pub fn new(request: &AnalysisRequest, model: &str) -> Self {
        let text = sanitize(&request.text);
        let text_length = text.chars().count();
        let mut text_preview: String = text.chars().take(Self::PREVIEW_CHARS).collect();
        if text_length > Self::PREVIEW_CHARS {
            text_preview.push('…');
        }
        Self {
            mode: request.mode,
            model: model.to_string(),
            text_preview,
            text_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub request: RequestSummary,
    pub result: AnalysisResult,
}
