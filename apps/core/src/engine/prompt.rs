//! Prompt construction.
//!
//! Every template ends with the exact reply shape the parser looks for
//! (`Sentiment:`, `Confidence:`, `Topic:`, `Summary:` lines). Building is pure:
//! the same text, mode and options always give the same prompt.

use super::language::detect_language;
use crate::config::TextLimits;
use crate::error::AppError;
use crate::models::{AnalysisMode, AnalysisOptions, DetailLevel};

const SENTIMENT_RULES: &str = "Rules:\n\
- Answer Positive if it is mostly happy or praising.\n\
- Answer Negative if it is mostly unhappy or complaining.\n\
- Answer Neutral if it mentions both pros and cons (mixed), or is indifferent.\n";

const LABEL_NOTE: &str = "Keep the field labels in English.\n";

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    limits: TextLimits,
}

impl PromptBuilder {
    pub fn new(limits: TextLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> TextLimits {
        self.limits
    }

    /// Sanitizes and bounds-checks `text`, then renders the template for `mode`.
    pub fn build(
        &self,
        text: &str,
        mode: AnalysisMode,
        options: &AnalysisOptions,
    ) -> Result<String, AppError> {
        let text = self.validate(text)?;
        let subject = subject_phrase(options.subject.as_deref());

        let prompt = match mode {
            AnalysisMode::Sentiment => format!(
                "Analyze the sentiment of {subject}.\n\
                 {SENTIMENT_RULES}\
                 Respond in exactly this format:\n\
                 Sentiment: <Positive|Negative|Neutral>\n\
                 Confidence: <number between 0 and 1>\n\n\
                 Text: {text}"
            ),
            AnalysisMode::Topic => format!(
                "What is the main topic (e.g., Battery, Screen, Price, Service, Quality, Delivery) \
                 of {subject}? Answer in 1-3 words.\n\
                 Respond in exactly this format:\n\
                 Topic: <1-3 words>\n\n\
                 Text: {text}"
            ),
            AnalysisMode::Summary => {
                let language = detect_language(&text).response_instruction();
                let note = if language.is_empty() { "" } else { LABEL_NOTE };
                format!(
                    "{language}{instruction}\n\
                     {note}\
                     Respond in exactly this format:\n\
                     Summary: <summary>\n\n\
                     Text: {text}",
                    instruction = summary_instruction(options.detail_level, &subject),
                )
            }
            AnalysisMode::BatchItem => {
                let language = detect_language(&text).response_instruction();
                let note = if language.is_empty() { "" } else { LABEL_NOTE };
                format!(
                    "{language}Analyze {subject}.\n\
                     {SENTIMENT_RULES}\
                     The topic is the main subject in 1-3 words (e.g., Battery, Screen, Price, Service, Quality, Delivery).\n\
                     {instruction}\n\
                     {note}\
                     Respond in exactly this format:\n\
                     Sentiment: <Positive|Negative|Neutral>\n\
                     Confidence: <number between 0 and 1>\n\
                     Topic: <1-3 words>\n\
                     Summary: <summary>\n\n\
                     Text: {text}",
                    instruction = summary_instruction(options.detail_level, &subject),
                )
            }
        };
        Ok(prompt)
    }

    /// Strips control characters and enforces the configured length bounds.
    pub fn validate(&self, text: &str) -> Result<String, AppError> {
        let cleaned = sanitize(text);
        let length = cleaned.chars().count();
        if length < self.limits.min_chars {
            return Err(AppError::Validation(format!(
                "Text is too short ({} characters). Minimum {} characters required.",
                length, self.limits.min_chars
            )));
        }
        if length > self.limits.max_chars {
            return Err(AppError::Validation(format!(
                "Text is too long ({} characters). Maximum {} characters allowed.",
                length, self.limits.max_chars
            )));
        }
        Ok(cleaned)
    }
}

/// Drops control characters except newline and tab, normalizes line endings, trims.
pub fn sanitize(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

fn subject_phrase(subject: Option<&str>) -> String {
    match subject.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => format!("this review for the {}", sanitize(name)),
        None => "this text".to_string(),
    }
}

fn summary_instruction(level: DetailLevel, subject: &str) -> String {
    match level {
        DetailLevel::Brief => format!("Summarize {} in 2-3 sentences.", subject),
        DetailLevel::Detailed => format!(
            "Provide a comprehensive summary of {}, covering all main points.",
            subject
        ),
        DetailLevel::Bullets => format!(
            "Summarize {} as bullet points (use - for each point).",
            subject
        ),
    }
}
