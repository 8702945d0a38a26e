//! Response parsing.
//!
//! Turns the model's free-form reply into an [`AnalysisResult`]. The reply is
//! untrusted: it may follow the requested `Field: value` shape, wrap it in
//! markdown, answer in prose, or say nothing useful. Parsing never fails; the
//! quality of what was recovered is reported through [`ParseStatus`].

use crate::models::{AnalysisMode, AnalysisResult, ParseStatus};
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

// Compile patterns once at startup
static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s>*#_`\-]*(sentiment|label|confidence|score|topic|summary)[\s*_`]*[:=][\s*_`]*(.*)$")
        .expect("Invalid regex: field marker line")
});

static SENTIMENT_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(positive|negative|neutral|mixed)\b").expect("Invalid regex: sentiment words")
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?(?:\d+(?:\.\d+)?|\.\d+))\s*(%)?").expect("Invalid regex: confidence number")
});

static LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}{3,}").expect("Invalid regex: word letters"));

/// Replies that decline or hedge instead of answering. Never used as fallback values.
static NON_ANSWER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(i'?m|i am)\s+(so\s+|very\s+)?sorry\b").expect("Invalid regex: apology"),
        Regex::new(r"(?i)\bi\s+(can'?t|cannot|can not|won'?t|am unable to|'?m unable to)\b")
            .expect("Invalid regex: refusal"),
        Regex::new(r"(?i)\bi\s+(don'?t|do not)\s+(know|understand)\b").expect("Invalid regex: uncertainty"),
        Regex::new(r"(?i)\bi'?m\s+not\s+sure\b").expect("Invalid regex: not sure"),
        Regex::new(r"(?i)\bas an ai\b").expect("Invalid regex: as an AI"),
        Regex::new(r"(?i)\b(language model|unable to (help|assist|comply))\b").expect("Invalid regex: assistant disclaimer"),
    ]
});

static LEADING_PRONOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(i|i'm|i've|you|we|he|she|it|it's|they|this|that|my|our)\b")
        .expect("Invalid regex: leading pronoun")
});

/// A topic recovered without its marker must look like a label, not prose.
const MAX_FALLBACK_TOPIC_WORDS: usize = 5;
const MAX_FALLBACK_TOPIC_CHARS: usize = 40;
/// A summary recovered without its marker must be at least a short sentence.
const MIN_FALLBACK_SUMMARY_WORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Label,
    Confidence,
    Topic,
    Summary,
}

/// Where a field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Marker,
    Fallback,
    Missing,
}

/// Marker values found in one reply, first occurrence wins.
#[derive(Debug, Default)]
struct MarkedFields {
    label: Option<String>,
    confidence: Option<String>,
    topic: Option<String>,
    summary: Option<String>,
}

impl MarkedFields {
    fn scan(raw: &str) -> Self {
        let mut fields = MarkedFields::default();
        let mut summary_lines: Option<Vec<String>> = None;
        let mut collecting_summary = false;

        for line in raw.lines() {
            if let Some(caps) = FIELD_LINE.captures(line) {
                collecting_summary = false;
                // An echoed format line ("Sentiment: <Positive|Negative|Neutral>") is not an answer.
                if is_template_placeholder(&caps[2]) {
                    continue;
                }
                let value = clean_value(&caps[2]);
                let field = match caps[1].to_ascii_lowercase().as_str() {
                    "sentiment" | "label" => Field::Label,
                    "confidence" | "score" => Field::Confidence,
                    "topic" => Field::Topic,
                    _ => Field::Summary,
                };
                match field {
                    Field::Label => {
                        fields.label.get_or_insert(value);
                    }
                    Field::Confidence => {
                        fields.confidence.get_or_insert(value);
                    }
                    Field::Topic => {
                        fields.topic.get_or_insert(value);
                    }
                    Field::Summary if summary_lines.is_none() => {
                        summary_lines = Some(vec![value]);
                        collecting_summary = true;
                    }
                    Field::Summary => {}
                }
            } else if collecting_summary {
                // Continuation of a multi-line (e.g. bulleted) summary.
                if let Some(lines) = summary_lines.as_mut() {
                    lines.push(line.trim_end().to_string());
                }
            }
        }

        fields.summary = summary_lines
            .map(|lines| lines.join("\n").trim().to_string())
            .filter(|s| !s.is_empty());
        fields
    }
}

/// Tolerant parser for model replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses `raw` for the fields `mode` asked for. Never fails.
    pub fn parse(&self, raw: &str, mode: AnalysisMode) -> AnalysisResult {
        let marked = MarkedFields::scan(raw);

        let wants_label = matches!(mode, AnalysisMode::Sentiment | AnalysisMode::BatchItem);
        let wants_topic = matches!(mode, AnalysisMode::Topic | AnalysisMode::BatchItem);
        let wants_summary = matches!(mode, AnalysisMode::Summary | AnalysisMode::BatchItem);

        let (label, label_source) = if wants_label {
            match marked.label.as_deref().and_then(normalize_label) {
                Some(label) => (Some(label), Source::Marker),
                None => match normalize_label(&without_template_lines(raw)) {
                    Some(label) => (Some(label), Source::Fallback),
                    None => (None, Source::Missing),
                },
            }
        } else {
            (None, Source::Missing)
        };

        let confidence = if wants_label {
            marked.confidence.as_deref().and_then(parse_confidence)
        } else {
            None
        };

        let (topic, topic_source) = if wants_topic {
            match marked.topic.as_deref().and_then(clean_topic) {
                Some(topic) => (Some(topic), Source::Marker),
                None if mode == AnalysisMode::Topic => match fallback_topic(raw) {
                    Some(topic) => (Some(topic), Source::Fallback),
                    None => (None, Source::Missing),
                },
                None => (None, Source::Missing),
            }
        } else {
            (None, Source::Missing)
        };

        let (summary, summary_source) = if wants_summary {
            match marked.summary.clone() {
                Some(summary) => (Some(summary), Source::Marker),
                None if mode == AnalysisMode::Summary => match fallback_summary(raw) {
                    Some(summary) => (Some(summary), Source::Fallback),
                    None => (None, Source::Missing),
                },
                None => (None, Source::Missing),
            }
        } else {
            (None, Source::Missing)
        };

        let required: Vec<Source> = [
            (wants_label, label_source),
            (wants_topic, topic_source),
            (wants_summary, summary_source),
        ]
        .into_iter()
        .filter(|(wanted, _)| *wanted)
        .map(|(_, source)| source)
        .collect();

        let parse_status = if required.iter().all(|s| *s == Source::Marker) {
            ParseStatus::Ok
        } else if required.iter().any(|s| *s != Source::Missing) {
            ParseStatus::Degraded
        } else {
            ParseStatus::Failed
        };

        if parse_status == ParseStatus::Failed {
            return AnalysisResult::failed(mode, raw);
        }

        AnalysisResult {
            request_id: Uuid::new_v4(),
            mode,
            model: String::new(),
            label,
            confidence,
            topic,
            summary,
            raw_model_output: raw.to_string(),
            parse_status,
            attempts: 0,
        }
    }
}

/// Strips markdown emphasis, quotes and surrounding whitespace from a marker value.
fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '`' | '"' | '\'' | '[' | ']' | '<' | '>'))
        .trim()
        .to_string()
}

fn is_template_placeholder(value: &str) -> bool {
    let value = value.trim();
    (value.starts_with('<') && value.ends_with('>'))
        || (value.contains('|') && !value.contains(char::is_whitespace))
}

/// `raw` minus echoed format lines, so their option lists are not read as answers.
fn without_template_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| {
            !FIELD_LINE
                .captures(line)
                .is_some_and(|caps| is_template_placeholder(&caps[2]))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_non_answer(text: &str) -> bool {
    NON_ANSWER_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Earliest sentiment word in `text`, lowercased; "mixed" reads as neutral.
fn normalize_label(text: &str) -> Option<String> {
    SENTIMENT_WORD.find(text).map(|m| {
        let word = m.as_str().to_ascii_lowercase();
        if word == "mixed" {
            "neutral".to_string()
        } else {
            word
        }
    })
}

/// First number in the value, `%` read as a percentage, clamped to `[0, 1]`.
fn parse_confidence(value: &str) -> Option<f32> {
    let caps = NUMBER.captures(value)?;
    let mut number: f32 = caps[1].parse().ok()?;
    if caps.get(2).is_some() {
        number /= 100.0;
    }
    if !number.is_finite() {
        return None;
    }
    Some(number.clamp(0.0, 1.0))
}

fn clean_topic(value: &str) -> Option<String> {
    let topic = value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | '!'))
        .trim()
        .to_string();
    (!topic.is_empty()).then_some(topic)
}

/// A short first line, when the model answered with the bare topic.
fn fallback_topic(raw: &str) -> Option<String> {
    if is_non_answer(raw) {
        return None;
    }
    let first = raw.lines().map(clean_value).find(|line| !line.is_empty())?;
    if first.ends_with(['.', '!', '?']) || LEADING_PRONOUN.is_match(&first) {
        return None;
    }
    let topic = clean_topic(&first)?;
    let words = topic.split_whitespace().count();
    if words <= MAX_FALLBACK_TOPIC_WORDS
        && topic.chars().count() <= MAX_FALLBACK_TOPIC_CHARS
        && LETTERS.is_match(&topic)
    {
        Some(topic)
    } else {
        None
    }
}

/// The whole reply, when the model summarized without the marker.
fn fallback_summary(raw: &str) -> Option<String> {
    let text = raw.trim();
    let words = text.split_whitespace().filter(|w| LETTERS.is_match(w)).count();
    (words >= MIN_FALLBACK_SUMMARY_WORDS && !is_non_answer(text)).then(|| text.to_string())
}
