//! Input language detection.
//!
//! Stopword and accent counting, no model involved. Only used to ask the
//! model to answer summaries in the language of the input.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    French,
    Spanish,
    German,
    Unknown,
}

impl Language {
    /// Prompt prefix asking the model to answer in this language.
    /// Empty for English and for anything we could not identify.
    pub fn response_instruction(&self) -> &'static str {
        match self {
            Language::French => "Respond in French. ",
            Language::Spanish => "Respond in Spanish. ",
            Language::German => "Respond in German. ",
            Language::English | Language::Unknown => "",
        }
    }
}

const ENGLISH_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
    "does", "did", "i", "you", "he", "she", "it", "we", "they", "and", "or", "but", "for",
    "with", "from", "to", "in", "on", "this", "that", "not", "very",
];

const FRENCH_WORDS: &[&str] = &[
    "le", "la", "les", "un", "une", "des", "du", "et", "ou", "mais", "je", "tu", "il", "elle",
    "nous", "vous", "ils", "elles", "est", "sont", "être", "avoir", "pour", "dans", "sur",
    "avec", "pas", "très", "ce", "cette",
];

const SPANISH_WORDS: &[&str] = &[
    "el", "los", "las", "una", "unos", "y", "pero", "yo", "es", "son", "está", "para",
    "por", "con", "muy", "este", "esta", "que", "no", "lo",
];

const GERMAN_WORDS: &[&str] = &[
    "der", "die", "das", "ein", "eine", "und", "oder", "aber", "ich", "du", "er", "sie", "wir",
    "ist", "sind", "nicht", "sehr", "mit", "für", "auf", "zu",
];

/// Detects the dominant language of `text`.
///
/// A language wins only when it scores at least twice the runner-up; close
/// calls come back as `Unknown` so no instruction is added.
pub fn detect_language(text: &str) -> Language {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();

    let count = |vocabulary: &[&str]| words.iter().filter(|w| vocabulary.contains(w)).count();

    let french_chars = text
        .chars()
        .filter(|c| matches!(*c, 'è' | 'ê' | 'ë' | 'à' | 'â' | 'ù' | 'û' | 'ô' | 'î' | 'ç' | 'œ'))
        .count();
    let spanish_chars = text.chars().filter(|c| matches!(*c, 'ñ' | '¿' | '¡')).count();
    let german_chars = text.chars().filter(|c| matches!(*c, 'ä' | 'ö' | 'ü' | 'ß')).count();

    let mut scores = [
        (Language::English, count(ENGLISH_WORDS)),
        (Language::French, count(FRENCH_WORDS) + french_chars),
        (Language::Spanish, count(SPANISH_WORDS) + spanish_chars),
        (Language::German, count(GERMAN_WORDS) + german_chars),
    ];
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (best, best_score) = scores[0];
    let runner_up = scores[1].1;
    if best_score == 0 || best_score < runner_up * 2 {
        return Language::Unknown;
    }
    best
}
