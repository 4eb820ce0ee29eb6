//! Answers collected from one turn, synthesis results, and history records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters of a prompt shown in history listings.
pub const SNIPPET_CHARS: usize = 30;

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// A provider's final answer for a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Text(String),
    Failed(String),
}

impl Answer {
    pub fn is_failed(&self) -> bool {
        matches!(self, Answer::Failed(_))
    }

    /// Blank text counts as no answer at all.
    pub fn is_blank(&self) -> bool {
        match self {
            Answer::Text(text) => text.trim().is_empty(),
            Answer::Failed(_) => false,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Text(text) => f.write_str(text),
            Answer::Failed(message) => write!(f, "[Error] {message}"),
        }
    }
}

/// Provider id -> final answer, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<String, Answer>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set where every entry is a successful text answer.
    pub fn from_texts<I, K, V>(texts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            texts
                .into_iter()
                .map(|(k, v)| (k.into(), Answer::Text(v.into())))
                .collect(),
        )
    }

    pub fn insert(&mut self, provider_id: impl Into<String>, answer: Answer) {
        self.0.insert(provider_id.into(), answer);
    }

    pub fn get(&self, provider_id: &str) -> Option<&Answer> {
        self.0.get(provider_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Answer)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required ids with no usable entry, in the order given.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|id| self.0.get(id.as_str()).is_none_or(Answer::is_blank))
            .map(String::as_str)
            .collect()
    }

    pub fn is_complete(&self, required: &[String]) -> bool {
        self.missing(required).is_empty()
    }
}

impl FromIterator<(String, Answer)> for AnswerSet {
    fn from_iter<T: IntoIterator<Item = (String, Answer)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Where a synthesized answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SynthesisSource {
    Synthesized,
    FallbackCombined,
}

impl fmt::Display for SynthesisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisSource::Synthesized => write!(f, "synthesized"),
            SynthesisSource::FallbackCombined => write!(f, "fallback-combined"),
        }
    }
}

/// The merged best-of-N answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub text: String,
    pub source: SynthesisSource,
    pub tokens_consumed: u64,
    /// Why the synthesis backend failed, when `source` is the fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A finished turn handed to the history recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub answers: AnswerSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisResult>,
}

impl HistoryRecord {
    pub fn new(prompt: impl Into<String>, answers: AnswerSet) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            prompt: prompt.into(),
            answers,
            synthesis: None,
        }
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            id: self.id,
            timestamp: self.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            snippet: excerpt(&self.prompt, SNIPPET_CHARS),
            providers: self.answers.len(),
            synthesized: self.synthesis.is_some(),
        }
    }
}

/// One line of a history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: Uuid,
    pub timestamp: String,
    pub snippet: String,
    pub providers: usize,
    pub synthesized: bool,
}
