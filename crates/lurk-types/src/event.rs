//! Per-turn event vocabulary.
//!
//! A [`StreamEvent`] is what one provider contributes to a turn; a
//! [`TurnEvent`] is what the merged sequence delivers to the caller,
//! ending with exactly one [`CompletionMarker`].

use serde::{Deserialize, Serialize};

/// What happened on one provider's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEventKind {
    /// A piece of answer text.
    Delta { text: String },
    /// The provider finished; `tokens` is what this provider was charged.
    Done { tokens: u64 },
    /// The provider failed; no further events follow for it.
    Error { message: String },
}

/// One event from one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "provider")]
    pub provider_id: String,
    #[serde(flatten)]
    pub kind: StreamEventKind,
}

impl StreamEvent {
    pub fn delta(provider_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            kind: StreamEventKind::Delta { text: text.into() },
        }
    }

    pub fn done(provider_id: impl Into<String>, tokens: u64) -> Self {
        Self {
            provider_id: provider_id.into(),
            kind: StreamEventKind::Done { tokens },
        }
    }

    pub fn error(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            kind: StreamEventKind::Error {
                message: message.into(),
            },
        }
    }

    /// Done or Error: the provider's last event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            StreamEventKind::Done { .. } | StreamEventKind::Error { .. }
        )
    }
}

/// Final marker of a turn. Always the last event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub all_done: bool,
    /// Ledger budget remaining when the turn finished.
    pub tokens: u64,
    pub tokens_used: u64,
    pub budget_exceeded: bool,
}

impl CompletionMarker {
    pub fn new(remaining: u64, used: u64, budget_exceeded: bool) -> Self {
        Self {
            all_done: true,
            tokens: remaining,
            tokens_used: used,
            budget_exceeded,
        }
    }
}

/// An item of the merged per-turn sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnEvent {
    Provider(StreamEvent),
    Complete(CompletionMarker),
}
