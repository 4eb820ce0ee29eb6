//! Handle to a dispatched turn.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lurk_types::answer::{Answer, AnswerSet};
use lurk_types::event::{CompletionMarker, StreamEvent, TurnEvent};

use crate::ledger::TokenLedger;

use super::multiplexer::{TurnEvents, multiplex};

/// Shared view of the per-turn answer accumulator.
///
/// Each provider task writes only its own entry.
#[derive(Debug, Clone, Default)]
pub struct AnswerHandle(Arc<DashMap<String, Answer>>);

impl AnswerHandle {
    /// Copy of the answers recorded so far.
    pub fn snapshot(&self) -> AnswerSet {
        self.0
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// A running turn: provider tasks plus the receiving end of their events.
///
/// Dropping the turn (or the stream returned by [`Turn::into_events`])
/// cancels and aborts every provider task.
pub struct Turn {
    id: Uuid,
    providers: Vec<String>,
    events: mpsc::Receiver<StreamEvent>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    answers: Arc<DashMap<String, Answer>>,
    ledger: TokenLedger,
}

/// Everything a drained turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Provider events in arrival order.
    pub events: Vec<StreamEvent>,
    pub answers: AnswerSet,
    pub marker: CompletionMarker,
}

impl Turn {
    pub(crate) fn new(
        id: Uuid,
        providers: Vec<String>,
        events: mpsc::Receiver<StreamEvent>,
        tasks: JoinSet<()>,
        cancel: CancellationToken,
        answers: Arc<DashMap<String, Answer>>,
        ledger: TokenLedger,
    ) -> Self {
        Self {
            id,
            providers,
            events,
            tasks,
            cancel,
            answers,
            ledger,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Provider ids taking part, deduplicated, in request order.
    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Token that stops every provider task of this turn when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn answers(&self) -> AnswerHandle {
        AnswerHandle(Arc::clone(&self.answers))
    }

    /// The merged event sequence, ending with one completion marker.
    pub fn into_events(self) -> TurnEvents {
        multiplex(
            self.events,
            self.tasks,
            self.providers,
            self.cancel,
            self.answers,
            self.ledger,
        )
    }

    /// Drain the turn to completion.
    pub async fn collect(self) -> TurnOutcome {
        let answers = self.answers();
        let ledger = self.ledger.clone();
        let mut stream = self.into_events();

        let mut events = Vec::new();
        let mut marker = None;
        while let Some(event) = stream.next().await {
            match event {
                TurnEvent::Provider(ev) => events.push(ev),
                TurnEvent::Complete(m) => marker = Some(m),
            }
        }

        TurnOutcome {
            events,
            answers: answers.snapshot(),
            marker: marker
                .unwrap_or_else(|| CompletionMarker::new(ledger.remaining(), ledger.used(), false)),
        }
    }
}
