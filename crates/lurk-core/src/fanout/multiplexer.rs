//! Event-driven merge of all provider streams of one turn.
//!
//! Provider tasks push into one shared channel as soon as they have an
//! event, so delivery follows arrival order: a provider that is never ready
//! cannot hold back one that is. The multiplexer drains the channel until
//! every provider has reported `Done` or `Error`, charging the ledger for
//! each delta on the way.

use std::collections::{BTreeSet, HashSet};
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use lurk_types::answer::Answer;
use lurk_types::event::{CompletionMarker, StreamEvent, StreamEventKind, TurnEvent};

use crate::estimate::estimate_tokens;
use crate::ledger::{LedgerStatus, TokenLedger};

/// Merged per-turn event sequence.
pub type TurnEvents = Pin<Box<dyn Stream<Item = TurnEvent> + Send + 'static>>;

/// Cause reported for a provider whose task vanished without a final event.
pub const TASK_LOST: &str = "provider task ended unexpectedly";

/// Merge `events` into one ordered sequence.
///
/// When a delta charge exhausts the ledger, the turn's token is cancelled:
/// providers stop after their current chunk, events already in flight are
/// still delivered, and the marker reports `budget_exceeded`. Dropping the
/// returned stream cancels the token and aborts every task.
pub(crate) fn multiplex(
    mut events: mpsc::Receiver<StreamEvent>,
    tasks: JoinSet<()>,
    providers: Vec<String>,
    cancel: CancellationToken,
    answers: Arc<DashMap<String, Answer>>,
    ledger: TokenLedger,
) -> TurnEvents {
    // Moved into the stream so they drop with it, polled or not.
    let cancel_on_drop = cancel.clone().drop_guard();
    Box::pin(async_stream::stream! {
        let _cancel_on_drop = cancel_on_drop;
        let _tasks = tasks;

        let mut active: HashSet<String> = providers.into_iter().collect();
        let mut budget_exceeded = false;

        while !active.is_empty() {
            let Some(event) = events.recv().await else {
                break;
            };
            if !active.contains(&event.provider_id) {
                continue;
            }

            if let StreamEventKind::Delta { text } = &event.kind {
                let (used, status) = ledger.charge_with_status(estimate_tokens(text));
                if status == LedgerStatus::Exhausted && !budget_exceeded {
                    budget_exceeded = true;
                    tracing::warn!(
                        used,
                        limit = ledger.limit(),
                        active = active.len(),
                        "token budget exhausted mid-turn, cancelling providers"
                    );
                    cancel.cancel();
                }
            }

            if event.is_terminal() {
                active.remove(&event.provider_id);
            }
            yield TurnEvent::Provider(event);
        }

        // Every sender is gone but some providers never finished.
        let lost: BTreeSet<String> = active.into_iter().collect();
        for id in lost {
            tracing::error!(provider = %id, "provider task ended without a final event");
            answers.insert(id.clone(), Answer::Failed(TASK_LOST.to_string()));
            yield TurnEvent::Provider(StreamEvent::error(id, TASK_LOST));
        }

        yield TurnEvent::Complete(CompletionMarker::new(
            ledger.remaining(),
            ledger.used(),
            budget_exceeded,
        ));
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;

    fn parts(
        providers: &[&str],
    ) -> (
        mpsc::Sender<StreamEvent>,
        mpsc::Receiver<StreamEvent>,
        Vec<String>,
        CancellationToken,
        Arc<DashMap<String, Answer>>,
    ) {
        let (tx, rx) = mpsc::channel(32);
        (
            tx,
            rx,
            providers.iter().map(|p| p.to_string()).collect(),
            CancellationToken::new(),
            Arc::new(DashMap::new()),
        )
    }

    #[tokio::test]
    async fn marker_is_last_and_carries_remaining() {
        let (tx, rx, providers, cancel, answers) = parts(&["a", "b"]);
        let ledger = TokenLedger::new(100);

        tx.send(StreamEvent::delta("a", "abcd")).await.unwrap();
        tx.send(StreamEvent::done("b", 0)).await.unwrap();
        tx.send(StreamEvent::done("a", 1)).await.unwrap();
        drop(tx);

        let out: Vec<TurnEvent> =
            multiplex(rx, JoinSet::new(), providers, cancel, answers, ledger.clone())
                .collect()
                .await;

        assert_eq!(out.len(), 4);
        assert_eq!(
            out.last(),
            Some(&TurnEvent::Complete(CompletionMarker::new(99, 1, false)))
        );
        assert_eq!(ledger.used(), 1);
    }

    #[tokio::test]
    async fn closed_channel_reports_lost_providers() {
        let (tx, rx, providers, cancel, answers) = parts(&["a", "b"]);
        tx.send(StreamEvent::done("a", 0)).await.unwrap();
        drop(tx);

        let out: Vec<TurnEvent> = multiplex(
            rx,
            JoinSet::new(),
            providers,
            cancel,
            Arc::clone(&answers),
            TokenLedger::new(10),
        )
        .collect()
        .await;

        assert_eq!(out[1], TurnEvent::Provider(StreamEvent::error("b", TASK_LOST)));
        assert!(matches!(out[2], TurnEvent::Complete(_)));
        assert!(answers.get("b").is_some_and(|a| a.is_failed()));
    }

    #[tokio::test]
    async fn exhaustion_cancels_and_flags_marker() {
        let (tx, rx, providers, cancel, answers) = parts(&["a"]);
        let ledger = TokenLedger::new(2);
        let observer = cancel.clone();

        tx.send(StreamEvent::delta("a", "twelve chars")).await.unwrap();
        tx.send(StreamEvent::error("a", "cancelled")).await.unwrap();
        drop(tx);

        let out: Vec<TurnEvent> =
            multiplex(rx, JoinSet::new(), providers, cancel, answers, ledger)
                .collect()
                .await;

        assert!(observer.is_cancelled());
        assert_eq!(
            out.last(),
            Some(&TurnEvent::Complete(CompletionMarker::new(0, 3, true)))
        );
    }

    #[tokio::test]
    async fn dropping_stream_cancels_token() {
        let (tx, rx, providers, cancel, answers) = parts(&["a"]);
        let observer = cancel.clone();

        let mut stream = multiplex(
            rx,
            JoinSet::new(),
            providers,
            cancel,
            answers,
            TokenLedger::new(10),
        );
        tx.send(StreamEvent::delta("a", "x")).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(first.is_some());
        drop(stream);

        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn ignores_events_from_unknown_or_finished_providers() {
        let (tx, rx, providers, cancel, answers) = parts(&["a"]);
        tx.send(StreamEvent::delta("zzz", "stray")).await.unwrap();
        tx.send(StreamEvent::done("a", 0)).await.unwrap();
        drop(tx);

        let out: Vec<TurnEvent> = multiplex(
            rx,
            JoinSet::new(),
            providers,
            cancel,
            answers,
            TokenLedger::new(10),
        )
        .collect()
        .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], TurnEvent::Provider(StreamEvent::done("a", 0)));
    }
}
