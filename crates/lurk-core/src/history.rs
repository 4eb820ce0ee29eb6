//! Turn history port and the regenerate workflow.
//!
//! The core never owns history storage: it hands finished records to a
//! [`HistoryRecorder`] implementation supplied by the caller (the in-memory
//! store lives in lurk-infra).

use uuid::Uuid;

use lurk_types::answer::{AnswerSet, HistoryRecord, HistorySummary, SynthesisResult};
use lurk_types::error::{DispatchError, HistoryError};

use crate::fanout::{Dispatcher, TurnRequest};

/// Storage for finished turns.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait HistoryRecorder: Send + Sync {
    /// Store a finished turn.
    fn record(
        &self,
        record: HistoryRecord,
    ) -> impl std::future::Future<Output = Result<(), HistoryError>> + Send;

    /// Attach a synthesis result to the newest record with `prompt`,
    /// creating an answer-less record when none exists. Returns its id.
    fn attach_synthesis(
        &self,
        prompt: &str,
        result: SynthesisResult,
    ) -> impl std::future::Future<Output = Result<Uuid, HistoryError>> + Send;

    /// Summaries, newest first.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<HistorySummary>, HistoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<HistoryRecord, HistoryError>> + Send;

    /// Full records, oldest first.
    fn records(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<HistoryRecord>, HistoryError>> + Send;

    /// Replace a record's answers. Any attached synthesis is dropped.
    fn replace_answers(
        &self,
        id: &Uuid,
        answers: AnswerSet,
    ) -> impl std::future::Future<Output = Result<(), HistoryError>> + Send;

    /// Remove everything; returns how many records were removed.
    fn clear(&self) -> impl std::future::Future<Output = Result<usize, HistoryError>> + Send;
}

/// What a regenerate run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenerateReport {
    pub regenerated: usize,
    pub total: usize,
    /// Set when the token budget stopped the run early.
    pub stopped: Option<DispatchError>,
}

/// Re-run every recorded prompt against `providers`, oldest first, and
/// replace the stored answers.
///
/// Each prompt goes through normal admission. A budget refusal stops the
/// run and is reported in [`RegenerateReport::stopped`]; a malformed
/// selection is returned as an error before anything is regenerated.
pub async fn regenerate_all<R: HistoryRecorder>(
    recorder: &R,
    dispatcher: &Dispatcher,
    providers: &[String],
) -> Result<RegenerateReport, RegenerateError> {
    let records = recorder.records().await?;
    let mut report = RegenerateReport {
        regenerated: 0,
        total: records.len(),
        stopped: None,
    };

    for record in records {
        let request = TurnRequest::new(record.prompt.clone(), providers.to_vec());
        let turn = match dispatcher.dispatch(request) {
            Ok(turn) => turn,
            Err(err @ DispatchError::BudgetExceeded { .. }) => {
                tracing::warn!(
                    regenerated = report.regenerated,
                    total = report.total,
                    "regeneration stopped: {err}"
                );
                report.stopped = Some(err);
                break;
            }
            Err(DispatchError::EmptyPrompt) => {
                tracing::debug!(record = %record.id, "skipping record with empty prompt");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let outcome = turn.collect().await;
        match recorder.replace_answers(&record.id, outcome.answers).await {
            Ok(()) => report.regenerated += 1,
            Err(err) => {
                tracing::debug!(record = %record.id, "record removed during regeneration: {err}");
            }
        }
    }

    tracing::info!(
        regenerated = report.regenerated,
        total = report.total,
        "history regenerated"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegenerateError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    History(#[from] HistoryError),
}
