//! Bounded in-memory history store.
//!
//! Keeps the newest `capacity` turns in a `VecDeque`; once full, recording
//! a new turn evicts the oldest one.

use std::collections::VecDeque;

use tokio::sync::RwLock;
use uuid::Uuid;

use lurk_core::history::HistoryRecorder;
use lurk_types::answer::{AnswerSet, HistoryRecord, HistorySummary, SynthesisResult};
use lurk_types::error::HistoryError;

pub struct InMemoryHistory {
    capacity: usize,
    records: RwLock<VecDeque<HistoryRecord>>,
}

impl InMemoryHistory {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn push(&self, records: &mut VecDeque<HistoryRecord>, record: HistoryRecord) {
        while records.len() >= self.capacity {
            if let Some(evicted) = records.pop_front() {
                tracing::debug!(record = %evicted.id, "history full, evicting oldest record");
            }
        }
        records.push_back(record);
    }
}

impl HistoryRecorder for InMemoryHistory {
    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let mut records = self.records.write().await;
        tracing::debug!(record = %record.id, answers = record.answers.len(), "recording turn");
        self.push(&mut records, record);
        Ok(())
    }

    async fn attach_synthesis(
        &self,
        prompt: &str,
        result: SynthesisResult,
    ) -> Result<Uuid, HistoryError> {
        let mut records = self.records.write().await;
        if let Some(record) = records.iter_mut().rev().find(|r| r.prompt == prompt) {
            record.synthesis = Some(result);
            return Ok(record.id);
        }

        let mut record = HistoryRecord::new(prompt, AnswerSet::new());
        record.synthesis = Some(result);
        let id = record.id;
        self.push(&mut records, record);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<HistorySummary>, HistoryError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().map(HistoryRecord::summary).collect())
    }

    async fn get(&self, id: &Uuid) -> Result<HistoryRecord, HistoryError> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|r| r.id == *id)
            .cloned()
            .ok_or(HistoryError::NotFound)
    }

    async fn records(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(self.records.read().await.iter().cloned().collect())
    }

    async fn replace_answers(&self, id: &Uuid, answers: AnswerSet) -> Result<(), HistoryError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or(HistoryError::NotFound)?;
        record.answers = answers;
        record.synthesis = None;
        Ok(())
    }

    async fn clear(&self) -> Result<usize, HistoryError> {
        let mut records = self.records.write().await;
        let removed = records.len();
        records.clear();
        tracing::info!(removed, "history cleared");
        Ok(removed)
    }
}
