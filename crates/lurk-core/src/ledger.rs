//! Process-wide token ledger.
//!
//! `TokenLedger` is the only mutable state shared by concurrently running
//! provider tasks. Charges are lock-free `fetch_add`s, so concurrent charges
//! are linearizable and never lose an increment. A warning is logged exactly
//! once when usage crosses 80% of the limit, even under concurrent access.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Percentage of the limit at which the one-shot warning fires.
const WARNING_PERCENT: u64 = 80;

/// Budget state after a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    /// Under the warning threshold, or already warned.
    Ok,
    /// Just crossed the warning threshold. Returned once per reset.
    Warning,
    /// At or over the limit.
    Exhausted,
}

/// Shared token counter with admission and charge operations.
///
/// Cloning produces another handle to the same counter.
#[derive(Debug, Clone)]
pub struct TokenLedger {
    limit: u64,
    warning_at: u64,
    used: Arc<AtomicU64>,
    warning_emitted: Arc<AtomicBool>,
}

impl TokenLedger {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            warning_at: (u128::from(limit) * u128::from(WARNING_PERCENT) / 100) as u64,
            used: Arc::new(AtomicU64::new(0)),
            warning_emitted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a turn estimated at `estimated` tokens may start.
    ///
    /// Refuses when `used + estimated > limit`.
    pub fn admit(&self, estimated: u64) -> bool {
        self.used().saturating_add(estimated) <= self.limit
    }

    /// Atomically add `cost` and return the new `used` value.
    pub fn charge(&self, cost: u64) -> u64 {
        self.charge_with_status(cost).0
    }

    /// Atomically add `cost`; returns the new `used` value and the status.
    pub fn charge_with_status(&self, cost: u64) -> (u64, LedgerStatus) {
        let prev = self.used.fetch_add(cost, Ordering::SeqCst);
        let new_total = prev.saturating_add(cost);

        if new_total >= self.limit {
            return (new_total, LedgerStatus::Exhausted);
        }

        if prev < self.warning_at
            && new_total >= self.warning_at
            && self
                .warning_emitted
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            tracing::warn!(
                used = new_total,
                limit = self.limit,
                "token budget is {WARNING_PERCENT}% consumed"
            );
            return (new_total, LedgerStatus::Warning);
        }

        (new_total, LedgerStatus::Ok)
    }

    /// Zero the counter. Administrative only; returns the new value.
    pub fn reset(&self) -> u64 {
        self.used.store(0, Ordering::SeqCst);
        self.warning_emitted.store(false, Ordering::SeqCst);
        tracing::info!(limit = self.limit, "token ledger reset");
        0
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Remaining tokens before exhaustion (saturating).
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Percentage of the limit consumed (0.0 to 100.0+).
    pub fn percentage(&self) -> f64 {
        if self.limit == 0 {
            return 100.0;
        }
        self.used() as f64 / self.limit as f64 * 100.0
    }
}
