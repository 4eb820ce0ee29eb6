//! Approximate token cost estimation.
//!
//! The ledger is a governor, not a meter: costs are estimated at roughly four
//! characters per token, rounded up. The estimate is monotonic in text length
//! and the same function is used for admission, per-delta charges and the
//! per-provider totals reported in `Done` events.

/// Rough characters-per-token ratio for English text.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Estimated tokens for `text`: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Turn-level cost estimation used before admission.
#[derive(Debug, Clone, Copy)]
pub struct CostEstimator {
    /// Flat cost charged per attachment reference, per provider.
    pub attachment_cost: u64,
}

impl Default for CostEstimator {
    fn default() -> Self {
        Self {
            attachment_cost: 250,
        }
    }
}

impl CostEstimator {
    pub fn new(attachment_cost: u64) -> Self {
        Self { attachment_cost }
    }

    /// Estimated input cost of sending `prompt` with `persona` and
    /// `attachments` to one provider.
    pub fn unit_cost(&self, prompt: &str, persona: &str, attachments: usize) -> u64 {
        estimate_tokens(prompt)
            .saturating_add(estimate_tokens(persona))
            .saturating_add(self.attachment_cost.saturating_mul(attachments as u64))
    }
}
