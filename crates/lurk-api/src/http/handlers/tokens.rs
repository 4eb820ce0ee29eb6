//! Token budget endpoints.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::http::extractors::admin::Operator;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TokenUsage {
    pub tokens_used: u64,
    pub token_limit: u64,
    pub remaining_tokens: u64,
    pub usage_percentage: f64,
}

impl TokenUsage {
    fn read(state: &AppState) -> Self {
        Self {
            tokens_used: state.ledger.used(),
            token_limit: state.ledger.limit(),
            remaining_tokens: state.ledger.remaining(),
            usage_percentage: (state.ledger.percentage() * 100.0).round() / 100.0,
        }
    }
}

/// GET /tokens
pub async fn get_tokens(State(state): State<AppState>) -> Json<TokenUsage> {
    Json(TokenUsage::read(&state))
}

/// POST /reset-tokens (operator only)
pub async fn reset_tokens(_op: Operator, State(state): State<AppState>) -> Json<TokenUsage> {
    let previous = state.ledger.used();
    state.ledger.reset();
    tracing::info!(previous, "token ledger reset by operator");
    Json(TokenUsage::read(&state))
}
