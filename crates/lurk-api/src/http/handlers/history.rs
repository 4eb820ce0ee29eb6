//! Turn history endpoints.
//!
//! - GET /history: summaries, newest first
//! - GET /history/{id}: one full record
//! - DELETE /history: clear
//! - POST /history/regenerate: re-run every prompt against a new selection

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use lurk_core::history::{HistoryRecorder, RegenerateError, regenerate_all};
use lurk_types::answer::{HistoryRecord, HistorySummary};
use lurk_types::error::HistoryError;

use crate::http::error::AppError;
use crate::state::AppState;

pub async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<HistorySummary>>, AppError> {
    Ok(Json(state.history.list().await?))
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryRecord>, AppError> {
    // An id that does not parse cannot name a record.
    let id: Uuid = id.parse().map_err(|_| HistoryError::NotFound)?;
    Ok(Json(state.history.get(&id).await?))
}

pub async fn clear_history(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state.history.clear().await?;
    Ok(Json(json!({ "removed": removed })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegenerateRequest {
    /// Defaults to every enabled provider.
    pub providers: Option<Vec<String>>,
}

pub async fn regenerate(
    State(state): State<AppState>,
    Json(body): Json<RegenerateRequest>,
) -> Result<Response, AppError> {
    let providers = body
        .providers
        .unwrap_or_else(|| state.registry.enabled_ids());

    let report = regenerate_all(state.history.as_ref(), &state.dispatcher, &providers)
        .await
        .map_err(|e| match e {
            RegenerateError::Dispatch(e) => AppError::Dispatch(e),
            RegenerateError::History(e) => AppError::History(e),
        })?;

    let response = match report.stopped {
        Some(reason) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": reason.to_string(),
                "regenerated": report.regenerated,
                "total": report.total,
            })),
        )
            .into_response(),
        None => Json(json!({
            "regenerated": report.regenerated,
            "total": report.total,
        }))
        .into_response(),
    };
    Ok(response)
}
