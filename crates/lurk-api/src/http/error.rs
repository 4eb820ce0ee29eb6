//! Application error type mapping to HTTP status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use lurk_types::error::{DispatchError, HistoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Dispatch(DispatchError),
    History(HistoryError),
    /// Missing or wrong operator token.
    Unauthorized(String),
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        AppError::Dispatch(e)
    }
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        AppError::History(e)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Dispatch(DispatchError::BudgetExceeded { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Dispatch(_) => StatusCode::BAD_REQUEST,
            AppError::History(HistoryError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Dispatch(e) => e.to_string(),
            AppError::History(e) => e.to_string(),
            AppError::Unauthorized(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, "{}", self.message());
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
