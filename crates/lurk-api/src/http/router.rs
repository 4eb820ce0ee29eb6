//! Axum router configuration with middleware.
//!
//! Middleware: permissive CORS and request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/stream", post(handlers::stream::stream))
        .route("/asklurk", post(handlers::synthesis::ask_lurk))
        .route("/tokens", get(handlers::tokens::get_tokens))
        .route("/reset-tokens", post(handlers::tokens::reset_tokens))
        .route("/providers", get(handlers::providers::list_providers))
        .route(
            "/history",
            get(handlers::history::list_history).delete(handlers::history::clear_history),
        )
        .route("/history/regenerate", post(handlers::history::regenerate))
        .route("/history/{id}", get(handlers::history::get_record))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
