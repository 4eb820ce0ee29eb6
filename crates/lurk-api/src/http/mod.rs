//! HTTP API layer for lurk.
//!
//! Axum router with SSE streaming, flat `{"error": ...}` bodies and
//! permissive CORS.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
