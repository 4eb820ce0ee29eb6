//! Shared domain types for lurk.
//!
//! Provider configuration, generation requests, stream events, answers and
//! their error types. Zero infrastructure dependencies -- only serde, uuid,
//! chrono, thiserror.

pub mod answer;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod provider;
