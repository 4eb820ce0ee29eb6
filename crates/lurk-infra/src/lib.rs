//! Infrastructure layer for lurk.
//!
//! Concrete implementations of the ports defined in `lurk-core`: LLM
//! backends (OpenAI-compatible family, Anthropic Messages API), credential
//! lookup, configuration loading and the in-memory history store.

pub mod config;
pub mod history;
pub mod llm;
pub mod secret;
