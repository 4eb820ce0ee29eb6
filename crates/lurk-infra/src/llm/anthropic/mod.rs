//! Anthropic Messages API provider.
//!
//! [`AnthropicProvider`] implements
//! [`LlmProvider`](lurk_core::llm::provider::LlmProvider) for `/v1/messages`,
//! including SSE streaming.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::AnthropicProvider;
