//! LLM provider abstractions.
//!
//! - `LlmProvider`: RPITIT trait for concrete backend implementations
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `ProviderAdapter`: uniform per-provider event stream with timeouts
//! - `ProviderRegistry`: id-indexed lookup table of adapters

pub mod adapter;
pub mod box_provider;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod provider;
pub mod registry;
pub mod unavailable;
