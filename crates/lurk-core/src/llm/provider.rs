//! LlmProvider trait definition.
//!
//! Uses RPITIT for `complete` and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use lurk_types::llm::{
    BackendEvent, CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities,
};

/// Boxed stream of raw backend events.
pub type BackendStream =
    Pin<Box<dyn Stream<Item = Result<BackendEvent, LlmError>> + Send + 'static>>;

/// Trait for LLM backends (OpenAI-compatible, Anthropic, ...).
///
/// Implementations live in lurk-infra. One implementation serves a whole
/// backend family; per-provider settings are passed at construction.
pub trait LlmProvider: Send + Sync {
    /// Backend family name (e.g., "anthropic", "groq").
    fn name(&self) -> &str;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// False when the backend cannot be reached at all (no credential).
    fn is_available(&self) -> bool {
        true
    }

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    fn stream(&self, request: CompletionRequest) -> BackendStream;
}
