//! Stand-in backend for providers whose credential is not configured.
//!
//! Every call fails with [`LlmError::MissingCredential`], so the provider
//! shows up in a turn as a single Error event instead of taking the process
//! down.

use lurk_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities};

use super::provider::{BackendStream, LlmProvider};

pub struct UnavailableProvider {
    family: String,
    capabilities: ProviderCapabilities,
}

impl UnavailableProvider {
    /// `family` is the human-readable backend name, e.g. "Groq".
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            capabilities: ProviderCapabilities {
                streaming: false,
                max_output_tokens: 0,
            },
        }
    }

    fn error(&self) -> LlmError {
        LlmError::MissingCredential {
            family: self.family.clone(),
        }
    }
}

impl LlmProvider for UnavailableProvider {
    fn name(&self) -> &str {
        &self.family
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(self.error())
    }

    fn stream(&self, _request: CompletionRequest) -> BackendStream {
        let err = self.error();
        Box::pin(futures_util::stream::once(async move { Err(err) }))
    }
}
