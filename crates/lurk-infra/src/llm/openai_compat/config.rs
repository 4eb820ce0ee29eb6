//! Configuration for OpenAI-compatible providers.
//!
//! Six of the supported families speak the OpenAI chat completions protocol;
//! they differ only in endpoint, credential and output limits.

use secrecy::SecretString;

use lurk_types::llm::ProviderCapabilities;
use lurk_types::provider::Backend;

/// Configuration for one OpenAI-compatible provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Family name used in logs and spans (e.g. "groq").
    pub provider_name: String,
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub capabilities: ProviderCapabilities,
}

impl OpenAiCompatConfig {
    /// Configuration for `backend`, or `None` for families that do not
    /// speak the OpenAI protocol.
    pub fn for_backend(backend: &Backend, api_key: SecretString, model: &str) -> Option<Self> {
        let max_output_tokens = match backend {
            Backend::OpenAi(_) => 16_384,
            Backend::Gemini(_) => 65_536,
            Backend::Mistral(_) => 32_768,
            Backend::Groq(_) | Backend::DeepSeek(_) | Backend::Aiml(_) => 8_192,
            Backend::Anthropic(_) => return None,
        };

        Some(Self {
            provider_name: backend.kind().to_string(),
            base_url: backend.base_url().to_string(),
            api_key,
            model: model.to_string(),
            capabilities: ProviderCapabilities {
                streaming: true,
                max_output_tokens,
            },
        })
    }
}
