//! LLM backend implementations.
//!
//! Concrete [`LlmProvider`](lurk_core::llm::provider::LlmProvider)
//! implementations for the supported backend families, plus the factory
//! ([`create_provider`]) and registry builder ([`build_registry`]) that turn
//! configuration into live adapters.

pub mod anthropic;
pub mod openai_compat;

use std::time::Duration;

use secrecy::SecretString;

use lurk_core::llm::adapter::ProviderAdapter;
use lurk_core::llm::box_provider::BoxLlmProvider;
use lurk_core::llm::registry::ProviderRegistry;
use lurk_core::llm::unavailable::UnavailableProvider;
use lurk_types::config::LurkConfig;
use lurk_types::llm::LlmError;
use lurk_types::provider::{Backend, ProviderConfig};

use crate::secret::CredentialSource;

use self::anthropic::AnthropicProvider;
use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Create a [`BoxLlmProvider`] for `config`.
///
/// Without an API key the result is an always-failing provider whose
/// error names the missing family credential.
pub fn create_provider(
    config: &ProviderConfig,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let Some(api_key) = api_key else {
        return Ok(BoxLlmProvider::new(UnavailableProvider::new(
            config.backend.family_name(),
        )));
    };

    match &config.backend {
        Backend::Anthropic(settings) => {
            let provider = AnthropicProvider::new(api_key, config.model.clone(), settings)?;
            Ok(BoxLlmProvider::new(provider))
        }
        backend @ (Backend::OpenAi(_)
        | Backend::Groq(_)
        | Backend::DeepSeek(_)
        | Backend::Mistral(_)
        | Backend::Aiml(_)
        | Backend::Gemini(_)) => {
            let oai_config = OpenAiCompatConfig::for_backend(backend, api_key, &config.model)
                .ok_or_else(|| {
                    LlmError::InvalidRequest(format!("{backend} is not OpenAI-compatible"))
                })?;
            Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(oai_config)))
        }
    }
}

/// Build the provider registry for `config`, looking up each family's key
/// in `credentials`.
///
/// A provider whose backend cannot be constructed is left out and logged;
/// a missing key never fails the build.
pub fn build_registry(
    config: &LurkConfig,
    credentials: &impl CredentialSource,
) -> ProviderRegistry {
    let timeout = Duration::from_secs(config.provider_timeout_secs);
    let mut registry = ProviderRegistry::new();

    for provider_config in &config.providers {
        let api_key = credentials.get(provider_config.backend.credential_env());
        let available = api_key.is_some();

        match create_provider(provider_config, api_key) {
            Ok(provider) => {
                tracing::debug!(
                    provider = %provider_config.id,
                    backend = %provider_config.backend,
                    model = %provider_config.model,
                    available,
                    "registered provider"
                );
                if !available {
                    tracing::warn!(
                        provider = %provider_config.id,
                        "{} not set; provider will report an error",
                        provider_config.backend.credential_env()
                    );
                }
                registry.register(ProviderAdapter::new(provider_config.clone(), provider, timeout));
            }
            Err(err) => {
                tracing::error!(provider = %provider_config.id, error = %err, "skipping provider");
            }
        }
    }

    registry
}
