//! Application state wiring the core services together.
//!
//! AppState holds the dispatcher, synthesizer, ledger and history store used
//! by both the CLI and the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use lurk_core::estimate::CostEstimator;
use lurk_core::fanout::{Dispatcher, GenerationSettings};
use lurk_core::ledger::TokenLedger;
use lurk_core::llm::registry::ProviderRegistry;
use lurk_core::synthesis::Synthesizer;
use lurk_infra::config::{load_config, resolve_data_dir};
use lurk_infra::history::InMemoryHistory;
use lurk_infra::llm::build_registry;
use lurk_infra::secret::EnvCredentials;
use lurk_types::config::LurkConfig;

use crate::http::extractors::admin::hash_admin_token;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LurkConfig>,
    pub registry: Arc<ProviderRegistry>,
    pub ledger: TokenLedger,
    pub dispatcher: Dispatcher,
    pub synthesizer: Arc<Synthesizer>,
    pub history: Arc<InMemoryHistory>,
    /// SHA-256 of the operator token; `None` leaves admin routes open.
    pub admin_digest: Option<String>,
}

impl AppState {
    /// Load configuration and credentials from the environment and wire
    /// every service.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_config(&data_dir).await?;
        let registry = build_registry(&config, &EnvCredentials::new());
        tracing::info!(
            data_dir = %data_dir.display(),
            providers = registry.len(),
            token_limit = config.token_limit,
            "application state initialized"
        );
        Ok(Self::from_parts(config, registry))
    }

    pub fn from_parts(config: LurkConfig, registry: ProviderRegistry) -> Self {
        let registry = Arc::new(registry);
        let ledger = TokenLedger::new(config.token_limit);
        let settings = GenerationSettings {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        };

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            ledger.clone(),
            CostEstimator::new(config.attachment_cost),
            settings,
        );
        let synthesizer = Synthesizer::new(
            Arc::clone(&registry),
            ledger.clone(),
            config.synthesis_provider.clone(),
            Duration::from_secs(config.synthesis_timeout_secs),
            settings,
        );
        let admin_digest = config.admin_token.as_deref().map(hash_admin_token);

        Self {
            history: Arc::new(InMemoryHistory::new(config.history_capacity)),
            config: Arc::new(config),
            registry,
            ledger,
            dispatcher,
            synthesizer: Arc::new(synthesizer),
            admin_digest,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use lurk_core::llm::adapter::ProviderAdapter;
    use lurk_core::llm::box_provider::BoxLlmProvider;
    use lurk_core::llm::mock::{ScriptedProvider, test_config};
    use lurk_types::provider::Capability;

    use super::*;

    /// State over scripted providers. A provider named `synthesis` is the
    /// (disabled) merge backend.
    pub fn state_with(
        providers: Vec<(&str, ScriptedProvider)>,
        token_limit: u64,
        admin_token: Option<&str>,
    ) -> AppState {
        let mut registry = ProviderRegistry::new();
        let mut configs = Vec::new();
        for (id, provider) in providers {
            let mut config = test_config(id, Capability::RequestResponse);
            config.enabled = id != "synthesis";
            configs.push(config.clone());
            registry.register(ProviderAdapter::new(
                config,
                BoxLlmProvider::new(provider),
                Duration::from_secs(5),
            ));
        }

        let config = LurkConfig {
            token_limit,
            synthesis_provider: "synthesis".into(),
            admin_token: admin_token.map(str::to_string),
            providers: configs,
            ..LurkConfig::default()
        };
        AppState::from_parts(config, registry)
    }
}
