//! Process-wide configuration.
//!
//! `LurkConfig` is the top-level `lurk.toml`. Every field has a default, so an
//! empty file (or no file at all) yields a working setup over the built-in
//! provider catalogue.

use serde::{Deserialize, Serialize};

use crate::provider::{ProviderConfig, default_catalogue};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LurkConfig {
    /// Global token budget shared by every turn until an operator reset.
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,

    /// Per-provider call timeout (for streaming providers: per chunk).
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_synthesis_timeout_secs")]
    pub synthesis_timeout_secs: u64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Flat estimated cost of one attachment reference.
    #[serde(default = "default_attachment_cost")]
    pub attachment_cost: u64,

    /// Provider id used for best-of-N synthesis.
    #[serde(default = "default_synthesis_provider")]
    pub synthesis_provider: String,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Operator token guarding `/reset-tokens`. Open when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,

    #[serde(default = "default_catalogue")]
    pub providers: Vec<ProviderConfig>,
}

fn default_token_limit() -> u64 {
    100_000
}

fn default_provider_timeout_secs() -> u64 {
    15
}

fn default_synthesis_timeout_secs() -> u64 {
    30
}

fn default_max_output_tokens() -> u32 {
    512
}

fn default_temperature() -> f64 {
    0.7
}

fn default_attachment_cost() -> u64 {
    250
}

fn default_synthesis_provider() -> String {
    "gpt-4.1".to_string()
}

fn default_history_capacity() -> usize {
    100
}

impl Default for LurkConfig {
    fn default() -> Self {
        Self {
            token_limit: default_token_limit(),
            provider_timeout_secs: default_provider_timeout_secs(),
            synthesis_timeout_secs: default_synthesis_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            attachment_cost: default_attachment_cost(),
            synthesis_provider: default_synthesis_provider(),
            history_capacity: default_history_capacity(),
            admin_token: None,
            providers: default_catalogue(),
        }
    }
}

impl LurkConfig {
    /// Ids of providers that take part in a turn when the caller names none.
    pub fn enabled_provider_ids(&self) -> Vec<String> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.id.clone())
            .collect()
    }
}
