//! Provider configuration: the closed set of backend kinds and the
//! per-provider settings loaded at startup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Most providers a single turn may fan out to.
pub const MAX_SELECTION: usize = 10;

/// System instruction used when a provider has no persona configured.
pub const DEFAULT_PERSONA: &str = "You are a helpful assistant.";

/// Settings shared by every backend that speaks the OpenAI chat protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatSettings {
    /// Override for the family's default endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Settings for the Anthropic Messages API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Value of the `anthropic-version` header; defaults to `2023-06-01`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Supported backend families, each carrying its own typed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    #[serde(rename = "openai")]
    OpenAi(CompatSettings),
    Groq(CompatSettings),
    #[serde(rename = "deepseek")]
    DeepSeek(CompatSettings),
    Mistral(CompatSettings),
    Aiml(CompatSettings),
    Gemini(CompatSettings),
    Anthropic(AnthropicSettings),
}

impl Backend {
    /// Machine name of the family (`"openai"`, `"groq"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::OpenAi(_) => "openai",
            Backend::Groq(_) => "groq",
            Backend::DeepSeek(_) => "deepseek",
            Backend::Mistral(_) => "mistral",
            Backend::Aiml(_) => "aiml",
            Backend::Gemini(_) => "gemini",
            Backend::Anthropic(_) => "anthropic",
        }
    }

    /// Human-readable family name, used in error messages.
    pub fn family_name(&self) -> &'static str {
        match self {
            Backend::OpenAi(_) => "OpenAI",
            Backend::Groq(_) => "Groq",
            Backend::DeepSeek(_) => "DeepSeek",
            Backend::Mistral(_) => "Mistral",
            Backend::Aiml(_) => "AIML",
            Backend::Gemini(_) => "Google",
            Backend::Anthropic(_) => "Anthropic",
        }
    }

    /// Environment variable holding this family's API key.
    pub fn credential_env(&self) -> &'static str {
        match self {
            Backend::OpenAi(_) => "OPENAI_API_KEY",
            Backend::Groq(_) => "GROQ_API_KEY",
            Backend::DeepSeek(_) => "DEEPSEEK_API_KEY",
            Backend::Mistral(_) => "MISTRAL_API_KEY",
            Backend::Aiml(_) => "AIML_API_KEY",
            Backend::Gemini(_) => "GOOGLE_API_KEY",
            Backend::Anthropic(_) => "ANTHROPIC_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Backend::OpenAi(_) => "https://api.openai.com/v1",
            Backend::Groq(_) => "https://api.groq.com/openai/v1",
            Backend::DeepSeek(_) => "https://api.deepseek.com",
            Backend::Mistral(_) => "https://api.mistral.ai/v1",
            Backend::Aiml(_) => "https://api.aimlapi.com/v1",
            Backend::Gemini(_) => "https://generativelanguage.googleapis.com/v1beta/openai",
            Backend::Anthropic(_) => "https://api.anthropic.com",
        }
    }

    /// Effective endpoint: the configured override or the family default.
    pub fn base_url(&self) -> &str {
        let configured = match self {
            Backend::OpenAi(s)
            | Backend::Groq(s)
            | Backend::DeepSeek(s)
            | Backend::Mistral(s)
            | Backend::Aiml(s)
            | Backend::Gemini(s) => s.base_url.as_deref(),
            Backend::Anthropic(s) => s.base_url.as_deref(),
        };
        configured.unwrap_or_else(|| self.default_base_url())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// How a provider delivers its answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Incremental deltas as the backend produces them.
    Streaming,
    /// One full answer, adapted to a single delta followed by done.
    #[default]
    RequestResponse,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Streaming => write!(f, "streaming"),
            Capability::RequestResponse => write!(f, "request-response"),
        }
    }
}

/// One selectable provider. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique key used in selections, events and answer sets.
    pub id: String,
    pub display_name: String,
    pub backend: Backend,
    pub model: String,
    #[serde(default)]
    pub capability: Capability,
    /// System instruction sent with every prompt; `None` uses [`DEFAULT_PERSONA`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    fn new(id: &str, display_name: &str, backend: Backend, model: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            backend,
            model: model.to_string(),
            capability: Capability::RequestResponse,
            persona: None,
            enabled: true,
        }
    }

    fn streaming(mut self) -> Self {
        self.capability = Capability::Streaming;
        self
    }

    fn with_persona(mut self, persona: &str) -> Self {
        self.persona = Some(persona.to_string());
        self
    }
}

/// The built-in provider set used when no providers are configured.
pub fn default_catalogue() -> Vec<ProviderConfig> {
    let compat = CompatSettings::default;
    const KNOWS_EVERYTHING: &str = "You are an AI assistant who knows everything.";

    vec![
        ProviderConfig::new("gpt-5", "GPT-5", Backend::OpenAi(compat()), "gpt-5-2025-08-07"),
        ProviderConfig::new("grok-4", "Grok 4", Backend::Groq(compat()), "grok-beta"),
        ProviderConfig::new(
            "gemini-2.5-pro",
            "Gemini 2.5 Pro",
            Backend::Gemini(compat()),
            "gemini-2.5-pro",
        ),
        ProviderConfig::new(
            "mistral-large-2",
            "Mistral Large 2",
            Backend::Mistral(compat()),
            "mistral-large-latest",
        )
        .streaming(),
        ProviderConfig::new(
            "qwen3-235b",
            "Qwen3 235B A22B",
            Backend::Aiml(compat()),
            "qwen3-235b-a22b-thinking-2507",
        )
        .with_persona(KNOWS_EVERYTHING),
        ProviderConfig::new(
            "deepseek-r1",
            "DeepSeek-R1",
            Backend::DeepSeek(compat()),
            "deepseek-chat",
        )
        .with_persona("You are a helpful assistant"),
        ProviderConfig::new(
            "llama-4-maverick",
            "Llama 4 Maverick",
            Backend::Aiml(compat()),
            "meta-llama/llama-4-maverick",
        )
        .with_persona(KNOWS_EVERYTHING),
        ProviderConfig::new("gpt-4.1", "GPT-4.1", Backend::OpenAi(compat()), "gpt-4.1-2025-04-14"),
        ProviderConfig::new(
            "gemini-1.5-pro",
            "Gemini 1.5 Pro",
            Backend::Gemini(compat()),
            "gemini-1.5-pro",
        ),
        ProviderConfig::new(
            "claude-sonnet",
            "Claude 3.5 Sonnet",
            Backend::Anthropic(AnthropicSettings::default()),
            "claude-sonnet-4-20250514",
        ),
    ]
}

/// Everything one adapter needs to answer one prompt for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// System instruction; empty means the generic assistant instruction.
    pub persona: String,
    pub provider_id: String,
    pub max_output_tokens: u32,
    pub temperature: f64,
}

impl GenerationRequest {
    /// The persona, or [`DEFAULT_PERSONA`] when it is blank.
    pub fn system_instruction(&self) -> &str {
        if self.persona.trim().is_empty() {
            DEFAULT_PERSONA
        } else {
            &self.persona
        }
    }
}
