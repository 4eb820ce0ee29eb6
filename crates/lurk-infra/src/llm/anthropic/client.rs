//! AnthropicProvider -- [`LlmProvider`] for the Anthropic Messages API.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and only exposed
//! when building request headers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use lurk_core::llm::provider::{BackendStream, LlmProvider};
use lurk_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, Usage,
};
use lurk_types::provider::AnthropicSettings;

use super::streaming::create_anthropic_stream;
use super::types::{AnthropicMessage, AnthropicNonStreamResponse, AnthropicRequest, ErrorPayload};

/// Default `anthropic-version` header value.
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Upper bound on a single HTTP exchange. Per-provider timeouts are
/// enforced above this layer and are much shorter.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Anthropic Claude provider. Does NOT derive Debug.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    api_version: String,
    model: String,
    capabilities: ProviderCapabilities,
}

impl AnthropicProvider {
    pub fn new(
        api_key: SecretString,
        model: String,
        settings: &AnthropicSettings,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            api_version: settings
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            capabilities: capabilities_for_model(&model),
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn to_anthropic_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model: if request.model.is_empty() {
                self.model.clone()
            } else {
                request.model.clone()
            },
            max_tokens: request.max_tokens,
            messages,
            system: request.system.clone(),
            stream,
            temperature: request.temperature,
        }
    }
}

fn capabilities_for_model(model: &str) -> ProviderCapabilities {
    let max_output_tokens = if model.contains("opus") {
        32_000
    } else if model.contains("sonnet") || model.contains("haiku") {
        8_192
    } else {
        4_096
    };
    ProviderCapabilities {
        streaming: true,
        max_output_tokens,
    }
}

/// Map a non-2xx status and its body to an [`LlmError`].
pub(crate) fn map_status(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorPayload>(body)
        .map(|p| p.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited,
        529 => LlmError::Overloaded(message),
        400 => LlmError::InvalidRequest(message),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.to_anthropic_request(request, false);

        let response = self
            .client
            .post(self.url())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), &error_body));
        }

        let resp: AnthropicNonStreamResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        Ok(CompletionResponse {
            content: resp.text(),
            stop_reason: StopReason::from_backend(resp.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
            id: resp.id,
            model: resp.model,
        })
    }

    fn stream(&self, request: CompletionRequest) -> BackendStream {
        create_anthropic_stream(
            self.client.clone(),
            self.url(),
            self.to_anthropic_request(&request, true),
            self.api_key.clone(),
            self.api_version.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use lurk_types::llm::Message;

    use super::*;

    fn provider(settings: AnthropicSettings) -> AnthropicProvider {
        AnthropicProvider::new(
            SecretString::from("sk-ant-test".to_string()),
            "claude-sonnet-4-20250514".to_string(),
            &settings,
        )
        .unwrap()
    }

    #[test]
    fn defaults_and_overrides() {
        let p = provider(AnthropicSettings::default());
        assert_eq!(p.url(), "https://api.anthropic.com/v1/messages");
        assert_eq!(p.api_version, DEFAULT_API_VERSION);
        assert_eq!(p.capabilities().max_output_tokens, 8_192);

        let p = provider(AnthropicSettings {
            base_url: Some("http://localhost:9000/".into()),
            api_version: Some("2024-01-01".into()),
        });
        assert_eq!(p.url(), "http://localhost:9000/v1/messages");
        assert_eq!(p.api_version, "2024-01-01");
    }

    #[test]
    fn request_conversion_keeps_system_separate() {
        let p = provider(AnthropicSettings::default());
        let request = CompletionRequest {
            model: String::new(),
            messages: vec![Message::user("2+2?")],
            system: Some("Be terse.".into()),
            max_tokens: 512,
            temperature: Some(0.7),
            stream: false,
        };
        let body = p.to_anthropic_request(&request, true);
        assert_eq!(body.model, "claude-sonnet-4-20250514");
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.system.as_deref(), Some("Be terse."));
        assert!(body.stream);
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(map_status(401, ""), LlmError::AuthenticationFailed));
        assert!(matches!(map_status(429, ""), LlmError::RateLimited));
        let err = map_status(
            500,
            r#"{"type":"error","error":{"type":"api_error","message":"boom"}}"#,
        );
        assert_eq!(err.to_string(), "provider error: HTTP 500: boom");
    }
}
