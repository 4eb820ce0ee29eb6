//! Uniform per-provider event stream.
//!
//! `ProviderAdapter` wraps one configured provider and turns its backend
//! into a finite, non-restartable sequence of [`StreamEvent`]s. Every
//! failure mode -- missing credential, network error, backend error,
//! timeout -- ends the sequence with a single `Error` event; nothing
//! escapes as a fault.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tracing::Instrument;

use lurk_types::answer::excerpt;
use lurk_types::event::StreamEvent;
use lurk_types::llm::{BackendEvent, CompletionRequest, CompletionResponse, LlmError, Message};
use lurk_types::provider::{Capability, DEFAULT_PERSONA, GenerationRequest, ProviderConfig};

use crate::estimate::estimate_tokens;

use super::box_provider::BoxLlmProvider;

/// Longest error cause carried in an `Error` event.
pub const MAX_ERROR_CHARS: usize = 100;

/// Lazy sequence of events for one provider and one prompt.
pub type ProviderEvents = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>;

/// A configured provider behind the uniform event contract.
pub struct ProviderAdapter {
    config: ProviderConfig,
    provider: BoxLlmProvider,
    timeout: Duration,
}

impl ProviderAdapter {
    pub fn new(config: ProviderConfig, provider: BoxLlmProvider, timeout: Duration) -> Self {
        Self {
            config,
            provider,
            timeout,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn display_name(&self) -> &str {
        &self.config.display_name
    }

    /// Whether the backend has what it needs to be called (a credential).
    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    /// System instruction sent to this provider; [`DEFAULT_PERSONA`] when
    /// none is configured.
    pub fn persona(&self) -> &str {
        match self.config.persona.as_deref() {
            Some(persona) if !persona.trim().is_empty() => persona,
            _ => DEFAULT_PERSONA,
        }
    }

    /// Backend request for one generation.
    pub fn completion_request(&self, request: &GenerationRequest) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![Message::user(request.prompt.clone())],
            system: Some(request.system_instruction().to_string()),
            max_tokens: request.max_output_tokens,
            temperature: Some(request.temperature),
            stream: self.config.capability == Capability::Streaming,
        }
    }

    /// One request-response call bounded by `timeout`.
    pub async fn complete_within(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<CompletionResponse, LlmError> {
        let span = tracing::info_span!(
            "gen_ai.complete",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            provider = %self.config.id,
        );

        match tokio::time::timeout(timeout, self.provider.complete(request))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }

    /// Run `request` against the backend as a stream of events.
    ///
    /// Request-response providers yield exactly one `Delta` then `Done`.
    /// Streaming providers yield a `Delta` per non-empty backend chunk; the
    /// timeout applies to the wait for each chunk. The final event is
    /// always `Done` or `Error`.
    pub fn generate(self: Arc<Self>, request: GenerationRequest) -> ProviderEvents {
        let this = self;
        Box::pin(async_stream::stream! {
            let id = this.config.id.clone();
            let completion = this.completion_request(&request);

            match this.config.capability {
                Capability::RequestResponse => {
                    match this.complete_within(&completion, this.timeout).await {
                        Ok(response) => {
                            let tokens = estimate_tokens(&response.content);
                            tracing::debug!(provider = %id, tokens, "provider answered");
                            yield StreamEvent::delta(&id, response.content);
                            yield StreamEvent::done(&id, tokens);
                        }
                        Err(err) => {
                            tracing::warn!(provider = %id, error = %err, "provider call failed");
                            yield StreamEvent::error(&id, describe(&err));
                        }
                    }
                }
                Capability::Streaming => {
                    let mut inner = this.provider.stream(completion);
                    let mut tokens = 0u64;
                    loop {
                        match tokio::time::timeout(this.timeout, inner.next()).await {
                            Err(_) => {
                                let err = LlmError::Timeout { secs: this.timeout.as_secs() };
                                tracing::warn!(
                                    provider = %id,
                                    error = %err,
                                    "provider stream stalled"
                                );
                                yield StreamEvent::error(&id, describe(&err));
                                break;
                            }
                            Ok(None) | Ok(Some(Ok(BackendEvent::Done))) => {
                                tracing::debug!(provider = %id, tokens, "provider stream finished");
                                yield StreamEvent::done(&id, tokens);
                                break;
                            }
                            Ok(Some(Ok(BackendEvent::TextDelta { text }))) => {
                                if text.is_empty() {
                                    continue;
                                }
                                tokens += estimate_tokens(&text);
                                yield StreamEvent::delta(&id, text);
                            }
                            Ok(Some(Ok(_))) => {}
                            Ok(Some(Err(err))) => {
                                tracing::warn!(
                                    provider = %id,
                                    error = %err,
                                    "provider stream failed"
                                );
                                yield StreamEvent::error(&id, describe(&err));
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Short human-readable cause for an `Error` event.
pub fn describe(err: &LlmError) -> String {
    excerpt(&err.to_string(), MAX_ERROR_CHARS)
}

#[cfg(test)]
mod tests {
    use lurk_types::event::StreamEventKind;

    use super::*;
    use crate::llm::mock::{ScriptedProvider, test_config};
    use crate::llm::unavailable::UnavailableProvider;

    fn generation(id: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: "2+2?".into(),
            persona: String::new(),
            provider_id: id.into(),
            max_output_tokens: 512,
            temperature: 0.7,
        }
    }

    fn adapter(
        id: &str,
        capability: Capability,
        provider: ScriptedProvider,
        timeout: Duration,
    ) -> Arc<ProviderAdapter> {
        Arc::new(ProviderAdapter::new(
            test_config(id, capability),
            BoxLlmProvider::new(provider),
            timeout,
        ))
    }

    #[tokio::test]
    async fn request_response_yields_one_delta_then_done() {
        let a = adapter(
            "p1",
            Capability::RequestResponse,
            ScriptedProvider::replying(&["4"]),
            Duration::from_secs(1),
        );
        let events: Vec<_> = a.generate(generation("p1")).collect().await;
        assert_eq!(events, vec![StreamEvent::delta("p1", "4"), StreamEvent::done("p1", 1)]);
    }

    #[tokio::test]
    async fn streaming_yields_delta_per_chunk() {
        let a = adapter(
            "p1",
            Capability::Streaming,
            ScriptedProvider::replying(&["Hello", "", " world"]),
            Duration::from_secs(1),
        );
        let events: Vec<_> = a.generate(generation("p1")).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("p1", "Hello"),
                StreamEvent::delta("p1", " world"),
                StreamEvent::done("p1", 4),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_single_error() {
        let a = adapter(
            "slow",
            Capability::RequestResponse,
            ScriptedProvider::hanging(),
            Duration::from_secs(15),
        );
        let events: Vec<_> = a.generate(generation("slow")).collect().await;
        assert_eq!(events, vec![StreamEvent::error("slow", "timed out after 15s")]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let a = adapter(
            "slow",
            Capability::Streaming,
            ScriptedProvider::hanging(),
            Duration::from_secs(15),
        );
        let events: Vec<_> = a.generate(generation("slow")).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, StreamEventKind::Error { .. }));
    }

    #[tokio::test]
    async fn backend_error_is_truncated() {
        let long = "x".repeat(300);
        let a = adapter(
            "p",
            Capability::RequestResponse,
            ScriptedProvider::failing(&long),
            Duration::from_secs(1),
        );
        let events: Vec<_> = a.generate(generation("p")).collect().await;
        let StreamEventKind::Error { message } = &events[0].kind else {
            panic!("expected error, got {:?}", events[0]);
        };
        assert_eq!(message.chars().count(), MAX_ERROR_CHARS + 1);
    }

    #[tokio::test]
    async fn missing_credential_is_an_error_event() {
        let a = Arc::new(ProviderAdapter::new(
            test_config("grok-4", Capability::RequestResponse),
            BoxLlmProvider::new(UnavailableProvider::new("Groq")),
            Duration::from_secs(1),
        ));
        assert!(!a.is_available());
        let events: Vec<_> = a.generate(generation("grok-4")).collect().await;
        assert_eq!(events, vec![StreamEvent::error("grok-4", "Groq API key missing")]);
    }

    #[test]
    fn blank_persona_resolves_to_default() {
        let adapter = |persona: Option<&str>| {
            let mut config = test_config("p", Capability::RequestResponse);
            config.persona = persona.map(str::to_string);
            ProviderAdapter::new(
                config,
                BoxLlmProvider::new(ScriptedProvider::replying(&["x"])),
                Duration::from_secs(1),
            )
        };
        assert_eq!(adapter(None).persona(), DEFAULT_PERSONA);
        assert_eq!(adapter(Some("  ")).persona(), DEFAULT_PERSONA);
        assert_eq!(adapter(Some("You are terse.")).persona(), "You are terse.");
    }

    #[test]
    fn completion_request_uses_persona_or_default() {
        let mut config = test_config("p", Capability::Streaming);
        config.persona = Some("You are terse.".into());
        let a = ProviderAdapter::new(
            config,
            BoxLlmProvider::new(ScriptedProvider::replying(&["x"])),
            Duration::from_secs(1),
        );
        let mut req = generation("p");
        req.persona = a.persona().to_string();
        let completion = a.completion_request(&req);
        assert_eq!(completion.system.as_deref(), Some("You are terse."));
        assert!(completion.stream);
        assert_eq!(completion.max_tokens, 512);
    }
}
