//! Scripted in-memory backend for tests.
//!
//! `ScriptedProvider` replies, fails, hangs or panics on demand and counts
//! how many times it was invoked, so tests can assert that no backend call
//! was made. It also flags when an in-flight call is released, so tests can
//! tell that a cancelled call was actually dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use lurk_types::llm::{
    BackendEvent, CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities,
    StopReason, Usage,
};
use lurk_types::provider::{Backend, Capability, CompatSettings, ProviderConfig};

use super::provider::{BackendStream, LlmProvider};

#[derive(Debug, Clone)]
enum Script {
    Reply(Vec<String>),
    Fail(String),
    Hang,
    Panic,
}

pub struct ScriptedProvider {
    script: Script,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    capabilities: ProviderCapabilities,
}

/// Raises the shared flag when the call holding it finishes or is dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
            capabilities: ProviderCapabilities {
                streaming: true,
                max_output_tokens: 4096,
            },
        }
    }

    /// Answers with `chunks` (streamed one by one, or concatenated).
    pub fn replying(chunks: &[&str]) -> Self {
        Self::with_script(Script::Reply(chunks.iter().map(|c| c.to_string()).collect()))
    }

    /// Every call fails with a provider error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self::with_script(Script::Hang)
    }

    /// Panics inside the call.
    pub fn panicking() -> Self {
        Self::with_script(Script::Panic)
    }

    /// Sleep before each reply (and between streamed chunks).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared invocation counter; keep it before boxing the provider.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Set once an in-flight call has finished or been dropped.
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = ReleaseGuard(Arc::clone(&self.released));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Reply(chunks) => Ok(CompletionResponse {
                id: "scripted-1".into(),
                content: chunks.concat(),
                model: request.model.clone(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            }),
            Script::Fail(message) => Err(LlmError::Provider {
                message: message.clone(),
            }),
            Script::Hang => std::future::pending().await,
            Script::Panic => panic!("scripted provider panicked"),
        }
    }

    fn stream(&self, _request: CompletionRequest) -> BackendStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.clone();
        let delay = self.delay;
        let guard = ReleaseGuard(Arc::clone(&self.released));

        Box::pin(async_stream::stream! {
            let _guard = guard;
            match script {
                Script::Reply(chunks) => {
                    yield Ok(BackendEvent::Connected);
                    for chunk in chunks {
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }
                        yield Ok(BackendEvent::TextDelta { text: chunk });
                    }
                    yield Ok(BackendEvent::Done);
                }
                Script::Fail(message) => {
                    yield Err(LlmError::Provider { message });
                }
                Script::Hang => {
                    std::future::pending::<()>().await;
                }
                Script::Panic => {
                    panic!("scripted provider panicked");
                }
            }
        })
    }
}

/// Minimal provider configuration for tests. The display name is the
/// upper-cased id.
pub fn test_config(id: &str, capability: Capability) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        backend: Backend::OpenAi(CompatSettings::default()),
        model: format!("{id}-model"),
        capability,
        persona: None,
        enabled: true,
    }
}
