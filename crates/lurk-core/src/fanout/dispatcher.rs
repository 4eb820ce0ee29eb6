//! Turn admission and per-provider task spawning.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use lurk_types::answer::Answer;
use lurk_types::error::DispatchError;
use lurk_types::event::{StreamEvent, StreamEventKind};
use lurk_types::provider::{DEFAULT_PERSONA, GenerationRequest, MAX_SELECTION};

use crate::estimate::CostEstimator;
use crate::ledger::TokenLedger;
use crate::llm::adapter::ProviderAdapter;
use crate::llm::registry::ProviderRegistry;

use super::CANCELLED;
use super::turn::Turn;

/// Capacity of a turn's event channel.
const CHANNEL_CAPACITY: usize = 256;

/// Per-request generation knobs shared by every provider in a turn.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub max_output_tokens: u32,
    pub temperature: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// One user turn as handed to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub prompt: String,
    /// Opaque attachment references, appended to the prompt.
    pub attachments: Vec<String>,
    /// Ordered provider ids; duplicates are collapsed.
    pub providers: Vec<String>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>, providers: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: Vec::new(),
            providers,
        }
    }

    /// Prompt text sent to every provider.
    pub fn effective_prompt(&self) -> String {
        let mut prompt = self.prompt.trim().to_string();
        for attachment in &self.attachments {
            if !prompt.is_empty() {
                prompt.push('\n');
            }
            prompt.push_str("Attachment: ");
            prompt.push_str(attachment);
        }
        prompt
    }
}

/// Starts one concurrent unit of work per selected provider.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    ledger: TokenLedger,
    estimator: CostEstimator,
    settings: GenerationSettings,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        ledger: TokenLedger,
        estimator: CostEstimator,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            registry,
            ledger,
            estimator,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Estimated cost of `request`, summed over its (deduplicated) providers.
    pub fn estimate(&self, request: &TurnRequest) -> u64 {
        dedup(&request.providers)
            .iter()
            .map(|id| {
                let adapter = self.registry.get(id);
                let persona = adapter
                    .as_deref()
                    .map_or(DEFAULT_PERSONA, ProviderAdapter::persona);
                self.estimator
                    .unit_cost(&request.prompt, persona, request.attachments.len())
            })
            .fold(0u64, u64::saturating_add)
    }

    /// Admit `request` and start its provider tasks.
    ///
    /// Every refusal happens here, before any task is spawned: an empty or
    /// oversized selection, an empty prompt, or an estimate the ledger does
    /// not admit. Unknown provider ids are not refused; they produce a
    /// single Error event in the turn. Must be called within a Tokio runtime.
    pub fn dispatch(&self, request: TurnRequest) -> Result<Turn, DispatchError> {
        if request.prompt.trim().is_empty() && request.attachments.is_empty() {
            return Err(DispatchError::EmptyPrompt);
        }

        let providers = dedup(&request.providers);
        if providers.is_empty() {
            return Err(DispatchError::EmptySelection);
        }
        if providers.len() > MAX_SELECTION {
            return Err(DispatchError::TooManyProviders {
                count: providers.len(),
                max: MAX_SELECTION,
            });
        }

        let estimated = self.estimate(&request);
        if !self.ledger.admit(estimated) {
            tracing::warn!(
                estimated,
                remaining = self.ledger.remaining(),
                "turn refused: token budget exceeded"
            );
            return Err(DispatchError::BudgetExceeded {
                estimated,
                remaining: self.ledger.remaining(),
            });
        }

        let turn_id = Uuid::now_v7();
        let prompt = request.effective_prompt();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let answers: Arc<DashMap<String, Answer>> = Arc::new(DashMap::new());
        let mut tasks = JoinSet::new();

        tracing::info!(
            %turn_id,
            providers = providers.len(),
            estimated,
            "dispatching turn"
        );

        for id in &providers {
            let adapter = self.registry.get(id);
            let generation = GenerationRequest {
                prompt: prompt.clone(),
                persona: adapter
                    .as_deref()
                    .map_or(DEFAULT_PERSONA, ProviderAdapter::persona)
                    .to_string(),
                provider_id: id.clone(),
                max_output_tokens: self.settings.max_output_tokens,
                temperature: self.settings.temperature,
            };
            let unit = ProviderUnit {
                provider_id: id.clone(),
                adapter,
                tx: tx.clone(),
                cancel: cancel.child_token(),
                answers: Arc::clone(&answers),
            };
            let span = tracing::info_span!("provider_unit", %turn_id, provider = %id);
            tasks.spawn(unit.run(generation).instrument(span));
        }
        drop(tx);

        Ok(Turn::new(
            turn_id,
            providers,
            rx,
            tasks,
            cancel,
            answers,
            self.ledger.clone(),
        ))
    }
}

/// Collapse duplicate ids, keeping the first occurrence.
fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// One provider's unit of work within a turn.
struct ProviderUnit {
    provider_id: String,
    adapter: Option<Arc<ProviderAdapter>>,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    answers: Arc<DashMap<String, Answer>>,
}

impl ProviderUnit {
    async fn run(self, request: GenerationRequest) {
        if AssertUnwindSafe(self.drive(request))
            .catch_unwind()
            .await
            .is_err()
        {
            tracing::error!(provider = %self.provider_id, "provider task panicked");
            self.fail("provider task panicked").await;
        }
    }

    async fn drive(&self, request: GenerationRequest) {
        let Some(adapter) = self.adapter.clone() else {
            self.fail(&format!("unknown provider: {}", self.provider_id))
                .await;
            return;
        };

        let mut events = adapter.generate(request);
        let mut text = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(provider = %self.provider_id, "provider task cancelled");
                    self.fail(CANCELLED).await;
                    return;
                }
                event = events.next() => event,
            };

            let Some(event) = next else {
                self.fail("stream ended unexpectedly").await;
                return;
            };

            match &event.kind {
                StreamEventKind::Delta { text: chunk } => text.push_str(chunk),
                StreamEventKind::Done { .. } => {
                    let answer = Answer::Text(std::mem::take(&mut text));
                    self.answers.insert(self.provider_id.clone(), answer);
                }
                StreamEventKind::Error { message } => {
                    self.answers
                        .insert(self.provider_id.clone(), Answer::Failed(message.clone()));
                }
            }

            let terminal = event.is_terminal();
            if self.tx.send(event).await.is_err() || terminal {
                return;
            }
        }
    }

    /// Record a failure as this provider's answer and emit its Error event.
    ///
    /// The answer is written before the event is sent, so it is visible
    /// once the multiplexer has seen every terminal event.
    async fn fail(&self, message: &str) {
        self.answers
            .insert(self.provider_id.clone(), Answer::Failed(message.to_string()));
        let _ = self
            .tx
            .send(StreamEvent::error(&self.provider_id, message))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use futures_util::StreamExt;
    use lurk_types::event::{CompletionMarker, TurnEvent};
    use lurk_types::provider::Capability;

    use super::*;
    use crate::llm::box_provider::BoxLlmProvider;
    use crate::llm::mock::{ScriptedProvider, test_config};

    const TIMEOUT: Duration = Duration::from_secs(15);

    fn dispatcher(providers: Vec<(&str, Capability, ScriptedProvider)>, limit: u64) -> Dispatcher {
        let mut registry = ProviderRegistry::new();
        for (id, capability, provider) in providers {
            registry.register(ProviderAdapter::new(
                test_config(id, capability),
                BoxLlmProvider::new(provider),
                TIMEOUT,
            ));
        }
        Dispatcher::new(
            Arc::new(registry),
            TokenLedger::new(limit),
            CostEstimator::default(),
            GenerationSettings::default(),
        )
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn events_for<'a>(events: &'a [StreamEvent], id: &str) -> Vec<&'a StreamEvent> {
        events.iter().filter(|e| e.provider_id == id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn one_answer_one_timeout() {
        let d = dispatcher(
            vec![
                ("p1", Capability::RequestResponse, ScriptedProvider::replying(&["4"])),
                ("p2", Capability::RequestResponse, ScriptedProvider::hanging()),
            ],
            100,
        );

        let outcome = d
            .dispatch(TurnRequest::new("2+2?", ids(&["p1", "p2"])))
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events_for(&outcome.events, "p1"),
            vec![&StreamEvent::delta("p1", "4"), &StreamEvent::done("p1", 1)]
        );
        assert_eq!(
            events_for(&outcome.events, "p2"),
            vec![&StreamEvent::error("p2", "timed out after 15s")]
        );
        assert_eq!(outcome.marker, CompletionMarker::new(99, 1, false));
        assert_eq!(outcome.answers.get("p1"), Some(&Answer::Text("4".into())));
        assert!(outcome.answers.get("p2").is_some_and(Answer::is_failed));
    }

    #[tokio::test]
    async fn faulty_provider_does_not_disturb_siblings() {
        let d = dispatcher(
            vec![
                ("bad", Capability::Streaming, ScriptedProvider::failing("boom")),
                ("good", Capability::Streaming, ScriptedProvider::replying(&["a", "b", "c"])),
            ],
            1000,
        );

        let outcome = d
            .dispatch(TurnRequest::new("hello", ids(&["bad", "good"])))
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events_for(&outcome.events, "good"),
            vec![
                &StreamEvent::delta("good", "a"),
                &StreamEvent::delta("good", "b"),
                &StreamEvent::delta("good", "c"),
                &StreamEvent::done("good", 3),
            ]
        );
        assert_eq!(
            events_for(&outcome.events, "bad"),
            vec![&StreamEvent::error("bad", "provider error: boom")]
        );
        assert_eq!(outcome.answers.get("good"), Some(&Answer::Text("abc".into())));
    }

    #[tokio::test]
    async fn panicking_provider_is_isolated() {
        let d = dispatcher(
            vec![
                ("crash", Capability::RequestResponse, ScriptedProvider::panicking()),
                ("ok", Capability::RequestResponse, ScriptedProvider::replying(&["fine"])),
            ],
            1000,
        );

        let outcome = d
            .dispatch(TurnRequest::new("hi", ids(&["crash", "ok"])))
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events_for(&outcome.events, "crash"),
            vec![&StreamEvent::error("crash", "provider task panicked")]
        );
        assert_eq!(events_for(&outcome.events, "ok").len(), 2);
    }

    #[tokio::test]
    async fn unknown_provider_gets_an_error_event() {
        let d = dispatcher(
            vec![("p1", Capability::RequestResponse, ScriptedProvider::replying(&["x"]))],
            1000,
        );

        let outcome = d
            .dispatch(TurnRequest::new("hi", ids(&["ghost", "p1"])))
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events_for(&outcome.events, "ghost"),
            vec![&StreamEvent::error("ghost", "unknown provider: ghost")]
        );
        assert_eq!(events_for(&outcome.events, "p1").len(), 2);
    }

    #[tokio::test]
    async fn exactly_one_terminal_per_provider_and_marker_last() {
        let d = dispatcher(
            vec![
                ("a", Capability::Streaming, ScriptedProvider::replying(&["1", "2"])),
                ("b", Capability::RequestResponse, ScriptedProvider::replying(&["3"])),
                ("c", Capability::RequestResponse, ScriptedProvider::failing("nope")),
            ],
            1000,
        );

        let events: Vec<TurnEvent> = d
            .dispatch(TurnRequest::new("count", ids(&["a", "b", "c"])))
            .unwrap()
            .into_events()
            .collect()
            .await;

        assert!(matches!(events.last(), Some(TurnEvent::Complete(_))));
        let markers = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::Complete(_)))
            .count();
        assert_eq!(markers, 1);
        for id in ["a", "b", "c"] {
            let terminals = events
                .iter()
                .filter(|e| {
                    matches!(e, TurnEvent::Provider(ev) if ev.provider_id == id && ev.is_terminal())
                })
                .count();
            assert_eq!(terminals, 1, "provider {id}");
        }
    }

    #[tokio::test]
    async fn refused_turn_contacts_no_provider() {
        let provider = ScriptedProvider::replying(&["never"]);
        let calls = provider.call_counter();
        let d = dispatcher(vec![("p1", Capability::RequestResponse, provider)], 10);

        // 80 chars plus the default persona is an estimate of 27 tokens.
        let prompt = "x".repeat(80);
        let err = d
            .dispatch(TurnRequest::new(prompt, ids(&["p1"])))
            .err()
            .unwrap();

        assert_eq!(
            err,
            DispatchError::BudgetExceeded {
                estimated: 27,
                remaining: 10
            }
        );
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(d.ledger().used(), 0);
    }

    #[tokio::test]
    async fn malformed_requests_are_refused() {
        let d = dispatcher(
            vec![("p1", Capability::RequestResponse, ScriptedProvider::replying(&["x"]))],
            1000,
        );

        assert_eq!(
            d.dispatch(TurnRequest::new("hi", vec![])).err(),
            Some(DispatchError::EmptySelection)
        );
        assert_eq!(
            d.dispatch(TurnRequest::new("   ", ids(&["p1"]))).err(),
            Some(DispatchError::EmptyPrompt)
        );

        let many: Vec<String> = (0..11).map(|i| format!("p{i}")).collect();
        assert_eq!(
            d.dispatch(TurnRequest::new("hi", many)).err(),
            Some(DispatchError::TooManyProviders { count: 11, max: 10 })
        );
    }

    #[tokio::test]
    async fn duplicates_are_collapsed() {
        let provider = ScriptedProvider::replying(&["x"]);
        let calls = provider.call_counter();
        let d = dispatcher(vec![("p1", Capability::RequestResponse, provider)], 1000);

        let turn = d
            .dispatch(TurnRequest::new("hi", ids(&["p1", "p1", "p1"])))
            .unwrap();
        assert_eq!(turn.providers(), &["p1".to_string()]);

        let outcome = turn.collect().await;
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attachments_alone_are_a_valid_prompt() {
        let d = dispatcher(
            vec![("p1", Capability::RequestResponse, ScriptedProvider::replying(&["seen"]))],
            10_000,
        );
        let mut request = TurnRequest::new("", ids(&["p1"]));
        request.attachments = vec!["report.pdf".into()];

        assert_eq!(request.effective_prompt(), "Attachment: report.pdf");
        assert_eq!(d.estimate(&request), 257);
        assert!(d.dispatch(request).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_the_budget_cancels_active_providers() {
        // Each chunk charges 10 tokens; the turn itself estimates at 16.
        let (a, b, c) = ("a".repeat(40), "b".repeat(40), "c".repeat(40));
        let d = dispatcher(
            vec![
                (
                    "chatty",
                    Capability::Streaming,
                    ScriptedProvider::replying(&[a.as_str(), b.as_str(), c.as_str()])
                        .with_delay(Duration::from_secs(1)),
                ),
                ("slow", Capability::RequestResponse, ScriptedProvider::hanging()),
            ],
            20,
        );

        let outcome = d
            .dispatch(TurnRequest::new("hi", ids(&["chatty", "slow"])))
            .unwrap()
            .collect()
            .await;

        assert!(outcome.marker.budget_exceeded);
        assert_eq!(outcome.marker.tokens, 0);
        assert_eq!(
            events_for(&outcome.events, "chatty"),
            vec![
                &StreamEvent::delta("chatty", a.as_str()),
                &StreamEvent::delta("chatty", b.as_str()),
                &StreamEvent::error("chatty", CANCELLED),
            ]
        );
        assert_eq!(
            events_for(&outcome.events, "slow"),
            vec![&StreamEvent::error("slow", CANCELLED)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fast_answers_are_not_held_back_by_slow_siblings() {
        let slow_delay = Duration::from_secs(10);
        let d = dispatcher(
            vec![
                (
                    "slow",
                    Capability::RequestResponse,
                    ScriptedProvider::replying(&["late"]).with_delay(slow_delay),
                ),
                ("fast", Capability::RequestResponse, ScriptedProvider::replying(&["quick"])),
            ],
            1000,
        );
        let start = tokio::time::Instant::now();
        let mut events = d
            .dispatch(TurnRequest::new("hi", ids(&["slow", "fast"])))
            .unwrap()
            .into_events();

        assert_eq!(
            events.next().await,
            Some(TurnEvent::Provider(StreamEvent::delta("fast", "quick")))
        );
        assert_eq!(
            events.next().await,
            Some(TurnEvent::Provider(StreamEvent::done("fast", 2)))
        );
        assert!(start.elapsed() < slow_delay);

        let rest: Vec<TurnEvent> = events.collect().await;
        assert!(start.elapsed() >= slow_delay);
        assert_eq!(
            rest,
            vec![
                TurnEvent::Provider(StreamEvent::delta("slow", "late")),
                TurnEvent::Provider(StreamEvent::done("slow", 1)),
                TurnEvent::Complete(CompletionMarker::new(997, 3, false)),
            ]
        );
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_turn() {
        let provider = ScriptedProvider::hanging();
        let calls = provider.call_counter();
        let released = provider.release_flag();
        let d = dispatcher(vec![("slow", Capability::RequestResponse, provider)], 1000);
        let turn = d.dispatch(TurnRequest::new("hi", ids(&["slow"]))).unwrap();
        let token = turn.cancellation_token();

        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!released.load(Ordering::SeqCst));

        let events = turn.into_events();
        drop(events);
        assert!(token.is_cancelled());

        let dropped = tokio::time::timeout(Duration::from_secs(1), async {
            while !released.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(dropped.is_ok(), "in-flight call was not dropped");
    }
}
