//! SSE fan-out endpoint.
//!
//! POST /stream
//!
//! Sends one prompt to every selected provider and relays their events as
//! they arrive. Each SSE `data:` line is one JSON object:
//! - `{"provider": id, "type": "delta", "text": ...}`
//! - `{"provider": id, "type": "done", "tokens": n}`
//! - `{"provider": id, "type": "error", "message": ...}`
//!
//! The last one is the completion marker
//! `{"all_done": true, "tokens": remaining, "tokens_used": used, "budget_exceeded": bool}`.
//! The finished turn is recorded in history right before the marker.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use lurk_core::fanout::TurnRequest;
use lurk_core::history::HistoryRecorder;
use lurk_types::answer::HistoryRecord;
use lurk_types::error::DispatchError;
use lurk_types::event::TurnEvent;

use crate::http::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Defaults to every enabled provider.
    pub providers: Option<Vec<String>>,
}

/// POST /stream
pub async fn stream(
    State(state): State<AppState>,
    Json(body): Json<StreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if body.prompt.trim().is_empty() && body.attachments.is_empty() {
        return Err(DispatchError::EmptyPrompt.into());
    }
    if state.ledger.is_exhausted() {
        return Err(DispatchError::BudgetExceeded {
            estimated: 0,
            remaining: 0,
        }
        .into());
    }

    let request = TurnRequest {
        prompt: body.prompt,
        attachments: body.attachments,
        providers: body
            .providers
            .unwrap_or_else(|| state.registry.enabled_ids()),
    };
    let prompt = request.effective_prompt();
    let turn = state.dispatcher.dispatch(request)?;
    tracing::info!(turn_id = %turn.id(), providers = turn.providers().len(), "streaming turn");

    let answers = turn.answers();
    let history = state.history.clone();
    let mut events = turn.into_events();

    let sse_stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            if matches!(event, TurnEvent::Complete(_)) {
                let record = HistoryRecord::new(prompt.clone(), answers.snapshot());
                if let Err(e) = history.record(record).await {
                    tracing::warn!("failed to record turn: {e}");
                }
            }
            yield Ok::<_, Infallible>(Event::default().data(encode(&event)));
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn encode(event: &TurnEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!("failed to encode turn event: {e}");
        r#"{"error":"event encoding failed"}"#.to_string()
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::{Value, json};

    use lurk_core::llm::mock::ScriptedProvider;

    use super::*;
    use crate::state::test_support::state_with;

    fn request(prompt: &str, providers: Option<&[&str]>) -> Json<StreamRequest> {
        Json(StreamRequest {
            prompt: prompt.to_string(),
            attachments: Vec::new(),
            providers: providers.map(|ids| ids.iter().map(|id| id.to_string()).collect()),
        })
    }

    async fn sse_payloads(state: AppState, body: Json<StreamRequest>) -> Vec<Value> {
        let response = stream(State(state), body).await.unwrap().into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn streams_provider_events_then_marker() {
        let state = state_with(
            vec![
                ("p1", ScriptedProvider::replying(&["4"])),
                ("p2", ScriptedProvider::failing("boom")),
            ],
            100,
            None,
        );

        let payloads = sse_payloads(state.clone(), request("2+2?", None)).await;

        assert!(payloads.contains(&json!({"provider": "p1", "type": "delta", "text": "4"})));
        assert!(payloads.contains(&json!({"provider": "p1", "type": "done", "tokens": 1})));
        assert!(payloads.iter().any(|p| p["provider"] == "p2" && p["type"] == "error"));

        let marker = payloads.last().unwrap();
        assert_eq!(marker["all_done"], true);
        assert_eq!(marker["tokens"], 99);
        assert_eq!(marker["tokens_used"], 1);

        let history = state.history.list().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].providers, 2);
    }

    #[tokio::test]
    async fn empty_prompt_is_bad_request() {
        let state = state_with(vec![("p1", ScriptedProvider::replying(&["x"]))], 100, None);
        let err = stream(State(state), request("   ", None)).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn over_budget_is_refused_without_calls() {
        let provider = ScriptedProvider::replying(&["x"]);
        let calls = provider.call_counter();
        let state = state_with(vec![("p1", provider)], 10, None);

        let err = stream(State(state), request(&"a".repeat(80), None))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_ledger_is_refused() {
        let state = state_with(vec![("p1", ScriptedProvider::replying(&["x"]))], 10, None);
        state.ledger.charge(10);
        let err = stream(State(state), request("hi", None)).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn explicit_selection_limits_fan_out() {
        let state = state_with(
            vec![
                ("p1", ScriptedProvider::replying(&["one"])),
                ("p2", ScriptedProvider::replying(&["two"])),
            ],
            100,
            None,
        );
        let payloads = sse_payloads(state, request("hi", Some(&["p2"]))).await;
        assert!(payloads.iter().all(|p| p["provider"] != "p1"));
        assert!(payloads.iter().any(|p| p["provider"] == "p2"));
    }
}
