//! Best-of-N synthesis endpoint.
//!
//! POST /asklurk
//!
//! Merges the answers a client collected from one turn. A missing answer is
//! a 400; a failing synthesis backend still returns 200 with the
//! deterministic fallback text and an `error` field.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use lurk_core::fanout::TurnRequest;
use lurk_core::history::HistoryRecorder;
use lurk_types::answer::{Answer, AnswerSet, SynthesisSource};
use lurk_types::error::SynthesisError;

use crate::state::AppState;

/// Prefix marking an answer the client received as a provider error.
const ERROR_PREFIX: &str = "[Error] ";

#[derive(Debug, Deserialize)]
pub struct AskLurkRequest {
    pub prompt: String,
    /// Attachment references sent with the streamed turn.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Provider id -> answer text.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// Required providers; defaults to every enabled provider.
    pub providers: Option<Vec<String>>,
}

/// POST /asklurk
pub async fn ask_lurk(State(state): State<AppState>, Json(body): Json<AskLurkRequest>) -> Response {
    let required = body
        .providers
        .unwrap_or_else(|| state.registry.enabled_ids());
    let answers = to_answer_set(body.answers);
    // Same prompt text `/stream` recorded the turn under.
    let prompt = TurnRequest {
        prompt: body.prompt,
        attachments: body.attachments,
        providers: Vec::new(),
    }
    .effective_prompt();

    let result = match state
        .synthesizer
        .synthesize(&prompt, &answers, &required)
        .await
    {
        Ok(result) => result,
        Err(SynthesisError::MissingProviders(missing)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "best": "",
                    "error": format!("Missing responses from: {}", missing.join(", ")),
                })),
            )
                .into_response();
        }
    };

    if let Err(e) = state
        .history
        .attach_synthesis(&prompt, result.clone())
        .await
    {
        tracing::warn!("failed to record synthesis: {e}");
    }

    let mut payload = json!({
        "best": result.text,
        "source": result.source,
        "tokens_used": state.ledger.used(),
    });
    if result.source == SynthesisSource::FallbackCombined {
        payload["error"] = json!(result.error.unwrap_or_else(|| "synthesis failed".to_string()));
    }
    Json(payload).into_response()
}

fn to_answer_set(texts: BTreeMap<String, String>) -> AnswerSet {
    texts
        .into_iter()
        .map(|(id, text)| {
            let answer = match text.strip_prefix(ERROR_PREFIX) {
                Some(message) => Answer::Failed(message.to_string()),
                None => Answer::Text(text),
            };
            (id, answer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use lurk_core::llm::mock::ScriptedProvider;

    use super::*;
    use crate::state::test_support::state_with;

    fn body(answers: &[(&str, &str)]) -> Json<AskLurkRequest> {
        Json(AskLurkRequest {
            prompt: "What is 2+2?".into(),
            attachments: Vec::new(),
            answers: answers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            providers: None,
        })
    }

    async fn call(state: AppState, body: Json<AskLurkRequest>) -> (StatusCode, Value) {
        let response = ask_lurk(State(state), body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn incomplete_answers_are_rejected() {
        let synth = ScriptedProvider::replying(&["merged"]);
        let calls = synth.call_counter();
        let state = state_with(
            vec![
                ("a", ScriptedProvider::replying(&["x"])),
                ("b", ScriptedProvider::replying(&["y"])),
                ("synthesis", synth),
            ],
            1000,
            None,
        );

        let (status, json) = call(state, body(&[("a", "4")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["best"], "");
        assert_eq!(json["error"], "Missing responses from: b");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_returns_best_and_records_history() {
        let state = state_with(
            vec![
                ("a", ScriptedProvider::replying(&["x"])),
                ("synthesis", ScriptedProvider::replying(&["It is 4."])),
            ],
            1000,
            None,
        );

        let (status, json) = call(state.clone(), body(&[("a", "4")])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["best"], "It is 4.");
        assert_eq!(json["source"], "synthesized");
        assert!(json["tokens_used"].as_u64().unwrap() > 0);
        assert!(json.get("error").is_none());

        let history = state.history.list().await.unwrap();
        assert!(history[0].synthesized);
    }

    #[tokio::test]
    async fn backend_failure_falls_back_with_200() {
        let state = state_with(
            vec![
                ("a", ScriptedProvider::replying(&["x"])),
                ("b", ScriptedProvider::replying(&["y"])),
                ("synthesis", ScriptedProvider::failing("down")),
            ],
            1000,
            None,
        );

        let (status, json) = call(state, body(&[("a", "foo"), ("b", "[Error] timed out")])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["source"], "fallback-combined");
        assert_eq!(json["best"], "A: foo\n\nB: [Error] timed out");
        assert!(json["error"].as_str().unwrap().contains("down"));
        assert_eq!(json["tokens_used"], 0);
    }

    #[tokio::test]
    async fn synthesis_joins_the_streamed_turn() {
        let state = state_with(
            vec![
                ("a", ScriptedProvider::replying(&["4"])),
                ("synthesis", ScriptedProvider::replying(&["It is 4."])),
            ],
            1000,
            None,
        );

        let streamed = crate::http::handlers::stream::stream(
            State(state.clone()),
            Json(crate::http::handlers::stream::StreamRequest {
                prompt: "  What is 2+2? ".into(),
                attachments: vec!["notes.txt".into()],
                providers: None,
            }),
        )
        .await
        .unwrap()
        .into_response();
        axum::body::to_bytes(streamed.into_body(), usize::MAX)
            .await
            .unwrap();

        let mut request = body(&[("a", "4")]);
        request.0.attachments = vec!["notes.txt".into()];
        let (status, _) = call(state.clone(), request).await;
        assert_eq!(status, StatusCode::OK);

        let history = state.history.list().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].providers, 1);
        assert!(history[0].synthesized);
    }

    #[test]
    fn error_prefix_marks_failed_answers() {
        let set = to_answer_set(BTreeMap::from([
            ("a".to_string(), "fine".to_string()),
            ("b".to_string(), "[Error] boom".to_string()),
        ]));
        assert_eq!(set.get("a"), Some(&Answer::Text("fine".into())));
        assert_eq!(set.get("b"), Some(&Answer::Failed("boom".into())));
    }
}
