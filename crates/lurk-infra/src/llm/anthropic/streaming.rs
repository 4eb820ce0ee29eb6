//! SSE stream for the Anthropic Messages API.
//!
//! Protocol:
//! 1. `message_start` -- message object with initial usage
//! 2. Per block: `content_block_start` -> N x `content_block_delta` -> `content_block_stop`
//! 3. `message_delta` -- stop_reason and cumulative usage
//! 4. `message_stop` -- final event
//! 5. `ping` events may appear anywhere (keepalive)
//! 6. `error` events may appear mid-stream

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use lurk_core::llm::provider::BackendStream;
use lurk_types::llm::{BackendEvent, LlmError, StopReason};

use super::client::map_status;
use super::types::{
    AnthropicDelta, AnthropicRequest, ContentBlockDeltaPayload, ErrorPayload, MessageDeltaPayload,
    MessageStartPayload,
};

/// Open a streaming request and map its SSE events to [`BackendEvent`]s.
pub fn create_anthropic_stream(
    client: reqwest::Client,
    url: String,
    body: AnthropicRequest,
    api_key: SecretString,
    api_version: String,
) -> BackendStream {
    Box::pin(async_stream::try_stream! {
        let response = client
            .post(&url)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", &api_version)
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            Err::<(), _>(map_status(status.as_u16(), &error_body))?;
            return;
        }

        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
            let finished = event.event == "message_stop";
            if let Some(mapped) = parse_sse_event(&event.event, &event.data)? {
                yield mapped;
            }
            if finished {
                break;
            }
        }
    })
}

/// Map one SSE event. Events that carry nothing of interest map to `None`.
pub fn parse_sse_event(event: &str, data: &str) -> Result<Option<BackendEvent>, LlmError> {
    let parse_err = |e: serde_json::Error| LlmError::Deserialization(format!("{event}: {e}"));

    match event {
        "message_start" => {
            let payload: MessageStartPayload = serde_json::from_str(data).map_err(parse_err)?;
            tracing::trace!(
                input_tokens = payload.message.usage.input_tokens,
                "anthropic stream started"
            );
            Ok(Some(BackendEvent::Connected))
        }
        "content_block_delta" => {
            let payload: ContentBlockDeltaPayload = serde_json::from_str(data).map_err(parse_err)?;
            match payload.delta {
                AnthropicDelta::TextDelta { text } => Ok(Some(BackendEvent::TextDelta { text })),
                AnthropicDelta::Other => Ok(None),
            }
        }
        "message_delta" => {
            let payload: MessageDeltaPayload = serde_json::from_str(data).map_err(parse_err)?;
            if payload.usage.output_tokens > 0 {
                tracing::trace!(output_tokens = payload.usage.output_tokens, "anthropic usage");
            }
            Ok(Some(BackendEvent::MessageDelta {
                stop_reason: StopReason::from_backend(payload.delta.stop_reason.as_deref()),
            }))
        }
        "message_stop" => Ok(Some(BackendEvent::Done)),
        "error" => {
            let payload: ErrorPayload = serde_json::from_str(data).map_err(parse_err)?;
            Err(match payload.error.error_type.as_str() {
                "overloaded_error" => LlmError::Overloaded(payload.error.message),
                "rate_limit_error" => LlmError::RateLimited,
                "authentication_error" => LlmError::AuthenticationFailed,
                _ => LlmError::Stream(payload.error.message),
            })
        }
        // ping, content_block_start, content_block_stop
        _ => Ok(None),
    }
}
