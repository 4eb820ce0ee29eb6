//! OpenAI SSE stream to [`BackendEvent`] adapter.
//!
//! Maps `async-openai`'s [`ChatCompletionResponseStream`] chunks to the
//! provider-agnostic [`BackendEvent`] enum defined in `lurk-types`.

use futures_util::StreamExt;

use async_openai::types::chat::{ChatCompletionResponseStream, FinishReason};

use lurk_core::llm::provider::BackendStream;
use lurk_types::llm::{BackendEvent, LlmError, StopReason, Usage};

/// Map an async-openai [`ChatCompletionResponseStream`] to a stream of [`BackendEvent`]s.
///
/// The returned stream emits events in this order:
/// 1. `Connected` -- immediately on entry
/// 2. `TextDelta` -- for each non-empty text chunk
/// 3. `MessageDelta` -- with the stop reason when finish_reason appears
/// 4. `Usage` -- token usage (requires `stream_options.include_usage = true` on request)
/// 5. `Done` -- at the end of the stream
pub fn map_openai_stream(stream: ChatCompletionResponseStream) -> BackendStream {
    Box::pin(async_stream::try_stream! {
        yield BackendEvent::Connected;

        let mut stream = stream;
        while let Some(result) = stream.next().await {
            let chunk = result.map_err(|e| LlmError::Stream(e.to_string()))?;

            // The final chunk carries usage with an empty choices array.
            if let Some(usage) = &chunk.usage {
                yield BackendEvent::Usage(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                });
            }

            for choice in chunk.choices {
                if let Some(text) = choice.delta.content
                    && !text.is_empty()
                {
                    yield BackendEvent::TextDelta { text };
                }

                if let Some(reason) = choice.finish_reason {
                    yield BackendEvent::MessageDelta {
                        stop_reason: map_finish_reason(&reason),
                    };
                }
            }
        }

        yield BackendEvent::Done;
    })
}

pub(crate) fn map_finish_reason(reason: &FinishReason) -> StopReason {
    match reason {
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::Stop
        | FinishReason::ContentFilter
        | FinishReason::ToolCalls
        | FinishReason::FunctionCall => StopReason::EndTurn,
    }
}
