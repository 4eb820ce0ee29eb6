//! `lurk ask`: run one turn from the terminal.
//!
//! Provider answers are buffered and printed as each provider finishes, so
//! interleaved deltas never mix on screen. With `--json` every turn event is
//! printed as one JSON line instead.

use std::collections::HashMap;

use anyhow::Result;
use console::style;
use futures_util::StreamExt;

use lurk_core::fanout::TurnRequest;
use lurk_core::history::HistoryRecorder;
use lurk_types::answer::{HistoryRecord, SynthesisSource};
use lurk_types::event::{CompletionMarker, StreamEventKind, TurnEvent};

use crate::state::AppState;

pub async fn ask(
    state: &AppState,
    prompt: String,
    providers: Vec<String>,
    attachments: Vec<String>,
    synthesize: bool,
    json: bool,
) -> Result<()> {
    let providers = if providers.is_empty() {
        state.registry.enabled_ids()
    } else {
        providers
    };
    let request = TurnRequest {
        prompt,
        attachments,
        providers,
    };
    let effective_prompt = request.effective_prompt();

    let turn = state.dispatcher.dispatch(request)?;
    let required = turn.providers().to_vec();
    let answers = turn.answers();
    let mut events = turn.into_events();

    let mut buffers: HashMap<String, String> = HashMap::new();
    let mut marker: Option<CompletionMarker> = None;

    while let Some(event) = events.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }
        match event {
            TurnEvent::Provider(event) => match event.kind {
                StreamEventKind::Delta { text } => {
                    buffers.entry(event.provider_id).or_default().push_str(&text);
                }
                StreamEventKind::Done { tokens } if !json => {
                    let text = buffers.remove(&event.provider_id).unwrap_or_default();
                    println!();
                    println!(
                        "  {} {}",
                        style(state.registry.label(&event.provider_id)).cyan().bold(),
                        style(format!("({tokens} tokens)")).dim()
                    );
                    println!("{}", text.trim());
                }
                StreamEventKind::Error { message } if !json => {
                    println!();
                    println!(
                        "  {} {}",
                        style(state.registry.label(&event.provider_id)).red().bold(),
                        style(message).red()
                    );
                }
                _ => {}
            },
            TurnEvent::Complete(m) => marker = Some(m),
        }
    }

    let answers = answers.snapshot();
    state
        .history
        .record(HistoryRecord::new(effective_prompt.clone(), answers.clone()))
        .await?;

    if !json {
        if let Some(m) = marker {
            println!();
            println!(
                "  {} {} used, {} remaining{}",
                style("Tokens:").dim(),
                style(m.tokens_used).bold(),
                style(m.tokens).bold(),
                if m.budget_exceeded {
                    format!(" {}", style("(budget exhausted)").yellow())
                } else {
                    String::new()
                }
            );
        }
    }

    if synthesize {
        let result = state
            .synthesizer
            .synthesize(&effective_prompt, &answers, &required)
            .await?;
        state
            .history
            .attach_synthesis(&effective_prompt, result.clone())
            .await?;

        if json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            println!();
            let heading = match result.source {
                SynthesisSource::Synthesized => style("Best answer").green().bold(),
                SynthesisSource::FallbackCombined => style("Combined answers").yellow().bold(),
            };
            println!("  {heading}");
            if let Some(error) = &result.error {
                println!("  {}", style(format!("synthesis failed: {error}")).dim());
            }
            println!("{}", result.text);
        }
    }
    println!();
    Ok(())
}
