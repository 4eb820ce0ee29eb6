//! Best-of-N synthesis.
//!
//! `Synthesizer` sends the collected answers of one turn to a designated
//! strong provider and asks for a single merged answer. If that call fails
//! for any reason the result is a deterministic concatenation of answer
//! excerpts instead; backend failures never reach the caller as errors.

use std::sync::Arc;
use std::time::Duration;

use lurk_types::answer::{Answer, AnswerSet, SynthesisResult, SynthesisSource, excerpt};
use lurk_types::error::SynthesisError;
use lurk_types::llm::{CompletionRequest, Message};

use crate::estimate::estimate_tokens;
use crate::fanout::GenerationSettings;
use crate::ledger::TokenLedger;
use crate::llm::adapter::describe;
use crate::llm::registry::ProviderRegistry;

/// Characters of each answer kept in the fallback text.
pub const FALLBACK_EXCERPT_CHARS: usize = 200;

/// System prompt for the synthesis call.
const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are given one question and several answers to it, each written by a different AI model.
Write the single best answer to the question:
1. Combine the strengths of the individual answers
2. Correct mistakes where the answers disagree
3. Do not repeat the answers verbatim or mention the models
4. Produce one coherent response in the language of the question"#;

pub struct Synthesizer {
    registry: Arc<ProviderRegistry>,
    ledger: TokenLedger,
    provider_id: String,
    timeout: Duration,
    settings: GenerationSettings,
}

impl Synthesizer {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        ledger: TokenLedger,
        provider_id: impl Into<String>,
        timeout: Duration,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            registry,
            ledger,
            provider_id: provider_id.into(),
            timeout,
            settings,
        }
    }

    /// Id of the provider that performs the merge.
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Merge `answers` into one.
    ///
    /// Every id in `required` must have a non-blank entry (a failure counts
    /// as an entry); otherwise nothing is called and the missing ids are
    /// returned. On success the ledger is charged for the prompt and the
    /// merged text.
    #[tracing::instrument(
        name = "synthesize",
        skip_all,
        fields(provider = %self.provider_id, answers = answers.len())
    )]
    pub async fn synthesize(
        &self,
        prompt: &str,
        answers: &AnswerSet,
        required: &[String],
    ) -> Result<SynthesisResult, SynthesisError> {
        let missing = answers.missing(required);
        if !missing.is_empty() {
            tracing::info!(missing = ?missing, "synthesis refused: incomplete answer set");
            return Err(SynthesisError::MissingProviders(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }

        let Some(adapter) = self.registry.get(&self.provider_id) else {
            let cause = format!("synthesis provider '{}' is not registered", self.provider_id);
            tracing::warn!("{cause}");
            return Ok(self.fallback(answers, cause));
        };

        let synthesis_prompt = build_synthesis_prompt(prompt, answers);
        let request = CompletionRequest {
            model: adapter.config().model.clone(),
            messages: vec![Message::user(synthesis_prompt.clone())],
            system: Some(SYNTHESIS_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_output_tokens,
            temperature: Some(self.settings.temperature),
            stream: false,
        };

        match adapter.complete_within(&request, self.timeout).await {
            Ok(response) if !response.content.trim().is_empty() => {
                let text = response.content.trim().to_string();
                let tokens = estimate_tokens(&synthesis_prompt) + estimate_tokens(&text);
                let used = self.ledger.charge(tokens);
                tracing::info!(tokens, used, "synthesis complete");
                Ok(SynthesisResult {
                    text,
                    source: SynthesisSource::Synthesized,
                    tokens_consumed: tokens,
                    error: None,
                })
            }
            Ok(_) => {
                tracing::warn!("synthesis returned an empty answer, using fallback");
                Ok(self.fallback(answers, "synthesis returned an empty answer".to_string()))
            }
            Err(err) => {
                tracing::warn!(error = %err, "synthesis failed, using fallback");
                Ok(self.fallback(answers, describe(&err)))
            }
        }
    }

    fn fallback(&self, answers: &AnswerSet, cause: String) -> SynthesisResult {
        SynthesisResult {
            text: fallback_combined(&self.registry, answers),
            source: SynthesisSource::FallbackCombined,
            tokens_consumed: 0,
            error: Some(cause),
        }
    }
}

/// The structured merge instruction: the question plus one tagged block per
/// successful answer, in provider id order.
pub fn build_synthesis_prompt(prompt: &str, answers: &AnswerSet) -> String {
    let mut sections = vec![format!("<question>\n{}\n</question>", escape_xml(prompt.trim()))];

    let blocks: Vec<String> = answers
        .iter()
        .filter_map(|(id, answer)| match answer {
            Answer::Text(text) => Some(format!(
                "<answer provider=\"{}\">\n{}\n</answer>",
                escape_xml(id),
                escape_xml(text.trim())
            )),
            Answer::Failed(_) => None,
        })
        .collect();
    sections.push(format!("<answers>\n{}\n</answers>", blocks.join("\n")));

    sections.join("\n\n")
}

/// Deterministic merge used when the synthesis call fails: one labeled
/// excerpt per provider, in id order.
pub fn fallback_combined(registry: &ProviderRegistry, answers: &AnswerSet) -> String {
    answers
        .iter()
        .map(|(id, answer)| {
            format!(
                "{}: {}",
                registry.label(id),
                excerpt(answer.to_string().trim(), FALLBACK_EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
