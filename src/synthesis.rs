//! Synthesis - merge the swarm's outputs into one final narrative

use serde_json::Value;
use tracing::{debug, instrument};

use crate::provider::{ChatMessage, ChatRequest, ProviderError, ProviderRegistry};
use crate::types::{Formality, SwarmConfig, Verbosity};

/// Returned verbatim when no bee produced a usable output
pub const NO_ACTIONABLE_RESULTS: &str =
    "The swarm finished without producing actionable results.";

/// One bee's contribution to the synthesis input set
#[derive(Debug, Clone)]
pub struct Contribution {
    /// Human-readable bee label
    pub bee: String,
    pub summary: String,
    pub result: Value,
}

/// The synthesized narrative plus the tokens spent producing it
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub response: String,
    pub tokens_used: u64,
}

fn build_prompt(
    trigger: &str,
    contributions: &[Contribution],
    verbosity: Verbosity,
    formality: Formality,
) -> (String, String) {
    let persona = format!(
        "You are the single voice of an assistant swarm. Merge the worker \
         outputs below into one {} answer in a {} register. Do not mention \
         the workers or the orchestration.",
        verbosity.as_str(),
        formality.as_str()
    );

    let mut prompt = format!("Original request:\n{trigger}\n\nWorker outputs:\n");
    for contribution in contributions {
        prompt.push_str(&format!(
            "- [{}] {}: {}\n",
            contribution.bee, contribution.summary, contribution.result
        ));
    }
    prompt.push_str("\nAnswer the original request using only these outputs.");

    (persona, prompt)
}

/// Produce the final narrative from every collected contribution.
///
/// An empty input set short-circuits to a canned message without a
/// provider call.
#[instrument(skip_all, fields(contributions = contributions.len()))]
pub async fn synthesize(
    providers: &ProviderRegistry,
    config: &SwarmConfig,
    trigger: &str,
    contributions: &[Contribution],
    verbosity: Verbosity,
    formality: Formality,
) -> Result<SynthesisOutcome, ProviderError> {
    if contributions.is_empty() {
        debug!("Nothing to synthesize");
        return Ok(SynthesisOutcome {
            response: NO_ACTIONABLE_RESULTS.to_string(),
            tokens_used: 0,
        });
    }

    let (persona, prompt) = build_prompt(trigger, contributions, verbosity, formality);
    let request = ChatRequest {
        model: config.model.clone(),
        messages: vec![ChatMessage::system(persona), ChatMessage::user(prompt)],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let response = providers.chat(&request).await?;
    let tokens_used = response.usage.map(|u| u.total_tokens).unwrap_or(0);

    Ok(SynthesisOutcome {
        response: response.content,
        tokens_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn contributions() -> Vec<Contribution> {
        vec![
            Contribution {
                bee: "research scout".to_string(),
                summary: "found 2 overdue tasks".to_string(),
                result: json!({"count": 2}),
            },
            Contribution {
                bee: "drafting writer".to_string(),
                summary: "drafted the reminder".to_string(),
                result: json!("draft text"),
            },
        ]
    }

    #[tokio::test]
    async fn test_empty_input_set_returns_canned_message() {
        // no provider registered on purpose - the call must never happen
        let providers = ProviderRegistry::new();
        let outcome = synthesize(
            &providers,
            &SwarmConfig::default(),
            "do the thing",
            &[],
            Verbosity::Normal,
            Formality::Neutral,
        )
        .await
        .unwrap();

        assert_eq!(outcome.response, NO_ACTIONABLE_RESULTS);
        assert_eq!(outcome.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_synthesis_calls_provider_once() {
        let scripted = Arc::new(ScriptedProvider::new());
        scripted.push_response("Here is your merged answer.", 17);
        let providers = ProviderRegistry::new().register("scripted", scripted.clone());

        let outcome = synthesize(
            &providers,
            &SwarmConfig::default(),
            "remind people about overdue tasks",
            &contributions(),
            Verbosity::Brief,
            Formality::Formal,
        )
        .await
        .unwrap();

        assert_eq!(outcome.response, "Here is your merged answer.");
        assert_eq!(outcome.tokens_used, 17);
        assert_eq!(scripted.remaining(), 0);
    }

    #[test]
    fn test_prompt_carries_outputs_and_tone() {
        let (persona, prompt) = build_prompt(
            "remind people",
            &contributions(),
            Verbosity::Detailed,
            Formality::Casual,
        );

        assert!(persona.contains("detailed"));
        assert!(persona.contains("casual"));
        assert!(prompt.contains("remind people"));
        assert!(prompt.contains("found 2 overdue tasks"));
        assert!(prompt.contains("research scout"));
        assert!(prompt.contains("drafted the reminder"));
    }
}
