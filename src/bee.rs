//! Bee runner - executes one agent against the shared session context

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::HiveError;
use crate::events::{EventSink, SwarmEvent};
use crate::provider::{ChatMessage, ChatRequest, ProviderRegistry};
use crate::store::SwarmStore;
use crate::types::{
    BeeOutput, BeeRun, ContextEntry, ContextKind, Handover, ParsedOutput, Signal, SignalDraft,
    SwarmConfig,
};

const DEGRADED_SUMMARY_LEN: usize = 200;

impl BeeOutput {
    /// Parse a model response into structured output.
    ///
    /// Strict JSON first, then one retry after stripping a markdown code
    /// fence, and finally the `Degraded` variant carrying the raw text.
    /// Malformed model output is never an error.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(parsed) = serde_json::from_str::<ParsedOutput>(trimmed) {
            return BeeOutput::Parsed(parsed);
        }
        if let Ok(parsed) = serde_json::from_str::<ParsedOutput>(extract_json(trimmed)) {
            return BeeOutput::Parsed(parsed);
        }
        BeeOutput::Degraded {
            raw: trimmed.to_string(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            BeeOutput::Parsed(parsed) => parsed.summary.clone(),
            BeeOutput::Degraded { raw } => truncate(raw, DEGRADED_SUMMARY_LEN),
        }
    }

    pub fn result_value(&self) -> Value {
        match self {
            BeeOutput::Parsed(parsed) => parsed.result.clone(),
            BeeOutput::Degraded { raw } => Value::String(raw.clone()),
        }
    }

    pub fn handover_data(&self) -> Option<&Value> {
        match self {
            BeeOutput::Parsed(parsed) => parsed.handover_data.as_ref(),
            BeeOutput::Degraded { .. } => None,
        }
    }

    pub fn signals(&self) -> &[SignalDraft] {
        match self {
            BeeOutput::Parsed(parsed) => &parsed.signals,
            BeeOutput::Degraded { .. } => &[],
        }
    }
}

/// Extract a JSON payload from a response that may wrap it in a markdown
/// code block
fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim();
        }
    }
    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            let content = text[start + 3..start + 3 + end].trim();
            if let Some(newline) = content.find('\n') {
                return content[newline + 1..].trim();
            }
            return content;
        }
    }
    text
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut prefix: String = text.chars().take(max_chars).collect();
    prefix.push_str("...");
    prefix
}

/// Executes one bee run end to end
pub struct BeeRunner {
    store: Arc<dyn SwarmStore>,
    providers: Arc<ProviderRegistry>,
    config: SwarmConfig,
    events: EventSink,
}

impl BeeRunner {
    pub fn new(
        store: Arc<dyn SwarmStore>,
        providers: Arc<ProviderRegistry>,
        config: SwarmConfig,
    ) -> Self {
        Self {
            store,
            providers,
            config,
            events: EventSink::noop(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Run one bee to a terminal state.
    ///
    /// Provider failures and malformed output are contained: they produce
    /// a `Failed` or degraded-but-`Completed` run, never an error. The
    /// `Err` path is reserved for the store becoming unavailable, which
    /// is the caller's session-level failure. `duration_ms` is recorded
    /// either way.
    #[instrument(skip_all, fields(run_id = %run.id, bee = %run.bee_instance_id))]
    pub async fn run(&self, mut run: BeeRun, trigger: &str) -> Result<BeeRun, HiveError> {
        let started = Instant::now();

        run.start();
        self.store.update_run(&run).await?;
        self.events.emit(SwarmEvent::RunStarted {
            session_id: run.session_id,
            run_id: run.id,
        });

        let snapshot = self.store.context_snapshot(run.session_id).await?;
        let handovers = self.store.handovers_for(run.session_id, run.id).await?;
        let request = self.build_request(&run, trigger, &snapshot, &handovers);

        match self.providers.chat(&request).await {
            Ok(response) => {
                let output = BeeOutput::parse(&response.content);
                self.persist_output(&run, &output).await?;

                let tokens_used = response.usage.map(|u| u.total_tokens).unwrap_or(0);
                run.complete(output, tokens_used, started.elapsed().as_millis() as u64);
                debug!(tokens_used, "Bee run completed");
                self.events.emit(SwarmEvent::RunCompleted {
                    session_id: run.session_id,
                    run_id: run.id,
                    tokens_used,
                    duration_ms: run.duration_ms,
                });
            }
            Err(e) => {
                warn!(error = %e, "Bee run failed");
                run.fail(e.to_string(), started.elapsed().as_millis() as u64);
                self.events.emit(SwarmEvent::RunFailed {
                    session_id: run.session_id,
                    run_id: run.id,
                    error: e.to_string(),
                });
            }
        }

        self.store.update_run(&run).await?;
        Ok(run)
    }

    /// Context keys are namespaced by bee identity so sibling writers can
    /// never collide
    fn namespace(run: &BeeRun) -> String {
        format!("{}:{}:{}", run.bee_type, run.subtype, run.bee_instance_id)
    }

    async fn persist_output(&self, run: &BeeRun, output: &BeeOutput) -> Result<(), HiveError> {
        let namespace = Self::namespace(run);

        self.store
            .append_context(ContextEntry::new(
                run.session_id,
                run.id,
                format!("{namespace}:result"),
                output.result_value(),
                ContextKind::Result,
                true,
            ))
            .await?;

        if let Some(data) = output.handover_data() {
            self.store
                .append_context(ContextEntry::new(
                    run.session_id,
                    run.id,
                    format!("{namespace}:handover"),
                    data.clone(),
                    ContextKind::Handover,
                    true,
                ))
                .await?;
        }

        for draft in output.signals() {
            self.store
                .raise_signal(Signal::new(
                    run.session_id,
                    run.id,
                    draft.kind,
                    draft.message.clone(),
                ))
                .await?;
            self.events.emit(SwarmEvent::SignalRaised {
                session_id: run.session_id,
                run_id: run.id,
                kind: draft.kind,
            });
        }

        Ok(())
    }

    fn build_request(
        &self,
        run: &BeeRun,
        trigger: &str,
        snapshot: &std::collections::HashMap<String, Value>,
        handovers: &[Handover],
    ) -> ChatRequest {
        let persona = format!(
            "You are the {} {} bee in an orchestrated swarm. Work only your \
             slice of the request. Answer with a single JSON object holding \
             \"summary\" and \"result\", plus \"handover_data\" for the next \
             phase and \"signals\" when something needs attention.",
            run.subtype, run.bee_type
        );

        let mut prompt = format!("Request:\n{trigger}\n");

        if !snapshot.is_empty() {
            prompt.push_str("\nShared context (latest value per key):\n");
            let mut keys: Vec<&String> = snapshot.keys().collect();
            keys.sort();
            for key in keys {
                prompt.push_str(&format!("- {key}: {}\n", snapshot[key]));
            }
        }

        if !handovers.is_empty() {
            prompt.push_str("\nHandovers addressed to you:\n");
            for handover in handovers {
                prompt.push_str(&format!("- {}: {}\n", handover.summary, handover.data));
            }
        }

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(persona), ChatMessage::user(prompt)],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{DispatchBee, DispatchPlan};
    use crate::provider::{ProviderError, RetryPolicy, ScriptedProvider};
    use crate::store::MemoryStore;
    use crate::types::{RunStatus, SignalKind, SwarmSession};
    use serde_json::json;

    // === Output Parsing Tests ===

    #[test]
    fn test_parse_strict_json() {
        let raw = r#"{"summary": "found 3 overdue tasks", "result": {"count": 3}}"#;
        let output = BeeOutput::parse(raw);

        match &output {
            BeeOutput::Parsed(parsed) => {
                assert_eq!(parsed.summary, "found 3 overdue tasks");
                assert_eq!(parsed.result, json!({"count": 3}));
                assert!(parsed.handover_data.is_none());
                assert!(parsed.signals.is_empty());
            }
            BeeOutput::Degraded { .. } => panic!("expected parsed output"),
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Here you go:\n```json\n{\"summary\": \"ok\", \"result\": 1}\n```\nanything else?";
        let output = BeeOutput::parse(raw);
        assert_eq!(output.summary(), "ok");
        assert_eq!(output.result_value(), json!(1));
    }

    #[test]
    fn test_parse_generic_fence() {
        let raw = "```\n{\"summary\": \"ok\", \"result\": 2}\n```";
        let output = BeeOutput::parse(raw);
        assert_eq!(output.result_value(), json!(2));
    }

    #[test]
    fn test_malformed_output_degrades() {
        let raw = "I could not produce JSON, sorry about that.";
        let output = BeeOutput::parse(raw);

        match &output {
            BeeOutput::Degraded { raw: kept } => assert_eq!(kept, raw),
            BeeOutput::Parsed(_) => panic!("expected degraded output"),
        }
        assert_eq!(output.summary(), raw);
        assert!(output.handover_data().is_none());
        assert!(output.signals().is_empty());
    }

    #[test]
    fn test_degraded_summary_is_truncated() {
        let raw = "x".repeat(500);
        let output = BeeOutput::parse(&raw);
        let summary = output.summary();
        assert!(summary.len() < raw.len());
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_parse_with_handover_and_signals() {
        let raw = r#"{
            "summary": "drafted the plan",
            "result": {"plan": "ship it"},
            "handover_data": {"next": "review"},
            "signals": [{"kind": "warning", "message": "deadline is tight"}]
        }"#;
        let output = BeeOutput::parse(raw);
        assert_eq!(output.handover_data(), Some(&json!({"next": "review"})));
        assert_eq!(output.signals().len(), 1);
        assert_eq!(output.signals()[0].kind, SignalKind::Warning);
    }

    // === Runner Tests ===

    async fn runner_fixture(
        provider: Arc<ScriptedProvider>,
    ) -> (Arc<MemoryStore>, BeeRunner, BeeRun, SwarmSession) {
        let store = Arc::new(MemoryStore::new());
        let plan = DispatchPlan::new(vec![DispatchBee::new("scout-1", "scout", "research", 0)]);
        let session = SwarmSession::new(plan);
        store.create_session(session.clone()).await.unwrap();

        let run = BeeRun::new(session.id, &session.plan.bees[0]);
        store.create_run(run.clone()).await.unwrap();

        let providers = Arc::new(
            ProviderRegistry::new()
                .with_retry(RetryPolicy::none())
                .register("scripted", provider),
        );
        let runner = BeeRunner::new(store.clone(), providers, SwarmConfig::default());
        (store, runner, run, session)
    }

    #[tokio::test]
    async fn test_run_completes_and_writes_context() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_response(
            r#"{"summary": "done", "result": {"found": 2}, "handover_data": {"ids": [1, 2]}}"#,
            42,
        );
        let (store, runner, run, session) = runner_fixture(provider).await;

        let finished = runner.run(run, "find overdue tasks").await.unwrap();
        assert_eq!(finished.status, RunStatus::Completed);
        assert_eq!(finished.tokens_used, 42);

        let snapshot = store.context_snapshot(session.id).await.unwrap();
        assert_eq!(snapshot["scout:research:scout-1:result"], json!({"found": 2}));
        assert_eq!(
            snapshot["scout:research:scout-1:handover"],
            json!({"ids": [1, 2]})
        );

        // the stored record reached the same terminal state
        let stored = store.runs(session.id).await.unwrap();
        assert_eq!(stored[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_emits_signals_from_output() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_response(
            r#"{"summary": "needs review", "result": null,
                "signals": [{"kind": "hold", "message": "waiting on approval"}]}"#,
            1,
        );
        let (store, runner, run, session) = runner_fixture(provider).await;

        runner.run(run, "archive the old project").await.unwrap();

        let signals = store.signals(session.id).await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Hold);
        assert!(store.has_unresolved_hold(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_provider_failure_marks_run_failed() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(ProviderError::Authentication("bad key".to_string()));
        let (store, runner, run, session) = runner_fixture(provider).await;

        let finished = runner.run(run, "anything").await.unwrap();
        assert_eq!(finished.status, RunStatus::Failed);
        assert!(finished.error.unwrap().contains("bad key"));

        // nothing was written to the context store
        assert!(store.context_entries(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_output_still_completes() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_response("plain prose, no JSON anywhere", 5);
        let (store, runner, run, session) = runner_fixture(provider).await;

        let finished = runner.run(run, "anything").await.unwrap();
        assert_eq!(finished.status, RunStatus::Completed);

        let snapshot = store.context_snapshot(session.id).await.unwrap();
        assert_eq!(
            snapshot["scout:research:scout-1:result"],
            json!("plain prose, no JSON anywhere")
        );
    }

    #[tokio::test]
    async fn test_handovers_reach_the_prompt() {
        // seed a handover addressed to the run, then check the request text
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_response(r#"{"summary": "ok", "result": null}"#, 1);
        let (store, runner, run, session) = runner_fixture(provider).await;

        store
            .append_handover(Handover::new(
                session.id,
                crate::types::BeeRunId::new(),
                run.id,
                "phase zero findings",
                json!({"count": 7}),
            ))
            .await
            .unwrap();

        let snapshot = store.context_snapshot(session.id).await.unwrap();
        let handovers = store.handovers_for(session.id, run.id).await.unwrap();
        let request = runner.build_request(&run, "summarize", &snapshot, &handovers);
        let user_prompt = &request.messages[1].content;
        assert!(user_prompt.contains("phase zero findings"));
        assert!(user_prompt.contains("\"count\":7"));
    }
}
