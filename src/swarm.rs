//! Swarm orchestrator - drives a dispatch plan through ordered phases

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::bee::BeeRunner;
use crate::error::HiveError;
use crate::events::{EventSink, SwarmEvent};
use crate::plan::DispatchPlan;
use crate::provider::ProviderRegistry;
use crate::store::SwarmStore;
use crate::synthesis::{self, Contribution};
use crate::types::{
    BeeRun, Formality, Handover, RunStatus, SessionStatus, SwarmConfig, SwarmSession,
    SwarmSessionId, Verbosity,
};

/// Bee type whose output is already user-facing and therefore excluded
/// from the synthesis input set
const ASSISTANT_BEE_TYPE: &str = "assistant";

/// Input to one swarm run; the plan comes from an external planner
#[derive(Debug, Clone)]
pub struct SwarmInput {
    pub trigger_message: String,
    pub plan: DispatchPlan,
    pub verbosity: Verbosity,
    pub formality: Formality,
}

impl SwarmInput {
    pub fn new(trigger_message: impl Into<String>, plan: DispatchPlan) -> Self {
        Self {
            trigger_message: trigger_message.into(),
            plan,
            verbosity: Verbosity::default(),
            formality: Formality::default(),
        }
    }
}

/// Final outcome of a swarm run
#[derive(Debug, Clone)]
pub struct SwarmResult {
    pub session_id: SwarmSessionId,
    pub response: String,
    pub total_tokens: u64,
    pub total_duration_ms: u64,
    /// `Completed`, or `Paused` when an unresolved hold stopped the run
    pub status: SessionStatus,
}

/// The main swarm orchestrator.
///
/// Owns one coordinating flow per run: phases execute strictly in order,
/// the bees within a phase concurrently. Hold signals are checked only at
/// phase boundaries, so a phase already in flight always settles even if a
/// hold is raised mid-phase; the pause path then returns a partial,
/// human-readable result.
pub struct SwarmOrchestrator {
    store: Arc<dyn SwarmStore>,
    providers: Arc<ProviderRegistry>,
    config: SwarmConfig,
    events: EventSink,
}

impl SwarmOrchestrator {
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

    /// Execute a dispatch plan to a terminal session state.
    ///
    /// Per-run failures are contained inside the phase; only an error
    /// outside that containment (the store becoming unavailable, the
    /// synthesis call failing) fails the whole session.
    #[instrument(skip(self, input))]
    pub async fn run_swarm(&self, input: SwarmInput) -> Result<SwarmResult, HiveError> {
        if input.plan.is_empty() {
            return Err(HiveError::EmptyPlan);
        }

        let session = SwarmSession::new(input.plan.clone());
        let session_id = session.id;
        self.store.create_session(session).await?;
        info!(session_id = %session_id, bees = input.plan.len(), "Swarm session created");

        match self.drive(session_id, &input).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Swarm session failed");
                let _ = self
                    .store
                    .update_session(session_id, SessionStatus::Failed, Some(e.to_string()))
                    .await;
                self.events.emit(SwarmEvent::SessionFailed {
                    session_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session_id: SwarmSessionId,
        input: &SwarmInput,
    ) -> Result<SwarmResult, HiveError> {
        let started = Instant::now();

        // one queued run per dispatched bee, grouped into ascending phases
        let mut phases: Vec<(u32, Vec<BeeRun>)> = Vec::new();
        for (order, bees) in input.plan.phases() {
            let mut runs = Vec::new();
            for bee in bees {
                let run = BeeRun::new(session_id, bee);
                self.store.create_run(run.clone()).await?;
                runs.push(run);
            }
            phases.push((order, runs));
        }

        self.store
            .update_session(session_id, SessionStatus::Running, None)
            .await?;
        self.events.emit(SwarmEvent::SessionStarted { session_id });

        let runner = Arc::new(
            BeeRunner::new(
                self.store.clone(),
                self.providers.clone(),
                self.config.clone(),
            )
            .with_events(self.events.clone()),
        );

        let mut settled: Vec<BeeRun> = Vec::new();
        let mut previous_phase: Vec<BeeRun> = Vec::new();

        for (order, runs) in phases {
            if self.store.has_unresolved_hold(session_id).await? {
                return self.pause(session_id, order, &settled, input, started).await;
            }

            // fan handover data out from the previous phase's producers to
            // every bee of this phase, before any of them starts
            for from in &previous_phase {
                let Some(output) = &from.output else { continue };
                let Some(data) = output.handover_data() else { continue };
                for to in &runs {
                    self.store
                        .append_handover(Handover::new(
                            session_id,
                            from.id,
                            to.id,
                            output.summary(),
                            data.clone(),
                        ))
                        .await?;
                }
            }

            debug!(order, bees = runs.len(), "Executing phase");
            self.events.emit(SwarmEvent::PhaseStarted {
                session_id,
                order,
                bees: runs.len(),
            });

            let mut join_set = JoinSet::new();
            for run in runs {
                let runner = Arc::clone(&runner);
                let trigger = input.trigger_message.clone();
                join_set.spawn(async move { runner.run(run, &trigger).await });
            }

            let mut finished = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(Ok(run)) => finished.push(run),
                    // store failure: outside per-run containment
                    Ok(Err(e)) => return Err(e),
                    Err(join_error) => {
                        error!(error = %join_error, "Bee task did not settle cleanly");
                    }
                }
            }

            previous_phase = finished.clone();
            settled.extend(finished);
        }

        let mut total_tokens: u64 = settled.iter().map(|r| r.tokens_used).sum();

        // synthesis reads the snapshot once; in-flight sibling writes were
        // never visible before this point
        let snapshot = self.store.context_snapshot(session_id).await?;
        debug!(keys = snapshot.len(), "Context snapshot at synthesis");

        let contributions: Vec<Contribution> = settled
            .iter()
            .filter(|run| run.bee_type != ASSISTANT_BEE_TYPE)
            .filter(|run| run.status == RunStatus::Completed)
            .filter_map(|run| {
                run.output.as_ref().map(|output| Contribution {
                    bee: format!("{} {}", run.subtype, run.bee_type),
                    summary: output.summary(),
                    result: output.result_value(),
                })
            })
            .collect();

        let outcome = synthesis::synthesize(
            &self.providers,
            &self.config,
            &input.trigger_message,
            &contributions,
            input.verbosity,
            input.formality,
        )
        .await?;
        total_tokens += outcome.tokens_used;

        self.store
            .update_session(session_id, SessionStatus::Completed, Some(outcome.response.clone()))
            .await?;
        self.events.emit(SwarmEvent::SessionCompleted { session_id });
        info!(session_id = %session_id, total_tokens, "Swarm session completed");

        Ok(SwarmResult {
            session_id,
            response: outcome.response,
            total_tokens,
            total_duration_ms: started.elapsed().as_millis() as u64,
            status: SessionStatus::Completed,
        })
    }

    async fn pause(
        &self,
        session_id: SwarmSessionId,
        pending_order: u32,
        settled: &[BeeRun],
        input: &SwarmInput,
        started: Instant,
    ) -> Result<SwarmResult, HiveError> {
        let completed = settled
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .count();
        let message = format!(
            "Swarm paused before phase {pending_order}: a hold signal is awaiting \
             resolution. {completed} of {} bees completed so far.",
            input.plan.len()
        );

        self.store
            .update_session(session_id, SessionStatus::Paused, Some(message.clone()))
            .await?;
        self.events.emit(SwarmEvent::SessionPaused {
            session_id,
            pending_order,
        });
        info!(session_id = %session_id, pending_order, "Swarm paused on unresolved hold");

        Ok(SwarmResult {
            session_id,
            response: message,
            total_tokens: settled.iter().map(|r| r.tokens_used).sum(),
            total_duration_ms: started.elapsed().as_millis() as u64,
            status: SessionStatus::Paused,
        })
    }
}
