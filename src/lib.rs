//! # Hive
//!
//! Swarm agent orchestration with tiered action governance - the
//! delegating hive.
//!
//! This crate implements the "Bees" - AI agents that cooperate in phased
//! swarms to answer complex requests, plus the governance layer that
//! decides how much autonomy any single action gets.
//!
//! ## Architecture
//!
//! ```text
//!                   ┌───────────────────────────────────────────────┐
//!  request + plan ─►│              SWARM ORCHESTRATOR               │
//!                   │  phase 0 ─► phase 1 ─► ... ─► synthesis       │
//!                   └──────┬──────────┬──────────────────┬──────────┘
//!                          ▼          ▼                  ▼
//!                      ┌───────┐  ┌───────┐         ┌─────────┐
//!                      │ Bee A │  │ Bee B │   ...   │  Bee N  │    (one phase
//!                      └───┬───┘  └───┬───┘         └────┬────┘     at a time,
//!                          │          │                  │          concurrent
//!                          ▼          ▼                  ▼          within it)
//!                   ┌───────────────────────────────────────────────┐
//!                   │   Context Store │ Handover Store │ Signal Bus │
//!                   └───────────────────────────────────────────────┘
//!
//!  single action ─► Tier Resolver ─► Action Executor ─► domain handler
//! ```
//!
//! ## Key Concepts
//!
//! - **Bee**: one specialized worker with its own persona and slice of
//!   the request
//! - **Phase**: bees sharing an `order` value, executed concurrently
//! - **Handover**: structured data passed from a finishing bee to a bee
//!   in the next phase
//! - **Signal**: out-of-band event a bee can raise; an unresolved `hold`
//!   pauses the run at the next phase boundary
//! - **Tier**: the autonomy level granted to an action, from
//!   `auto_execute` down to `suggest_only`

pub mod bee;
pub mod error;
pub mod events;
pub mod executor;
pub mod plan;
pub mod provider;
pub mod registry;
pub mod store;
pub mod swarm;
pub mod synthesis;
pub mod types;

pub use bee::BeeRunner;
pub use error::HiveError;
pub use events::{event_channel, EventSink, SwarmEvent};
pub use executor::{ActionExecutor, ActionHandler, ExecutionReport, FnHandler, HandlerRegistry};
pub use plan::{DispatchBee, DispatchPlan};
pub use provider::{
    AnthropicProvider, ChatMessage, ChatProvider, ChatRequest, ChatResponse, ChatRole,
    ProviderError, ProviderRegistry, RetryPolicy, ScriptedProvider,
};
pub use registry::{ActionRegistry, ActionRegistryEntry};
pub use store::{MemoryStore, SwarmStore};
pub use swarm::{SwarmInput, SwarmOrchestrator, SwarmResult};
pub use synthesis::{Contribution, SynthesisOutcome, NO_ACTIONABLE_RESULTS};

// Re-export commonly used protocol types
pub use types::{
    Action, ActionContext, ActionId, ActionStatus, ActionType, AutonomyMode, AutonomyProfile,
    BeeOutput, BeeRun, BeeRunId, ContextEntry, ContextKind, Formality, Handover, ParsedOutput,
    RunStatus, SessionStatus, Signal, SignalDraft, SignalId, SignalKind, SwarmConfig,
    SwarmSession, SwarmSessionId, Tier, TokenUsage, Verbosity,
};
