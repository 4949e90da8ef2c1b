//! Core protocol types - identifiers, tiers, statuses, and governed records

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::HiveError;
use crate::executor::ExecutionReport;
use crate::plan::DispatchPlan;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifier for a governed action
    ActionId
);
id_type!(
    /// Identifier for an orchestrated swarm session
    SwarmSessionId
);
id_type!(
    /// Identifier for one bee's execution within a session
    BeeRunId
);
id_type!(
    /// Identifier for a signal raised during a run
    SignalId
);

/// Autonomy tier granted to an action.
///
/// Variants are ordered by increasing human oversight, so `Ord` compares
/// conservatism: `SuggestOnly` is the most conservative tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Execute immediately, no notification
    AutoExecute,
    /// Execute immediately, then notify
    ExecuteNotify,
    /// Draft the action and wait for human approval
    DraftApprove,
    /// Only suggest; never executes on its own
    SuggestOnly,
}

impl Tier {
    /// Escalate to the approval gate, never lowering oversight
    pub fn escalated(self) -> Tier {
        self.max(Tier::DraftApprove)
    }
}

/// Per-user default autonomy posture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyMode {
    Autopilot,
    Copilot,
    Manual,
}

impl Default for AutonomyMode {
    fn default() -> Self {
        AutonomyMode::Copilot
    }
}

/// A known operation the assistant can be asked to perform.
///
/// Unrecognized names deserialize into [`ActionType::Other`] so an unknown
/// capability is representable without erroring; the registry treats it as
/// unregistered and governance falls back to the most conservative tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    CreateTask,
    AssignTask,
    CompleteTask,
    UpdateTaskStatus,
    CreateProject,
    ArchiveProject,
    SendMessage,
    ScheduleMeeting,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::CreateTask => "create_task",
            ActionType::AssignTask => "assign_task",
            ActionType::CompleteTask => "complete_task",
            ActionType::UpdateTaskStatus => "update_task_status",
            ActionType::CreateProject => "create_project",
            ActionType::ArchiveProject => "archive_project",
            ActionType::SendMessage => "send_message",
            ActionType::ScheduleMeeting => "schedule_meeting",
            ActionType::Other(name) => name,
        }
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "create_task" => ActionType::CreateTask,
            "assign_task" => ActionType::AssignTask,
            "complete_task" => ActionType::CompleteTask,
            "update_task_status" => ActionType::UpdateTaskStatus,
            "create_project" => ActionType::CreateProject,
            "archive_project" => ActionType::ArchiveProject,
            "send_message" => ActionType::SendMessage,
            "schedule_meeting" => ActionType::ScheduleMeeting,
            _ => ActionType::Other(name),
        }
    }
}

impl From<ActionType> for String {
    fn from(ty: ActionType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a governed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
    Expired,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Executed
                | ActionStatus::Failed
                | ActionStatus::Rejected
                | ActionStatus::Expired
        )
    }
}

/// A single governed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub action_type: ActionType,
    pub tier: Tier,
    pub status: ActionStatus,
    pub planned_payload: Value,
    pub user_edited_payload: Option<Value>,
    pub execution_result: Option<Value>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Action {
    pub fn new(action_type: ActionType, tier: Tier, planned_payload: Value) -> Self {
        Self {
            id: ActionId::new(),
            action_type,
            tier,
            status: ActionStatus::Pending,
            planned_payload,
            user_edited_payload: None,
            execution_result: None,
            rejection_reason: None,
            created_at: Utc::now(),
            approved_at: None,
            executed_at: None,
            expires_at: None,
        }
    }

    /// The arguments execution must read: the user's edit when present,
    /// otherwise the planned payload
    pub fn effective_payload(&self) -> &Value {
        self.user_edited_payload.as_ref().unwrap_or(&self.planned_payload)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_open(&self) -> Result<(), HiveError> {
        if self.is_terminal() {
            return Err(HiveError::ActionFinalized(self.id));
        }
        Ok(())
    }

    /// Record a human approval decision
    pub fn approve(&mut self) -> Result<(), HiveError> {
        self.ensure_open()?;
        self.status = ActionStatus::Approved;
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// Record a human rejection; terminal
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), HiveError> {
        self.ensure_open()?;
        self.status = ActionStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    /// Expire an action that never received a decision; terminal
    pub fn expire(&mut self) -> Result<(), HiveError> {
        self.ensure_open()?;
        self.status = ActionStatus::Expired;
        Ok(())
    }

    /// Record the outcome of dispatching this action; terminal either way
    pub fn apply_execution(&mut self, report: &ExecutionReport) -> Result<(), HiveError> {
        self.ensure_open()?;
        self.status = if report.success {
            ActionStatus::Executed
        } else {
            ActionStatus::Failed
        };
        self.execution_result = match (&report.result, &report.error) {
            (Some(result), _) => Some(result.clone()),
            (None, Some(error)) => Some(Value::String(error.clone())),
            (None, None) => None,
        };
        self.executed_at = Some(Utc::now());
        Ok(())
    }
}

/// Per-user governance preferences consumed by the tier resolver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutonomyProfile {
    pub mode: AutonomyMode,
    #[serde(default)]
    pub overrides: HashMap<ActionType, Tier>,
}

impl AutonomyProfile {
    pub fn new(mode: AutonomyMode) -> Self {
        Self {
            mode,
            overrides: HashMap::new(),
        }
    }

    /// Pin an explicit tier for one action type
    pub fn override_tier(mut self, action_type: ActionType, tier: Tier) -> Self {
        self.overrides.insert(action_type, tier);
        self
    }
}

/// Who asked for an action and who its side effect lands on
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionContext {
    pub initiator: String,
    pub target: Option<String>,
}

impl ActionContext {
    pub fn new(initiator: impl Into<String>) -> Self {
        Self {
            initiator: initiator.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// True when the side effect lands on someone other than the requester
    pub fn targets_other_user(&self) -> bool {
        self.target
            .as_deref()
            .is_some_and(|target| target != self.initiator)
    }
}

/// Lifecycle status of a swarm session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planning,
    Running,
    Paused,
    Completed,
    Failed,
}

/// One orchestrated swarm run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSession {
    pub id: SwarmSessionId,
    pub status: SessionStatus,
    pub plan: DispatchPlan,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SwarmSession {
    pub fn new(plan: DispatchPlan) -> Self {
        Self {
            id: SwarmSessionId::new(),
            status: SessionStatus::Planning,
            plan,
            result: None,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle status of one bee's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Structured output of one bee, as parsed from the model response.
///
/// `Parsed` carries the schema-validated fields; `Degraded` preserves the
/// raw text when the model produced something unparseable. Malformed model
/// output is never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BeeOutput {
    Parsed(ParsedOutput),
    Degraded { raw: String },
}

/// Schema the bees are instructed to answer with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedOutput {
    pub summary: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub handover_data: Option<Value>,
    #[serde(default)]
    pub signals: Vec<SignalDraft>,
}

/// A signal requested inside a bee's structured output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDraft {
    pub kind: SignalKind,
    pub message: String,
}

/// One bee's execution within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeeRun {
    pub id: BeeRunId,
    pub session_id: SwarmSessionId,
    pub bee_instance_id: String,
    pub bee_type: String,
    pub subtype: String,
    pub order: u32,
    pub status: RunStatus,
    pub output: Option<BeeOutput>,
    pub error: Option<String>,
    pub tokens_used: u64,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl BeeRun {
    pub fn new(session_id: SwarmSessionId, bee: &crate::plan::DispatchBee) -> Self {
        Self {
            id: BeeRunId::new(),
            session_id,
            bee_instance_id: bee.bee_instance_id.clone(),
            bee_type: bee.bee_type.clone(),
            subtype: bee.subtype.clone(),
            order: bee.order,
            status: RunStatus::Queued,
            output: None,
            error: None,
            tokens_used: 0,
            duration_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self) {
        self.status = RunStatus::Running;
    }

    pub fn complete(&mut self, output: BeeOutput, tokens_used: u64, duration_ms: u64) {
        self.status = RunStatus::Completed;
        self.output = Some(output);
        self.tokens_used = tokens_used;
        self.duration_ms = duration_ms;
    }

    pub fn fail(&mut self, error: impl Into<String>, duration_ms: u64) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = duration_ms;
    }
}

/// What kind of fact a context entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Result,
    Handover,
    Fact,
}

/// Append-only fact written by a bee, scoped to its session.
///
/// Keys are namespaced by bee identity; later entries with the same key do
/// not overwrite earlier ones - all are retained, latest wins at snapshot
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub session_id: SwarmSessionId,
    pub bee_run_id: BeeRunId,
    pub key: String,
    pub value: Value,
    pub kind: ContextKind,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

impl ContextEntry {
    pub fn new(
        session_id: SwarmSessionId,
        bee_run_id: BeeRunId,
        key: impl Into<String>,
        value: Value,
        kind: ContextKind,
        is_visible: bool,
    ) -> Self {
        Self {
            session_id,
            bee_run_id,
            key: key.into(),
            value,
            kind,
            is_visible,
            created_at: Utc::now(),
        }
    }
}

/// Structured message passed from a finishing run to a specific run in the
/// next phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handover {
    pub session_id: SwarmSessionId,
    pub from_bee_run_id: BeeRunId,
    pub to_bee_run_id: BeeRunId,
    pub handover_type: String,
    pub summary: String,
    pub data: Value,
    pub constraints: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Handover {
    pub fn new(
        session_id: SwarmSessionId,
        from_bee_run_id: BeeRunId,
        to_bee_run_id: BeeRunId,
        summary: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            session_id,
            from_bee_run_id,
            to_bee_run_id,
            handover_type: "phase_result".to_string(),
            summary: summary.into(),
            data,
            constraints: None,
            created_at: Utc::now(),
        }
    }
}

/// Typed out-of-band event a bee can raise mid-run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Info,
    Warning,
    Hold,
    Escalate,
}

/// An event raised by a run; only unresolved `Hold` signals gate phase
/// progression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub session_id: SwarmSessionId,
    pub from_bee_run_id: BeeRunId,
    pub target_bee_run_id: Option<BeeRunId>,
    pub kind: SignalKind,
    pub message: String,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        session_id: SwarmSessionId,
        from_bee_run_id: BeeRunId,
        kind: SignalKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: SignalId::new(),
            session_id,
            from_bee_run_id,
            target_bee_run_id: None,
            kind,
            message: message.into(),
            is_resolved: false,
            created_at: Utc::now(),
        }
    }

    /// Whether this signal blocks phase progression until resolved
    pub fn is_blocking(&self) -> bool {
        self.kind == SignalKind::Hold && !self.is_resolved
    }
}

/// Token accounting for one model call or one run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Requested length of the synthesized narrative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Brief,
    #[default]
    Normal,
    Detailed,
}

impl Verbosity {
    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Brief => "brief",
            Verbosity::Normal => "normal",
            Verbosity::Detailed => "detailed",
        }
    }
}

/// Requested register of the synthesized narrative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formality {
    Casual,
    #[default]
    Neutral,
    Formal,
}

impl Formality {
    pub fn as_str(self) -> &'static str {
        match self {
            Formality::Casual => "casual",
            Formality::Neutral => "neutral",
            Formality::Formal => "formal",
        }
    }
}

/// Tunables shared by the bee runner and the orchestrator
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Model passed to the chat provider
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-latest".to_string(),
            temperature: Some(0.2),
            max_tokens: Some(1024),
        }
    }
}
