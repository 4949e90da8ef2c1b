//! Action registry and tier resolution

use tracing::debug;

use crate::types::{ActionContext, ActionType, AutonomyMode, AutonomyProfile, Tier};

/// Static configuration for one known action type
#[derive(Debug, Clone, Copy)]
pub struct ActionRegistryEntry {
    pub default_tier: Tier,
    pub handler_name: &'static str,
    /// External integration the handler depends on, if any. Carried for
    /// the owning product to consult; the executor does not gate on it.
    pub requires_integration: Option<&'static str>,
    /// Whether the handler creates a mutating side effect; drives the
    /// copilot escalation rule
    pub mutating: bool,
}

/// Static table mapping action types to their governance defaults.
///
/// The table is an exhaustive match over [`ActionType`], so adding a
/// variant without a registry row fails to compile. [`ActionType::Other`]
/// is the runtime escape hatch for dynamic capabilities and is always
/// unregistered.
pub struct ActionRegistry;

impl ActionRegistry {
    pub fn entry(action_type: &ActionType) -> Option<ActionRegistryEntry> {
        let entry = match action_type {
            ActionType::CreateTask => ActionRegistryEntry {
                default_tier: Tier::ExecuteNotify,
                handler_name: "create_task",
                requires_integration: None,
                mutating: true,
            },
            ActionType::AssignTask => ActionRegistryEntry {
                default_tier: Tier::ExecuteNotify,
                handler_name: "assign_task",
                requires_integration: None,
                mutating: true,
            },
            ActionType::CompleteTask => ActionRegistryEntry {
                default_tier: Tier::AutoExecute,
                handler_name: "complete_task",
                requires_integration: None,
                mutating: true,
            },
            ActionType::UpdateTaskStatus => ActionRegistryEntry {
                default_tier: Tier::AutoExecute,
                handler_name: "update_task_status",
                requires_integration: None,
                mutating: true,
            },
            ActionType::CreateProject => ActionRegistryEntry {
                default_tier: Tier::ExecuteNotify,
                handler_name: "create_project",
                requires_integration: None,
                mutating: true,
            },
            ActionType::ArchiveProject => ActionRegistryEntry {
                default_tier: Tier::DraftApprove,
                handler_name: "archive_project",
                requires_integration: None,
                mutating: true,
            },
            ActionType::SendMessage => ActionRegistryEntry {
                default_tier: Tier::DraftApprove,
                handler_name: "send_message",
                requires_integration: Some("chat"),
                mutating: false,
            },
            ActionType::ScheduleMeeting => ActionRegistryEntry {
                default_tier: Tier::DraftApprove,
                handler_name: "schedule_meeting",
                requires_integration: Some("calendar"),
                mutating: true,
            },
            ActionType::Other(_) => return None,
        };
        Some(entry)
    }

    /// Compute the effective tier for one action instance.
    ///
    /// Pure function of registry, profile, and context. Priority order:
    /// explicit per-type override, manual mode, registry default under
    /// autopilot, copilot escalation for mutating actions targeting
    /// someone other than the initiator. Unregistered types resolve to
    /// [`Tier::SuggestOnly`]; resolution never fails.
    pub fn resolve_tier(
        action_type: &ActionType,
        profile: &AutonomyProfile,
        context: &ActionContext,
    ) -> Tier {
        if let Some(tier) = profile.overrides.get(action_type) {
            debug!(action_type = %action_type, tier = ?tier, "Tier resolved from explicit override");
            return *tier;
        }

        if profile.mode == AutonomyMode::Manual {
            return Tier::DraftApprove;
        }

        let Some(entry) = Self::entry(action_type) else {
            debug!(action_type = %action_type, "Unregistered action type, resolving to suggest_only");
            return Tier::SuggestOnly;
        };

        if profile.mode == AutonomyMode::Autopilot {
            return entry.default_tier;
        }

        // copilot: hand assigning work on someone else's behalf to a human
        if entry.mutating && context.targets_other_user() {
            return entry.default_tier.escalated();
        }

        entry.default_tier
    }
}
