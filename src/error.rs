//! Hive error types

use thiserror::Error;

use crate::provider::ProviderError;
use crate::types::{ActionId, BeeRunId, SignalId, SwarmSessionId};

/// Errors that can occur in the hive system
#[derive(Debug, Error)]
pub enum HiveError {
    /// Swarm session not found
    #[error("Swarm session not found: {0}")]
    SessionNotFound(SwarmSessionId),

    /// Bee run not found
    #[error("Bee run not found: {0}")]
    RunNotFound(BeeRunId),

    /// Signal not found
    #[error("Signal not found: {0}")]
    SignalNotFound(SignalId),

    /// Dispatch plan contains no bees
    #[error("Dispatch plan contains no bees")]
    EmptyPlan,

    /// Action already reached a terminal status
    #[error("Action already finalized: {0}")]
    ActionFinalized(ActionId),

    /// Provider error
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Store error
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
