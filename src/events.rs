//! Outbound event stream for run observers

use tokio::sync::mpsc;

use crate::types::{BeeRunId, SignalKind, SwarmSessionId};

/// Progress events emitted while a swarm run executes
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    SessionStarted {
        session_id: SwarmSessionId,
    },
    PhaseStarted {
        session_id: SwarmSessionId,
        order: u32,
        bees: usize,
    },
    RunStarted {
        session_id: SwarmSessionId,
        run_id: BeeRunId,
    },
    RunCompleted {
        session_id: SwarmSessionId,
        run_id: BeeRunId,
        tokens_used: u64,
        duration_ms: u64,
    },
    RunFailed {
        session_id: SwarmSessionId,
        run_id: BeeRunId,
        error: String,
    },
    SignalRaised {
        session_id: SwarmSessionId,
        run_id: BeeRunId,
        kind: SignalKind,
    },
    SessionPaused {
        session_id: SwarmSessionId,
        pending_order: u32,
    },
    SessionCompleted {
        session_id: SwarmSessionId,
    },
    SessionFailed {
        session_id: SwarmSessionId,
        error: String,
    },
}

/// Best-effort sender for [`SwarmEvent`]s.
///
/// Nobody listening - or a receiver dropped mid-run - never affects
/// orchestration.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SwarmEvent>>,
}

impl EventSink {
    /// A sink that drops every event
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SwarmEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Create a sink plus the receiver an observer drains
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<SwarmEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx: Some(tx) }, rx)
}
