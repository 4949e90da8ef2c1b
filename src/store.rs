//! Session-scoped stores - the persistence contract and its in-memory form
//!
//! Everything under a session is append-only: the only mutations allowed
//! after creation are the session/run state-machine updates and resolving
//! a signal. Writes are keyed by the writing run's identity, so concurrent
//! bees never touch the same logical key.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::HiveError;
use crate::types::{
    BeeRun, BeeRunId, ContextEntry, Handover, SessionStatus, Signal, SignalId, SwarmSession,
    SwarmSessionId,
};

/// Persistence contract the orchestration core runs against.
///
/// An external storage engine implements the same operations; the core
/// depends only on this trait.
#[async_trait]
pub trait SwarmStore: Send + Sync {
    async fn create_session(&self, session: SwarmSession) -> Result<(), HiveError>;
    async fn get_session(&self, id: SwarmSessionId) -> Result<SwarmSession, HiveError>;
    async fn update_session(
        &self,
        id: SwarmSessionId,
        status: SessionStatus,
        result: Option<String>,
    ) -> Result<(), HiveError>;

    async fn create_run(&self, run: BeeRun) -> Result<(), HiveError>;
    /// Overwrite a run record; refused once the stored run is terminal
    async fn update_run(&self, run: &BeeRun) -> Result<(), HiveError>;
    async fn runs(&self, session_id: SwarmSessionId) -> Result<Vec<BeeRun>, HiveError>;

    async fn append_context(&self, entry: ContextEntry) -> Result<(), HiveError>;
    async fn context_entries(
        &self,
        session_id: SwarmSessionId,
    ) -> Result<Vec<ContextEntry>, HiveError>;
    /// Latest visible value per key, in append order
    async fn context_snapshot(
        &self,
        session_id: SwarmSessionId,
    ) -> Result<HashMap<String, Value>, HiveError>;

    async fn append_handover(&self, handover: Handover) -> Result<(), HiveError>;
    /// Handovers addressed to one run
    async fn handovers_for(
        &self,
        session_id: SwarmSessionId,
        run_id: BeeRunId,
    ) -> Result<Vec<Handover>, HiveError>;

    async fn raise_signal(&self, signal: Signal) -> Result<(), HiveError>;
    async fn signals(&self, session_id: SwarmSessionId) -> Result<Vec<Signal>, HiveError>;
    /// The one permitted signal mutation: `is_resolved` false -> true
    async fn resolve_signal(
        &self,
        session_id: SwarmSessionId,
        signal_id: SignalId,
    ) -> Result<(), HiveError>;
    async fn has_unresolved_hold(&self, session_id: SwarmSessionId) -> Result<bool, HiveError>;
}

/// Everything a session owns, dropped together with it
struct SessionBucket {
    session: SwarmSession,
    runs: Vec<BeeRun>,
    context: Vec<ContextEntry>,
    handovers: Vec<Handover>,
    signals: Vec<Signal>,
}

impl SessionBucket {
    fn new(session: SwarmSession) -> Self {
        Self {
            session,
            runs: Vec::new(),
            context: Vec::new(),
            handovers: Vec::new(),
            signals: Vec::new(),
        }
    }
}

/// In-memory [`SwarmStore`] - the abstraction the core orchestration runs
/// against, and the fixture every test uses
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SwarmSessionId, SessionBucket>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(
        &self,
        id: SwarmSessionId,
        f: impl FnOnce(&SessionBucket) -> T,
    ) -> Result<T, HiveError> {
        let sessions = self.sessions.read();
        let bucket = sessions.get(&id).ok_or(HiveError::SessionNotFound(id))?;
        Ok(f(bucket))
    }

    fn write<T>(
        &self,
        id: SwarmSessionId,
        f: impl FnOnce(&mut SessionBucket) -> Result<T, HiveError>,
    ) -> Result<T, HiveError> {
        let mut sessions = self.sessions.write();
        let bucket = sessions.get_mut(&id).ok_or(HiveError::SessionNotFound(id))?;
        f(bucket)
    }
}

#[async_trait]
impl SwarmStore for MemoryStore {
    async fn create_session(&self, session: SwarmSession) -> Result<(), HiveError> {
        debug!(session_id = %session.id, "Creating session record");
        self.sessions
            .write()
            .insert(session.id, SessionBucket::new(session));
        Ok(())
    }

    async fn get_session(&self, id: SwarmSessionId) -> Result<SwarmSession, HiveError> {
        self.read(id, |bucket| bucket.session.clone())
    }

    async fn update_session(
        &self,
        id: SwarmSessionId,
        status: SessionStatus,
        result: Option<String>,
    ) -> Result<(), HiveError> {
        self.write(id, |bucket| {
            bucket.session.status = status;
            if result.is_some() {
                bucket.session.result = result;
            }
            Ok(())
        })
    }

    async fn create_run(&self, run: BeeRun) -> Result<(), HiveError> {
        self.write(run.session_id, |bucket| {
            bucket.runs.push(run);
            Ok(())
        })
    }

    async fn update_run(&self, run: &BeeRun) -> Result<(), HiveError> {
        self.write(run.session_id, |bucket| {
            let stored = bucket
                .runs
                .iter_mut()
                .find(|r| r.id == run.id)
                .ok_or(HiveError::RunNotFound(run.id))?;
            if stored.is_terminal() {
                return Err(HiveError::Store(format!(
                    "bee run {} already reached a terminal status",
                    run.id
                )));
            }
            *stored = run.clone();
            Ok(())
        })
    }

    async fn runs(&self, session_id: SwarmSessionId) -> Result<Vec<BeeRun>, HiveError> {
        self.read(session_id, |bucket| bucket.runs.clone())
    }

    async fn append_context(&self, entry: ContextEntry) -> Result<(), HiveError> {
        self.write(entry.session_id, |bucket| {
            bucket.context.push(entry);
            Ok(())
        })
    }

    async fn context_entries(
        &self,
        session_id: SwarmSessionId,
    ) -> Result<Vec<ContextEntry>, HiveError> {
        self.read(session_id, |bucket| bucket.context.clone())
    }

    async fn context_snapshot(
        &self,
        session_id: SwarmSessionId,
    ) -> Result<HashMap<String, Value>, HiveError> {
        self.read(session_id, |bucket| {
            let mut snapshot = HashMap::new();
            for entry in bucket.context.iter().filter(|e| e.is_visible) {
                snapshot.insert(entry.key.clone(), entry.value.clone());
            }
            snapshot
        })
    }

    async fn append_handover(&self, handover: Handover) -> Result<(), HiveError> {
        self.write(handover.session_id, |bucket| {
            bucket.handovers.push(handover);
            Ok(())
        })
    }

    async fn handovers_for(
        &self,
        session_id: SwarmSessionId,
        run_id: BeeRunId,
    ) -> Result<Vec<Handover>, HiveError> {
        self.read(session_id, |bucket| {
            bucket
                .handovers
                .iter()
                .filter(|h| h.to_bee_run_id == run_id)
                .cloned()
                .collect()
        })
    }

    async fn raise_signal(&self, signal: Signal) -> Result<(), HiveError> {
        self.write(signal.session_id, |bucket| {
            bucket.signals.push(signal);
            Ok(())
        })
    }

    async fn signals(&self, session_id: SwarmSessionId) -> Result<Vec<Signal>, HiveError> {
        self.read(session_id, |bucket| bucket.signals.clone())
    }

    async fn resolve_signal(
        &self,
        session_id: SwarmSessionId,
        signal_id: SignalId,
    ) -> Result<(), HiveError> {
        self.write(session_id, |bucket| {
            let signal = bucket
                .signals
                .iter_mut()
                .find(|s| s.id == signal_id)
                .ok_or(HiveError::SignalNotFound(signal_id))?;
            signal.is_resolved = true;
            Ok(())
        })
    }

    async fn has_unresolved_hold(&self, session_id: SwarmSessionId) -> Result<bool, HiveError> {
        self.read(session_id, |bucket| {
            bucket.signals.iter().any(|s| s.is_blocking())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{DispatchBee, DispatchPlan};
    use crate::types::{ContextKind, SignalKind};
    use serde_json::json;

    async fn seeded_store() -> (MemoryStore, SwarmSession) {
        let store = MemoryStore::new();
        let plan = DispatchPlan::new(vec![DispatchBee::new("a", "scout", "research", 0)]);
        let session = SwarmSession::new(plan);
        store.create_session(session.clone()).await.unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let store = MemoryStore::new();
        let missing = SwarmSessionId::new();
        assert!(matches!(
            store.get_session(missing).await,
            Err(HiveError::SessionNotFound(_))
        ));
        assert!(matches!(
            store.runs(missing).await,
            Err(HiveError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_status_and_result_updates() {
        let (store, session) = seeded_store().await;

        store
            .update_session(session.id, SessionStatus::Running, None)
            .await
            .unwrap();
        let loaded = store.get_session(session.id).await.unwrap();
        assert_eq!(loaded.status, SessionStatus::Running);
        assert!(loaded.result.is_none());

        store
            .update_session(session.id, SessionStatus::Completed, Some("done".to_string()))
            .await
            .unwrap();
        let loaded = store.get_session(session.id).await.unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_terminal_run_is_immutable() {
        let (store, session) = seeded_store().await;
        let mut run = BeeRun::new(session.id, &session.plan.bees[0]);
        store.create_run(run.clone()).await.unwrap();

        run.start();
        store.update_run(&run).await.unwrap();

        run.fail("provider exploded", 12);
        store.update_run(&run).await.unwrap();

        // any further write is refused
        run.start();
        assert!(matches!(
            store.update_run(&run).await,
            Err(HiveError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_latest_wins_and_visible_only() {
        let (store, session) = seeded_store().await;
        let run_id = BeeRunId::new();

        for (key, value, visible) in [
            ("scout:research:a:result", json!(1), true),
            ("scout:research:a:result", json!(2), true),
            ("scout:research:a:scratch", json!("hidden"), false),
        ] {
            store
                .append_context(ContextEntry::new(
                    session.id,
                    run_id,
                    key,
                    value,
                    ContextKind::Result,
                    visible,
                ))
                .await
                .unwrap();
        }

        // every entry is retained
        assert_eq!(store.context_entries(session.id).await.unwrap().len(), 3);

        let snapshot = store.context_snapshot(session.id).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["scout:research:a:result"], json!(2));
    }

    #[tokio::test]
    async fn test_handovers_are_filtered_by_target() {
        let (store, session) = seeded_store().await;
        let from = BeeRunId::new();
        let to_a = BeeRunId::new();
        let to_b = BeeRunId::new();

        store
            .append_handover(Handover::new(session.id, from, to_a, "findings", json!({"n": 1})))
            .await
            .unwrap();
        store
            .append_handover(Handover::new(session.id, from, to_b, "findings", json!({"n": 2})))
            .await
            .unwrap();

        let for_a = store.handovers_for(session.id, to_a).await.unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_hold_signal_gating_and_resolution() {
        let (store, session) = seeded_store().await;
        let run_id = BeeRunId::new();

        store
            .raise_signal(Signal::new(session.id, run_id, SignalKind::Info, "fyi"))
            .await
            .unwrap();
        assert!(!store.has_unresolved_hold(session.id).await.unwrap());

        let hold = Signal::new(session.id, run_id, SignalKind::Hold, "wait for legal");
        store.raise_signal(hold.clone()).await.unwrap();
        assert!(store.has_unresolved_hold(session.id).await.unwrap());

        store.resolve_signal(session.id, hold.id).await.unwrap();
        assert!(!store.has_unresolved_hold(session.id).await.unwrap());

        // resolving twice is a no-op, unknown ids are not
        store.resolve_signal(session.id, hold.id).await.unwrap();
        assert!(matches!(
            store.resolve_signal(session.id, SignalId::new()).await,
            Err(HiveError::SignalNotFound(_))
        ));
    }
}
