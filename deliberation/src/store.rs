//! In-memory registry of concurrent sessions
//!
//! Each session lives behind its own mutex; the map lock is held only long
//! enough to look a handle up or insert one, so sessions never block each
//! other.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::error::{DeliberationError, Result};
use crate::events::{DeliberationEvent, SharedEventBus};
use crate::juror::{JurorId, Panel};
use crate::phase_gate::{Action, PhaseGate};
use crate::session::{Phase, SessionId, SessionState};

/// Exclusive handle on one session
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Shared reference to SessionStore
pub type SharedSessionStore = Arc<SessionStore>;

/// Registry of live sessions
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    events: Option<SharedEventBus>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish resets and phase changes to `bus`.
    pub fn with_events(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedSessionStore {
        Arc::new(self)
    }

    /// Open a new session in the prologue with a fresh id.
    pub async fn create(&self, panel: Panel) -> SessionId {
        let id = Uuid::new_v4().to_string();
        let jurors = panel.len();
        let state = SessionState::new(&id, panel);
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(state)));
        info!(session_id = %id, jurors, "Session created");
        id
    }

    pub async fn get(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DeliberationError::SessionNotFound(id.to_string()))
    }

    /// Drop a session. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "Session removed");
        }
        removed
    }

    /// Ids of every live session, sorted.
    pub async fn list_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// External reset: back to the prologue with initial convictions.
    pub async fn reset(&self, id: &str) -> Result<()> {
        let handle = self.get(id).await?;
        handle.lock().await.reset("external reset");
        info!(session_id = %id, "Session reset");
        self.publish(DeliberationEvent::SessionReset {
            session_id: id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Move the session one phase forward.
    pub async fn advance(&self, id: &str, reason: &str) -> Result<Phase> {
        let handle = self.get(id).await?;
        let mut session = handle.lock().await;
        let from = session.phase();
        let to = session.advance(reason)?;
        self.publish(DeliberationEvent::PhaseChanged {
            session_id: id.to_string(),
            from,
            to,
            timestamp: Utc::now(),
        });
        Ok(to)
    }

    /// Mark evidence as presented. Returns how many ids were new.
    pub async fn unlock_resources(&self, id: &str, resources: &[&str]) -> Result<usize> {
        let handle = self.get(id).await?;
        let mut session = handle.lock().await;
        PhaseGate::authorize(&session, Action::PresentEvidence)?;
        let added = session.unlock_resources(resources.iter().copied());
        info!(
            session_id = %id,
            added,
            total = session.unlocked_resources().len(),
            "Resources unlocked"
        );
        Ok(added)
    }

    /// Count a one-on-one exchange with a juror. Returns the new count.
    pub async fn record_chat(&self, id: &str, juror_id: &str) -> Result<u32> {
        let handle = self.get(id).await?;
        let mut session = handle.lock().await;
        PhaseGate::authorize(&session, Action::Chat)?;
        if !session.panel().contains(juror_id) {
            return Err(DeliberationError::JurorNotFound(juror_id.to_string()));
        }
        Ok(session.increment_actor_round(juror_id))
    }

    /// Final convictions, readable only in the verdict phase.
    pub async fn collect_convictions(&self, id: &str) -> Result<BTreeMap<JurorId, u8>> {
        let handle = self.get(id).await?;
        let session = handle.lock().await;
        PhaseGate::authorize(&session, Action::CollectVotes)?;
        Ok(session.panel().snapshot())
    }

    fn publish(&self, event: DeliberationEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::juror::JurorRecord;

    fn panel() -> Panel {
        Panel::new(vec![JurorRecord::new("a", 20), JurorRecord::new("b", 80)])
    }

    async fn advance_to(store: &SessionStore, id: &str, phase: Phase) {
        while store.get(id).await.unwrap().lock().await.phase() != phase {
            store.advance(id, "walk").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = SessionStore::new();
        let id = store.create(panel()).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.list_ids().await, vec![id.clone()]);

        let handle = store.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.phase(), Phase::Prologue);

        assert!(store.remove(&id).await);
        assert!(!store.remove(&id).await);
        let err = store.get(&id).await.err().unwrap();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let store = SessionStore::new();
        let a = store.create(panel()).await;
        let b = store.create(panel()).await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_unlock_is_gated_and_monotonic() {
        let store = SessionStore::new();
        let id = store.create(panel()).await;
        assert!(store.unlock_resources(&id, &["log-1"]).await.is_err());

        advance_to(&store, &id, Phase::Investigation).await;
        assert_eq!(store.unlock_resources(&id, &["log-1", "log-2"]).await.unwrap(), 2);
        assert_eq!(store.unlock_resources(&id, &["log-2"]).await.unwrap(), 0);

        let handle = store.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.unlocked_resources().len(), 2);
    }

    #[tokio::test]
    async fn test_record_chat() {
        let store = SessionStore::new();
        let id = store.create(panel()).await;
        advance_to(&store, &id, Phase::Persuasion).await;

        assert_eq!(store.record_chat(&id, "a").await.unwrap(), 1);
        assert_eq!(store.record_chat(&id, "a").await.unwrap(), 2);
        let err = store.record_chat(&id, "zed").await.unwrap_err();
        assert_eq!(err.code(), "JUROR_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_collect_only_in_verdict() {
        let store = SessionStore::new();
        let id = store.create(panel()).await;
        assert!(store.collect_convictions(&id).await.is_err());

        advance_to(&store, &id, Phase::Verdict).await;
        let votes = store.collect_convictions(&id).await.unwrap();
        assert_eq!(votes["a"], 20);
        assert_eq!(votes["b"], 80);
    }

    #[tokio::test]
    async fn test_reset_publishes_and_restores() {
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();
        let store = SessionStore::new().with_events(bus);
        let id = store.create(panel()).await;

        store.advance(&id, "start").await.unwrap();
        store.reset(&id).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "phase_changed");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type(), "session_reset");
        assert_eq!(second.session_id(), id);

        let handle = store.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.phase(), Phase::Prologue);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = Arc::new(SessionStore::new());
        let a = store.create(panel()).await;
        let b = store.create(panel()).await;

        advance_to(&store, &a, Phase::Persuasion).await;
        store.record_chat(&a, "a").await.unwrap();

        let hb = store.get(&b).await.unwrap();
        let sb = hb.lock().await;
        assert_eq!(sb.phase(), Phase::Prologue);
        assert_eq!(sb.actor_rounds("a"), 0);
    }
}
