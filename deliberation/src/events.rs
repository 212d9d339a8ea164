//! Deliberation events and the broadcast bus that carries them.
//!
//! Presentation layers subscribe to follow a session live (round start,
//! each speech, notes, phase changes). Publishing never fails when nobody
//! is listening.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::juror::JurorId;
use crate::session::{Phase, Role, SessionId};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Everything observable about a running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliberationEvent {
    /// Speakers for a round were chosen
    RoundStarted {
        session_id: SessionId,
        round: u32,
        leader: JurorId,
        responders: Vec<JurorId>,
        timestamp: DateTime<Utc>,
    },

    /// A speaker's turn was committed
    TurnCompleted {
        session_id: SessionId,
        round: u32,
        speaker: JurorId,
        role: Role,
        text: String,
        deltas: BTreeMap<JurorId, i32>,
        timestamp: DateTime<Utc>,
    },

    /// A player note was accepted
    NoteReceived {
        session_id: SessionId,
        target: JurorId,
        remaining: u32,
        timestamp: DateTime<Utc>,
    },

    /// Session moved to a new phase
    PhaseChanged {
        session_id: SessionId,
        from: Phase,
        to: Phase,
        timestamp: DateTime<Utc>,
    },

    /// Session was reset to the prologue
    SessionReset {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

impl DeliberationEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoundStarted { .. } => "round_started",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::NoteReceived { .. } => "note_received",
            Self::PhaseChanged { .. } => "phase_changed",
            Self::SessionReset { .. } => "session_reset",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            Self::RoundStarted { session_id, .. }
            | Self::TurnCompleted { session_id, .. }
            | Self::NoteReceived { session_id, .. }
            | Self::PhaseChanged { session_id, .. }
            | Self::SessionReset { session_id, .. } => session_id,
        }
    }
}

/// Broadcast bus for deliberation events
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<DeliberationEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DeliberationEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DeliberationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
