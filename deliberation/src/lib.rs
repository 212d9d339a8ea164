//! Jury Deliberation Engine
//!
//! This library provides:
//! - A conviction model for a panel of AI jurors (0 = not guilty, 100 = guilty)
//! - Turn scheduling, windowed deliberation briefs and the influence formula
//! - A phase-gated session state machine with player notes
//! - An orchestrator that drives rounds against a pluggable turn generator
//!
//! # Features
//!
//! ## Core engine
//! - `InfluenceModel`: topic, framing and distance-damped conviction shifts
//! - `TurnScheduler`: leader/responder selection with fairness and contrast
//! - `ContextWindower`: bounded brief of the transcript for each speaker
//! - `PhaseGate`: per-phase action eligibility
//!
//! ## Orchestration
//! - `DeliberationOrchestrator::run_round`: one all-or-nothing round
//! - `DeliberationOrchestrator::deliberate`: every remaining round, then verdict
//! - `DeliberationOrchestrator::submit_note`: idempotent, quota-limited notes
//! - `SessionStore`: concurrent sessions, each behind its own lock
//!
//! # Usage
//!
//! ```ignore
//! let generator = Arc::new(ScriptedGenerator::new());
//! let orchestrator = DeliberationOrchestrator::new(generator);
//! let outcomes = orchestrator.deliberate(&mut session, None).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod generator;
pub mod influence;
pub mod juror;
pub mod orchestrator;
pub mod phase_gate;
pub mod scheduler;
pub mod session;
pub mod store;

// Re-export key engine types
pub use config::{DeliberationConfig, InfluenceConfig, MAX_NOTE_LIMIT};
pub use context::ContextWindower;
pub use error::{DeliberationError, Result};
pub use influence::{Framing, InfluenceModel};
pub use juror::{
    JurorId, JurorProfile, JurorRecord, Panel, TopicTable, CONVICTION_MAX, CONVICTION_MIN,
    CONVICTION_NEUTRAL,
};
pub use scheduler::TurnScheduler;

// Re-export session and gate types
pub use phase_gate::{require_phase, Action, PhaseGate};
pub use session::{
    NoteReceipt, Phase, PhaseTransition, Role, SessionId, SessionState, TurnRecord,
};

// Re-export orchestration types
pub use events::{DeliberationEvent, EventBus, SharedEventBus};
pub use generator::{
    parse_analysis, tools_for_phase, GenerationError, ScriptedGenerator, Tool, TurnGenerator,
    TurnRequest, TurnResponse,
};
pub use orchestrator::{DeliberationOrchestrator, RoundOutcome, TurnEvent};
pub use store::{SessionHandle, SessionStore, SharedSessionStore};
