//! Deliberation orchestrator - drives rounds and handles player notes.
//!
//! Ties together the scheduler, windower, influence model and the external
//! turn generator. A round is built on a staged copy of the session and only
//! swapped in once every speaker's turn has been generated and applied, so a
//! collaborator failure never leaves half a round behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DeliberationConfig;
use crate::context::ContextWindower;
use crate::error::{DeliberationError, Result};
use crate::events::{DeliberationEvent, SharedEventBus};
use crate::generator::{tools_for_phase, TurnGenerator, TurnRequest};
use crate::influence::{Framing, InfluenceModel};
use crate::juror::{JurorId, TopicTable};
use crate::phase_gate::{Action, PhaseGate};
use crate::scheduler::TurnScheduler;
use crate::session::{NoteReceipt, Role, SessionState, TurnRecord};

/// One speaker's turn as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub round: u32,
    pub speaker_id: JurorId,
    pub role: Role,
    pub text: String,
    pub framing: Framing,
    /// Listener → applied delta.
    pub deltas: BTreeMap<JurorId, i32>,
}

/// A committed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u32,
    pub turns: Vec<TurnEvent>,
}

impl RoundOutcome {
    /// Speaker who opened the round.
    pub fn leader(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == Role::Leader)
            .map(|t| t.speaker_id.as_str())
    }

    /// Net movement per juror across the round.
    pub fn net_deltas(&self) -> BTreeMap<JurorId, i32> {
        let mut net = BTreeMap::new();
        for turn in &self.turns {
            for (id, delta) in &turn.deltas {
                *net.entry(id.clone()).or_insert(0) += delta;
            }
        }
        net
    }
}

/// Runs deliberation rounds against a session.
///
/// Usage:
/// 1. Build with `new()` or `with_config()`, optionally `with_events()`
/// 2. Move the session into the deliberation phase
/// 3. Accept player notes with `submit_note()` at any point in that phase
/// 4. Call `run_round()` per round, or `deliberate()` to run them all and
///    advance to the verdict phase
pub struct DeliberationOrchestrator {
    config: DeliberationConfig,
    scheduler: TurnScheduler,
    windower: ContextWindower,
    model: InfluenceModel,
    generator: Arc<dyn TurnGenerator>,
    events: Option<SharedEventBus>,
}

impl DeliberationOrchestrator {
    /// Create an orchestrator with default config and topic table.
    pub fn new(generator: Arc<dyn TurnGenerator>) -> Self {
        Self::with_config(DeliberationConfig::default(), TopicTable::default(), generator)
    }

    /// Create an orchestrator with custom config.
    pub fn with_config(
        config: DeliberationConfig,
        topics: TopicTable,
        generator: Arc<dyn TurnGenerator>,
    ) -> Self {
        Self {
            scheduler: TurnScheduler::new(config.responders_per_round),
            windower: ContextWindower::new(config.recent_rounds, config.summary_max_chars),
            model: InfluenceModel::new(config.influence.clone(), topics),
            config,
            generator,
            events: None,
        }
    }

    /// Publish round, turn and note events to `bus`.
    pub fn with_events(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &DeliberationConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &TurnScheduler {
        &self.scheduler
    }

    pub fn model(&self) -> &InfluenceModel {
        &self.model
    }

    pub fn windower(&self) -> &ContextWindower {
        &self.windower
    }

    /// Run one round: a leader, then each responder, strictly in order.
    ///
    /// Each speaker sees the convictions left by the previous speaker. If the
    /// generator fails for any speaker, the session is left exactly as it was
    /// and the error is returned for the caller to retry.
    pub async fn run_round(
        &self,
        round: u32,
        session: &mut SessionState,
        notes: Option<&BTreeMap<JurorId, String>>,
    ) -> Result<Vec<TurnEvent>> {
        PhaseGate::authorize(session, Action::RunRound)?;

        let mut staged = session.clone();
        let leader = self.scheduler.select_leader(&staged)?;
        let responders = self.scheduler.select_responders(&leader, &staged)?;

        staged.leader_history.push(leader.clone());
        staged.responder_history.push(responders.clone());

        info!(
            session_id = %staged.id,
            round,
            leader = %leader,
            responders = ?responders,
            "Round started"
        );

        let speakers = std::iter::once((leader.clone(), Role::Leader))
            .chain(responders.iter().cloned().map(|id| (id, Role::Responder)));
        let tools_allowed = tools_for_phase(staged.phase);
        let mut turns = Vec::new();

        for (speaker_id, role) in speakers {
            let request = TurnRequest {
                session_id: staged.id.clone(),
                juror_id: speaker_id.clone(),
                round,
                brief: self.windower.build_brief(&staged, round),
                role,
                note: notes.and_then(|n| n.get(&speaker_id)).cloned(),
                tools_allowed: tools_allowed.clone(),
            };

            let response = self.generator.generate_turn(request).await.map_err(|e| {
                warn!(
                    session_id = %staged.id,
                    round,
                    speaker = %speaker_id,
                    generator = self.generator.name(),
                    error = %e,
                    "Turn generation failed; round discarded"
                );
                DeliberationError::from(e)
            })?;

            let panel_before = staged.panel.snapshot();
            let deltas = self.model.apply_to_panel(
                &mut staged.panel,
                &speaker_id,
                &response.topics,
                response.framing,
            )?;
            let panel_after = staged.panel.snapshot();

            debug!(
                session_id = %staged.id,
                round,
                speaker = %speaker_id,
                role = %role,
                framing = %response.framing,
                deltas = ?deltas,
                "Turn applied"
            );

            staged.transcript.push(TurnRecord {
                round,
                speaker_id: speaker_id.clone(),
                role,
                text: response.text.clone(),
                topics: self
                    .model
                    .canonical_topics(&response.topics)
                    .into_iter()
                    .collect(),
                framing: response.framing,
                speaker_conviction_before: panel_before.get(&speaker_id).copied().unwrap_or(0),
                speaker_conviction_after: panel_after.get(&speaker_id).copied().unwrap_or(0),
                panel_before,
                panel_after,
                deltas: deltas.clone(),
            });

            turns.push(TurnEvent {
                round,
                speaker_id,
                role,
                text: response.text,
                framing: response.framing,
                deltas,
            });
        }

        *session = staged;
        info!(
            session_id = %session.id,
            round,
            turns = turns.len(),
            "Round committed"
        );
        self.publish_round(session, round, &leader, &responders, &turns);

        Ok(turns)
    }

    /// Run the remaining rounds up to `total_rounds` (the configured total
    /// when `None`), delivering each pending note to its target the next time
    /// that juror speaks, then advance the session to the verdict phase.
    pub async fn deliberate(
        &self,
        session: &mut SessionState,
        total_rounds: Option<u32>,
    ) -> Result<Vec<RoundOutcome>> {
        PhaseGate::authorize(session, Action::RunRound)?;

        let total = total_rounds.unwrap_or(self.config.total_rounds);
        let mut outcomes = Vec::new();
        for round in session.completed_rounds() + 1..=total {
            let notes = session.pending_notes();
            let turns = self.run_round(round, session, Some(&notes)).await?;
            for turn in &turns {
                if notes.contains_key(&turn.speaker_id) {
                    session.pending_notes.remove(&turn.speaker_id);
                }
            }
            outcomes.push(RoundOutcome { round, turns });
        }

        let from = session.phase;
        let to = session.advance("deliberation rounds complete")?;
        self.publish(DeliberationEvent::PhaseChanged {
            session_id: session.id.clone(),
            from,
            to,
            timestamp: Utc::now(),
        });
        info!(
            session_id = %session.id,
            rounds = outcomes.len(),
            "Deliberation complete"
        );

        Ok(outcomes)
    }

    /// Pass a note to a juror, at most once per idempotency key.
    ///
    /// Checks run in a fixed order: key, target, length, replay, quota. A
    /// replayed key is a successful no-op reporting `accepted: false`.
    pub fn submit_note(
        &self,
        session: &mut SessionState,
        target_id: &str,
        content: &str,
        idempotency_key: &str,
    ) -> Result<NoteReceipt> {
        PhaseGate::authorize(session, Action::SubmitNote)?;

        let limit = self.config.note_limit;
        if idempotency_key.trim().is_empty() {
            return Err(DeliberationError::InvalidIdempotencyKey);
        }
        if !session.panel.contains(target_id) {
            return Err(DeliberationError::TargetNotFound {
                target_id: target_id.to_string(),
            });
        }
        let len = content.chars().count();
        if len > self.config.note_max_chars {
            return Err(DeliberationError::ContentTooLong {
                len,
                max: self.config.note_max_chars,
            });
        }
        if session.used_idempotency_keys.contains(idempotency_key) {
            debug!(session_id = %session.id, key = idempotency_key, "Note replay ignored");
            return Ok(NoteReceipt {
                accepted: false,
                remaining: limit.saturating_sub(session.notes_used),
            });
        }
        if session.notes_used >= limit {
            warn!(session_id = %session.id, limit, "Note limit reached");
            return Err(DeliberationError::NoteLimitReached { limit });
        }

        session
            .used_idempotency_keys
            .insert(idempotency_key.to_string());
        session.notes_used += 1;
        session
            .notes_by_target
            .insert(target_id.to_string(), content.to_string());
        session.pending_notes.insert(target_id.to_string());

        let remaining = limit.saturating_sub(session.notes_used);
        info!(session_id = %session.id, target = target_id, remaining, "Note accepted");
        self.publish(DeliberationEvent::NoteReceived {
            session_id: session.id.clone(),
            target: target_id.to_string(),
            remaining,
            timestamp: Utc::now(),
        });

        Ok(NoteReceipt {
            accepted: true,
            remaining,
        })
    }

    fn publish_round(
        &self,
        session: &SessionState,
        round: u32,
        leader: &str,
        responders: &[JurorId],
        turns: &[TurnEvent],
    ) {
        if self.events.is_none() {
            return;
        }
        self.publish(DeliberationEvent::RoundStarted {
            session_id: session.id.clone(),
            round,
            leader: leader.to_string(),
            responders: responders.to_vec(),
            timestamp: Utc::now(),
        });
        for turn in turns {
            self.publish(DeliberationEvent::TurnCompleted {
                session_id: session.id.clone(),
                round,
                speaker: turn.speaker_id.clone(),
                role: turn.role,
                text: turn.text.clone(),
                deltas: turn.deltas.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    fn publish(&self, event: DeliberationEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
