//! Session state machine - phases, transitions, histories and quotas.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DeliberationError, Result};
use crate::influence::Framing;
use crate::juror::{JurorId, Panel};

/// Unique identifier for a session
pub type SessionId = String;

/// Narrative phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Case introduction; nothing is actionable yet.
    Prologue,
    /// Evidence gathering.
    Investigation,
    /// One-on-one conversations with jurors.
    Persuasion,
    /// Jurors debate among themselves in rounds.
    Deliberation,
    /// Votes are collected.
    Verdict,
}

impl Phase {
    /// All phases in narrative order.
    pub const ALL: [Phase; 5] = [
        Self::Prologue,
        Self::Investigation,
        Self::Persuasion,
        Self::Deliberation,
        Self::Verdict,
    ];

    /// Whether this is the final phase.
    pub fn is_terminal(self) -> bool {
        self == Self::Verdict
    }

    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<Phase> {
        match self {
            Self::Prologue => Some(Self::Investigation),
            Self::Investigation => Some(Self::Persuasion),
            Self::Persuasion => Some(Self::Deliberation),
            Self::Deliberation => Some(Self::Verdict),
            Self::Verdict => None,
        }
    }

    /// Valid transitions from this phase. Backward moves only happen via reset.
    pub fn valid_transitions(self) -> &'static [Phase] {
        match self {
            Self::Prologue => &[Self::Investigation],
            Self::Investigation => &[Self::Persuasion],
            Self::Persuasion => &[Self::Deliberation],
            Self::Deliberation => &[Self::Verdict],
            Self::Verdict => &[],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prologue => write!(f, "prologue"),
            Self::Investigation => write!(f, "investigation"),
            Self::Persuasion => write!(f, "persuasion"),
            Self::Deliberation => write!(f, "deliberation"),
            Self::Verdict => write!(f, "verdict"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = DeliberationError;

    fn from_str(s: &str) -> Result<Self> {
        Phase::ALL
            .into_iter()
            .find(|p| p.to_string() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| DeliberationError::Config {
                message: format!("unknown phase: {}", s),
            })
    }
}

/// Role of a speaker within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Opens the round.
    Leader,
    /// Answers the leader.
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leader => write!(f, "leader"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Record of a single speaker's turn. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Round number (1-indexed).
    pub round: u32,
    pub speaker_id: JurorId,
    pub role: Role,
    pub text: String,
    /// Canonical topics the collaborator tagged.
    pub topics: Vec<String>,
    pub framing: Framing,
    pub speaker_conviction_before: u8,
    pub speaker_conviction_after: u8,
    pub panel_before: BTreeMap<JurorId, u8>,
    pub panel_after: BTreeMap<JurorId, u8>,
    /// Listener → applied delta (zero deltas included).
    pub deltas: BTreeMap<JurorId, i32>,
}

/// Outcome of a note submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteReceipt {
    /// False for an idempotent replay.
    pub accepted: bool,
    /// Notes left in the session quota.
    pub remaining: u32,
}

/// Per-session mutable state. Owns its panel so sessions never share jurors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub(crate) id: SessionId,
    pub(crate) phase: Phase,
    pub(crate) panel: Panel,
    pub(crate) unlocked_resources: BTreeSet<String>,
    pub(crate) actor_rounds: BTreeMap<String, u32>,
    pub(crate) leader_history: Vec<JurorId>,
    pub(crate) responder_history: Vec<Vec<JurorId>>,
    pub(crate) transcript: Vec<TurnRecord>,
    pub(crate) notes_used: u32,
    pub(crate) used_idempotency_keys: BTreeSet<String>,
    pub(crate) notes_by_target: BTreeMap<JurorId, String>,
    /// Targets whose latest note has not been delivered in a round yet.
    pub(crate) pending_notes: BTreeSet<JurorId>,
    pub(crate) transitions: Vec<PhaseTransition>,
    pub(crate) created_at: DateTime<Utc>,
}

impl SessionState {
    /// Create a session in the prologue phase.
    pub fn new(id: &str, panel: Panel) -> Self {
        Self {
            id: id.to_string(),
            phase: Phase::Prologue,
            panel,
            unlocked_resources: BTreeSet::new(),
            actor_rounds: BTreeMap::new(),
            leader_history: Vec::new(),
            responder_history: Vec::new(),
            transcript: Vec::new(),
            notes_used: 0,
            used_idempotency_keys: BTreeSet::new(),
            notes_by_target: BTreeMap::new(),
            pending_notes: BTreeSet::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Move forward along a valid edge.
    pub fn transition(&mut self, to: Phase, reason: &str) -> Result<()> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(DeliberationError::invalid_phase(
                self.phase,
                self.phase.valid_transitions(),
            ));
        }
        self.record_transition(to, reason);
        Ok(())
    }

    /// Move to the next phase in narrative order.
    pub fn advance(&mut self, reason: &str) -> Result<Phase> {
        let to = self
            .phase
            .next()
            .ok_or_else(|| DeliberationError::invalid_phase(self.phase, &[]))?;
        self.transition(to, reason)?;
        Ok(to)
    }

    /// External reset: back to prologue with seated convictions restored and
    /// every history, quota and note cleared. The transition log survives.
    pub fn reset(&mut self, reason: &str) {
        self.record_transition(Phase::Prologue, reason);
        self.panel.reset();
        self.unlocked_resources.clear();
        self.actor_rounds.clear();
        self.leader_history.clear();
        self.responder_history.clear();
        self.transcript.clear();
        self.notes_used = 0;
        self.used_idempotency_keys.clear();
        self.notes_by_target.clear();
        self.pending_notes.clear();
    }

    fn record_transition(&mut self, to: Phase, reason: &str) {
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
    }

    /// Union resources into the unlocked set. Returns how many were new.
    pub fn unlock_resources<I, S>(&mut self, resources: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.unlocked_resources.len();
        self.unlocked_resources
            .extend(resources.into_iter().map(Into::into));
        self.unlocked_resources.len() - before
    }

    /// Bump an actor's round counter and return the new count.
    pub fn increment_actor_round(&mut self, actor: &str) -> u32 {
        let count = self.actor_rounds.entry(actor.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Times each juror has led so far.
    pub fn leader_counts(&self) -> BTreeMap<&str, u32> {
        let mut counts = BTreeMap::new();
        for id in &self.leader_history {
            *counts.entry(id.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Times each juror has responded so far.
    pub fn responder_counts(&self) -> BTreeMap<&str, u32> {
        let mut counts = BTreeMap::new();
        for id in self.responder_history.iter().flatten() {
            *counts.entry(id.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn unlocked_resources(&self) -> &BTreeSet<String> {
        &self.unlocked_resources
    }

    pub fn actor_rounds(&self, actor: &str) -> u32 {
        self.actor_rounds.get(actor).copied().unwrap_or(0)
    }

    pub fn leader_history(&self) -> &[JurorId] {
        &self.leader_history
    }

    pub fn responder_history(&self) -> &[Vec<JurorId>] {
        &self.responder_history
    }

    pub fn transcript(&self) -> &[TurnRecord] {
        &self.transcript
    }

    pub fn notes_used(&self) -> u32 {
        self.notes_used
    }

    pub fn notes_by_target(&self) -> &BTreeMap<JurorId, String> {
        &self.notes_by_target
    }

    /// Undelivered notes, keyed by target.
    pub fn pending_notes(&self) -> BTreeMap<JurorId, String> {
        self.pending_notes
            .iter()
            .filter_map(|id| self.notes_by_target.get(id).map(|n| (id.clone(), n.clone())))
            .collect()
    }

    pub fn has_used_key(&self, key: &str) -> bool {
        self.used_idempotency_keys.contains(key)
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Rounds fully committed so far.
    pub fn completed_rounds(&self) -> u32 {
        self.leader_history.len() as u32
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} jurors | {} rounds | {} turns | notes {} | session={}",
            self.phase,
            self.panel.len(),
            self.completed_rounds(),
            self.transcript.len(),
            self.notes_used,
            self.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::juror::JurorRecord;

    fn session() -> SessionState {
        SessionState::new(
            "s-001",
            Panel::new(vec![JurorRecord::new("a", 30), JurorRecord::new("b", 70)]),
        )
    }

    #[test]
    fn test_new_session() {
        let s = session();
        assert_eq!(s.phase(), Phase::Prologue);
        assert_eq!(s.completed_rounds(), 0);
        assert!(s.transcript().is_empty());
        assert_eq!(s.notes_used(), 0);
    }

    #[test]
    fn test_full_forward_walk() {
        let mut s = session();
        for expected in [
            Phase::Investigation,
            Phase::Persuasion,
            Phase::Deliberation,
            Phase::Verdict,
        ] {
            assert_eq!(s.advance("next").unwrap(), expected);
        }
        assert!(s.phase().is_terminal());
        assert_eq!(s.transitions().len(), 4);
        assert!(s.advance("past the end").is_err());
    }

    #[test]
    fn test_skip_forward_rejected() {
        let mut s = session();
        let err = s.transition(Phase::Verdict, "skip").unwrap_err();
        assert_eq!(err.code(), "INVALID_PHASE_TRANSITION");
        assert_eq!(s.phase(), Phase::Prologue);
    }

    #[test]
    fn test_backward_rejected() {
        let mut s = session();
        s.advance("start").unwrap();
        s.advance("talk").unwrap();
        let err = s.transition(Phase::Investigation, "back").unwrap_err();
        assert!(matches!(
            err,
            DeliberationError::InvalidPhaseTransition {
                current: Phase::Persuasion,
                ..
            }
        ));
    }

    #[test]
    fn test_reset_restores_prologue_and_clears() {
        let mut s = session();
        s.advance("start").unwrap();
        s.unlock_resources(["e1", "e2"]);
        s.increment_actor_round("a");
        s.leader_history.push("a".into());
        s.notes_used = 2;
        s.used_idempotency_keys.insert("k".into());
        s.panel.get_mut("a").unwrap().shift(25);

        s.reset("new game");
        assert_eq!(s.phase(), Phase::Prologue);
        assert!(s.unlocked_resources().is_empty());
        assert_eq!(s.actor_rounds("a"), 0);
        assert_eq!(s.completed_rounds(), 0);
        assert_eq!(s.notes_used(), 0);
        assert!(!s.has_used_key("k"));
        assert_eq!(s.panel().get("a").unwrap().conviction(), 30);
        assert_eq!(s.transitions().last().unwrap().to, Phase::Prologue);
    }

    #[test]
    fn test_unlock_is_union() {
        let mut s = session();
        assert_eq!(s.unlock_resources(["e1", "e2"]), 2);
        assert_eq!(s.unlock_resources(["e2", "e3"]), 1);
        assert_eq!(s.unlocked_resources().len(), 3);
    }

    #[test]
    fn test_actor_round_counter() {
        let mut s = session();
        assert_eq!(s.increment_actor_round("a"), 1);
        assert_eq!(s.increment_actor_round("a"), 2);
        assert_eq!(s.actor_rounds("a"), 2);
        assert_eq!(s.actor_rounds("b"), 0);
    }

    #[test]
    fn test_history_counts() {
        let mut s = session();
        s.leader_history = vec!["a".into(), "b".into(), "a".into()];
        s.responder_history = vec![vec!["b".into()], vec!["a".into()], vec!["b".into()]];
        assert_eq!(s.leader_counts().get("a"), Some(&2));
        assert_eq!(s.responder_counts().get("b"), Some(&2));
        assert_eq!(s.completed_rounds(), 3);
    }

    #[test]
    fn test_phase_display_and_parse() {
        for phase in Phase::ALL {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
        assert_eq!(" Verdict ".parse::<Phase>().unwrap(), Phase::Verdict);
        assert!("closing".parse::<Phase>().is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Leader.to_string(), "leader");
        assert_eq!(Role::Responder.to_string(), "responder");
    }

    #[test]
    fn test_status_line() {
        let s = session();
        let line = s.status_line();
        assert!(line.contains("[prologue]"));
        assert!(line.contains("2 jurors"));
        assert!(line.contains("s-001"));
    }
}
