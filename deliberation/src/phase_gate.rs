//! Action eligibility per phase.
//!
//! Every caller-facing operation names an [`Action`]; the gate refuses it
//! unless the session sits in one of the phases where that action is legal.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DeliberationError, Result};
use crate::session::{Phase, SessionState};

/// Caller-facing operations that the gate guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// One-on-one conversation with a juror.
    Chat,
    /// Showing evidence (unlocking resources).
    PresentEvidence,
    /// Running a deliberation round.
    RunRound,
    /// Passing a note to a juror.
    SubmitNote,
    /// Reading final votes.
    CollectVotes,
}

impl Action {
    /// Phases in which this action is legal.
    pub fn allowed_phases(self) -> &'static [Phase] {
        match self {
            Self::Chat => &[Phase::Persuasion],
            Self::PresentEvidence => &[Phase::Investigation, Phase::Persuasion],
            Self::RunRound | Self::SubmitNote => &[Phase::Deliberation],
            Self::CollectVotes => &[Phase::Verdict],
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::PresentEvidence => write!(f, "present_evidence"),
            Self::RunRound => write!(f, "run_round"),
            Self::SubmitNote => write!(f, "submit_note"),
            Self::CollectVotes => write!(f, "collect_votes"),
        }
    }
}

/// Fail with `InvalidPhaseTransition` unless the session is in `allowed`.
pub fn require_phase(session: &SessionState, allowed: &[Phase]) -> Result<()> {
    if allowed.contains(&session.phase()) {
        return Ok(());
    }
    Err(DeliberationError::invalid_phase(session.phase(), allowed))
}

/// Guard for caller-facing actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseGate;

impl PhaseGate {
    /// Authorize `action` for the session's current phase.
    pub fn authorize(session: &SessionState, action: Action) -> Result<()> {
        require_phase(session, action.allowed_phases()).inspect_err(|_| {
            warn!(
                session_id = %session.id(),
                phase = %session.phase(),
                action = %action,
                "Action rejected by phase gate"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::juror::Panel;

    fn session_in(phase: Phase) -> SessionState {
        let mut s = SessionState::new("s-gate", Panel::default());
        while s.phase() != phase {
            s.advance("walk").unwrap();
        }
        s
    }

    #[test]
    fn test_each_action_legal_only_in_its_phases() {
        let actions = [
            Action::Chat,
            Action::PresentEvidence,
            Action::RunRound,
            Action::SubmitNote,
            Action::CollectVotes,
        ];
        for phase in Phase::ALL {
            let s = session_in(phase);
            for action in actions {
                let ok = PhaseGate::authorize(&s, action).is_ok();
                assert_eq!(
                    ok,
                    action.allowed_phases().contains(&phase),
                    "{} in {}",
                    action,
                    phase
                );
            }
        }
    }

    #[test]
    fn test_require_phase_error() {
        let s = session_in(Phase::Investigation);
        let err = require_phase(&s, &[Phase::Deliberation]).unwrap_err();
        match err {
            DeliberationError::InvalidPhaseTransition { current, allowed } => {
                assert_eq!(current, Phase::Investigation);
                assert_eq!(allowed, "deliberation");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_evidence_in_two_phases() {
        assert!(PhaseGate::authorize(&session_in(Phase::Investigation), Action::PresentEvidence).is_ok());
        assert!(PhaseGate::authorize(&session_in(Phase::Persuasion), Action::PresentEvidence).is_ok());
        assert!(PhaseGate::authorize(&session_in(Phase::Prologue), Action::PresentEvidence).is_err());
    }
}
