//! Deliberation error types
//!
//! One enum covers scheduling, note validation, phase gating and collaborator
//! failures. Each variant carries a machine-readable code so callers (HTTP
//! layers, CLIs, agents) can branch without matching on display strings.

use thiserror::Error;

use crate::generator::GenerationError;
use crate::session::Phase;

/// Result type alias for deliberation operations
pub type Result<T> = std::result::Result<T, DeliberationError>;

/// Errors that can occur while running a deliberation session
#[derive(Error, Debug)]
pub enum DeliberationError {
    /// Panel is empty, so no leader can be scheduled
    #[error("No jurors available to schedule")]
    NoJurorsAvailable,

    /// Note submitted without an idempotency key
    #[error("Idempotency key must not be empty")]
    InvalidIdempotencyKey,

    /// Note addressed to a juror that is not on the panel
    #[error("Note target not found: {target_id}")]
    TargetNotFound { target_id: String },

    /// Note content exceeds the per-note character limit
    #[error("Note too long: {len} chars (max {max})")]
    ContentTooLong { len: usize, max: usize },

    /// Note quota for the session is exhausted
    #[error("Note limit reached ({limit} per session)")]
    NoteLimitReached { limit: u32 },

    /// Action attempted outside the phases in which it is legal
    #[error("Invalid phase: {current} (allowed: {allowed})")]
    InvalidPhaseTransition { current: Phase, allowed: String },

    /// Turn-generation collaborator failed; the turn was not applied
    #[error("Turn generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Unknown session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Unknown juror id outside of note submission
    #[error("Juror not found: {0}")]
    JurorNotFound(String),

    /// Configuration rejected by validation or parsing
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl DeliberationError {
    /// Build an `InvalidPhaseTransition` from the current phase and the allowed set.
    pub fn invalid_phase(current: Phase, allowed: &[Phase]) -> Self {
        let allowed = allowed
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::InvalidPhaseTransition { current, allowed }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoJurorsAvailable => "NO_JURORS_AVAILABLE",
            Self::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            Self::TargetNotFound { .. } => "TARGET_NOT_FOUND",
            Self::ContentTooLong { .. } => "CONTENT_TOO_LONG",
            Self::NoteLimitReached { .. } => "NOTE_LIMIT_REACHED",
            Self::InvalidPhaseTransition { .. } => "INVALID_PHASE_TRANSITION",
            Self::Generation(_) => "GENERATION_FAILED",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::JurorNotFound(_) => "JUROR_NOT_FOUND",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }

    /// Whether the caller may retry the same request.
    ///
    /// Only collaborator failures qualify; the core never retries them itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Generation(_))
    }

    /// Whether this is a note-submission validation failure.
    pub fn is_note_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdempotencyKey
                | Self::TargetNotFound { .. }
                | Self::ContentTooLong { .. }
                | Self::NoteLimitReached { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DeliberationError::NoJurorsAvailable.code(),
            "NO_JURORS_AVAILABLE"
        );
        assert_eq!(
            DeliberationError::NoteLimitReached { limit: 3 }.code(),
            "NOTE_LIMIT_REACHED"
        );
        assert_eq!(
            DeliberationError::SessionNotFound("s".into()).code(),
            "SESSION_NOT_FOUND"
        );
    }

    #[test]
    fn test_invalid_phase_lists_allowed() {
        let err = DeliberationError::invalid_phase(
            Phase::Prologue,
            &[Phase::Deliberation, Phase::Verdict],
        );
        let msg = err.to_string();
        assert!(msg.contains("prologue"));
        assert!(msg.contains("deliberation, verdict"));
    }

    #[test]
    fn test_only_generation_is_retryable() {
        let err: DeliberationError = GenerationError::Timeout { seconds: 30 }.into();
        assert!(err.is_retryable());
        assert!(!DeliberationError::InvalidIdempotencyKey.is_retryable());
        assert!(!DeliberationError::NoJurorsAvailable.is_retryable());
    }

    #[test]
    fn test_note_rejections() {
        assert!(DeliberationError::ContentTooLong { len: 201, max: 200 }.is_note_rejection());
        assert!(DeliberationError::TargetNotFound {
            target_id: "x".into()
        }
        .is_note_rejection());
        assert!(!DeliberationError::NoJurorsAvailable.is_note_rejection());
    }
}
