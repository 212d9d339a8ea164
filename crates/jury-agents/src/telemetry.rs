//! Transcript and session summary sinks.
//!
//! Two outputs:
//! - transcript file: one JSON line per committed turn, overwritten per run
//! - summary log: append-only, one JSON line per finished session

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deliberation::{Framing, JurorId, Role, SessionState};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One committed turn, as written to the transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub session_id: String,
    pub round: u32,
    pub speaker_id: JurorId,
    pub role: Role,
    pub text: String,
    pub topics: Vec<String>,
    pub framing: Framing,
    pub deltas: BTreeMap<JurorId, i32>,
    pub panel_after: BTreeMap<JurorId, u8>,
}

/// End-of-session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub rounds: u32,
    pub turns: usize,
    pub notes_used: u32,
    pub leaders: Vec<JurorId>,
    pub initial: BTreeMap<JurorId, u8>,
    pub r#final: BTreeMap<JurorId, u8>,
    pub finished_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn from_session(session: &SessionState) -> Self {
        Self {
            session_id: session.id().to_string(),
            rounds: session.completed_rounds(),
            turns: session.transcript().len(),
            notes_used: session.notes_used(),
            leaders: session.leader_history().to_vec(),
            initial: session
                .panel()
                .iter()
                .map(|j| (j.id.clone(), j.initial_conviction()))
                .collect(),
            r#final: session.panel().snapshot(),
            finished_at: Utc::now(),
        }
    }

    /// Jurors above `threshold` (guilty) versus the rest (not guilty).
    pub fn tally(&self, threshold: u8) -> (usize, usize) {
        let guilty = self.r#final.values().filter(|c| **c > threshold).count();
        (guilty, self.r#final.len() - guilty)
    }
}

/// Write every turn of `session` to `path` as JSON lines. Returns the count.
pub fn write_transcript(session: &SessionState, path: &Path) -> Result<usize> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create transcript {}", path.display()))?;

    for record in session.transcript() {
        let line = TranscriptLine {
            session_id: session.id().to_string(),
            round: record.round,
            speaker_id: record.speaker_id.clone(),
            role: record.role,
            text: record.text.clone(),
            topics: record.topics.clone(),
            framing: record.framing,
            deltas: record.deltas.clone(),
            panel_after: record.panel_after.clone(),
        };
        writeln!(file, "{}", serde_json::to_string(&line)?)?;
    }

    info!(
        path = %path.display(),
        turns = session.transcript().len(),
        "Wrote transcript"
    );
    Ok(session.transcript().len())
}

/// Append a summary line to `path`. Failures are logged, never fatal.
pub fn append_summary(summary: &SessionSummary, path: &Path) {
    match serde_json::to_string(summary) {
        Ok(json) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append session summary: {e}");
                    } else {
                        info!(path = %path.display(), "Appended session summary");
                    }
                }
                Err(e) => warn!("Failed to open summary file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize session summary: {e}"),
    }
}

/// Wait for a background sink task to drain. Returns false if it panicked or
/// was cancelled; the failure is logged, never fatal.
pub async fn join_sink(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(task = name, error = %e, "Background sink task failed");
            false
        }
    }
}
