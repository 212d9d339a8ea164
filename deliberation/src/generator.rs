//! Turn-generation collaborator boundary.
//!
//! The engine never writes juror dialogue itself. It hands a brief, a role
//! and an optional player note to a [`TurnGenerator`] and receives text plus
//! the topics and framing the argument used.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::influence::Framing;
use crate::juror::JurorId;
use crate::session::{Phase, Role, SessionId};

/// Errors from a turn-generation collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

/// Capabilities a speaking juror may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// Look up unlocked evidence.
    EvidenceLookup,
    /// Cast a final vote.
    CastVote,
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EvidenceLookup => write!(f, "evidence_lookup"),
            Self::CastVote => write!(f, "cast_vote"),
        }
    }
}

/// Tools granted in `phase`. Vote casting exists only in the verdict phase.
pub fn tools_for_phase(phase: Phase) -> BTreeSet<Tool> {
    let mut tools = BTreeSet::from([Tool::EvidenceLookup]);
    if phase == Phase::Verdict {
        tools.insert(Tool::CastVote);
    }
    tools
}

/// Everything the collaborator needs to produce one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: SessionId,
    pub juror_id: JurorId,
    pub round: u32,
    pub brief: String,
    pub role: Role,
    pub note: Option<String>,
    pub tools_allowed: BTreeSet<Tool>,
}

/// What the collaborator said and how it framed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub framing: Framing,
}

impl TurnResponse {
    pub fn new(text: &str, topics: &[&str], framing: Framing) -> Self {
        Self {
            text: text.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            framing,
        }
    }
}

/// Produces a juror's contribution for one turn.
#[async_trait]
pub trait TurnGenerator: Send + Sync {
    async fn generate_turn(&self, request: TurnRequest) -> Result<TurnResponse, GenerationError>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Deterministic generator that replays a queue of canned outcomes.
///
/// When the queue runs dry it answers with a neutral, topic-less line so
/// long offline runs never stall. Every request is recorded for inspection.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<TurnResponse, GenerationError>>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful turn.
    pub fn push(&self, response: TurnResponse) {
        self.lock_script().push_back(Ok(response));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: GenerationError) {
        self.lock_script().push_back(Err(error));
    }

    /// Builder-style `push`.
    pub fn with_responses(self, responses: impl IntoIterator<Item = TurnResponse>) -> Self {
        for response in responses {
            self.push(response);
        }
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Outcomes still queued.
    pub fn remaining(&self) -> usize {
        self.lock_script().len()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<TurnResponse, GenerationError>>> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TurnGenerator for ScriptedGenerator {
    async fn generate_turn(&self, request: TurnRequest) -> Result<TurnResponse, GenerationError> {
        let fallback = TurnResponse::new(
            &format!("{} has nothing further to add.", request.juror_id),
            &[],
            Framing::Neutral,
        );
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        self.lock_script().pop_front().unwrap_or(Ok(fallback))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Deserialize)]
struct AnalysisTag {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    impact: String,
}

/// Hidden analysis tag with its JSON payload captured.
static ANALYSIS_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*ANALYSIS:\s*(\{.*?\})\s*-->")
        .expect("ANALYSIS_TAG_RE regex should compile")
});

/// Any tag-shaped comment, well-formed or not.
static ANALYSIS_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*ANALYSIS:.*?-->").expect("ANALYSIS_COMMENT_RE regex should compile")
});

/// Split a raw model reply into visible text and its hidden analysis tag.
///
/// The tag looks like `<!-- ANALYSIS: {"topics": [...], "impact": "positive"} -->`.
/// A missing or malformed tag yields no topics and neutral framing; every
/// tag-shaped comment is stripped from the visible text either way.
pub fn parse_analysis(raw: &str) -> TurnResponse {
    let (topics, framing) = ANALYSIS_TAG_RE
        .captures(raw)
        .and_then(|caps| serde_json::from_str::<AnalysisTag>(&caps[1]).ok())
        .map(|tag| (tag.topics, Framing::from_label(&tag.impact)))
        .unwrap_or_default();

    let text = ANALYSIS_COMMENT_RE.replace_all(raw, "").trim().to_string();

    TurnResponse {
        text,
        topics,
        framing,
    }
}
