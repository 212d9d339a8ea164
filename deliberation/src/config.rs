//! Deliberation tunables.
//!
//! Every constant the scheduler, influence model, windower and note quota
//! read lives here so a scenario can be re-tuned from a TOML file without
//! touching code. Defaults reproduce the stock game balance.

use serde::{Deserialize, Serialize};

use crate::error::{DeliberationError, Result};

/// Hard ceiling on notes per session; `note_limit` may lower it, never raise it.
pub const MAX_NOTE_LIMIT: u32 = 3;

/// Configuration for a deliberation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliberationConfig {
    /// Rounds run by `deliberate()` before the verdict phase.
    pub total_rounds: u32,
    /// Responders selected per round (besides the leader).
    pub responders_per_round: usize,
    /// Notes a player may pass per session.
    pub note_limit: u32,
    /// Maximum note length in characters.
    pub note_max_chars: usize,
    /// Most recent rounds rendered verbatim in a brief.
    pub recent_rounds: usize,
    /// Character cap for the summary of older rounds.
    pub summary_max_chars: usize,
    /// Influence model constants.
    pub influence: InfluenceConfig,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            total_rounds: 4,
            responders_per_round: 2,
            note_limit: 3,
            note_max_chars: 200,
            recent_rounds: 2,
            summary_max_chars: 300,
            influence: InfluenceConfig::default(),
        }
    }
}

/// Constants for conviction propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluenceConfig {
    /// Listeners strictly below this conviction resist movement.
    pub extreme_low: u8,
    /// Listeners strictly above this conviction resist movement.
    pub extreme_high: u8,
    /// Multiplier applied to raw influence on extreme listeners.
    pub extreme_damping: f64,
    /// Impact factor for neutral framing.
    pub neutral_factor: f64,
    /// Influence power for jurors whose profile omits it.
    pub default_influence_power: f64,
}

impl Default for InfluenceConfig {
    fn default() -> Self {
        Self {
            extreme_low: 15,
            extreme_high: 85,
            extreme_damping: 0.5,
            neutral_factor: 0.3,
            default_influence_power: 0.5,
        }
    }
}

impl DeliberationConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| DeliberationError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the session invariants.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(DeliberationError::Config {
                message: message.to_string(),
            })
        };

        if self.total_rounds == 0 {
            return fail("total_rounds must be at least 1");
        }
        if self.responders_per_round == 0 {
            return fail("responders_per_round must be at least 1");
        }
        if self.note_limit == 0 || self.note_limit > MAX_NOTE_LIMIT {
            return fail("note_limit must be within 1..=3");
        }
        if self.recent_rounds == 0 {
            return fail("recent_rounds must be at least 1");
        }
        let inf = &self.influence;
        if inf.extreme_low >= inf.extreme_high || inf.extreme_high > 100 {
            return fail("extreme_low must be below extreme_high, and both within 0..=100");
        }
        if !(0.0..=1.0).contains(&inf.extreme_damping) {
            return fail("extreme_damping must be within 0.0..=1.0");
        }
        if !inf.neutral_factor.is_finite() || !inf.default_influence_power.is_finite() {
            return fail("influence factors must be finite");
        }
        Ok(())
    }
}
