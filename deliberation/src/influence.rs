//! Conviction propagation.
//!
//! One speaker's turn moves every other juror by a topic-weighted,
//! framing-scaled, distance-damped amount. The computation is a full pairwise
//! pass per turn; nothing iterates to a fixed point.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::InfluenceConfig;
use crate::error::{DeliberationError, Result};
use crate::juror::{JurorId, JurorRecord, Panel, TopicTable, CONVICTION_MAX};

/// Valence of a turn's argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Framing {
    /// Lenient parse: anything that is not positive/negative is neutral.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Negative => write!(f, "negative"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Pure influence computation plus its application to a panel.
#[derive(Debug, Clone)]
pub struct InfluenceModel {
    config: InfluenceConfig,
    topics: TopicTable,
}

impl Default for InfluenceModel {
    fn default() -> Self {
        Self::new(InfluenceConfig::default(), TopicTable::default())
    }
}

impl InfluenceModel {
    pub fn new(config: InfluenceConfig, topics: TopicTable) -> Self {
        Self { config, topics }
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    /// Sign and strength of a framing.
    pub fn impact_factor(&self, framing: Framing) -> f64 {
        match framing {
            Framing::Positive => 1.0,
            Framing::Negative => -1.0,
            Framing::Neutral => self.config.neutral_factor,
        }
    }

    /// `max(0, 1 - |a - b| / 100)`
    pub fn distance_damping(listener: u8, speaker: u8) -> f64 {
        let distance = listener.abs_diff(speaker) as f64;
        (1.0 - distance / CONVICTION_MAX as f64).max(0.0)
    }

    /// Canonical, de-duplicated topic set for a turn.
    pub fn canonical_topics(&self, topics: &[String]) -> BTreeSet<String> {
        topics
            .iter()
            .map(|t| self.topics.canonicalize(t).to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Unrounded influence of `speaker` on `listener` before extreme damping.
    pub fn raw_influence(
        &self,
        speaker: &JurorRecord,
        listener: &JurorRecord,
        topics: &BTreeSet<String>,
        framing: Framing,
    ) -> f64 {
        let factor = self.impact_factor(framing);
        let damping = Self::distance_damping(listener.conviction(), speaker.conviction());
        topics
            .iter()
            .map(|topic| listener.affinity(topic) as f64 * factor * speaker.influence_power * damping)
            .sum()
    }

    /// Integer delta for one listener. Never panics; non-finite math yields 0.
    pub fn delta_for(
        &self,
        speaker: &JurorRecord,
        listener: &JurorRecord,
        topics: &BTreeSet<String>,
        framing: Framing,
    ) -> i32 {
        let mut raw = self.raw_influence(speaker, listener, topics, framing);

        let conviction = listener.conviction();
        if conviction < self.config.extreme_low || conviction > self.config.extreme_high {
            raw *= self.config.extreme_damping;
        }

        if !raw.is_finite() {
            return 0;
        }
        raw.round_ties_even() as i32
    }

    /// Move every listener (the speaker is skipped) and report the deltas.
    pub fn apply_impact<'a>(
        &self,
        speaker: &JurorRecord,
        listeners: impl IntoIterator<Item = &'a mut JurorRecord>,
        topics: &[String],
        framing: Framing,
    ) -> BTreeMap<JurorId, i32> {
        let topics = self.canonical_topics(topics);
        let mut deltas = BTreeMap::new();

        for listener in listeners {
            if listener.id == speaker.id {
                continue;
            }
            let delta = self.delta_for(speaker, listener, &topics, framing);
            let before = listener.conviction();
            let after = listener.shift(delta);
            debug!(
                speaker = %speaker.id,
                listener = %listener.id,
                delta,
                before,
                after,
                "Applied influence"
            );
            deltas.insert(listener.id.clone(), delta);
        }

        deltas
    }

    /// `apply_impact` against every other member of `panel`.
    pub fn apply_to_panel(
        &self,
        panel: &mut Panel,
        speaker_id: &str,
        topics: &[String],
        framing: Framing,
    ) -> Result<BTreeMap<JurorId, i32>> {
        let speaker = panel
            .get(speaker_id)
            .cloned()
            .ok_or_else(|| DeliberationError::JurorNotFound(speaker_id.to_string()))?;
        Ok(self.apply_impact(&speaker, panel.iter_mut(), topics, framing))
    }
}
