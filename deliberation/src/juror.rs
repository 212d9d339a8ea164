//! Juror records, topic canonicalization, and the per-session panel.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Unique identifier for a juror
pub type JurorId = String;

/// Lowest legal conviction.
pub const CONVICTION_MIN: u8 = 0;
/// Highest legal conviction.
pub const CONVICTION_MAX: u8 = 100;
/// Conviction of a juror with no lean either way.
pub const CONVICTION_NEUTRAL: u8 = 50;

/// Clamp an arbitrary signed value into the legal conviction range.
pub fn clamp_conviction(value: i32) -> u8 {
    value.clamp(CONVICTION_MIN as i32, CONVICTION_MAX as i32) as u8
}

/// Alias → canonical topic key table.
///
/// Collaborators tag arguments with whatever label the model produced; the
/// table folds known synonyms (including the localized labels used by the
/// character cards) onto one canonical key. Unknown keys pass through as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicTable {
    aliases: HashMap<String, String>,
}

/// Canonical topic keys with their localized aliases.
const DEFAULT_TOPICS: &[(&str, &str)] = &[
    ("技术责任", "technical_responsibility"),
    ("外部攻击", "external_attack"),
    ("AI自主性", "ai_autonomy"),
    ("情感诉求", "emotional_appeal"),
    ("法律先例", "legal_precedent"),
    ("受害者立场", "victim_position"),
    ("安全措施", "safety_measures"),
    ("企业责任", "corporate_responsibility"),
    ("社会影响", "social_impact"),
    ("技术细节", "technical_details"),
];

impl Default for TopicTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (alias, canonical) in DEFAULT_TOPICS {
            table.insert(alias, canonical);
            table.insert(canonical, canonical);
        }
        table
    }
}

impl TopicTable {
    /// A table with no aliases; every key is its own canonical form.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Register an alias.
    pub fn insert(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.trim().to_string(), canonical.to_string());
    }

    /// Builder-style `insert`.
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.insert(alias, canonical);
        self
    }

    /// Canonical form of a topic key.
    pub fn canonicalize<'a>(&'a self, topic: &'a str) -> &'a str {
        let trimmed = topic.trim();
        self.aliases
            .get(trimmed)
            .map(String::as_str)
            .unwrap_or(trimmed)
    }

    /// Whether `topic` has a registered mapping.
    pub fn is_known(&self, topic: &str) -> bool {
        self.aliases.contains_key(topic.trim())
    }
}

/// Static juror definition, as produced by the panel loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurorProfile {
    pub id: JurorId,
    #[serde(default)]
    pub name: String,
    pub initial_conviction: i32,
    /// Topic → signed weight; keys may be aliases.
    #[serde(default)]
    pub topic_affinity: BTreeMap<String, i32>,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub influence_power: Option<f64>,
}

/// A juror seated on a session's panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurorRecord {
    pub id: JurorId,
    pub name: String,
    conviction: u8,
    initial_conviction: u8,
    /// Canonical topic → signed weight.
    topic_affinity: BTreeMap<String, i32>,
    pub influence_power: f64,
}

impl JurorRecord {
    /// Seat a juror from its profile.
    ///
    /// Affinity keys are folded through `topics`. When several aliases land
    /// on the same canonical key, an entry spelled canonically wins, then the
    /// first alias in key order.
    pub fn from_profile(profile: &JurorProfile, topics: &TopicTable, default_power: f64) -> Self {
        let mut affinity = BTreeMap::new();
        for (key, weight) in &profile.topic_affinity {
            if topics.canonicalize(key) == key.trim() {
                affinity.insert(key.trim().to_string(), *weight);
            }
        }
        for (key, weight) in &profile.topic_affinity {
            affinity
                .entry(topics.canonicalize(key).to_string())
                .or_insert(*weight);
        }

        let power = profile
            .influence_power
            .filter(|p| p.is_finite())
            .unwrap_or(default_power);
        let initial = clamp_conviction(profile.initial_conviction);
        let name = if profile.name.is_empty() {
            profile.id.clone()
        } else {
            profile.name.clone()
        };

        Self {
            id: profile.id.clone(),
            name,
            conviction: initial,
            initial_conviction: initial,
            topic_affinity: affinity,
            influence_power: power,
        }
    }

    /// Minimal constructor for fixtures and programmatic panels.
    pub fn new(id: &str, conviction: i32) -> Self {
        let conviction = clamp_conviction(conviction);
        Self {
            id: id.to_string(),
            name: id.to_string(),
            conviction,
            initial_conviction: conviction,
            topic_affinity: BTreeMap::new(),
            influence_power: 0.5,
        }
    }

    /// Builder: set a canonical topic weight.
    pub fn with_affinity(mut self, topic: &str, weight: i32) -> Self {
        self.topic_affinity.insert(topic.to_string(), weight);
        self
    }

    /// Builder: set influence power.
    pub fn with_influence_power(mut self, power: f64) -> Self {
        self.influence_power = power;
        self
    }

    pub fn conviction(&self) -> u8 {
        self.conviction
    }

    pub fn initial_conviction(&self) -> u8 {
        self.initial_conviction
    }

    /// Weight for an already-canonical topic key; unknown topics weigh 0.
    pub fn affinity(&self, canonical_topic: &str) -> i32 {
        self.topic_affinity
            .get(canonical_topic)
            .copied()
            .unwrap_or(0)
    }

    pub fn topic_affinity(&self) -> &BTreeMap<String, i32> {
        &self.topic_affinity
    }

    /// Apply a signed delta, clamped. Returns the new conviction.
    pub(crate) fn shift(&mut self, delta: i32) -> u8 {
        if delta != 0 {
            self.conviction = clamp_conviction((self.conviction as i32).saturating_add(delta));
        }
        self.conviction
    }

    /// Restore the seated conviction (external reset only).
    pub(crate) fn reset(&mut self) {
        self.conviction = self.initial_conviction;
    }

    /// Distance from indifference.
    pub fn polarity(&self) -> u8 {
        self.conviction.abs_diff(CONVICTION_NEUTRAL)
    }

    /// Vague label safe to show a player; never reveals the number.
    pub fn stance_label(&self) -> &'static str {
        match self.conviction {
            81..=100 => "strongly favors guilty",
            61..=80 => "leans guilty",
            41..=60 => "undecided",
            21..=40 => "leans not guilty",
            _ => "strongly favors not guilty",
        }
    }
}

/// The jurors seated for one session, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    jurors: BTreeMap<JurorId, JurorRecord>,
}

impl Panel {
    /// Build a panel; a repeated id replaces the earlier record.
    pub fn new(records: impl IntoIterator<Item = JurorRecord>) -> Self {
        Self {
            jurors: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Seat every profile through the topic table.
    pub fn from_profiles(profiles: &[JurorProfile], topics: &TopicTable, default_power: f64) -> Self {
        Self::new(
            profiles
                .iter()
                .map(|p| JurorRecord::from_profile(p, topics, default_power)),
        )
    }

    pub fn get(&self, id: &str) -> Option<&JurorRecord> {
        self.jurors.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut JurorRecord> {
        self.jurors.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jurors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jurors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jurors.is_empty()
    }

    /// Jurors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &JurorRecord> {
        self.jurors.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut JurorRecord> {
        self.jurors.values_mut()
    }

    pub fn ids(&self) -> Vec<JurorId> {
        self.jurors.keys().cloned().collect()
    }

    /// Current conviction of every juror.
    pub fn snapshot(&self) -> BTreeMap<JurorId, u8> {
        self.jurors
            .iter()
            .map(|(id, r)| (id.clone(), r.conviction))
            .collect()
    }

    /// Restore all seated convictions.
    pub(crate) fn reset(&mut self) {
        for record in self.jurors.values_mut() {
            record.reset();
        }
    }
}
