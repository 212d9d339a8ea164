//! Juror character cards and panel files.
//!
//! A panel file is TOML: an optional `[config]` table (any
//! `DeliberationConfig` key) followed by `[[jurors]]` cards. Without a file
//! the runner seats the built-in five-juror panel.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use deliberation::{DeliberationConfig, JurorProfile, Panel, TopicTable};
use serde::Deserialize;

/// Profile plus the persona text the dialogue model needs.
#[derive(Debug, Clone, Deserialize)]
pub struct JurorCard {
    #[serde(flatten)]
    pub profile: JurorProfile,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub speaking_style: String,
}

/// Parsed panel file.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelFile {
    #[serde(default)]
    pub config: DeliberationConfig,
    pub jurors: Vec<JurorCard>,
}

impl PanelFile {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: Self = toml::from_str(s).context("Invalid panel file")?;
        file.config.validate()?;
        if file.jurors.is_empty() {
            bail!("Panel file seats no jurors");
        }
        let mut seen = std::collections::BTreeSet::new();
        for card in &file.jurors {
            if !seen.insert(card.profile.id.as_str()) {
                bail!("Duplicate juror id: {}", card.profile.id);
            }
        }
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read panel file {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// The built-in panel with default tunables.
    pub fn builtin() -> Self {
        Self {
            config: DeliberationConfig::default(),
            jurors: default_cards(),
        }
    }

    /// Seat the panel, folding topic aliases through `topics`.
    pub fn seat(&self, topics: &TopicTable) -> Panel {
        let profiles: Vec<JurorProfile> = self.jurors.iter().map(|c| c.profile.clone()).collect();
        Panel::from_profiles(
            &profiles,
            topics,
            self.config.influence.default_influence_power,
        )
    }

    /// Cards keyed by juror id.
    pub fn cards(&self) -> BTreeMap<String, JurorCard> {
        self.jurors
            .iter()
            .map(|c| (c.profile.id.clone(), c.clone()))
            .collect()
    }
}

fn card(
    id: &str,
    name: &str,
    conviction: i32,
    power: f64,
    affinity: &[(&str, i32)],
    background: &str,
    speaking_style: &str,
) -> JurorCard {
    JurorCard {
        profile: JurorProfile {
            id: id.to_string(),
            name: name.to_string(),
            initial_conviction: conviction,
            topic_affinity: affinity.iter().map(|(t, w)| (t.to_string(), *w)).collect(),
            influence_power: Some(power),
        },
        background: background.to_string(),
        speaking_style: speaking_style.to_string(),
    }
}

/// Five jurors spread across the conviction scale.
pub fn default_cards() -> Vec<JurorCard> {
    vec![
        card(
            "engineer",
            "Dr. Lin Wei",
            70,
            0.6,
            &[("技术细节", 12), ("技术责任", 10), ("情感诉求", -8)],
            "Robotics safety engineer who has audited industrial control firmware.",
            "Precise, asks for logs and timestamps.",
        ),
        card(
            "mother",
            "Grace Okafor",
            80,
            0.5,
            &[("受害者立场", 15), ("情感诉求", 8), ("AI自主性", -10)],
            "Nurse and mother of two; lost a colleague to a workplace accident.",
            "Warm but unyielding when talking about the victim.",
        ),
        card(
            "student",
            "Kai Moreno",
            45,
            0.3,
            &[("社会影响", 10), ("AI自主性", 6), ("法律先例", 4)],
            "Philosophy undergraduate following the case online.",
            "Curious, thinks out loud, changes mind openly.",
        ),
        card(
            "lawyer",
            "Eleanor Hart",
            35,
            0.8,
            &[("法律先例", 14), ("企业责任", 10), ("外部攻击", 6)],
            "Retired appellate lawyer.",
            "Measured, cites precedent, dislikes emotional appeals.",
        ),
        card(
            "hacker",
            "Sam Ortiz",
            15,
            0.7,
            &[("外部攻击", 15), ("安全措施", 8), ("企业责任", 6)],
            "Penetration tester who has seen prompt injection in the wild.",
            "Blunt, sardonic, technical shorthand.",
        ),
    ]
}
