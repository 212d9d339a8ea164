//! Bounded briefs for each turn.
//!
//! The most recent rounds go in verbatim; everything older collapses into one
//! summary block with a hard character cap, so the brief stays the same size
//! however long deliberation runs.

use std::collections::BTreeMap;

use crate::session::{SessionState, TurnRecord};

/// Returned when nothing has been said yet.
pub const NO_PRIOR_RECORD: &str = "No prior deliberation record.";

/// Label on the collapsed block of older rounds.
pub const EARLIER_LABEL: &str = "[Earlier rounds]";

/// Appended when the older-rounds block is cut.
pub const ELLIPSIS: &str = "...";

/// Builds the textual brief handed to the turn generator.
#[derive(Debug, Clone)]
pub struct ContextWindower {
    recent_rounds: usize,
    summary_max_chars: usize,
}

impl Default for ContextWindower {
    fn default() -> Self {
        Self::new(2, 300)
    }
}

impl ContextWindower {
    pub fn new(recent_rounds: usize, summary_max_chars: usize) -> Self {
        Self {
            recent_rounds,
            summary_max_chars,
        }
    }

    /// Brief for a turn in `round`. Entries from later rounds are ignored.
    pub fn build_brief(&self, session: &SessionState, round: u32) -> String {
        let mut rounds: BTreeMap<u32, Vec<&TurnRecord>> = BTreeMap::new();
        for entry in session.transcript().iter().filter(|e| e.round <= round) {
            rounds.entry(entry.round).or_default().push(entry);
        }
        if rounds.is_empty() {
            return NO_PRIOR_RECORD.to_string();
        }

        let split = rounds.len().saturating_sub(self.recent_rounds);
        let mut parts = Vec::new();

        let older: Vec<String> = rounds
            .iter()
            .take(split)
            .flat_map(|(r, entries)| {
                entries.iter().map(move |e| {
                    format!("R{} {}({}): {}", r, e.speaker_id, e.role, e.text)
                })
            })
            .collect();
        if !older.is_empty() {
            parts.push(EARLIER_LABEL.to_string());
            parts.push(truncate_chars(&older.join("\n"), self.summary_max_chars));
        }

        for (r, entries) in rounds.iter().skip(split) {
            for e in entries {
                parts.push(format!("{}-{}({}): {}", r, e.speaker_id, e.role, e.text));
            }
        }

        parts.join("\n")
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str(ELLIPSIS);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::influence::Framing;
    use crate::juror::Panel;
    use crate::session::Role;

    fn entry(round: u32, speaker: &str, role: Role, text: &str) -> TurnRecord {
        TurnRecord {
            round,
            speaker_id: speaker.to_string(),
            role,
            text: text.to_string(),
            topics: vec![],
            framing: Framing::Neutral,
            speaker_conviction_before: 50,
            speaker_conviction_after: 50,
            panel_before: Default::default(),
            panel_after: Default::default(),
            deltas: Default::default(),
        }
    }

    fn session_with(entries: Vec<TurnRecord>) -> SessionState {
        let mut s = SessionState::new("s-ctx", Panel::default());
        s.transcript = entries;
        s
    }

    #[test]
    fn test_empty_transcript() {
        let s = session_with(vec![]);
        assert_eq!(ContextWindower::default().build_brief(&s, 1), NO_PRIOR_RECORD);
    }

    #[test]
    fn test_recent_rounds_verbatim() {
        let s = session_with(vec![
            entry(1, "a", Role::Leader, "Opening"),
            entry(1, "b", Role::Responder, "Reply"),
            entry(2, "c", Role::Leader, "Second"),
        ]);
        let brief = ContextWindower::default().build_brief(&s, 2);
        assert_eq!(
            brief,
            "1-a(leader): Opening\n1-b(responder): Reply\n2-c(leader): Second"
        );
        assert!(!brief.contains(EARLIER_LABEL));
    }

    #[test]
    fn test_older_rounds_summarized() {
        let s = session_with(vec![
            entry(1, "a", Role::Leader, "one"),
            entry(2, "b", Role::Leader, "two"),
            entry(3, "c", Role::Leader, "three"),
        ]);
        let brief = ContextWindower::default().build_brief(&s, 3);
        let lines: Vec<_> = brief.lines().collect();
        assert_eq!(lines[0], EARLIER_LABEL);
        assert_eq!(lines[1], "R1 a(leader): one");
        assert_eq!(lines[2], "2-b(leader): two");
        assert_eq!(lines[3], "3-c(leader): three");
    }

    #[test]
    fn test_in_progress_round_counts_as_recent() {
        let s = session_with(vec![
            entry(1, "a", Role::Leader, "one"),
            entry(2, "b", Role::Leader, "two"),
            entry(3, "c", Role::Leader, "three-in-progress"),
        ]);
        let brief = ContextWindower::default().build_brief(&s, 3);
        assert!(brief.contains("R1 a(leader): one"));
        assert!(brief.contains("3-c(leader): three-in-progress"));
    }

    #[test]
    fn test_summary_truncated_to_limit() {
        let long = "x".repeat(500);
        let s = session_with(vec![
            entry(1, "a", Role::Leader, &long),
            entry(2, "b", Role::Leader, "two"),
            entry(3, "c", Role::Leader, "three"),
        ]);
        let brief = ContextWindower::default().build_brief(&s, 3);
        let summary = brief.lines().nth(1).unwrap();
        assert_eq!(summary.chars().count(), 300 + ELLIPSIS.len());
        assert!(summary.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let text = "陪审".repeat(200);
        let cut = truncate_chars(&text, 300);
        assert_eq!(cut.chars().count(), 303);
        assert_eq!(truncate_chars("short", 300), "short");
    }

    #[test]
    fn test_brief_size_bounded() {
        let entries: Vec<_> = (1..=20)
            .flat_map(|r| {
                vec![
                    entry(r, "a", Role::Leader, &"argument ".repeat(10)),
                    entry(r, "b", Role::Responder, &"counter ".repeat(10)),
                ]
            })
            .collect();
        let s = session_with(entries);
        let windower = ContextWindower::default();
        let short = windower.build_brief(&s, 12).chars().count();
        let long = windower.build_brief(&s, 20).chars().count();
        assert_eq!(short, long);
    }

    #[test]
    fn test_future_rounds_ignored() {
        let s = session_with(vec![
            entry(1, "a", Role::Leader, "one"),
            entry(4, "b", Role::Leader, "later"),
        ]);
        let brief = ContextWindower::default().build_brief(&s, 2);
        assert!(!brief.contains("later"));
    }
}
