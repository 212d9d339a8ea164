//! Speaker selection for deliberation rounds.
//!
//! Leaders are the most polarized jurors who have not led yet, so every juror
//! leads once before anyone leads twice. Responders are the jurors furthest
//! from the leader, for confrontational pairings.

use std::cmp::Reverse;

use crate::error::{DeliberationError, Result};
use crate::juror::JurorId;
use crate::session::SessionState;

/// Picks who speaks in a round.
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    responders_per_round: usize,
}

impl Default for TurnScheduler {
    fn default() -> Self {
        Self::new(2)
    }
}

impl TurnScheduler {
    pub fn new(responders_per_round: usize) -> Self {
        Self {
            responders_per_round,
        }
    }

    /// Leader for the next round.
    ///
    /// Candidates are the jurors absent from the leader history (or the whole
    /// panel once everyone has led). Highest `|conviction - 50|` wins; ties go
    /// to fewest times led, then lowest id.
    pub fn select_leader(&self, session: &SessionState) -> Result<JurorId> {
        let panel = session.panel();
        let counts = session.leader_counts();
        let led = |id: &str| counts.get(id).copied().unwrap_or(0);

        let never_led: Vec<_> = panel.iter().filter(|j| led(&j.id) == 0).collect();
        let pool = if never_led.is_empty() {
            panel.iter().collect()
        } else {
            never_led
        };

        pool.into_iter()
            .min_by_key(|j| (Reverse(j.polarity()), led(&j.id), j.id.clone()))
            .map(|j| j.id.clone())
            .ok_or(DeliberationError::NoJurorsAvailable)
    }

    /// Responders for `leader_id`, in speaking order.
    ///
    /// With at most `responders_per_round` others on the panel, all of them
    /// respond (id order). Otherwise the furthest from the leader are picked;
    /// ties go to fewest prior responses, then lowest id.
    pub fn select_responders(&self, leader_id: &str, session: &SessionState) -> Result<Vec<JurorId>> {
        let panel = session.panel();
        let leader = panel
            .get(leader_id)
            .ok_or_else(|| DeliberationError::JurorNotFound(leader_id.to_string()))?;

        let mut others: Vec<_> = panel.iter().filter(|j| j.id != leader.id).collect();
        if others.len() <= self.responders_per_round {
            return Ok(others.into_iter().map(|j| j.id.clone()).collect());
        }

        let counts = session.responder_counts();
        others.sort_by_key(|j| {
            (
                Reverse(j.conviction().abs_diff(leader.conviction())),
                counts.get(j.id.as_str()).copied().unwrap_or(0),
                j.id.clone(),
            )
        });

        Ok(others
            .into_iter()
            .take(self.responders_per_round)
            .map(|j| j.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::juror::{JurorRecord, Panel};

    fn session(stances: &[(&str, i32)]) -> SessionState {
        SessionState::new(
            "s-sched",
            Panel::new(stances.iter().map(|(id, c)| JurorRecord::new(id, *c))),
        )
    }

    #[test]
    fn test_leader_max_polarity() {
        let s = session(&[("a", 10), ("b", 50), ("c", 60)]);
        assert_eq!(TurnScheduler::default().select_leader(&s).unwrap(), "a");
    }

    #[test]
    fn test_leader_empty_panel() {
        let s = session(&[]);
        let err = TurnScheduler::default().select_leader(&s).unwrap_err();
        assert!(matches!(err, DeliberationError::NoJurorsAvailable));
    }

    #[test]
    fn test_leader_prefers_never_led() {
        let mut s = session(&[("a", 0), ("b", 45), ("c", 55)]);
        s.leader_history.push("a".into());
        // b and c tie on polarity 5; id breaks the tie
        assert_eq!(TurnScheduler::default().select_leader(&s).unwrap(), "b");
    }

    #[test]
    fn test_leader_tie_on_fewest_leads_after_full_cycle() {
        let mut s = session(&[("a", 20), ("b", 80)]);
        s.leader_history = vec!["a".into(), "b".into(), "b".into()];
        // same polarity 30; a has led fewer times
        assert_eq!(TurnScheduler::default().select_leader(&s).unwrap(), "a");
    }

    #[test]
    fn test_leader_tie_on_id() {
        let s = session(&[("zed", 20), ("amy", 80)]);
        assert_eq!(TurnScheduler::default().select_leader(&s).unwrap(), "amy");
    }

    #[test]
    fn test_every_juror_leads_once_before_repeat() {
        let scheduler = TurnScheduler::default();
        let mut s = session(&[("a", 5), ("b", 95), ("c", 40), ("d", 52), ("e", 70)]);
        for _ in 0..5 {
            let leader = scheduler.select_leader(&s).unwrap();
            assert!(!s.leader_history.contains(&leader));
            s.leader_history.push(leader);
        }
        let mut led = s.leader_history.clone();
        led.sort();
        assert_eq!(led, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_responders_furthest_from_leader() {
        // distances from leader (50): b=40, c=40, d=10
        let s = session(&[("lead", 50), ("b", 90), ("c", 10), ("d", 60)]);
        let responders = TurnScheduler::default()
            .select_responders("lead", &s)
            .unwrap();
        assert_eq!(responders, vec!["b", "c"]);
    }

    #[test]
    fn test_responders_tie_prefers_fewer_responses() {
        let mut s = session(&[("lead", 50), ("b", 90), ("c", 10), ("d", 60)]);
        s.responder_history.push(vec!["b".into()]);
        let responders = TurnScheduler::default()
            .select_responders("lead", &s)
            .unwrap();
        assert_eq!(responders, vec!["c", "b"]);
    }

    #[test]
    fn test_small_panel_returns_everyone_else() {
        let s = session(&[("a", 50), ("b", 51), ("c", 0)]);
        let responders = TurnScheduler::default().select_responders("a", &s).unwrap();
        assert_eq!(responders, vec!["b", "c"]);

        let s = session(&[("solo", 50)]);
        assert!(TurnScheduler::default()
            .select_responders("solo", &s)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_responders_never_include_leader() {
        let s = session(&[("a", 0), ("b", 100), ("c", 30), ("d", 70)]);
        let responders = TurnScheduler::default().select_responders("b", &s).unwrap();
        assert_eq!(responders.len(), 2);
        assert!(!responders.contains(&"b".to_string()));
        assert_eq!(responders[0], "a");
    }

    #[test]
    fn test_unknown_leader() {
        let s = session(&[("a", 0)]);
        assert!(TurnScheduler::default().select_responders("x", &s).is_err());
    }
}
