//! Per-player chronological match histories
//!
//! Each ledger match is viewed twice, once from each participant's side,
//! with stats resolved to "own" and "opponent" so downstream feature code
//! never has to branch on who won.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::data::ledger::Ledger;
use crate::Surface;

/// One match seen from a single player's perspective
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMatch {
    pub date: NaiveDate,
    pub is_winner: bool,
    pub opponent: String,
    pub draw_size: f32,
    pub surface: Surface,
    pub own_stats: Vec<f32>,
    pub opponent_stats: Vec<f32>,
}

/// Head-to-head summary between two players
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadToHead {
    pub wins: usize,
    pub total: usize,
}

impl HeadToHead {
    /// Win share, 0.5 when the players never met
    pub fn win_percentage(&self) -> f32 {
        if self.total == 0 {
            0.5
        } else {
            self.wins as f32 / self.total as f32
        }
    }
}

/// Index from player name to that player's date-ordered history
#[derive(Debug, Clone, Default)]
pub struct PlayerIndex {
    histories: HashMap<String, Vec<PlayerMatch>>,
    stats: Vec<String>,
}

impl PlayerIndex {
    /// Index every player in the ledger.
    ///
    /// Matches are re-sorted by date here rather than trusting the caller.
    pub fn build(ledger: &Ledger) -> Self {
        let mut order: Vec<usize> = (0..ledger.len()).collect();
        let matches = ledger.matches();
        order.sort_by_key(|&i| matches[i].date);

        let mut histories: HashMap<String, Vec<PlayerMatch>> = HashMap::new();
        for i in order {
            let m = &matches[i];
            histories.entry(m.winner.clone()).or_default().push(PlayerMatch {
                date: m.date,
                is_winner: true,
                opponent: m.loser.clone(),
                draw_size: m.draw_size,
                surface: m.surface,
                own_stats: m.winner_stats.clone(),
                opponent_stats: m.loser_stats.clone(),
            });
            histories.entry(m.loser.clone()).or_default().push(PlayerMatch {
                date: m.date,
                is_winner: false,
                opponent: m.winner.clone(),
                draw_size: m.draw_size,
                surface: m.surface,
                own_stats: m.loser_stats.clone(),
                opponent_stats: m.winner_stats.clone(),
            });
        }

        log::debug!("Indexed {} players from {} matches", histories.len(), ledger.len());

        PlayerIndex {
            histories,
            stats: ledger.stats().to_vec(),
        }
    }

    pub fn history(&self, player: &str) -> Option<&[PlayerMatch]> {
        self.histories.get(player).map(|h| h.as_slice())
    }

    pub fn contains(&self, player: &str) -> bool {
        self.histories.contains_key(player)
    }

    pub fn num_players(&self) -> usize {
        self.histories.len()
    }

    pub fn players(&self) -> impl Iterator<Item = &str> {
        self.histories.keys().map(|k| k.as_str())
    }

    /// Stat names in feature order
    pub fn stats(&self) -> &[String] {
        &self.stats
    }

    /// The paired raw ledger columns (`w_x`, `l_x` for every stat)
    pub fn feature_columns(&self) -> Vec<String> {
        self.stats
            .iter()
            .flat_map(|s| [format!("w_{}", s), format!("l_{}", s)])
            .collect()
    }

    /// The last `n` matches strictly before `cutoff` (all matches without one)
    pub fn recent_before(&self, player: &str, cutoff: Option<NaiveDate>, n: usize) -> &[PlayerMatch] {
        let history = match self.histories.get(player) {
            Some(h) => h.as_slice(),
            None => return &[],
        };
        let end = match cutoff {
            Some(date) => history.partition_point(|m| m.date < date),
            None => history.len(),
        };
        &history[end.saturating_sub(n)..end]
    }

    /// Prior meetings of `player` against `opponent`, strictly before `cutoff`
    pub fn head_to_head(&self, player: &str, opponent: &str, cutoff: Option<NaiveDate>) -> HeadToHead {
        let history = self.recent_before(player, cutoff, usize::MAX);
        let meetings = history.iter().filter(|m| m.opponent == opponent);
        let (wins, total) = meetings.fold((0, 0), |(w, t), m| (w + m.is_winner as usize, t + 1));
        HeadToHead { wins, total }
    }
}
