//! Matchup feature encoding
//!
//! Turns two players' histories into fixed-length, left-padded feature
//! sequences plus per-step masks marking meetings with the other player.

use chrono::NaiveDate;

use super::history::{HeadToHead, PlayerIndex, PlayerMatch};
use crate::{FeatureConfig, Result, Surface, TennisError};

/// Features present in every vector regardless of stats
/// (is_winner, days since previous match, draw size)
pub const BASE_FEATURES: usize = 3;

/// Returned when the opponent's value is zero (+300%)
pub const PCT_DIFF_SENTINEL: f32 = 3.0;

/// Relative difference of `mine` over `opponent`
pub fn percentage_difference(mine: f32, opponent: f32) -> f32 {
    if opponent == 0.0 {
        PCT_DIFF_SENTINEL
    } else {
        (mine - opponent) / opponent
    }
}

/// Encoded inputs for one ordered pair of players
#[derive(Debug, Clone, PartialEq)]
pub struct Matchup {
    /// [lookback][feature_width]
    pub features_a: Vec<Vec<f32>>,
    pub features_b: Vec<Vec<f32>>,
    /// [lookback], 1.0 where the step was played against the other player
    pub mask_a: Vec<f32>,
    pub mask_b: Vec<f32>,
    /// From player A's perspective
    pub head_to_head: HeadToHead,
}

impl Matchup {
    /// The same matchup with the two players exchanged
    pub fn swapped(self) -> Self {
        let h2h = self.head_to_head;
        Matchup {
            features_a: self.features_b,
            features_b: self.features_a,
            mask_a: self.mask_b,
            mask_b: self.mask_a,
            head_to_head: HeadToHead {
                wins: h2h.total - h2h.wins,
                total: h2h.total,
            },
        }
    }

    /// Real (non-padded) steps in each sequence
    pub fn history_lengths(&self) -> (usize, usize) {
        let real = |seq: &[Vec<f32>]| seq.iter().filter(|v| v.iter().any(|x| *x != 0.0)).count();
        (real(&self.features_a), real(&self.features_b))
    }
}

/// Stateless encoder for a fixed feature layout
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupEncoder {
    lookback: usize,
    num_stats: usize,
    surface_one_hot: bool,
}

impl MatchupEncoder {
    pub fn new(lookback: usize, num_stats: usize, surface_one_hot: bool) -> Self {
        MatchupEncoder {
            lookback,
            num_stats,
            surface_one_hot,
        }
    }

    pub fn from_config(config: &FeatureConfig, num_stats: usize) -> Self {
        Self::new(config.lookback, num_stats, config.surface_one_hot)
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn surface_one_hot(&self) -> bool {
        self.surface_one_hot
    }

    /// Same feature layout with a different sequence length
    pub fn with_lookback(&self, lookback: usize) -> Self {
        MatchupEncoder {
            lookback,
            ..self.clone()
        }
    }

    /// Length of every per-match feature vector
    pub fn feature_width(&self) -> usize {
        let surface = if self.surface_one_hot { Surface::ONE_HOT_DIM } else { 0 };
        BASE_FEATURES + surface + 2 * self.num_stats
    }

    /// Feature vector for `current`, with `previous` supplying the rest gap
    pub fn match_features(&self, current: &PlayerMatch, previous: &PlayerMatch) -> Vec<f32> {
        let mut features = Vec::with_capacity(self.feature_width());
        features.push(if current.is_winner { 1.0 } else { 0.0 });
        features.push((current.date - previous.date).num_days() as f32);
        features.push(current.draw_size);
        if self.surface_one_hot {
            features.extend(current.surface.one_hot());
        }
        for (&own, &opp) in current.own_stats.iter().zip(&current.opponent_stats) {
            features.push(own);
            features.push(percentage_difference(own, opp));
        }
        features
    }

    /// Encode up to `lookback + 1` recent matches into a padded sequence.
    ///
    /// The oldest match only provides the gap for its successor and is not
    /// emitted itself. Missing steps are zero vectors placed at the front.
    pub fn encode_history(&self, recent: &[PlayerMatch], opponent: &str) -> (Vec<Vec<f32>>, Vec<f32>) {
        let start = recent.len().saturating_sub(self.lookback + 1);
        let window = &recent[start..];

        let mut features: Vec<Vec<f32>> = Vec::with_capacity(self.lookback);
        let mut mask: Vec<f32> = Vec::with_capacity(self.lookback);
        let pad = self.lookback.saturating_sub(window.len().saturating_sub(1));
        features.resize(pad, vec![0.0; self.feature_width()]);
        mask.resize(pad, 0.0);

        for pair in window.windows(2) {
            features.push(self.match_features(&pair[1], &pair[0]));
            mask.push(if pair[1].opponent == opponent { 1.0 } else { 0.0 });
        }

        (features, mask)
    }

    /// Encode the pair (a, b) using only matches strictly before `cutoff`.
    ///
    /// Without a cutoff the full histories are used. Fails when either
    /// player is absent from the index.
    pub fn encode(
        &self,
        index: &PlayerIndex,
        player_a: &str,
        player_b: &str,
        cutoff: Option<NaiveDate>,
    ) -> Result<Matchup> {
        for player in [player_a, player_b] {
            if !index.contains(player) {
                return Err(TennisError::PlayerNotFound(player.to_string()));
            }
        }
        if index.stats().len() != self.num_stats {
            return Err(TennisError::ShapeMismatch(format!(
                "encoder expects {} stats, ledger has {}",
                self.num_stats,
                index.stats().len()
            )));
        }

        let recent_a = index.recent_before(player_a, cutoff, self.lookback + 1);
        let recent_b = index.recent_before(player_b, cutoff, self.lookback + 1);
        let (features_a, mask_a) = self.encode_history(recent_a, player_b);
        let (features_b, mask_b) = self.encode_history(recent_b, player_a);

        Ok(Matchup {
            features_a,
            features_b,
            mask_a,
            mask_b,
            head_to_head: index.head_to_head(player_a, player_b, cutoff),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ledger::Ledger;

    fn index(csv: &str) -> PlayerIndex {
        PlayerIndex::build(&Ledger::from_reader(csv.as_bytes()).unwrap())
    }

    const LEDGER: &str = "\
tourney_date,surface,draw_size,winner_name,loser_name,w_ace,l_ace,w_df,l_df
20190101,Hard,32,Anna,Beth,10,5,2,0
20190111,Clay,64,Beth,Cara,4,8,1,1
20190121,Hard,32,Anna,Cara,6,6,0,3
20190131,Grass,128,Cara,Anna,12,3,2,2
20190210,Hard,32,Beth,Anna,5,0,1,4
";

    #[test]
    fn test_percentage_difference() {
        assert_eq!(percentage_difference(100.0, 50.0), 1.0);
        assert_eq!(percentage_difference(50.0, 100.0), -0.5);
        assert_eq!(percentage_difference(100.0, 0.0), 3.0);
        assert_eq!(percentage_difference(0.0, 0.0), 3.0);
    }

    #[test]
    fn test_feature_width() {
        assert_eq!(MatchupEncoder::new(10, 2, false).feature_width(), 7);
        assert_eq!(MatchupEncoder::new(10, 2, true).feature_width(), 11);
    }

    #[test]
    fn test_match_features_layout() {
        let index = index(LEDGER);
        let encoder = MatchupEncoder::new(10, 2, false);
        let anna = index.history("Anna").unwrap();
        // Anna beat Cara on 01-21, previous match 01-01
        let features = encoder.match_features(&anna[1], &anna[0]);
        assert_eq!(features, vec![1.0, 20.0, 32.0, 6.0, 0.0, 0.0, -1.0]);

        // Loss to Cara: own stats are the loser columns
        let features = encoder.match_features(&anna[2], &anna[1]);
        assert_eq!(features[0], 0.0);
        assert_eq!(features[3], 3.0);
        assert_eq!(features[4], -0.75);
    }

    #[test]
    fn test_padding_to_lookback() {
        let index = index(LEDGER);
        let encoder = MatchupEncoder::new(10, 2, false);
        // Cara has 3 matches: the oldest only seeds the first gap
        let recent = index.recent_before("Cara", None, 11);
        assert_eq!(recent.len(), 3);
        let (features, mask) = encoder.encode_history(recent, "Anna");

        assert_eq!(features.len(), 10);
        assert_eq!(mask.len(), 10);
        assert!(features.iter().all(|f| f.len() == 7));
        assert!(features[..7].iter().all(|f| f.iter().all(|x| *x == 0.0)));
        assert!(features[9].iter().any(|x| *x != 0.0));
        assert_eq!(&mask[8..], &[1.0, 1.0]);
        assert!(mask[..8].iter().all(|m| *m == 0.0));
    }

    #[test]
    fn test_truncates_to_most_recent() {
        let index = index(LEDGER);
        let encoder = MatchupEncoder::new(2, 2, false);
        let matchup = encoder.encode(&index, "Anna", "Beth", None).unwrap();
        assert_eq!(matchup.features_a.len(), 2);
        // Anna's last two: loss to Cara (01-31), loss to Beth (02-10)
        assert_eq!(matchup.features_a[1][1], 10.0);
        assert_eq!(matchup.mask_a, vec![0.0, 1.0]);
    }

    #[test]
    fn test_cutoff_prevents_leakage() {
        let index = index(LEDGER);
        let encoder = MatchupEncoder::new(3, 2, false);
        let cutoff = NaiveDate::from_ymd_opt(2019, 1, 31);
        let matchup = encoder.encode(&index, "Cara", "Anna", cutoff).unwrap();
        // Cara has two matches before 01-31, so one feature row
        let (len_a, _) = matchup.history_lengths();
        assert_eq!(len_a, 1);
        assert_eq!(matchup.head_to_head, HeadToHead { wins: 0, total: 1 });
    }

    #[test]
    fn test_encode_is_symmetric() {
        let index = index(LEDGER);
        let encoder = MatchupEncoder::new(4, 2, true);
        let cutoff = NaiveDate::from_ymd_opt(2019, 2, 10);
        let ab = encoder.encode(&index, "Anna", "Beth", cutoff).unwrap();
        let ba = encoder.encode(&index, "Beth", "Anna", cutoff).unwrap();
        assert_eq!(ab.clone().swapped(), ba);
        assert_eq!(ab.features_a, ba.features_b);
        assert_eq!(ab.mask_a, ba.mask_b);
    }

    #[test]
    fn test_head_to_head_without_meetings() {
        let csv = "tourney_date,surface,draw_size,winner_name,loser_name\n\
20190101,Hard,32,A,B\n20190102,Hard,32,C,D\n";
        let index = index(csv);
        let encoder = MatchupEncoder::new(3, 0, false);
        let matchup = encoder.encode(&index, "A", "C", None).unwrap();
        assert_eq!(matchup.head_to_head.total, 0);
        assert_eq!(matchup.head_to_head.win_percentage(), 0.5);
        assert!(matchup.mask_a.iter().all(|m| *m == 0.0));
    }

    #[test]
    fn test_unknown_player() {
        let index = index(LEDGER);
        let encoder = MatchupEncoder::new(3, 2, false);
        let err = encoder.encode(&index, "Anna", "Zoe", None).unwrap_err();
        assert!(matches!(err, TennisError::PlayerNotFound(name) if name == "Zoe"));
    }
}
