//! Feature extraction and encoding
//!
//! Converts the match ledger into per-player histories and model-ready
//! matchup sequences.

pub mod history;
pub mod matchup;
pub mod normalize;

pub use history::{HeadToHead, PlayerIndex, PlayerMatch};
pub use matchup::{percentage_difference, Matchup, MatchupEncoder};
pub use normalize::FeatureNormalizer;
