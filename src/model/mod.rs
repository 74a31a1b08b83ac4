//! Neural network architecture
//!
//! A shared stacked LSTM encodes each player's history, opponent-biased
//! attention pools it, and an antisymmetric head compares the two players.

pub mod artifact;
pub mod attention;
pub mod heads;
pub mod lstm;

pub use artifact::{load_artifacts, save_artifacts, ArtifactManifest};
pub use lstm::{TennisLstm, TennisLstmConfig};
