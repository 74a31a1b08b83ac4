//! Data ingestion and storage
//!
//! CSV ledger loading, SQLite persistence, and training datasets.

pub mod database;
pub mod dataset;
pub mod ledger;

pub use database::Database;
pub use dataset::{MatchupDataset, TrainingDataset};
pub use ledger::{Ledger, MatchRecord};
