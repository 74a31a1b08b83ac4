//! Model training
//!
//! Training loop, loss, metrics tracking, and epoch-level schedules.

pub mod metrics;
pub mod schedule;
pub mod trainer;

pub use metrics::{Metrics, TrainingHistory};
pub use schedule::{EarlyStopping, PlateauScheduler};
pub use trainer::{prepare_splits, run_training, Trainer, TrainingOutcome};
