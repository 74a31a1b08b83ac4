//! Tennis match prediction using deep learning
//!
//! An attention LSTM over per-player match histories, trained on symmetric
//! winner/loser pairs drawn from a historical match ledger.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Court surface a match was played on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Surface {
    Hard,
    Clay,
    Grass,
    Carpet,
    Unknown,
}

impl Surface {
    /// Width of the one-hot encoding (Unknown encodes as all zeros)
    pub const ONE_HOT_DIM: usize = 4;

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hard" => Surface::Hard,
            "clay" => Surface::Clay,
            "grass" => Surface::Grass,
            "carpet" => Surface::Carpet,
            _ => Surface::Unknown,
        }
    }

    pub fn one_hot(&self) -> [f32; Self::ONE_HOT_DIM] {
        match self {
            Surface::Hard => [1.0, 0.0, 0.0, 0.0],
            Surface::Clay => [0.0, 1.0, 0.0, 0.0],
            Surface::Grass => [0.0, 0.0, 1.0, 0.0],
            Surface::Carpet => [0.0, 0.0, 0.0, 1.0],
            Surface::Unknown => [0.0; Self::ONE_HOT_DIM],
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Hard => write!(f, "Hard"),
            Surface::Clay => write!(f, "Clay"),
            Surface::Grass => write!(f, "Grass"),
            Surface::Carpet => write!(f, "Carpet"),
            Surface::Unknown => write!(f, ""),
        }
    }
}

/// Model prediction output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub player_a: String,
    pub player_b: String,
    pub player_a_win_prob: f32,
    /// Prior head-to-head wins for player A
    pub h2h_wins: usize,
    pub h2h_total: usize,
    pub confidence: ConfidenceLevel,
}

impl Prediction {
    /// Get the predicted winner (player with >=50% win probability)
    pub fn predicted_winner(&self) -> &str {
        if self.player_a_win_prob >= 0.5 {
            &self.player_a
        } else {
            &self.player_b
        }
    }
}

/// Confidence level based on available match history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,   // Both players fill most of the lookback
    Medium, // One player has a partial history
    Low,    // Both players have thin histories
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::High => write!(f, "High"),
            ConfidenceLevel::Medium => write!(f, "Medium"),
            ConfidenceLevel::Low => write!(f, "Low"),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum TennisError {
    #[error("No match history for player: {0}")]
    PlayerNotFound(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Ledger schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient {split} samples: have {samples}, need at least one batch of {batch_size}")]
    InsufficientSamples {
        split: &'static str,
        samples: usize,
        batch_size: usize,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Model not trained - run `tennis train` first")]
    NoModel,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TennisError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub ledger_path: String,
    pub database_path: String,
    pub dataset_path: String,
    pub model_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Matches per player sequence
    pub lookback: usize,
    pub surface_one_hot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout: f64,
    pub head_hidden: usize,
    /// Additive attention bias at steps played against the current opponent
    pub opponent_bias: f32,
    /// Initial value of the learnable softmax temperature
    pub attention_temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub max_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub grad_clip_norm: f32,
    /// Fraction of samples (taken from the end) held out for validation
    pub test_size: f64,
    pub early_stopping_patience: usize,
    pub min_delta: f64,
    pub lr_patience: usize,
    pub lr_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig {
                ledger_path: "data/atp_matches.csv".to_string(),
                database_path: "data/tennis.db".to_string(),
                dataset_path: "data/training_dataset.json".to_string(),
                model_path: "model/tennis_lstm".to_string(),
            },
            features: FeatureConfig {
                lookback: 10,
                surface_one_hot: false,
            },
            model: ModelConfig {
                hidden_size: 64,
                num_layers: 2,
                dropout: 0.4,
                head_hidden: 32,
                opponent_bias: 2.0,
                attention_temperature: 0.5,
            },
            training: TrainingConfig {
                max_epochs: 50,
                batch_size: 32,
                learning_rate: 1e-3,
                weight_decay: 0.01,
                grad_clip_norm: 1.0,
                test_size: 0.2,
                early_stopping_patience: 5,
                min_delta: 0.001,
                lr_patience: 3,
                lr_factor: 0.5,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TennisError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| TennisError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TennisError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject hyperparameters that would make training or inference meaningless
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(TennisError::Config(msg.to_string()));

        if self.features.lookback == 0 {
            return fail("features.lookback must be at least 1");
        }
        if self.model.hidden_size == 0 || self.model.num_layers == 0 || self.model.head_hidden == 0 {
            return fail("model.hidden_size, model.num_layers and model.head_hidden must be non-zero");
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return fail("model.dropout must be in [0, 1)");
        }
        if self.model.attention_temperature <= 0.0 {
            return fail("model.attention_temperature must be positive");
        }
        if self.training.batch_size == 0 {
            return fail("training.batch_size must be at least 1");
        }
        if self.training.max_epochs == 0 {
            return fail("training.max_epochs must be at least 1");
        }
        if self.training.early_stopping_patience == 0 {
            return fail("training.early_stopping_patience must be at least 1");
        }
        if self.training.grad_clip_norm <= 0.0 {
            return fail("training.grad_clip_norm must be positive");
        }
        if self.training.learning_rate <= 0.0 {
            return fail("training.learning_rate must be positive");
        }
        if self.training.test_size <= 0.0 || self.training.test_size >= 1.0 {
            return fail("training.test_size must be in (0, 1)");
        }
        if self.training.lr_factor <= 0.0 || self.training.lr_factor >= 1.0 {
            return fail("training.lr_factor must be in (0, 1)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.features.lookback = 0;
        assert!(matches!(config.validate(), Err(TennisError::Config(_))));

        let mut config = Config::default();
        config.training.test_size = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.max_epochs = 0;
        assert!(matches!(config.validate(), Err(TennisError::Config(_))));

        let mut config = Config::default();
        config.training.early_stopping_patience = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.grad_clip_norm = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.features.lookback, 10);
        assert_eq!(parsed.model.opponent_bias, 2.0);
        assert_eq!(parsed.training.batch_size, 32);
    }

    #[test]
    fn test_surface_parse() {
        assert_eq!(Surface::parse("Clay"), Surface::Clay);
        assert_eq!(Surface::parse(" hard "), Surface::Hard);
        assert_eq!(Surface::parse(""), Surface::Unknown);
        assert_eq!(Surface::Unknown.one_hot(), [0.0; 4]);
    }
}
