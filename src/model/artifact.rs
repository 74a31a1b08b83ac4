//! Trained model artifacts
//!
//! Weights are written by Burn's recorder to `<model_path>.mpk`; everything
//! needed to rebuild and feed the network goes to `<model_path>.json`.

use std::path::Path;

use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lstm::{TennisLstm, TennisLstmConfig};
use crate::features::{FeatureNormalizer, MatchupEncoder};
use crate::{Result, TennisError};

/// Sidecar describing a saved model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub model: TennisLstmConfig,
    pub lookback: usize,
    pub surface_one_hot: bool,
    /// Ledger stat names the features were built from, in order
    pub stats: Vec<String>,
    pub normalizer: FeatureNormalizer,
    pub best_epoch: usize,
    pub best_val_f1: f64,
    pub trained_at: DateTime<Utc>,
}

impl ArtifactManifest {
    pub fn weights_path(model_path: &str) -> String {
        format!("{}.mpk", model_path)
    }

    pub fn manifest_path(model_path: &str) -> String {
        format!("{}.json", model_path)
    }

    /// The encoder that produced the training features
    pub fn encoder(&self) -> MatchupEncoder {
        MatchupEncoder::new(self.lookback, self.stats.len(), self.surface_one_hot)
    }

    /// Check the pieces agree with each other
    pub fn validate(&self) -> Result<()> {
        let width = self.encoder().feature_width();
        if self.model.input_size != width {
            return Err(TennisError::Config(format!(
                "manifest input_size {} does not match feature width {}",
                self.model.input_size, width
            )));
        }
        if self.normalizer.width() != width {
            return Err(TennisError::Config(format!(
                "normalizer covers {} features, model expects {}",
                self.normalizer.width(),
                width
            )));
        }
        if self.lookback == 0 || self.model.hidden_size == 0 || self.model.num_layers == 0 {
            return Err(TennisError::Config(
                "manifest has zero lookback, hidden_size or num_layers".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, model_path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::manifest_path(model_path), data)?;
        Ok(())
    }

    pub fn load(model_path: &str) -> Result<Self> {
        let path = Self::manifest_path(model_path);
        if !Path::new(&path).exists() {
            return Err(TennisError::Config(format!("model manifest {} not found", path)));
        }
        let data = std::fs::read_to_string(&path)?;
        let manifest: ArtifactManifest = serde_json::from_str(&data)
            .map_err(|e| TennisError::Config(format!("invalid model manifest {}: {}", path, e)))?;
        manifest.validate()?;
        Ok(manifest)
    }
}

/// Persist weights and manifest, creating the parent directory
pub fn save_artifacts<B: Backend>(
    model: &TennisLstm<B>,
    manifest: &ArtifactManifest,
    model_path: &str,
) -> Result<()>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    manifest.validate()?;
    if let Some(parent) = Path::new(model_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    model.save(model_path)?;
    manifest.save(model_path)?;
    log::info!("Saved model artifacts to {}", model_path);
    Ok(())
}

/// Load weights and manifest saved by [`save_artifacts`]
pub fn load_artifacts<B: Backend>(
    device: &B::Device,
    model_path: &str,
) -> Result<(TennisLstm<B>, ArtifactManifest)>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    if !Path::new(&ArtifactManifest::weights_path(model_path)).exists() {
        return Err(TennisError::NoModel);
    }
    let manifest = ArtifactManifest::load(model_path)?;
    let model = TennisLstm::load(device, model_path, &manifest.model)?;
    Ok((model, manifest))
}
