//! Model inference for predictions
//!
//! An [`InferenceContext`] is built once (ledger index, encoder, fitted
//! normalizer, model) and then only read, so every query sees the same state.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::data::dataset::{masks_to_tensor, sequences_to_tensor};
use crate::data::ledger::Ledger;
use crate::features::{FeatureNormalizer, MatchupEncoder, PlayerIndex};
use crate::model::{load_artifacts, TennisLstm};
use crate::training::trainer::tensor_values;
use crate::{ConfidenceLevel, Prediction, Result, TennisError};

/// Raw model input at the service boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(rename = "X1")]
    pub x1: Vec<Vec<f32>>,
    #[serde(rename = "X2")]
    pub x2: Vec<Vec<f32>>,
    #[serde(rename = "M1")]
    pub m1: Vec<f32>,
    #[serde(rename = "M2")]
    pub m2: Vec<f32>,
}

impl PredictionRequest {
    /// Reject empty or inconsistent arrays before they reach a model
    pub fn validate(&self, num_features: usize) -> Result<()> {
        let seq_len = self.x1.len();
        if seq_len == 0 || self.x2.is_empty() {
            return Err(TennisError::ShapeMismatch("X1 and X2 must be non-empty".to_string()));
        }
        if self.x2.len() != seq_len {
            return Err(TennisError::ShapeMismatch(format!(
                "X1 has {} steps but X2 has {}",
                seq_len,
                self.x2.len()
            )));
        }
        if self.m1.len() != seq_len || self.m2.len() != seq_len {
            return Err(TennisError::ShapeMismatch(format!(
                "masks have {}/{} steps, sequences have {}",
                self.m1.len(),
                self.m2.len(),
                seq_len
            )));
        }
        if let Some(row) = self
            .x1
            .iter()
            .chain(&self.x2)
            .find(|r| r.len() != num_features)
        {
            return Err(TennisError::ShapeMismatch(format!(
                "step has {} features, expected {}",
                row.len(),
                num_features
            )));
        }
        Ok(())
    }
}

/// Response returned to the service layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub player_a_win_probability: f32,
}

/// Anything that maps a normalised matchup to P(player A wins)
pub trait MatchupModel {
    fn win_probability(&self, input: &PredictionRequest) -> Result<f32>;
}

/// Trained network bound to a device
pub struct LoadedModel<B: Backend> {
    model: TennisLstm<B>,
    device: B::Device,
}

impl<B: Backend> LoadedModel<B> {
    pub fn new(model: TennisLstm<B>, device: B::Device) -> Self {
        LoadedModel { model, device }
    }
}

impl<B: Backend> MatchupModel for LoadedModel<B> {
    fn win_probability(&self, input: &PredictionRequest) -> Result<f32> {
        let x1 = sequences_to_tensor::<B>(&[input.x1.as_slice()], &self.device);
        let x2 = sequences_to_tensor::<B>(&[input.x2.as_slice()], &self.device);
        let m1 = masks_to_tensor::<B>(&[input.m1.as_slice()], &self.device);
        let m2 = masks_to_tensor::<B>(&[input.m2.as_slice()], &self.device);

        let probs = tensor_values(self.model.forward_prob(x1, x2, m1, m2))?;
        probs
            .first()
            .copied()
            .ok_or_else(|| TennisError::Model("model returned no output".to_string()))
    }
}

/// Deterministic stand-in: sigmoid of the mean feature gap between players
#[derive(Debug, Clone, Copy, Default)]
pub struct StubModel;

impl MatchupModel for StubModel {
    fn win_probability(&self, input: &PredictionRequest) -> Result<f32> {
        let mean = |seq: &[Vec<f32>]| {
            let n = seq.iter().map(|r| r.len()).sum::<usize>().max(1);
            seq.iter().flatten().sum::<f32>() / n as f32
        };
        let gap = mean(&input.x1) - mean(&input.x2);
        Ok(1.0 / (1.0 + (-gap).exp()))
    }
}

/// Shared read-only state for answering prediction queries
pub struct InferenceContext<M: MatchupModel> {
    index: PlayerIndex,
    encoder: MatchupEncoder,
    normalizer: FeatureNormalizer,
    model: M,
}

impl<B: Backend> InferenceContext<LoadedModel<B>>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Load saved artifacts and index the ledger.
    ///
    /// Fails fast if the ledger's stats differ from those the model was trained on.
    pub fn load(ledger: &Ledger, model_path: &str, device: B::Device) -> Result<Self> {
        let (model, manifest) = load_artifacts::<B>(&device, model_path)?;
        if manifest.stats != ledger.stats() {
            return Err(TennisError::Config(format!(
                "model was trained on stats {:?} but the ledger has {:?}",
                manifest.stats,
                ledger.stats()
            )));
        }
        let encoder = manifest.encoder();
        Self::new(
            PlayerIndex::build(ledger),
            encoder,
            manifest.normalizer,
            LoadedModel::new(model, device),
        )
    }
}

impl<M: MatchupModel> InferenceContext<M> {
    pub fn new(
        index: PlayerIndex,
        encoder: MatchupEncoder,
        normalizer: FeatureNormalizer,
        model: M,
    ) -> Result<Self> {
        if normalizer.width() != encoder.feature_width() {
            return Err(TennisError::Config(format!(
                "normalizer covers {} features, encoder produces {}",
                normalizer.width(),
                encoder.feature_width()
            )));
        }
        Ok(InferenceContext {
            index,
            encoder,
            normalizer,
            model,
        })
    }

    pub fn index(&self) -> &PlayerIndex {
        &self.index
    }

    pub fn lookback(&self) -> usize {
        self.encoder.lookback()
    }

    /// P(player_a beats player_b) using the trained lookback
    pub fn predict(&self, player_a: &str, player_b: &str) -> Result<f32> {
        self.predict_with_lookback(player_a, player_b, self.encoder.lookback())
    }

    /// P(player_a beats player_b) from each player's last `lookback` matches.
    ///
    /// The pair is always evaluated in lexicographic order and the result
    /// inverted when the caller's order differs.
    pub fn predict_with_lookback(&self, player_a: &str, player_b: &str, lookback: usize) -> Result<f32> {
        if player_a == player_b {
            return Ok(0.5);
        }
        if lookback == 0 {
            return Err(TennisError::Config("lookback must be at least 1".to_string()));
        }

        let swapped = player_b < player_a;
        let (first, second) = if swapped {
            (player_b, player_a)
        } else {
            (player_a, player_b)
        };

        let encoder = self.encoder.with_lookback(lookback);
        let matchup = encoder.encode(&self.index, first, second, None)?;
        let request = PredictionRequest {
            x1: matchup.features_a,
            x2: matchup.features_b,
            m1: matchup.mask_a,
            m2: matchup.mask_b,
        };
        let p = self.evaluate(request)?;

        Ok(if swapped { 1.0 - p } else { p })
    }

    /// Full prediction with head-to-head record and confidence
    pub fn prediction(&self, player_a: &str, player_b: &str) -> Result<Prediction> {
        let p = self.predict(player_a, player_b)?;
        let h2h = self.index.head_to_head(player_a, player_b, None);
        let history_len = |player: &str| {
            self.index
                .recent_before(player, None, self.lookback() + 1)
                .len()
                .saturating_sub(1)
        };
        let confidence = compute_confidence(history_len(player_a), history_len(player_b), self.lookback());

        Ok(Prediction {
            player_a: player_a.to_string(),
            player_b: player_b.to_string(),
            player_a_win_prob: p,
            h2h_wins: h2h.wins,
            h2h_total: h2h.total,
            confidence,
        })
    }

    /// Answer a raw request: validate, normalise, evaluate
    pub fn predict_request(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        let p = self.evaluate(request.clone())?;
        Ok(PredictionResponse {
            player_a_win_probability: p,
        })
    }

    fn evaluate(&self, mut request: PredictionRequest) -> Result<f32> {
        request.validate(self.normalizer.width())?;
        self.normalizer.transform_sequence(&mut request.x1)?;
        self.normalizer.transform_sequence(&mut request.x2)?;
        let p = self.model.win_probability(&request)?;
        Ok(p.clamp(0.0, 1.0))
    }
}

/// Confidence from how much of the lookback each player fills
pub fn compute_confidence(history_a: usize, history_b: usize, lookback: usize) -> ConfidenceLevel {
    let full = |n: usize| n * 4 >= lookback * 3;
    let half = |n: usize| n * 2 >= lookback;
    if full(history_a) && full(history_b) {
        ConfidenceLevel::High
    } else if half(history_a) || half(history_b) {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Format prediction for display
pub fn format_prediction(pred: &Prediction) -> String {
    let win_prob = if pred.player_a_win_prob >= 0.5 {
        pred.player_a_win_prob
    } else {
        1.0 - pred.player_a_win_prob
    };

    format!(
        r#"
┌─────────────────────────────────────────────────┐
│  {} vs {}
├─────────────────────────────────────────────────┤
│  Win probability:  {} {:.1}%
│  Head-to-head:     {} - {}
│  Confidence:       {}
└─────────────────────────────────────────────────┘
"#,
        pred.player_a,
        pred.player_b,
        pred.predicted_winner(),
        win_prob * 100.0,
        pred.h2h_wins,
        pred.h2h_total - pred.h2h_wins,
        pred.confidence
    )
}
