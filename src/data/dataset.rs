//! Training samples, the on-disk dataset artifact, and Burn batching
//!
//! Every ledger match yields two samples: winner as player A (label 1) and
//! loser as player A (label 0). Histories are cut strictly before the match
//! date so no sample sees its own result.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::data::ledger::Ledger;
use crate::features::{FeatureNormalizer, Matchup, MatchupEncoder, PlayerIndex};
use crate::{Result, TennisError};

/// One ordered matchup with its outcome for player A
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupSample {
    /// [lookback][features]
    pub x1: Vec<Vec<f32>>,
    pub x2: Vec<Vec<f32>>,
    /// [lookback]
    pub m1: Vec<f32>,
    pub m2: Vec<f32>,
    /// 1.0 if player A won
    pub label: f32,
}

impl MatchupSample {
    pub fn from_matchup(matchup: Matchup, label: f32) -> Self {
        MatchupSample {
            x1: matchup.features_a,
            x2: matchup.features_b,
            m1: matchup.mask_a,
            m2: matchup.mask_b,
            label,
        }
    }

    /// Standardise both sequences in place
    pub fn normalize(&mut self, normalizer: &FeatureNormalizer) -> Result<()> {
        normalizer.transform_sequence(&mut self.x1)?;
        normalizer.transform_sequence(&mut self.x2)
    }

    /// Every feature row of both players
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.x1.iter().chain(self.x2.iter()).map(|r| r.as_slice())
    }
}

/// Serialised training set, stored as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub lookback: usize,
    pub num_features: usize,
    pub stats: Vec<String>,
    pub surface_one_hot: bool,
    #[serde(rename = "X1")]
    pub x1: Vec<Vec<Vec<f32>>>,
    #[serde(rename = "X2")]
    pub x2: Vec<Vec<Vec<f32>>>,
    #[serde(rename = "M1")]
    pub m1: Vec<Vec<f32>>,
    #[serde(rename = "M2")]
    pub m2: Vec<Vec<f32>>,
    pub y: Vec<f32>,
}

impl TrainingDataset {
    /// Build both orientations of every ledger match, in date order
    pub fn build(ledger: &Ledger, encoder: &MatchupEncoder) -> Result<Self> {
        let index = PlayerIndex::build(ledger);
        let mut samples = Vec::with_capacity(ledger.len() * 2);

        for m in ledger.matches() {
            let matchup = encoder.encode(&index, &m.winner, &m.loser, Some(m.date))?;
            samples.push(MatchupSample::from_matchup(matchup.clone(), 1.0));
            samples.push(MatchupSample::from_matchup(matchup.swapped(), 0.0));
        }

        log::info!(
            "Built {} samples from {} matches ({} players)",
            samples.len(),
            ledger.len(),
            index.num_players()
        );

        Ok(Self::from_samples(
            samples,
            encoder.lookback(),
            encoder.feature_width(),
            ledger.stats().to_vec(),
            encoder.surface_one_hot(),
        ))
    }

    pub fn from_samples(
        samples: Vec<MatchupSample>,
        lookback: usize,
        num_features: usize,
        stats: Vec<String>,
        surface_one_hot: bool,
    ) -> Self {
        let mut dataset = TrainingDataset {
            lookback,
            num_features,
            stats,
            surface_one_hot,
            x1: Vec::with_capacity(samples.len()),
            x2: Vec::with_capacity(samples.len()),
            m1: Vec::with_capacity(samples.len()),
            m2: Vec::with_capacity(samples.len()),
            y: Vec::with_capacity(samples.len()),
        };
        for s in samples {
            dataset.x1.push(s.x1);
            dataset.x2.push(s.x2);
            dataset.m1.push(s.m1);
            dataset.m2.push(s.m2);
            dataset.y.push(s.label);
        }
        dataset
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Check every array against (samples, lookback, num_features), then
    /// labels and masks against {0, 1}
    pub fn validate(&self) -> Result<()> {
        let n = self.y.len();
        if self.x1.len() != n || self.x2.len() != n || self.m1.len() != n || self.m2.len() != n {
            return Err(TennisError::ShapeMismatch(format!(
                "array lengths differ: X1={}, X2={}, M1={}, M2={}, y={}",
                self.x1.len(),
                self.x2.len(),
                self.m1.len(),
                self.m2.len(),
                n
            )));
        }
        for i in 0..n {
            check_sample_shape(&self.x1[i], &self.m1[i], self.lookback, self.num_features)
                .and_then(|_| {
                    check_sample_shape(&self.x2[i], &self.m2[i], self.lookback, self.num_features)
                })
                .map_err(|e| TennisError::ShapeMismatch(format!("sample {}: {}", i, e)))?;
        }
        if let Some((i, label)) = self.y.iter().enumerate().find(|(_, y)| !is_binary(**y)) {
            return Err(TennisError::ShapeMismatch(format!(
                "sample {}: label {} is not 0 or 1",
                i, label
            )));
        }
        Ok(())
    }

    /// Unpack into per-sample structs
    pub fn into_samples(self) -> Vec<MatchupSample> {
        self.x1
            .into_iter()
            .zip(self.x2)
            .zip(self.m1)
            .zip(self.m2)
            .zip(self.y)
            .map(|((((x1, x2), m1), m2), label)| MatchupSample {
                x1,
                x2,
                m1,
                m2,
                label,
            })
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        let dataset: TrainingDataset = serde_json::from_reader(file)?;
        dataset.validate()?;
        Ok(dataset)
    }
}

/// Check one player's sequence and mask against (lookback, num_features)
pub fn check_sample_shape(
    sequence: &[Vec<f32>],
    mask: &[f32],
    lookback: usize,
    num_features: usize,
) -> std::result::Result<(), String> {
    if sequence.len() != lookback {
        return Err(format!("sequence has {} steps, expected {}", sequence.len(), lookback));
    }
    if mask.len() != lookback {
        return Err(format!("mask has {} steps, expected {}", mask.len(), lookback));
    }
    if let Some(row) = sequence.iter().find(|r| r.len() != num_features) {
        return Err(format!("step has {} features, expected {}", row.len(), num_features));
    }
    if sequence.iter().flatten().any(|x| !x.is_finite()) {
        return Err("sequence holds a non-finite value".to_string());
    }
    if let Some(m) = mask.iter().find(|m| !is_binary(**m)) {
        return Err(format!("mask value {} is not 0 or 1", m));
    }
    Ok(())
}

fn is_binary(value: f32) -> bool {
    value == 0.0 || value == 1.0
}

/// In-memory Burn dataset over matchup samples
#[derive(Debug, Clone, Default)]
pub struct MatchupDataset {
    samples: Vec<MatchupSample>,
}

impl MatchupDataset {
    pub fn new(samples: Vec<MatchupSample>) -> Self {
        MatchupDataset { samples }
    }

    pub fn samples(&self) -> &[MatchupSample] {
        &self.samples
    }
}

impl Dataset<MatchupSample> for MatchupDataset {
    fn get(&self, index: usize) -> Option<MatchupSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batch of matchup samples
#[derive(Debug, Clone)]
pub struct MatchupBatch<B: Backend> {
    /// Player A sequences: [batch, lookback, features]
    pub x1: Tensor<B, 3>,
    /// Player B sequences: [batch, lookback, features]
    pub x2: Tensor<B, 3>,
    /// Opponent masks: [batch, lookback]
    pub m1: Tensor<B, 2>,
    pub m2: Tensor<B, 2>,
    /// Labels: [batch, 1]
    pub labels: Tensor<B, 2>,
}

/// Batcher for creating training batches
#[derive(Clone)]
pub struct MatchupBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> MatchupBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        MatchupBatcher { device }
    }
}

/// Stack sequences into a [batch, lookback, features] tensor
pub fn sequences_to_tensor<B: Backend>(sequences: &[&[Vec<f32>]], device: &B::Device) -> Tensor<B, 3> {
    let batch_size = sequences.len();
    let seq_len = sequences.first().map(|s| s.len()).unwrap_or(0);
    let feature_dim = sequences
        .first()
        .and_then(|s| s.first())
        .map(|r| r.len())
        .unwrap_or(0);

    let data: Vec<f32> = sequences
        .iter()
        .flat_map(|s| s.iter().flat_map(|r| r.iter().copied()))
        .collect();

    Tensor::<B, 1>::from_data(TensorData::new(data, [batch_size * seq_len * feature_dim]), device)
        .reshape([batch_size, seq_len, feature_dim])
}

/// Stack masks into a [batch, lookback] tensor
pub fn masks_to_tensor<B: Backend>(masks: &[&[f32]], device: &B::Device) -> Tensor<B, 2> {
    let batch_size = masks.len();
    let seq_len = masks.first().map(|m| m.len()).unwrap_or(0);
    let data: Vec<f32> = masks.iter().flat_map(|m| m.iter().copied()).collect();
    Tensor::<B, 1>::from_data(TensorData::new(data, [batch_size * seq_len]), device)
        .reshape([batch_size, seq_len])
}

impl<B: Backend> Batcher<B, MatchupSample, MatchupBatch<B>> for MatchupBatcher<B> {
    fn batch(&self, items: Vec<MatchupSample>, _device: &B::Device) -> MatchupBatch<B> {
        let x1: Vec<&[Vec<f32>]> = items.iter().map(|s| s.x1.as_slice()).collect();
        let x2: Vec<&[Vec<f32>]> = items.iter().map(|s| s.x2.as_slice()).collect();
        let m1: Vec<&[f32]> = items.iter().map(|s| s.m1.as_slice()).collect();
        let m2: Vec<&[f32]> = items.iter().map(|s| s.m2.as_slice()).collect();
        let labels: Vec<f32> = items.iter().map(|s| s.label).collect();

        MatchupBatch {
            x1: sequences_to_tensor(&x1, &self.device),
            x2: sequences_to_tensor(&x2, &self.device),
            m1: masks_to_tensor(&m1, &self.device),
            m2: masks_to_tensor(&m2, &self.device),
            labels: Tensor::<B, 1>::from_data(TensorData::new(labels, [items.len()]), &self.device)
                .reshape([items.len(), 1]),
        }
    }
}
