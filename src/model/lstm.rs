//! LSTM model for tennis match prediction
//!
//! Both players' histories run through the same recurrent encoder; the
//! pooled contexts are compared by an antisymmetric head.

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Lstm, LstmConfig};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::attention::{AttentionConfig, OpponentAttention};
use super::heads::{CombinationHead, HeadConfig};
use crate::{ModelConfig, Result, TennisError};

/// Architecture hyperparameters, persisted alongside the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TennisLstmConfig {
    /// Per-step feature width
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout: f64,
    pub head_hidden: usize,
    pub opponent_bias: f32,
    pub attention_temperature: f32,
}

impl TennisLstmConfig {
    pub fn from_model_config(config: &ModelConfig, input_size: usize) -> Self {
        TennisLstmConfig {
            input_size,
            hidden_size: config.hidden_size,
            num_layers: config.num_layers,
            dropout: config.dropout,
            head_hidden: config.head_hidden,
            opponent_bias: config.opponent_bias,
            attention_temperature: config.attention_temperature,
        }
    }
}

/// LSTM encoder with opponent attention and a difference head
///
/// Architecture:
/// 1. Stacked LSTM (dropout between layers) over each history
/// 2. LayerNorm + opponent-biased attention pooling -> context
/// 3. Antisymmetric head on (context_a, context_b) -> win logit
#[derive(Module, Debug)]
pub struct TennisLstm<B: Backend> {
    layers: Vec<Lstm<B>>,
    layer_dropout: Dropout,
    attention: OpponentAttention<B>,
    head: CombinationHead<B>,
}

impl<B: Backend> TennisLstm<B> {
    pub fn new(device: &B::Device, config: &TennisLstmConfig) -> Self {
        let layers = (0..config.num_layers)
            .map(|i| {
                let input = if i == 0 { config.input_size } else { config.hidden_size };
                LstmConfig::new(input, config.hidden_size, true).init(device)
            })
            .collect();

        let attention = OpponentAttention::new(
            device,
            &AttentionConfig {
                hidden_size: config.hidden_size,
                opponent_bias: config.opponent_bias,
                temperature: config.attention_temperature,
            },
        );

        let head = CombinationHead::new(
            device,
            &HeadConfig {
                input_dim: config.hidden_size,
                hidden_dim: config.head_hidden,
                dropout: config.dropout,
            },
        );

        TennisLstm {
            layers,
            layer_dropout: DropoutConfig::new(config.dropout).init(),
            attention,
            head,
        }
    }

    /// Encode a batch of histories into context vectors
    ///
    /// # Arguments
    /// * `sequence` - Padded histories [batch, seq_len, input_size]
    /// * `opponent_mask` - Optional head-to-head mask [batch, seq_len]
    ///
    /// # Returns
    /// Context vectors [batch, hidden_size]
    pub fn encode(&self, sequence: Tensor<B, 3>, opponent_mask: Option<Tensor<B, 2>>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = sequence;
        for (i, lstm) in self.layers.iter().enumerate() {
            let (output, _) = lstm.forward(x, None);
            x = if i < last {
                self.layer_dropout.forward(output)
            } else {
                output
            };
        }
        let (context, _) = self.attention.forward(x, opponent_mask);
        context
    }

    /// Win logit for player A from two context vectors [batch, 1]
    pub fn combine(&self, context_a: Tensor<B, 2>, context_b: Tensor<B, 2>) -> Tensor<B, 2> {
        self.head.forward(context_a, context_b)
    }

    /// Forward pass returning the win logit for player A [batch, 1]
    pub fn forward(
        &self,
        x1: Tensor<B, 3>,
        x2: Tensor<B, 3>,
        m1: Tensor<B, 2>,
        m2: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let context_a = self.encode(x1, Some(m1));
        let context_b = self.encode(x2, Some(m2));
        self.combine(context_a, context_b)
    }

    /// Forward pass returning the win probability for player A [batch, 1]
    pub fn forward_prob(
        &self,
        x1: Tensor<B, 3>,
        x2: Tensor<B, 3>,
        m1: Tensor<B, 2>,
        m2: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        sigmoid(self.forward(x1, x2, m1, m2))
    }

    /// Save weights to `<path>.mpk`
    pub fn save(&self, path: &str) -> Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.into())
            .map_err(|e| TennisError::Model(format!("failed to save weights to {}: {}", path, e)))
    }

    /// Load weights saved by [`TennisLstm::save`]
    pub fn load(device: &B::Device, path: &str, config: &TennisLstmConfig) -> Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.into(), device)
            .map_err(|e| TennisError::Model(format!("failed to load weights from {}: {}", path, e)))?;

        let model = Self::new(device, config);
        Ok(model.load_record(record))
    }
}
