//! Attention pooling over a player's encoded match history
//!
//! Steps played against the current opponent receive an additive score bias
//! so head-to-head meetings dominate the pooled context.

use burn::module::{Module, Param};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::tensor::activation::{softmax, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

/// Lower bound applied to the learned temperature
const MIN_TEMPERATURE: f32 = 0.05;

/// Configuration for opponent attention
#[derive(Debug, Clone)]
pub struct AttentionConfig {
    pub hidden_size: usize,
    /// Score added at masked (head-to-head) steps
    pub opponent_bias: f32,
    /// Initial softmax temperature
    pub temperature: f32,
}

#[derive(Module, Debug)]
pub struct OpponentAttention<B: Backend> {
    norm: LayerNorm<B>,
    score_hidden: Linear<B>,
    score_out: Linear<B>,
    temperature: Param<Tensor<B, 1>>,
    opponent_bias: f32,
}

impl<B: Backend> OpponentAttention<B> {
    pub fn new(device: &B::Device, config: &AttentionConfig) -> Self {
        let score_dim = (config.hidden_size / 2).max(1);
        OpponentAttention {
            norm: LayerNormConfig::new(config.hidden_size).init(device),
            score_hidden: LinearConfig::new(config.hidden_size, score_dim).init(device),
            score_out: LinearConfig::new(score_dim, 1).init(device),
            temperature: Param::from_tensor(Tensor::full([1], config.temperature, device)),
            opponent_bias: config.opponent_bias,
        }
    }

    /// Pool a sequence into a context vector
    ///
    /// # Arguments
    /// * `sequence` - Recurrent outputs [batch, seq_len, hidden]
    /// * `opponent_mask` - 1.0 at steps against the current opponent [batch, seq_len]
    ///
    /// # Returns
    /// (context [batch, hidden], weights [batch, seq_len])
    pub fn forward(
        &self,
        sequence: Tensor<B, 3>,
        opponent_mask: Option<Tensor<B, 2>>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch, seq_len, hidden] = sequence.dims();
        let sequence = self.norm.forward(sequence);

        // [batch, seq_len, 1]
        let scores = self.score_out.forward(tanh(self.score_hidden.forward(sequence.clone())));
        let scores = match opponent_mask {
            Some(mask) => {
                let mask: Tensor<B, 3> = mask.unsqueeze_dim(2);
                scores + mask.mul_scalar(self.opponent_bias)
            }
            None => scores,
        };

        let temperature = self
            .temperature
            .val()
            .clamp_min(MIN_TEMPERATURE)
            .reshape([1, 1, 1]);
        let weights = softmax(scores / temperature, 1);

        let context = (sequence * weights.clone())
            .sum_dim(1)
            .reshape([batch, hidden]);

        (context, weights.reshape([batch, seq_len]))
    }

    /// Current (clamped) softmax temperature
    pub fn temperature(&self) -> f32 {
        let t: f32 = self.temperature.val().into_scalar().elem();
        t.max(MIN_TEMPERATURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f32>;

    fn attention(bias: f32) -> OpponentAttention<TestBackend> {
        let config = AttentionConfig {
            hidden_size: 8,
            opponent_bias: bias,
            temperature: 0.5,
        };
        OpponentAttention::new(&Default::default(), &config)
    }

    #[test]
    fn test_output_shapes_and_weights_sum_to_one() {
        let device = Default::default();
        let attn = attention(2.0);
        let seq = Tensor::<TestBackend, 3>::random([3, 5, 8], Distribution::Normal(0.0, 1.0), &device);

        let (context, weights) = attn.forward(seq, None);
        assert_eq!(context.dims(), [3, 8]);
        assert_eq!(weights.dims(), [3, 5]);

        let sums = weights.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
        assert!((attn.temperature() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_opponent_mask_raises_weight() {
        let device = Default::default();
        let attn = attention(10.0);
        let seq = Tensor::<TestBackend, 3>::random([1, 4, 8], Distribution::Normal(0.0, 1.0), &device);
        let mask = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.0f32, 0.0, 1.0, 0.0]), &device)
            .reshape([1, 4]);

        let (_, plain) = attn.forward(seq.clone(), None);
        let (_, biased) = attn.forward(seq, Some(mask));

        let plain = plain.into_data().to_vec::<f32>().unwrap();
        let biased = biased.into_data().to_vec::<f32>().unwrap();
        assert!(biased[2] > plain[2]);
        assert!(biased[2] > 0.9);
    }
}
