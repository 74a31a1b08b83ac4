//! Combination head turning two context vectors into a win logit

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for the combination head
#[derive(Debug, Clone)]
pub struct HeadConfig {
    /// Context vector dimension
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub dropout: f64,
}

/// Antisymmetric difference head.
///
/// `logit(a, b) = g(a - b) - g(b - a)`, so swapping the players negates the
/// logit and the sigmoid output becomes `1 - p` (exactly, in eval mode).
#[derive(Module, Debug)]
pub struct CombinationHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> CombinationHead<B> {
    pub fn new(device: &B::Device, config: &HeadConfig) -> Self {
        CombinationHead {
            fc1: LinearConfig::new(config.input_dim, config.hidden_dim).init(device),
            fc2: LinearConfig::new(config.hidden_dim, 1).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }

    fn score(&self, diff: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(diff));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Win logit for player A [batch, 1]
    pub fn forward(&self, context_a: Tensor<B, 2>, context_b: Tensor<B, 2>) -> Tensor<B, 2> {
        let diff = context_a - context_b;
        self.score(diff.clone()) - self.score(diff.neg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_swapping_negates_logit() {
        let device = Default::default();
        let config = HeadConfig {
            input_dim: 6,
            hidden_dim: 4,
            dropout: 0.5,
        };
        let head = CombinationHead::<TestBackend>::new(&device, &config);
        let a = Tensor::<TestBackend, 2>::random([5, 6], Distribution::Normal(0.0, 1.0), &device);
        let b = Tensor::<TestBackend, 2>::random([5, 6], Distribution::Normal(0.0, 1.0), &device);

        let ab = head.forward(a.clone(), b.clone());
        let ba = head.forward(b, a);
        assert_eq!(ab.dims(), [5, 1]);

        let sum = (ab + ba).abs().max().into_scalar();
        assert!(sum < 1e-5);
    }

    #[test]
    fn test_equal_contexts_give_zero_logit() {
        let device = Default::default();
        let config = HeadConfig {
            input_dim: 3,
            hidden_dim: 2,
            dropout: 0.0,
        };
        let head = CombinationHead::<TestBackend>::new(&device, &config);
        let a = Tensor::<TestBackend, 2>::random([2, 3], Distribution::Normal(0.0, 1.0), &device);
        let logit = head.forward(a.clone(), a).abs().max().into_scalar();
        assert!(logit < 1e-6);
    }
}
