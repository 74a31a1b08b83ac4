//! Training loop and loss computation

use burn::data::dataloader::DataLoaderBuilder;
use burn::grad_clipping::GradientClippingConfig;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use chrono::Utc;

use crate::data::dataset::{MatchupBatch, MatchupBatcher, MatchupDataset, MatchupSample, TrainingDataset};
use crate::features::FeatureNormalizer;
use crate::model::{ArtifactManifest, TennisLstm, TennisLstmConfig};
use crate::training::metrics::{Metrics, TrainingHistory};
use crate::training::schedule::{EarlyStopping, PlateauScheduler};
use crate::{Config, Result, TennisError, TrainingConfig};

/// Shuffle seed for the training loader
const SHUFFLE_SEED: u64 = 42;

/// Binary cross-entropy on probabilities
pub fn binary_cross_entropy<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let eps = 1e-7;
    let probs_clamped = probs.clamp(eps, 1.0 - eps);
    let loss = targets.clone().neg() * probs_clamped.clone().log()
        - (targets.neg() + 1.0) * (probs_clamped.neg() + 1.0).log();
    loss.mean()
}

/// Copy a tensor's values out as f32
pub fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TennisError::Model(format!("failed to read tensor data: {:?}", e)))
}

/// Split samples in order: the last `test_size` fraction of matches is validation.
///
/// Samples come in (winner-as-A, loser-as-A) pairs, so the cut is sized in
/// whole matches and both orientations always land on the same side.
pub fn chronological_split(
    mut samples: Vec<MatchupSample>,
    test_size: f64,
) -> (Vec<MatchupSample>, Vec<MatchupSample>) {
    let n_matches = samples.len() / 2;
    let n_test = (((n_matches as f64) * test_size).ceil() as usize * 2).min(samples.len());
    let n_train = samples.len() - n_test;
    let val = samples.split_off(n_train);
    (samples, val)
}

/// Drop trailing samples so the length is a multiple of `batch_size`
pub fn trim_to_batch<T>(samples: &mut Vec<T>, batch_size: usize) {
    let keep = (samples.len() / batch_size) * batch_size;
    samples.truncate(keep);
}

/// Normalised, batch-aligned train and validation sets
#[derive(Debug, Clone)]
pub struct PreparedSplits {
    pub train: MatchupDataset,
    pub val: MatchupDataset,
    pub normalizer: FeatureNormalizer,
}

/// Split, fit the normalizer on training rows only, normalise, and trim.
///
/// Fails when either split cannot fill a single batch.
pub fn prepare_splits(dataset: TrainingDataset, config: &TrainingConfig) -> Result<PreparedSplits> {
    dataset.validate()?;
    let width = dataset.num_features;
    let (mut train, mut val) = chronological_split(dataset.into_samples(), config.test_size);

    for (split, samples) in [("training", &train), ("validation", &val)] {
        if samples.len() < config.batch_size {
            return Err(TennisError::InsufficientSamples {
                split,
                samples: samples.len(),
                batch_size: config.batch_size,
            });
        }
    }

    let normalizer = FeatureNormalizer::fit(train.iter().flat_map(|s| s.rows()), width)?;
    for sample in train.iter_mut().chain(val.iter_mut()) {
        sample.normalize(&normalizer)?;
    }

    trim_to_batch(&mut train, config.batch_size);
    trim_to_batch(&mut val, config.batch_size);
    log::info!(
        "Prepared {} training and {} validation samples (batch size {})",
        train.len(),
        val.len(),
        config.batch_size
    );

    Ok(PreparedSplits {
        train: MatchupDataset::new(train),
        val: MatchupDataset::new(val),
        normalizer,
    })
}

/// Model and history produced by a training run
pub struct TrainingOutcome<B: Backend> {
    pub model: TennisLstm<B>,
    pub history: TrainingHistory,
}

/// Trainer for the TennisLstm model
pub struct Trainer<B: AutodiffBackend> {
    model: TennisLstm<B>,
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: TennisLstm<B>, config: TrainingConfig, device: B::Device) -> Self {
        Trainer {
            model,
            config,
            device,
        }
    }

    /// Train until `max_epochs` or early stopping, returning the best model
    pub fn train(
        mut self,
        train_dataset: MatchupDataset,
        val_dataset: MatchupDataset,
    ) -> Result<TrainingOutcome<B::InnerBackend>> {
        let batcher_train = MatchupBatcher::<B>::new(self.device.clone());
        let batcher_val = MatchupBatcher::<B::InnerBackend>::new(self.device.clone());

        let train_loader = DataLoaderBuilder::new(batcher_train)
            .batch_size(self.config.batch_size)
            .shuffle(SHUFFLE_SEED)
            .build(train_dataset);

        let val_loader = DataLoaderBuilder::new(batcher_val)
            .batch_size(self.config.batch_size)
            .build(val_dataset);

        let mut optimizer = AdamWConfig::new()
            .with_weight_decay(self.config.weight_decay as f32)
            .with_grad_clipping(Some(GradientClippingConfig::Norm(self.config.grad_clip_norm)))
            .init::<B, TennisLstm<B>>();

        let mut history = TrainingHistory::new();
        let mut early_stopping = EarlyStopping::new(
            self.config.early_stopping_patience,
            self.config.min_delta,
        );
        let mut scheduler = PlateauScheduler::new(
            self.config.learning_rate,
            self.config.lr_factor,
            self.config.lr_patience,
        );

        log::info!(
            "Starting training for up to {} epochs ({} parameters)",
            self.config.max_epochs,
            self.model.num_params()
        );

        if self.config.max_epochs == 0 {
            return Err(TennisError::Config("training.max_epochs must be at least 1".to_string()));
        }

        for epoch in 0..self.config.max_epochs {
            let learning_rate = scheduler.learning_rate();

            let train_metrics = self.train_epoch(&mut optimizer, train_loader.iter(), learning_rate)?;
            let val_metrics = self.validate_epoch(&self.model.valid(), val_loader.iter())?;

            history.record_epoch(epoch, &train_metrics, &val_metrics, learning_rate);

            log::info!(
                "Epoch {}/{}: Train: {} | Val: {} | lr: {:.2e}",
                epoch + 1,
                self.config.max_epochs,
                train_metrics,
                val_metrics,
                learning_rate
            );

            if early_stopping.step(epoch, val_metrics.f1(), &self.model) {
                log::info!(
                    "Early stopping at epoch {} (best was epoch {})",
                    epoch + 1,
                    early_stopping.best_epoch() + 1
                );
                history.stopped_early = true;
                break;
            }

            scheduler.step(val_metrics.f1());
        }

        history.best_epoch = early_stopping.best_epoch();
        history.best_val_f1 = early_stopping.best_score().unwrap_or(0.0);
        let best = early_stopping.into_best().unwrap_or(self.model);

        Ok(TrainingOutcome {
            model: best.valid(),
            history,
        })
    }

    /// Train one epoch
    fn train_epoch<O>(
        &mut self,
        optimizer: &mut O,
        loader: impl Iterator<Item = MatchupBatch<B>>,
        learning_rate: f64,
    ) -> Result<Metrics>
    where
        O: Optimizer<TennisLstm<B>, B>,
    {
        let mut metrics = Metrics::new();

        for batch in loader {
            let probs = self.model.forward_prob(batch.x1, batch.x2, batch.m1, batch.m2);
            let loss = binary_cross_entropy(probs.clone(), batch.labels.clone());
            let loss_val: f32 = loss.clone().into_scalar().elem();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = optimizer.step(learning_rate, self.model.clone(), grads);

            metrics.update(loss_val, &tensor_values(probs)?, &tensor_values(batch.labels)?);
        }

        Ok(metrics)
    }

    /// Validate one epoch (inference mode, no gradient tracking)
    fn validate_epoch(
        &self,
        model: &TennisLstm<B::InnerBackend>,
        loader: impl Iterator<Item = MatchupBatch<B::InnerBackend>>,
    ) -> Result<Metrics> {
        let mut metrics = Metrics::new();

        for batch in loader {
            let probs = model.forward_prob(batch.x1, batch.x2, batch.m1, batch.m2);
            let loss = binary_cross_entropy(probs.clone(), batch.labels.clone());
            let loss_val: f32 = loss.into_scalar().elem();

            metrics.update(loss_val, &tensor_values(probs)?, &tensor_values(batch.labels)?);
        }

        Ok(metrics)
    }
}

/// Full offline run: prepare splits, train, and describe the result
pub fn run_training<B: AutodiffBackend>(
    dataset: TrainingDataset,
    config: &Config,
    device: B::Device,
) -> Result<(TrainingOutcome<B::InnerBackend>, ArtifactManifest)> {
    let lookback = dataset.lookback;
    let surface_one_hot = dataset.surface_one_hot;
    let stats = dataset.stats.clone();
    let model_config = TennisLstmConfig::from_model_config(&config.model, dataset.num_features);

    let splits = prepare_splits(dataset, &config.training)?;
    let model = TennisLstm::<B>::new(&device, &model_config);
    let outcome = Trainer::new(model, config.training.clone(), device).train(splits.train, splits.val)?;

    let manifest = ArtifactManifest {
        model: model_config,
        lookback,
        surface_one_hot,
        stats,
        normalizer: splits.normalizer,
        best_epoch: outcome.history.best_epoch,
        best_val_f1: outcome.history.best_val_f1,
        trained_at: Utc::now(),
    };
    manifest.validate()?;

    Ok((outcome, manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn sample(label: f32, value: f32) -> MatchupSample {
        MatchupSample {
            x1: vec![vec![value, 1.0, 2.0]; 2],
            x2: vec![vec![-value, 1.0, 2.0]; 2],
            m1: vec![0.0, 1.0],
            m2: vec![0.0, 1.0],
            label,
        }
    }

    fn dataset(n: usize) -> TrainingDataset {
        let samples = (0..n)
            .map(|i| sample((i % 2) as f32, if i % 2 == 0 { -1.0 } else { 1.0 }))
            .collect();
        TrainingDataset::from_samples(samples, 2, 3, Vec::new(), false)
    }

    #[test]
    fn test_chronological_split_keeps_order() {
        let samples: Vec<MatchupSample> = (0..10).map(|i| sample(1.0, i as f32)).collect();
        let (train, val) = chronological_split(samples, 0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(train[7].x1[0][0], 7.0);
        assert_eq!(val[0].x1[0][0], 8.0);
    }

    #[test]
    fn test_split_never_separates_a_match() {
        // Samples 2k and 2k+1 are the two orientations of match k
        let samples: Vec<MatchupSample> = (0..10).map(|i| sample(1.0, (i / 2) as f32)).collect();
        let (train, val) = chronological_split(samples, 0.25);
        assert_eq!(train.len(), 6);
        assert_eq!(val.len(), 4);
        assert_ne!(train.last().unwrap().x1[0][0], val[0].x1[0][0]);
        assert_eq!(val[0].x1[0][0], 3.0);
    }

    #[test]
    fn test_trim_to_batch() {
        let mut v: Vec<u32> = (0..11).collect();
        trim_to_batch(&mut v, 4);
        assert_eq!(v.len(), 8);
        trim_to_batch(&mut v, 3);
        assert_eq!(v.len(), 6);
    }

    #[test]
    fn test_prepare_splits_fits_on_train_only() {
        let mut config = Config::default().training;
        config.batch_size = 2;
        config.test_size = 0.25;
        let splits = prepare_splits(dataset(10), &config).unwrap();
        // 5 matches: 3 train / 2 val
        assert_eq!(splits.train.samples().len(), 6);
        assert_eq!(splits.val.samples().len(), 4);
        assert_eq!(splits.normalizer.width(), 3);
        // Train rows alternate -1/+1 in the first feature
        assert!(splits.normalizer.mean[0].abs() < 0.2);
    }

    #[test]
    fn test_insufficient_samples() {
        let mut config = Config::default().training;
        config.batch_size = 4;
        config.test_size = 0.25;
        match prepare_splits(dataset(8), &config) {
            Err(TennisError::InsufficientSamples { split, samples, batch_size }) => {
                assert_eq!(split, "validation");
                assert_eq!(samples, 2);
                assert_eq!(batch_size, 4);
            }
            _ => panic!("expected InsufficientSamples"),
        }
    }

    #[test]
    fn test_bce_matches_hand_computation() {
        let device = Default::default();
        let probs = Tensor::<TestBackend, 1>::from_floats([0.8, 0.4], &device).reshape([2, 1]);
        let targets = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0], &device).reshape([2, 1]);
        let loss: f32 = binary_cross_entropy(probs, targets).into_scalar();
        let expected = -(0.8f32.ln() + 0.6f32.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_training_runs_and_records_history() {
        let mut config = Config::default();
        config.model.hidden_size = 8;
        config.model.num_layers = 1;
        config.model.head_hidden = 4;
        config.training.batch_size = 4;
        config.training.max_epochs = 3;
        config.training.test_size = 0.25;

        let (outcome, manifest) =
            run_training::<TestAutodiffBackend>(dataset(16), &config, Default::default()).unwrap();

        assert!(outcome.history.epochs() >= 1 && outcome.history.epochs() <= 3);
        assert!(outcome.history.train_losses.iter().all(|l| l.is_finite()));
        assert_eq!(manifest.model.input_size, 3);
        assert_eq!(manifest.lookback, 2);
    }

    #[test]
    fn test_zero_epochs_is_an_error() {
        let mut config = Config::default();
        config.model.hidden_size = 8;
        config.model.num_layers = 1;
        config.training.batch_size = 4;
        config.training.max_epochs = 0;
        config.training.test_size = 0.25;

        let result = run_training::<TestAutodiffBackend>(dataset(16), &config, Default::default());
        assert!(matches!(result, Err(TennisError::Config(_))));
    }
}
