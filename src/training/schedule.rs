//! Epoch-level training control: early stopping and plateau LR decay
//!
//! Both track validation F1, so higher is better.

/// Stops training once the score stalls and keeps the best model seen.
#[derive(Debug, Clone)]
pub struct EarlyStopping<M> {
    patience: usize,
    min_delta: f64,
    best_score: Option<f64>,
    best_state: Option<M>,
    counter: usize,
    best_epoch: usize,
}

impl<M: Clone> EarlyStopping<M> {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        EarlyStopping {
            patience,
            min_delta,
            best_score: None,
            best_state: None,
            counter: 0,
            best_epoch: 0,
        }
    }

    /// Record an epoch's score; returns true when training should stop.
    ///
    /// A score must beat the best by at least `min_delta` to reset the
    /// counter. The first epoch always becomes the best.
    pub fn step(&mut self, epoch: usize, score: f64, model: &M) -> bool {
        match self.best_score {
            Some(best) if score < best + self.min_delta => {
                self.counter += 1;
                log::debug!("No F1 improvement for {} epoch(s)", self.counter);
            }
            _ => {
                self.best_score = Some(score);
                self.best_state = Some(model.clone());
                self.best_epoch = epoch;
                self.counter = 0;
            }
        }
        self.counter >= self.patience
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// The best model seen, if any epoch was recorded
    pub fn into_best(self) -> Option<M> {
        self.best_state
    }
}

/// Multiplies the learning rate by `factor` once the score has failed to
/// improve for more than `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    learning_rate: f64,
    factor: f64,
    patience: usize,
    threshold: f64,
    best: f64,
    bad_epochs: usize,
}

impl PlateauScheduler {
    /// Relative improvement required to count as progress
    pub const DEFAULT_THRESHOLD: f64 = 1e-4;

    pub fn new(learning_rate: f64, factor: f64, patience: usize) -> Self {
        PlateauScheduler {
            learning_rate,
            factor,
            patience,
            threshold: Self::DEFAULT_THRESHOLD,
            best: f64::NEG_INFINITY,
            bad_epochs: 0,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Feed an epoch's score and return the learning rate for the next epoch
    pub fn step(&mut self, score: f64) -> f64 {
        if score > self.best * (1.0 + self.threshold) {
            self.best = score;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.patience {
            let reduced = self.learning_rate * self.factor;
            log::info!("Reducing learning rate {:.2e} -> {:.2e}", self.learning_rate, reduced);
            self.learning_rate = reduced;
            self.bad_epochs = 0;
        }
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_stopping_counts_small_gains_as_stalls() {
        let mut stopper = EarlyStopping::new(2, 0.01);
        assert!(!stopper.step(0, 0.50, &"e0"));
        assert!(!stopper.step(1, 0.505, &"e1"));
        assert!(stopper.step(2, 0.509, &"e2"));
        assert_eq!(stopper.best_epoch(), 0);
        assert_eq!(stopper.into_best(), Some("e0"));
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let mut stopper = EarlyStopping::new(2, 0.001);
        stopper.step(0, 0.4, &0);
        stopper.step(1, 0.3, &1);
        assert!(!stopper.step(2, 0.6, &2));
        assert!(!stopper.step(3, 0.55, &3));
        assert!(stopper.step(4, 0.59, &4));
        assert_eq!(stopper.best_score(), Some(0.6));
        assert_eq!(stopper.into_best(), Some(2));
    }

    #[test]
    fn test_plateau_halves_after_patience() {
        let mut sched = PlateauScheduler::new(1e-3, 0.5, 2);
        assert_eq!(sched.step(0.5), 1e-3);
        assert_eq!(sched.step(0.5), 1e-3);
        assert_eq!(sched.step(0.4), 1e-3);
        // Third stalled epoch exceeds patience
        assert_eq!(sched.step(0.5), 5e-4);
        // Counter restarted
        assert_eq!(sched.step(0.5), 5e-4);
        assert_eq!(sched.step(0.9), 5e-4);
    }
}
