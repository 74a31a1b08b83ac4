//! Training metrics and evaluation

use std::fmt;

/// Decision threshold on the predicted probability
pub const THRESHOLD: f32 = 0.5;

/// Binary classification metrics accumulated over batches
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub total_loss: f64,
    pub batch_count: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with a batch of probabilities and 0/1 labels
    pub fn update(&mut self, loss: f32, probs: &[f32], labels: &[f32]) {
        self.total_loss += loss as f64;
        self.batch_count += 1;
        for (&p, &y) in probs.iter().zip(labels) {
            match (p > THRESHOLD, y >= 0.5) {
                (true, true) => self.true_positives += 1,
                (true, false) => self.false_positives += 1,
                (false, false) => self.true_negatives += 1,
                (false, true) => self.false_negatives += 1,
            }
        }
    }

    pub fn total_predictions(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// Get average loss per batch
    pub fn avg_loss(&self) -> f64 {
        if self.batch_count == 0 {
            0.0
        } else {
            self.total_loss / self.batch_count as f64
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total_predictions())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean of precision and recall, 0 when both are 0
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loss: {:.4} | Acc: {:.2}% | P: {:.3} R: {:.3} F1: {:.3}",
            self.avg_loss(),
            self.accuracy() * 100.0,
            self.precision(),
            self.recall(),
            self.f1()
        )
    }
}

/// Training history for tracking progress
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub train_accuracies: Vec<f64>,
    pub val_accuracies: Vec<f64>,
    pub train_f1s: Vec<f64>,
    pub val_f1s: Vec<f64>,
    pub learning_rates: Vec<f64>,
    pub best_val_f1: f64,
    pub best_epoch: usize,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metrics for an epoch
    pub fn record_epoch(&mut self, epoch: usize, train: &Metrics, val: &Metrics, learning_rate: f64) {
        self.train_losses.push(train.avg_loss());
        self.val_losses.push(val.avg_loss());
        self.train_accuracies.push(train.accuracy());
        self.val_accuracies.push(val.accuracy());
        self.train_f1s.push(train.f1());
        self.val_f1s.push(val.f1());
        self.learning_rates.push(learning_rate);

        if epoch == 0 || val.f1() > self.best_val_f1 {
            self.best_val_f1 = val.f1();
            self.best_epoch = epoch;
        }
    }

    pub fn epochs(&self) -> usize {
        self.train_losses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_counts() {
        let mut m = Metrics::new();
        m.update(0.5, &[0.9, 0.8, 0.2, 0.6, 0.5], &[1.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(m.true_positives, 2);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.true_negatives, 1);
        // 0.5 is not above the threshold
        assert_eq!(m.false_negatives, 1);

        assert!((m.accuracy() - 0.6).abs() < 1e-9);
        assert!((m.precision() - 2.0 / 3.0).abs() < 1e-9);
        assert!((m.recall() - 2.0 / 3.0).abs() < 1e-9);
        assert!((m.f1() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_division() {
        let mut m = Metrics::new();
        assert_eq!(m.accuracy(), 0.0);
        m.update(0.1, &[0.1, 0.2], &[0.0, 0.0]);
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.recall(), 0.0);
        assert_eq!(m.f1(), 0.0);
        assert_eq!(m.accuracy(), 1.0);
    }

    #[test]
    fn test_average_loss_over_batches() {
        let mut a = Metrics::new();
        a.update(1.0, &[0.9], &[1.0]);
        a.update(3.0, &[0.1], &[1.0]);
        assert_eq!(a.avg_loss(), 2.0);
        assert_eq!(a.total_predictions(), 2);
        assert_eq!(a.false_negatives, 1);
    }

    #[test]
    fn test_history_tracks_best_f1() {
        let mut good = Metrics::new();
        good.update(0.3, &[0.9, 0.1], &[1.0, 0.0]);
        let mut bad = Metrics::new();
        bad.update(0.7, &[0.1, 0.9], &[1.0, 0.0]);

        let mut history = TrainingHistory::new();
        history.record_epoch(0, &bad, &bad, 1e-3);
        history.record_epoch(1, &good, &good, 1e-3);
        history.record_epoch(2, &bad, &bad, 5e-4);

        assert_eq!(history.epochs(), 3);
        assert_eq!(history.best_epoch, 1);
        assert_eq!(history.best_val_f1, 1.0);
        assert_eq!(history.learning_rates, vec![1e-3, 1e-3, 5e-4]);
    }
}
