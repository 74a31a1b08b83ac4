use serde::{Deserialize, Serialize};

use crate::{Result, TennisError};

/// Per-feature standardisation fitted on training rows.
///
/// Stored in the model manifest so inference applies exactly the
/// statistics seen during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureNormalizer {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl FeatureNormalizer {
    /// Fit mean and population standard deviation over feature rows.
    ///
    /// Constant features get a scale of 1 so they map to zero.
    pub fn fit<'a, I>(rows: I, width: usize) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut count = 0usize;
        let mut sum = vec![0.0f64; width];
        let mut sum_sq = vec![0.0f64; width];

        for row in rows {
            if row.len() != width {
                return Err(TennisError::ShapeMismatch(format!(
                    "feature row has {} values, expected {}",
                    row.len(),
                    width
                )));
            }
            for (i, &x) in row.iter().enumerate() {
                sum[i] += x as f64;
                sum_sq[i] += (x as f64) * (x as f64);
            }
            count += 1;
        }

        if count == 0 {
            return Err(TennisError::ShapeMismatch(
                "cannot fit normalizer on zero rows".to_string(),
            ));
        }

        let n = count as f64;
        let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();
        let scale = sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| {
                let var = (sq / n - m * m).max(0.0);
                let std = var.sqrt();
                if std > 1e-12 {
                    std as f32
                } else {
                    1.0
                }
            })
            .collect();

        Ok(FeatureNormalizer {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Standardise one row in place
    pub fn transform_row(&self, row: &mut [f32]) -> Result<()> {
        if row.len() != self.width() {
            return Err(TennisError::ShapeMismatch(format!(
                "feature row has {} values, normalizer was fit on {}",
                row.len(),
                self.width()
            )));
        }
        for ((x, m), s) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
            *x = (*x - m) / s;
        }
        Ok(())
    }

    /// Standardise every step of a sequence in place
    pub fn transform_sequence(&self, sequence: &mut [Vec<f32>]) -> Result<()> {
        sequence.iter_mut().try_for_each(|row| self.transform_row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let rows = [vec![1.0, 5.0], vec![3.0, 5.0]];
        let norm = FeatureNormalizer::fit(rows.iter().map(|r| r.as_slice()), 2).unwrap();
        assert_eq!(norm.mean, vec![2.0, 5.0]);
        // Constant column keeps unit scale
        assert_eq!(norm.scale, vec![1.0, 1.0]);

        let mut row = vec![3.0, 5.0];
        norm.transform_row(&mut row).unwrap();
        assert_eq!(row, vec![1.0, 0.0]);
    }

    #[test]
    fn test_width_mismatch() {
        let rows = [vec![1.0, 2.0]];
        let norm = FeatureNormalizer::fit(rows.iter().map(|r| r.as_slice()), 2).unwrap();
        let mut short = vec![1.0];
        assert!(matches!(
            norm.transform_row(&mut short),
            Err(TennisError::ShapeMismatch(_))
        ));

        let bad = [vec![1.0, 2.0, 3.0]];
        assert!(FeatureNormalizer::fit(bad.iter().map(|r| r.as_slice()), 2).is_err());
    }

    #[test]
    fn test_fit_requires_rows() {
        let rows: Vec<Vec<f32>> = Vec::new();
        assert!(FeatureNormalizer::fit(rows.iter().map(|r| r.as_slice()), 3).is_err());
    }

    #[test]
    fn test_transformed_rows_are_standardised() {
        let rows: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, (i * i) as f32]).collect();
        let norm = FeatureNormalizer::fit(rows.iter().map(|r| r.as_slice()), 2).unwrap();
        let mut seq = rows.clone();
        norm.transform_sequence(&mut seq).unwrap();
        for col in 0..2 {
            let mean: f32 = seq.iter().map(|r| r[col]).sum::<f32>() / 10.0;
            let var: f32 = seq.iter().map(|r| (r[col] - mean).powi(2)).sum::<f32>() / 10.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-4);
        }
    }
}
