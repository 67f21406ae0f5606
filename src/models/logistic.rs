//! L2-regularised logistic regression trained by full-batch gradient descent

use crate::config::ClassifierConfig;
use crate::error::{PipelineError, ScoringError};
use crate::models::classifier::Classifier;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Logistic regression over standardised inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    intercept: f64,
}

impl LogisticRegression {
    /// Fit on a dense row-major matrix. Starts from zero weights, so the
    /// result depends only on the data and the configuration.
    pub fn fit(rows: &[Vec<f32>], labels: &[u8], config: &ClassifierConfig) -> Result<Self, PipelineError> {
        if rows.len() != labels.len() {
            return Err(PipelineError::TrainingData(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let n = rows.len();
        let positives = labels.iter().filter(|&&y| y == 1).count();
        if positives == 0 || positives == n {
            return Err(PipelineError::TrainingData(
                "classifier needs both positive and negative examples".to_string(),
            ));
        }
        let width = rows[0].len();
        if let Some(row) = rows.iter().position(|r| r.len() != width) {
            return Err(PipelineError::TrainingData(format!(
                "row {row} has {} features, expected {width}",
                rows[row].len()
            )));
        }

        let (means, scales) = standardisation(rows, width);
        let x: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .map(|(j, &v)| (f64::from(v) - means[j]) / scales[j])
                    .collect()
            })
            .collect();

        let (w_pos, w_neg) = if config.balanced {
            (
                n as f64 / (2.0 * positives as f64),
                n as f64 / (2.0 * (n - positives) as f64),
            )
        } else {
            (1.0, 1.0)
        };
        let total_weight = positives as f64 * w_pos + (n - positives) as f64 * w_neg;

        let mut weights = vec![0.0; width];
        let mut intercept = 0.0;
        let mut grad = vec![0.0; width];
        for epoch in 0..config.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            let mut loss = 0.0;
            for (xi, &yi) in x.iter().zip(labels) {
                let p = sigmoid(intercept + dot(&weights, xi));
                let y = f64::from(yi);
                let sw = if yi == 1 { w_pos } else { w_neg };
                let err = sw * (p - y);
                for (g, &v) in grad.iter_mut().zip(xi) {
                    *g += err * v;
                }
                grad_b += err;
                loss -= sw * (y * p.max(1e-15).ln() + (1.0 - y) * (1.0 - p).max(1e-15).ln());
            }
            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= config.learning_rate * (g / total_weight + config.l2 * *w);
            }
            intercept -= config.learning_rate * grad_b / total_weight;

            if epoch % 100 == 0 {
                debug!(epoch, loss = loss / total_weight, "Logistic regression training");
            }
        }

        info!(
            features = width,
            rows = n,
            positives,
            epochs = config.epochs,
            "Logistic regression fitted"
        );

        Ok(Self {
            means,
            scales,
            weights,
            intercept,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Parameter vectors agree in length.
    pub fn is_consistent(&self) -> bool {
        self.means.len() == self.weights.len() && self.scales.len() == self.weights.len()
    }
}

impl Classifier for LogisticRegression {
    fn predict_proba(&self, features: &[f32]) -> Result<f64, ScoringError> {
        if features.len() != self.weights.len() {
            return Err(ScoringError::FeatureWidth {
                expected: self.weights.len(),
                found: features.len(),
            });
        }
        let z = features
            .iter()
            .enumerate()
            .map(|(j, &v)| self.weights[j] * (f64::from(v) - self.means[j]) / self.scales[j])
            .sum::<f64>()
            + self.intercept;
        let p = sigmoid(z);
        if p.is_finite() {
            Ok(p)
        } else {
            Err(ScoringError::NonFiniteProbability)
        }
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn name(&self) -> &str {
        "logistic_regression"
    }
}

fn standardisation(rows: &[Vec<f32>], width: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let mut means = vec![0.0; width];
    for row in rows {
        for (m, &v) in means.iter_mut().zip(row) {
            *m += f64::from(v);
        }
    }
    means.iter_mut().for_each(|m| *m /= n);

    let mut scales = vec![0.0; width];
    for row in rows {
        for (j, &v) in row.iter().enumerate() {
            scales[j] += (f64::from(v) - means[j]).powi(2);
        }
    }
    let scales = scales
        .into_iter()
        .map(|ss| {
            let sd = (ss / n).sqrt();
            if sd > 1e-12 {
                sd
            } else {
                1.0
            }
        })
        .collect();
    (means, scales)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f32>>, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let x = i as f32 / 10.0;
            rows.push(vec![x, 1.0]);
            labels.push(u8::from(x > 2.0));
        }
        (rows, labels)
    }

    #[test]
    fn test_learns_separable_direction() {
        let (rows, labels) = separable();
        let model = LogisticRegression::fit(&rows, &labels, &ClassifierConfig::default()).unwrap();

        let low = model.predict_proba(&[0.2, 1.0]).unwrap();
        let high = model.predict_proba(&[3.8, 1.0]).unwrap();
        assert!(low < 0.5, "low = {low}");
        assert!(high > 0.5, "high = {high}");
        assert!(model.weights()[0] > 0.0);
        assert_eq!(model.weights()[1], 0.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (rows, labels) = separable();
        let config = ClassifierConfig::default();
        assert_eq!(
            LogisticRegression::fit(&rows, &labels, &config).unwrap(),
            LogisticRegression::fit(&rows, &labels, &config).unwrap()
        );
    }

    #[test]
    fn test_single_class_is_rejected() {
        let rows = vec![vec![1.0], vec![2.0]];
        assert!(LogisticRegression::fit(&rows, &[0, 0], &ClassifierConfig::default()).is_err());
    }

    #[test]
    fn test_width_mismatch_is_reported() {
        let (rows, labels) = separable();
        let model = LogisticRegression::fit(&rows, &labels, &ClassifierConfig::default()).unwrap();
        assert_eq!(
            model.predict_proba(&[1.0]),
            Err(ScoringError::FeatureWidth {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(0.0), 0.5);
    }
}
