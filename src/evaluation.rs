//! Evaluation metrics over labelled predictions.

use crate::error::PipelineError;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

/// A metric that may be mathematically undefined for the given data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Value(f64),
    Undefined,
}

impl Serialize for MetricValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Value(v) => serializer.serialize_f64(*v),
            MetricValue::Undefined => serializer.serialize_str("undefined"),
        }
    }
}

impl MetricValue {
    pub fn value(self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(v),
            MetricValue::Undefined => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{v:.4}"),
            MetricValue::Undefined => f.write_str("undefined"),
        }
    }
}

/// Classification report for the positive (fraud) class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when no probabilities were supplied
    pub roc_auc: Option<MetricValue>,
}

impl EvaluationReport {
    /// Metric name / formatted value pairs, in report order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            ("Accuracy", format!("{:.4}", self.accuracy)),
            ("F1 Score", format!("{:.4}", self.f1)),
            ("Precision", format!("{:.4}", self.precision)),
            ("Recall", format!("{:.4}", self.recall)),
        ];
        if let Some(auc) = self.roc_auc {
            entries.push(("ROC AUC", auc.to_string()));
        }
        entries
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let io_err = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_string()).map_err(io_err)?;
        info!(path = %path.display(), "Metrics report saved");
        Ok(())
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.entries() {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

/// Computes evaluation metrics from parallel label/prediction/probability slices.
pub struct MetricsReporter;

impl MetricsReporter {
    pub fn evaluate(
        y_true: &[u8],
        y_pred: &[u8],
        y_proba: Option<&[f64]>,
    ) -> Result<EvaluationReport, PipelineError> {
        if y_true.len() != y_pred.len() || y_proba.is_some_and(|p| p.len() != y_true.len()) {
            return Err(PipelineError::TrainingData(
                "label, prediction and probability sequences differ in length".to_string(),
            ));
        }
        if y_true.is_empty() {
            return Err(PipelineError::TrainingData(
                "cannot evaluate an empty prediction set".to_string(),
            ));
        }

        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1, p == 1) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(EvaluationReport {
            samples: y_true.len(),
            accuracy: ratio(tp + tn, y_true.len()),
            precision,
            recall,
            f1,
            roc_auc: y_proba.map(|p| roc_auc(y_true, p)),
        })
    }
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
///
/// Undefined for single-class labels or when the slices differ in length.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> MetricValue {
    if y_true.len() != scores.len() {
        return MetricValue::Undefined;
    }
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return MetricValue::Undefined;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; the tie group i..=j shares the mean rank
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum += mean_rank * order[i..=j].iter().filter(|&&k| y_true[k] == 1).count() as f64;
        i = j + 1;
    }

    let p = positives as f64;
    MetricValue::Value((rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}
