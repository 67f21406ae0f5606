//! Classifier seam between the feature pipeline and the scoring model

use crate::error::ScoringError;
use crate::models::logistic::LogisticRegression;
use serde::{Deserialize, Serialize};

/// Opaque probabilistic classifier over a fixed-width feature vector.
pub trait Classifier: Send + Sync {
    /// Probability of the positive (fraud) class.
    fn predict_proba(&self, features: &[f32]) -> Result<f64, ScoringError>;

    /// Expected feature vector width.
    fn n_features(&self) -> usize;

    fn name(&self) -> &str {
        "classifier"
    }
}

/// Serializable classifier stored inside the fitted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    Logistic(LogisticRegression),
}

impl Classifier for ClassifierModel {
    fn predict_proba(&self, features: &[f32]) -> Result<f64, ScoringError> {
        match self {
            ClassifierModel::Logistic(m) => m.predict_proba(features),
        }
    }

    fn n_features(&self) -> usize {
        match self {
            ClassifierModel::Logistic(m) => m.n_features(),
        }
    }

    fn name(&self) -> &str {
        match self {
            ClassifierModel::Logistic(m) => m.name(),
        }
    }
}
