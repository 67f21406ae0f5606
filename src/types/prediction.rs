//! Scoring outcomes returned to callers

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};

/// Binary decision plus the probability it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Decision label (0 = legitimate, 1 = fraud)
    #[serde(rename = "prediction")]
    pub label: u8,

    /// Fraud probability (0.0 - 1.0)
    pub probability: f64,
}

/// Error body attached to a record that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    /// Offending field, when the failure is attributable to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub reason: String,
}

impl From<&ScoringError> for RecordError {
    fn from(err: &ScoringError) -> Self {
        match err {
            ScoringError::Schema(e) => Self {
                field: Some(e.field.clone()),
                reason: e.reason.clone(),
            },
            other => Self {
                field: None,
                reason: other.to_string(),
            },
        }
    }
}

/// Per-record slot of a scoring response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordOutcome {
    Scored(PredictionResult),
    Failed { error: RecordError },
}

impl From<Result<PredictionResult, ScoringError>> for RecordOutcome {
    fn from(result: Result<PredictionResult, ScoringError>) -> Self {
        match result {
            Ok(prediction) => RecordOutcome::Scored(prediction),
            Err(e) => RecordOutcome::Failed {
                error: RecordError::from(&e),
            },
        }
    }
}

/// Request payload on the serving boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub data: Vec<serde_json::Value>,
}

/// Response payload: per-record outcomes, or a rejection of the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoringResponse {
    Results {
        results: Vec<RecordOutcome>,
    },
    Rejected {
        error: RecordError,
        /// Position of the offending record, when one is to blame
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
}

impl ScoringResponse {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ScoringResponse::Rejected {
            error: RecordError {
                field: None,
                reason: reason.into(),
            },
            index: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;

    #[test]
    fn test_prediction_serialization_shape() {
        let result = PredictionResult {
            label: 1,
            probability: 0.83,
        };
        let json = serde_json::to_value(result).unwrap();

        assert_eq!(json["prediction"], 1);
        assert_eq!(json["probability"], 0.83);
    }

    #[test]
    fn test_failed_outcome_carries_field() {
        let outcome = RecordOutcome::from(Err(ScoringError::Schema(SchemaError::missing(
            "valor_compra",
        ))));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["error"]["field"], "valor_compra");
    }
}
