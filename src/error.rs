//! Error taxonomy for fitting, loading and serving the scoring pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// A record is missing a required field or carries a value of the wrong type.
///
/// Reported per record; callers decide whether it aborts the whole batch.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
#[error("field '{field}': {reason}")]
pub struct SchemaError {
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    pub fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            reason: "required field is missing or null".to_string(),
        }
    }

    pub fn wrong_type(field: &str, expected: &str, found: &str) -> Self {
        Self {
            field: field.to_string(),
            reason: format!("expected {expected}, found {found}"),
        }
    }
}

/// The fitted artifact cannot be loaded or is internally inconsistent.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {path} is corrupt: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode artifact: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("unsupported artifact format version {found} (expected {expected})")]
    FormatVersion { found: u32, expected: u32 },

    #[error("artifact is inconsistent: {0}")]
    Inconsistent(String),
}

/// A fit-time statistic has no data to be computed from.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot compute {statistic} for column '{column}': {reason}")]
pub struct UndefinedStatisticError {
    pub column: String,
    pub statistic: &'static str,
    pub reason: String,
}

/// Failure while scoring a single record against a fitted pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("feature vector has {found} values but the classifier expects {expected}")]
    FeatureWidth { expected: usize, found: usize },

    #[error("classifier produced a non-finite probability")]
    NonFiniteProbability,
}

impl ScoringError {
    /// Offending field name, when the failure can be attributed to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ScoringError::Schema(e) => Some(&e.field),
            _ => None,
        }
    }
}

/// Umbrella error for the offline fit / batch paths.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    UndefinedStatistic(#[from] UndefinedStatisticError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    #[error("training data is unusable: {0}")]
    TrainingData(String),

    #[error("{path} line {line}: {source}")]
    InvalidRow {
        path: PathBuf,
        line: usize,
        #[source]
        source: SchemaError,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
