//! Configuration management for the fraud scoring pipeline

use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Decision threshold tuned for the production classifier.
pub const DEFAULT_THRESHOLD: f64 = 0.61;

/// How a scoring request reacts to records that fail schema validation
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Any invalid record fails the whole request
    WholeBatch,
    /// Invalid records get an error slot, the rest are scored
    #[default]
    PerRecord,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming scoring requests
    pub request_subject: String,
    /// Subject for results when a request carries no reply subject
    pub result_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            request_subject: "scoring.requests".to_string(),
            result_subject: "scoring.results".to_string(),
        }
    }
}

/// Feature pipeline parameters fixed before fitting
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Identifier, timestamp and leaked-score columns removed up front
    pub drop_columns: Vec<String>,
    /// High-cardinality categorical column that is collapsed and target encoded
    pub category_column: String,
    /// Minimum fit-time count for a category to keep its own value
    pub min_count: usize,
    /// Catch-all value for infrequent and unseen categories
    pub sentinel: String,
    /// Number of folds for out-of-fold target encoding
    pub n_fold: usize,
    /// Shuffle seed for the fold partition
    pub seed: u64,
    /// Token treated as "yes" in document-delivery fields
    pub affirmative_token: String,
    /// Country codes kept as-is; everything else becomes the sentinel
    pub country_allow_list: Vec<String>,
    /// Numeric score columns imputed with the fit-time median
    pub score_columns: Vec<String>,
    /// Columns expanded into indicator blocks
    pub one_hot_columns: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            drop_columns: vec![
                "data_compra".to_string(),
                "produto".to_string(),
                "score_fraude_modelo".to_string(),
            ],
            category_column: "categoria_produto".to_string(),
            min_count: 1000,
            sentinel: "Other".to_string(),
            n_fold: 5,
            seed: 42,
            affirmative_token: "Y".to_string(),
            country_allow_list: vec!["BR".to_string(), "AR".to_string()],
            score_columns: (2..=10).map(|i| format!("score_{i}")).collect(),
            one_hot_columns: [
                "score_1",
                "pais",
                "entrega_doc_1",
                "entrega_doc_2",
                "entrega_doc_3",
                "is_missing",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Classifier training parameters
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Full-batch gradient descent iterations
    pub epochs: usize,
    pub learning_rate: f64,
    /// L2 penalty on the weights (not the intercept)
    pub l2: f64,
    /// Reweight classes inversely to their frequency
    pub balanced: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 0.1,
            l2: 1e-3,
            balanced: true,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Probability above which a record is labelled fraud
    pub threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Serving pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of requests scored concurrently
    pub workers: usize,
    /// Reaction to invalid records inside a request
    pub error_mode: ErrorMode,
    /// Seconds between runtime metric summaries
    pub summary_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            error_mode: ErrorMode::PerRecord,
            summary_interval_secs: 30,
        }
    }
}

/// File locations used by the offline commands
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub artifact: PathBuf,
    pub raw_data: PathBuf,
    pub train_data: PathBuf,
    pub test_data: PathBuf,
    pub predictions: PathBuf,
    pub metrics_report: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from("models/model_pipeline.json"),
            raw_data: PathBuf::from("data/raw/dados.csv"),
            train_data: PathBuf::from("data/processed/train.csv"),
            test_data: PathBuf::from("data/processed/test.csv"),
            predictions: PathBuf::from("data/processed/result_with_predictions.csv"),
            metrics_report: PathBuf::from("data/processed/metrics.txt"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, falling back to defaults
    /// when the file does not exist
    pub fn load() -> Result<Self> {
        let path = Path::new("config/config.toml");
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
