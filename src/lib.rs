//! Fraud Scoring Pipeline Library
//!
//! Leakage-safe feature pipeline and decision policy for transaction fraud
//! scoring, with offline batch tooling and a NATS serving transport.

pub mod batch;
pub mod config;
pub mod consumer;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use consumer::ScoringRequestConsumer;
pub use error::{ArtifactError, PipelineError, SchemaError, ScoringError, UndefinedStatisticError};
pub use evaluation::{EvaluationReport, MetricsReporter};
pub use pipeline::{load_pipeline, FittedPipeline};
pub use producer::ResultProducer;
pub use types::{PredictionResult, Record, ScoringRequest, ScoringResponse};
