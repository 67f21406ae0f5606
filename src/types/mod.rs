//! Type definitions for the fraud scoring pipeline

pub mod prediction;
pub mod record;
pub mod schema;

pub use prediction::{
    PredictionResult, RecordError, RecordOutcome, ScoringRequest, ScoringResponse,
};
pub use record::{FieldValue, Record};
pub use schema::{Schema, LABEL_FIELD};
