//! Feature transformation stages.
//!
//! Each stage is a pair of a fit step, which learns parameters from training
//! records, and a pure transform over one [`Record`] using only those
//! parameters. Stages are composed as an ordered list in
//! [`crate::pipeline::FittedPipeline`].

pub mod imputer;
pub mod normalizer;
pub mod one_hot;
pub mod projector;
pub mod rarity;
pub mod target_encoder;
pub mod vectorizer;

pub use imputer::ScoreImputer;
pub use normalizer::FieldNormalizer;
pub use one_hot::{CategoricalOneHotEncoder, CategoryKey, OneHotVocabulary};
pub use projector::ColumnProjector;
pub use rarity::RarityCollapser;
pub use target_encoder::{CategoryEncodingMap, LeakSafeCategoryEncoder};
pub use vectorizer::FeatureVectorizer;

use crate::types::record::Record;
use serde::{Deserialize, Serialize};

/// A fitted record-to-record stage, in serving order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FittedStage {
    Project(ColumnProjector),
    Collapse(RarityCollapser),
    TargetEncode(CategoryEncodingMap),
    Normalize(FieldNormalizer),
    Impute(ScoreImputer),
}

impl FittedStage {
    pub fn name(&self) -> &'static str {
        match self {
            FittedStage::Project(_) => "project",
            FittedStage::Collapse(_) => "collapse",
            FittedStage::TargetEncode(_) => "target_encode",
            FittedStage::Normalize(_) => "normalize",
            FittedStage::Impute(_) => "impute",
        }
    }

    pub fn transform(&self, record: &Record) -> Record {
        match self {
            FittedStage::Project(s) => s.transform(record),
            FittedStage::Collapse(s) => s.transform(record),
            FittedStage::TargetEncode(s) => s.transform(record),
            FittedStage::Normalize(s) => s.transform(record),
            FittedStage::Impute(s) => s.transform(record),
        }
    }
}
