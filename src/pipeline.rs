//! Fitting and serving of the complete feature pipeline.
//!
//! Serving order: project, collapse rare categories, target encode, normalize,
//! impute, vectorize, classify, decide. Fitting walks the same order, feeding
//! each stage the output of the previous fitted stage; training rows receive
//! their out-of-fold target encodings rather than the persisted map values.

use crate::config::{ClassifierConfig, ErrorMode, FeatureConfig};
use crate::error::{ArtifactError, PipelineError, ScoringError};
use crate::features::target_encoder::EncoderFit;
use crate::features::{
    ColumnProjector, FeatureVectorizer, FieldNormalizer, FittedStage, LeakSafeCategoryEncoder,
    RarityCollapser, ScoreImputer,
};
use crate::models::{Classifier, ClassifierModel, DecisionPolicy, LogisticRegression};
use crate::types::prediction::{PredictionResult, RecordError, RecordOutcome, ScoringResponse};
use crate::types::record::Record;
use crate::types::schema::{Schema, LABEL_FIELD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Version of the serialized artifact layout.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

const STAGE_ORDER: [&str; 5] = ["project", "collapse", "target_encode", "normalize", "impute"];

/// Every learned artifact plus the classifier, immutable once fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    format_version: u32,
    artifact_id: Uuid,
    fitted_at: DateTime<Utc>,
    features: FeatureConfig,
    stages: Vec<FittedStage>,
    vectorizer: FeatureVectorizer,
    classifier: ClassifierModel,
    policy: DecisionPolicy,
}

impl FittedPipeline {
    /// Fit every stage and the classifier from labelled training records.
    pub fn fit(
        records: &[Record],
        features: &FeatureConfig,
        classifier: &ClassifierConfig,
        policy: DecisionPolicy,
    ) -> Result<Self, PipelineError> {
        if records.is_empty() {
            return Err(PipelineError::TrainingData("no training rows".to_string()));
        }
        let labels: Vec<u8> = records
            .iter()
            .enumerate()
            .map(|(row, r)| {
                r.label(LABEL_FIELD).ok_or_else(|| {
                    PipelineError::TrainingData(format!(
                        "row {row} has no binary '{LABEL_FIELD}' label"
                    ))
                })
            })
            .collect::<Result<_, _>>()?;
        let inputs: Vec<Record> = records.iter().map(|r| r.clone().without(LABEL_FIELD)).collect();

        info!(
            rows = records.len(),
            positives = labels.iter().filter(|&&y| y == 1).count(),
            "Fitting feature pipeline"
        );

        let projector = ColumnProjector::new(features.drop_columns.iter().cloned());
        let projected: Vec<Record> = inputs.iter().map(|r| projector.transform(r)).collect();

        let collapser = RarityCollapser::fit(
            &features.category_column,
            projected.iter().map(|r| r.value(&features.category_column)),
            features.min_count,
            &features.sentinel,
        );
        let collapsed: Vec<Record> = projected.iter().map(|r| collapser.transform(r)).collect();
        info!(
            column = %features.category_column,
            frequent = collapser.vocabulary().len(),
            "Rarity vocabulary fitted"
        );

        let encoder =
            LeakSafeCategoryEncoder::new(&features.category_column, features.n_fold, features.seed);
        let EncoderFit { map, out_of_fold } = encoder.fit_records(&collapsed, &labels)?;
        let encoded: Vec<Record> = collapsed
            .iter()
            .zip(&out_of_fold)
            .map(|(r, &value)| map.with_encoded(r, value))
            .collect();
        info!(
            categories = map.entries().len(),
            global_mean = map.global_mean(),
            n_fold = features.n_fold,
            "Target encoding fitted"
        );

        let normalizer = FieldNormalizer::new(
            &features.affirmative_token,
            &features.country_allow_list,
            &features.sentinel,
        );
        let normalized: Vec<Record> = encoded.iter().map(|r| normalizer.transform(r)).collect();

        let imputer = ScoreImputer::fit(&features.score_columns, &normalized)?;
        let imputed: Vec<Record> = normalized.iter().map(|r| imputer.transform(r)).collect();

        let vectorizer = FeatureVectorizer::fit(&features.one_hot_columns, &imputed)?;
        let matrix: Vec<Vec<f32>> = imputed
            .iter()
            .map(|r| vectorizer.transform(r))
            .collect::<Result<_, ScoringError>>()?;
        info!(width = vectorizer.width(), "Feature layout fitted");

        let model = LogisticRegression::fit(&matrix, &labels, classifier)?;

        let pipeline = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            artifact_id: Uuid::new_v4(),
            fitted_at: Utc::now(),
            features: features.clone(),
            stages: vec![
                FittedStage::Project(projector),
                FittedStage::Collapse(collapser),
                FittedStage::TargetEncode(map),
                FittedStage::Normalize(normalizer),
                FittedStage::Impute(imputer),
            ],
            vectorizer,
            classifier: ClassifierModel::Logistic(model),
            policy,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn artifact_id(&self) -> Uuid {
        self.artifact_id
    }

    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    pub fn stages(&self) -> &[FittedStage] {
        &self.stages
    }

    pub fn vectorizer(&self) -> &FeatureVectorizer {
        &self.vectorizer
    }

    pub fn classifier(&self) -> &ClassifierModel {
        &self.classifier
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.policy
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.vectorizer.feature_names()
    }

    /// Run the record-to-record stages.
    pub fn transform_record(&self, record: &Record) -> Record {
        self.stages
            .iter()
            .fold(record.clone(), |acc, stage| stage.transform(&acc))
    }

    /// Feature vector for one validated record.
    pub fn transform(&self, record: &Record) -> Result<Vec<f32>, ScoringError> {
        self.vectorizer.transform(&self.transform_record(record))
    }

    pub fn predict_proba(&self, record: &Record) -> Result<f64, ScoringError> {
        self.classifier.predict_proba(&self.transform(record)?)
    }

    pub fn score(&self, record: &Record) -> Result<PredictionResult, ScoringError> {
        let probability = self.predict_proba(record)?;
        Ok(PredictionResult {
            label: self.policy.decide(probability),
            probability,
        })
    }

    /// Validate and score one raw JSON record.
    pub fn score_json(&self, schema: &Schema, raw: &serde_json::Value) -> Result<PredictionResult, ScoringError> {
        let record = schema.validate_json(raw)?;
        self.score(&record)
    }

    /// Score a request's records. In whole-batch mode the first failing
    /// record rejects the request; otherwise every slot reports on its own.
    pub fn score_request(
        &self,
        schema: &Schema,
        data: &[serde_json::Value],
        mode: ErrorMode,
    ) -> ScoringResponse {
        let mut results = Vec::with_capacity(data.len());
        for (index, raw) in data.iter().enumerate() {
            let outcome = self.score_json(schema, raw);
            match (mode, outcome) {
                (ErrorMode::WholeBatch, Err(e)) => {
                    debug!(index, error = %e, "Rejecting request");
                    return ScoringResponse::Rejected {
                        error: RecordError::from(&e),
                        index: Some(index),
                    };
                }
                (_, outcome) => results.push(RecordOutcome::from(outcome)),
            }
        }
        ScoringResponse::Results { results }
    }

    /// Internal consistency of a fitted or freshly loaded artifact.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::FormatVersion {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }

        let names: Vec<&str> = self.stages.iter().map(FittedStage::name).collect();
        if names != STAGE_ORDER {
            return Err(ArtifactError::Inconsistent(format!(
                "stage order {names:?} does not match {STAGE_ORDER:?}"
            )));
        }

        let ClassifierModel::Logistic(model) = &self.classifier;
        if !model.is_consistent() {
            return Err(ArtifactError::Inconsistent(
                "classifier parameter vectors differ in length".to_string(),
            ));
        }
        if self.vectorizer.width() != self.classifier.n_features() {
            return Err(ArtifactError::Inconsistent(format!(
                "feature layout has width {} but the classifier expects {}",
                self.vectorizer.width(),
                self.classifier.n_features()
            )));
        }

        if let Some(block) = self
            .vectorizer
            .one_hot()
            .blocks()
            .iter()
            .find(|b| !b.is_sorted_unique())
        {
            return Err(ArtifactError::Inconsistent(format!(
                "one-hot categories of '{}' are not strictly ordered",
                block.column
            )));
        }

        for stage in &self.stages {
            if let FittedStage::TargetEncode(map) = stage {
                let in_range = |v: f64| (0.0..=1.0).contains(&v);
                if !in_range(map.global_mean()) || !map.entries().values().all(|&v| in_range(v)) {
                    return Err(ArtifactError::Inconsistent(
                        "target encoding values outside [0, 1]".to_string(),
                    ));
                }
            }
        }

        if !(0.0..=1.0).contains(&self.policy.threshold()) {
            return Err(ArtifactError::Inconsistent(format!(
                "decision threshold {} outside [0, 1]",
                self.policy.threshold()
            )));
        }
        Ok(())
    }

    /// Persist as a single JSON artifact, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let write_err = |source| ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let bytes = serde_json::to_vec_pretty(self).map_err(ArtifactError::Encode)?;
        fs::write(path, bytes).map_err(write_err)?;

        info!(
            path = %path.display(),
            artifact_id = %self.artifact_id,
            "Pipeline artifact saved"
        );
        Ok(())
    }

    /// Load and validate an artifact. Any failure here must stop startup.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ArtifactError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let decode_err = |source| ArtifactError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let raw: serde_json::Value = serde_json::from_slice(&bytes).map_err(decode_err)?;
        let found = raw
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if found != u64::from(ARTIFACT_FORMAT_VERSION) {
            return Err(ArtifactError::FormatVersion {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }

        let pipeline: FittedPipeline = serde_json::from_value(raw).map_err(decode_err)?;
        pipeline.validate()?;

        info!(
            path = %path.display(),
            artifact_id = %pipeline.artifact_id,
            fitted_at = %pipeline.fitted_at,
            features = pipeline.vectorizer.width(),
            threshold = pipeline.policy.threshold(),
            "Pipeline artifact loaded"
        );
        Ok(pipeline)
    }
}

/// Load the fitted pipeline once at startup.
pub fn load_pipeline<P: AsRef<Path>>(path: P) -> Result<FittedPipeline, ArtifactError> {
    FittedPipeline::load(path)
}
