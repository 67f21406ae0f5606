//! Final record-to-vector step: numeric passthrough plus one-hot blocks

use crate::error::{PipelineError, SchemaError, ScoringError};
use crate::features::one_hot::{CategoricalOneHotEncoder, OneHotVocabulary};
use crate::types::record::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Layout of the classifier input: every remaining numeric column (sorted by
/// name), followed by the indicator blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVectorizer {
    numeric_columns: Vec<String>,
    one_hot: OneHotVocabulary,
}

impl FeatureVectorizer {
    /// Learn the layout from fully transformed training records.
    ///
    /// Columns not listed for one-hot expansion must be numeric.
    pub fn fit(one_hot_columns: &[String], records: &[Record]) -> Result<Self, PipelineError> {
        let one_hot = CategoricalOneHotEncoder::fit(one_hot_columns, records)?;

        let expanded: BTreeSet<&str> = one_hot_columns.iter().map(String::as_str).collect();
        let mut numeric: BTreeSet<String> = BTreeSet::new();
        for (row, record) in records.iter().enumerate() {
            for (name, value) in record.fields() {
                if expanded.contains(name) {
                    continue;
                }
                if let FieldValue::Text(text) = value {
                    return Err(PipelineError::TrainingData(format!(
                        "row {row}: column '{name}' holds text '{text}' but is not one-hot encoded"
                    )));
                }
                numeric.insert(name.to_string());
            }
        }

        Ok(Self {
            numeric_columns: numeric.into_iter().collect(),
            one_hot,
        })
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    pub fn one_hot(&self) -> &OneHotVocabulary {
        &self.one_hot
    }

    pub fn width(&self) -> usize {
        self.numeric_columns.len() + self.one_hot.width()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.numeric_columns
            .iter()
            .cloned()
            .chain(self.one_hot.feature_names())
            .collect()
    }

    pub fn transform(&self, record: &Record) -> Result<Vec<f32>, ScoringError> {
        let mut out = Vec::with_capacity(self.width());
        for column in &self.numeric_columns {
            let value = record.value(column);
            match value.as_f64() {
                Some(v) => out.push(v as f32),
                None if value.is_missing() => return Err(SchemaError::missing(column).into()),
                None => {
                    return Err(SchemaError::wrong_type(column, "number", value.type_name()).into())
                }
            }
        }
        self.one_hot.encode_into(record, &mut out);
        Ok(out)
    }
}
