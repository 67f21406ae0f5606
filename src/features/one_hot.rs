//! One-hot expansion of categorical and boolean columns

use crate::error::UndefinedStatisticError;
use crate::types::record::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Category identity used for vocabulary lookup.
///
/// Ordering is integers, then strings, then missing, which fixes the indicator
/// order inside each block.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CategoryKey {
    Int(i64),
    Text(String),
    Missing,
}

impl CategoryKey {
    pub fn from_value(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => CategoryKey::Missing,
            FieldValue::Float(v) if v.is_nan() => CategoryKey::Missing,
            FieldValue::Int(v) => CategoryKey::Int(*v),
            FieldValue::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                CategoryKey::Int(*v as i64)
            }
            FieldValue::Float(v) => CategoryKey::Text(v.to_string()),
            FieldValue::Text(s) => CategoryKey::Text(s.clone()),
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryKey::Int(v) => write!(f, "{v}"),
            CategoryKey::Text(s) => f.write_str(s),
            CategoryKey::Missing => f.write_str("nan"),
        }
    }
}

/// Known categories of one column, in indicator order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotBlock {
    pub column: String,
    pub categories: Vec<CategoryKey>,
}

impl OneHotBlock {
    /// Categories must be strictly increasing for lookup to be correct.
    pub fn is_sorted_unique(&self) -> bool {
        self.categories.windows(2).all(|w| w[0] < w[1])
    }

    fn position(&self, key: &CategoryKey) -> Option<usize> {
        self.categories.binary_search(key).ok()
    }
}

/// Fixed-width indicator layout learned at fit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotVocabulary {
    blocks: Vec<OneHotBlock>,
}

/// Fit entry point for the one-hot vocabulary.
pub struct CategoricalOneHotEncoder;

impl CategoricalOneHotEncoder {
    pub fn fit(columns: &[String], records: &[Record]) -> Result<OneHotVocabulary, UndefinedStatisticError> {
        if records.is_empty() {
            return Err(UndefinedStatisticError {
                column: columns.join(","),
                statistic: "one-hot vocabulary",
                reason: "no training rows".to_string(),
            });
        }

        let blocks = columns
            .iter()
            .map(|column| {
                let categories: BTreeSet<CategoryKey> = records
                    .iter()
                    .map(|r| CategoryKey::from_value(r.value(column)))
                    .collect();
                OneHotBlock {
                    column: column.clone(),
                    categories: categories.into_iter().collect(),
                }
            })
            .collect();

        Ok(OneHotVocabulary { blocks })
    }
}

impl OneHotVocabulary {
    pub fn blocks(&self) -> &[OneHotBlock] {
        &self.blocks
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.column.as_str())
    }

    /// Total number of indicator columns.
    pub fn width(&self) -> usize {
        self.blocks.iter().map(|b| b.categories.len()).sum()
    }

    /// Indicator names as `<column>_<category>`, in output order.
    pub fn feature_names(&self) -> Vec<String> {
        self.blocks
            .iter()
            .flat_map(|b| b.categories.iter().map(move |c| format!("{}_{}", b.column, c)))
            .collect()
    }

    /// Append the indicators of `record` to `out`. A value outside the
    /// vocabulary yields an all-zero block.
    pub fn encode_into(&self, record: &Record, out: &mut Vec<f32>) {
        for block in &self.blocks {
            let start = out.len();
            out.resize(start + block.categories.len(), 0.0);
            if let Some(pos) = block.position(&CategoryKey::from_value(record.value(&block.column))) {
                out[start + pos] = 1.0;
            }
        }
    }

    pub fn encode(&self, record: &Record) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.width());
        self.encode_into(record, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["pais".to_string(), "score_1".to_string()]
    }

    fn vocabulary() -> OneHotVocabulary {
        let records = vec![
            Record::new().with("pais", "BR").with("score_1", 4_i64),
            Record::new().with("pais", "Other").with("score_1", 1_i64),
            Record::new().with("pais", "AR").with("score_1", 10_i64),
        ];
        CategoricalOneHotEncoder::fit(&columns(), &records).unwrap()
    }

    #[test]
    fn test_sorted_stable_layout() {
        let vocab = vocabulary();
        assert_eq!(
            vocab.feature_names(),
            ["pais_AR", "pais_BR", "pais_Other", "score_1_1", "score_1_4", "score_1_10"]
        );
        assert_eq!(vocab.width(), 6);
    }

    #[test]
    fn test_known_values_set_one_indicator_per_block() {
        let vocab = vocabulary();
        let row = vocab.encode(&Record::new().with("pais", "BR").with("score_1", 10_i64));
        assert_eq!(row, [0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unknown_value_gives_zero_block() {
        let vocab = vocabulary();
        let row = vocab.encode(&Record::new().with("pais", "US").with("score_1", 4_i64));
        assert_eq!(row, [0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_width_is_constant_across_inputs() {
        let vocab = vocabulary();
        let inputs = [
            Record::new(),
            Record::new().with("pais", "BR"),
            Record::new().with("pais", 3_i64).with("score_1", "x").with("extra", 1.5),
            Record::new().with("pais", FieldValue::Null).with("score_1", 4.0),
        ];
        for record in &inputs {
            assert_eq!(vocab.encode(record).len(), vocab.width());
        }
    }

    #[test]
    fn test_integral_float_matches_integer_category() {
        let vocab = vocabulary();
        let from_float = vocab.encode(&Record::new().with("pais", "AR").with("score_1", 4.0));
        let from_int = vocab.encode(&Record::new().with("pais", "AR").with("score_1", 4_i64));
        assert_eq!(from_float, from_int);
    }

    #[test]
    fn test_empty_fit_is_undefined() {
        assert!(CategoricalOneHotEncoder::fit(&columns(), &[]).is_err());
    }
}
