//! Median imputation for numeric score columns

use crate::error::UndefinedStatisticError;
use crate::types::record::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Learned per-column medians, frozen after fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreImputer {
    medians: BTreeMap<String, f64>,
}

impl ScoreImputer {
    /// Median of each column over non-missing fit-time values.
    ///
    /// A column without a single observed value has no defined median and
    /// fails the fit.
    pub fn fit(columns: &[String], records: &[Record]) -> Result<Self, UndefinedStatisticError> {
        let mut medians = BTreeMap::new();
        for column in columns {
            let observed: Vec<f64> = records
                .iter()
                .filter_map(|r| r.value(column).as_f64())
                .collect();
            let value = median(observed).ok_or_else(|| UndefinedStatisticError {
                column: column.clone(),
                statistic: "median",
                reason: "no non-missing values at fit time".to_string(),
            })?;
            debug!(column = %column, median = value, "Fitted imputation median");
            medians.insert(column.clone(), value);
        }
        Ok(Self { medians })
    }

    pub fn medians(&self) -> &BTreeMap<String, f64> {
        &self.medians
    }

    pub fn transform(&self, record: &Record) -> Record {
        self.medians.iter().fold(record.clone(), |acc, (column, median)| {
            if acc.value(column).is_missing() {
                acc.with(column.clone(), FieldValue::Float(*median))
            } else {
                acc
            }
        })
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["score_2".to_string(), "score_7".to_string()]
    }

    fn training() -> Vec<Record> {
        vec![
            Record::new().with("score_2", 1.0).with("score_7", 10_i64),
            Record::new().with("score_2", FieldValue::Null).with("score_7", 4_i64),
            Record::new().with("score_2", 3.0).with("score_7", FieldValue::Null),
            Record::new().with("score_2", 10.0).with("score_7", 6_i64),
            Record::new().with("score_2", f64::NAN).with("score_7", 8_i64),
        ]
    }

    #[test]
    fn test_medians_ignore_missing() {
        let imputer = ScoreImputer::fit(&columns(), &training()).unwrap();
        assert_eq!(imputer.medians()["score_2"], 3.0);
        assert_eq!(imputer.medians()["score_7"], 7.0);
    }

    #[test]
    fn test_transform_leaves_no_missing_scores() {
        let imputer = ScoreImputer::fit(&columns(), &training()).unwrap();
        let inputs = [
            Record::new(),
            Record::new().with("score_2", FieldValue::Null),
            Record::new().with("score_2", f64::NAN).with("score_7", 1_i64),
        ];
        for record in &inputs {
            let out = imputer.transform(record);
            for column in columns() {
                assert!(!out.value(&column).is_missing());
            }
        }
    }

    #[test]
    fn test_present_values_pass_through() {
        let imputer = ScoreImputer::fit(&columns(), &training()).unwrap();
        let record = Record::new().with("score_2", 42.5).with("score_7", 1_i64);
        assert_eq!(imputer.transform(&record), record);
    }

    #[test]
    fn test_all_missing_column_fails_fast() {
        let records = vec![Record::new().with("score_2", FieldValue::Null).with("score_7", 1_i64)];
        let err = ScoreImputer::fit(&columns(), &records).unwrap_err();
        assert_eq!(err.column, "score_2");
    }
}
