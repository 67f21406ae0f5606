//! Out-of-fold target encoding for categorical columns.
//!
//! Fit partitions the training rows into `n_fold` shuffled folds. Each row is
//! encoded with the mean label of its category computed from the other folds
//! only, so no row ever sees its own label. The persisted map holds, per
//! category, the average of those out-of-fold values over the category's rows;
//! anything absent from the map encodes to the global label mean.

use crate::error::{PipelineError, UndefinedStatisticError};
use crate::types::record::{FieldValue, Record};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Fit parameters for the out-of-fold encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakSafeCategoryEncoder {
    pub column: String,
    pub n_fold: usize,
    pub seed: u64,
}

/// Result of fitting: the serving map plus the leak-free training encodings.
#[derive(Debug, Clone)]
pub struct EncoderFit {
    pub map: CategoryEncodingMap,
    /// Out-of-fold encoding of each training row, aligned with the input
    pub out_of_fold: Vec<f64>,
}

/// Serving-time encoding table with its global-mean fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncodingMap {
    column: String,
    output_column: String,
    encoding: BTreeMap<String, f64>,
    global_mean: f64,
}

#[derive(Default, Clone, Copy)]
struct Tally {
    sum: f64,
    count: usize,
}

impl LeakSafeCategoryEncoder {
    pub fn new(column: impl Into<String>, n_fold: usize, seed: u64) -> Self {
        Self {
            column: column.into(),
            n_fold,
            seed,
        }
    }

    /// Name of the encoded feature emitted in place of the source column.
    pub fn output_column(&self) -> String {
        format!("{}_kfold_target_enc", self.column)
    }

    /// Fit from category values and binary labels (same length).
    pub fn fit(
        &self,
        categories: &[Option<&str>],
        labels: &[u8],
    ) -> Result<EncoderFit, PipelineError> {
        if categories.len() != labels.len() {
            return Err(PipelineError::TrainingData(format!(
                "{} category values but {} labels",
                categories.len(),
                labels.len()
            )));
        }
        if self.n_fold < 2 {
            return Err(PipelineError::Config(format!(
                "n_fold must be at least 2, got {}",
                self.n_fold
            )));
        }
        if labels.is_empty() {
            return Err(UndefinedStatisticError {
                column: self.column.clone(),
                statistic: "global label mean",
                reason: "no training rows".to_string(),
            }
            .into());
        }
        if self.n_fold > labels.len() {
            return Err(PipelineError::TrainingData(format!(
                "n_fold = {} exceeds the {} training rows",
                self.n_fold,
                labels.len()
            )));
        }

        let n = labels.len();
        let global_mean = labels.iter().map(|&y| f64::from(y)).sum::<f64>() / n as f64;
        let folds = fold_assignment(n, self.n_fold, self.seed);

        let mut totals: HashMap<&str, Tally> = HashMap::new();
        let mut per_fold: Vec<HashMap<&str, Tally>> = vec![HashMap::new(); self.n_fold];
        for (i, category) in categories.iter().enumerate() {
            let Some(category) = *category else { continue };
            let y = f64::from(labels[i]);
            for tally in [
                totals.entry(category).or_default(),
                per_fold[folds[i]].entry(category).or_default(),
            ] {
                tally.sum += y;
                tally.count += 1;
            }
        }

        let out_of_fold: Vec<f64> = categories
            .iter()
            .enumerate()
            .map(|(i, category)| {
                let Some(category) = *category else {
                    return global_mean;
                };
                let total = totals[category];
                let held_out = per_fold[folds[i]][category];
                let count = total.count - held_out.count;
                if count == 0 {
                    global_mean
                } else {
                    (total.sum - held_out.sum) / count as f64
                }
            })
            .collect();

        let mut accumulated: BTreeMap<String, Tally> = BTreeMap::new();
        for (category, value) in categories.iter().zip(&out_of_fold) {
            if let Some(category) = category {
                let tally = accumulated.entry(category.to_string()).or_default();
                tally.sum += value;
                tally.count += 1;
            }
        }
        let encoding: BTreeMap<String, f64> = accumulated
            .into_iter()
            .map(|(category, tally)| (category, tally.sum / tally.count as f64))
            .collect();

        debug!(
            column = %self.column,
            n_fold = self.n_fold,
            categories = encoding.len(),
            global_mean,
            "Fitted out-of-fold target encoding"
        );

        Ok(EncoderFit {
            map: CategoryEncodingMap {
                column: self.column.clone(),
                output_column: self.output_column(),
                encoding,
                global_mean,
            },
            out_of_fold,
        })
    }

    /// Fit from records, reading the category from the configured column.
    pub fn fit_records(&self, records: &[Record], labels: &[u8]) -> Result<EncoderFit, PipelineError> {
        let categories: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.value(&self.column).as_str())
            .collect();
        self.fit(&categories, labels)
    }
}

impl CategoryEncodingMap {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn output_column(&self) -> &str {
        &self.output_column
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.encoding
    }

    /// Encoded value of a category; unseen and null fall back to the global mean.
    pub fn encode(&self, value: &FieldValue) -> f64 {
        value
            .as_str()
            .and_then(|category| self.encoding.get(category))
            .copied()
            .unwrap_or(self.global_mean)
    }

    /// Replace the source column with an explicit encoded value.
    pub fn with_encoded(&self, record: &Record, encoded: f64) -> Record {
        record
            .clone()
            .without(&self.column)
            .with(self.output_column.clone(), FieldValue::Float(encoded))
    }

    pub fn transform(&self, record: &Record) -> Record {
        let encoded = self.encode(record.value(&self.column));
        self.with_encoded(record, encoded)
    }
}

/// Fold index of each row: rows are shuffled with `seed`, then split into
/// `k` contiguous folds whose sizes differ by at most one (larger folds first).
pub fn fold_assignment(n: usize, k: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut folds = vec![0; n];
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        for &row in &order[start..start + size] {
            folds[row] = fold;
        }
        start += size;
    }
    folds
}
