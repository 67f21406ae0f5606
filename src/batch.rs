//! Offline table handling: dataset split, training-table loading and batch scoring.

use crate::config::ErrorMode;
use crate::error::{PipelineError, Result, ScoringError};
use crate::evaluation::{EvaluationReport, MetricsReporter};
use crate::pipeline::FittedPipeline;
use crate::types::record::Record;
use crate::types::schema::{Schema, LABEL_FIELD};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub const PREDICTED_LABEL_COLUMN: &str = "predicted_label";
pub const PREDICTED_PROBABILITY_COLUMN: &str = "predicted_probability";
pub const TRUE_LABEL_COLUMN: &str = "true_label";

/// Header plus raw cell text, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let csv_err = |source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        debug!(path = %path.display(), rows = rows.len(), "Read table");
        Ok(Self { headers, rows })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PipelineError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let csv_err = |source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        writer.write_record(&self.headers).map_err(csv_err)?;
        for row in &self.rows {
            writer.write_record(row).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            headers: self.headers.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Shuffle rows with a seeded generator and write `ceil(n * test_fraction)`
/// of them to the test file, the rest to the train file.
pub fn split_dataset(
    input: &Path,
    train_out: &Path,
    test_out: &Path,
    test_fraction: f64,
    seed: u64,
) -> Result<(usize, usize)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::Config(format!(
            "test fraction must lie in (0, 1), got {test_fraction}"
        )));
    }

    let table = Table::read(input)?;
    let mut order: Vec<usize> = (0..table.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_test = (table.len() as f64 * test_fraction).ceil() as usize;
    let (test_idx, train_idx) = order.split_at(n_test.min(order.len()));

    table.subset(train_idx).write(train_out)?;
    table.subset(test_idx).write(test_out)?;

    info!(
        train = train_idx.len(),
        test = test_idx.len(),
        seed,
        "Dataset split written"
    );
    Ok((train_idx.len(), test_idx.len()))
}

/// Validate every row of a CSV; the first bad row fails the load with its line number.
pub fn load_records(path: &Path, schema: &Schema) -> Result<Vec<Record>> {
    let table = Table::read(path)?;
    table
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            schema
                .validate_row(&table.headers, row)
                .map_err(|source| PipelineError::InvalidRow {
                    path: path.to_path_buf(),
                    line: idx + 2,
                    source,
                })
        })
        .collect()
}

/// Outcome of a batch scoring run.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub rows: usize,
    pub scored: usize,
    pub failed: usize,
    pub flagged: usize,
    /// Present when the table carried ground-truth labels
    pub report: Option<EvaluationReport>,
}

/// Score every row of `input`, writing the augmented table to `output` and,
/// when labels are present, the metrics report to `report_path`.
pub fn score_table(
    pipeline: &FittedPipeline,
    input: &Path,
    output: &Path,
    report_path: &Path,
    mode: ErrorMode,
) -> Result<BatchSummary> {
    let schema = Schema::batch();
    let mut table = Table::read(input)?;
    let label_idx = table.headers.iter().position(|h| h == LABEL_FIELD);

    let mut y_true = Vec::new();
    let mut y_pred = Vec::new();
    let mut y_proba = Vec::new();
    let mut failed = 0usize;
    let mut flagged = 0usize;

    for (idx, row) in table.rows.iter_mut().enumerate() {
        let line = idx + 2;
        let true_label = label_idx.and_then(|i| row.get(i)).cloned();
        let scored = schema
            .validate_row(&table.headers, row)
            .map_err(ScoringError::from)
            .and_then(|record| Ok((record.label(LABEL_FIELD), pipeline.score(&record)?)));

        match scored {
            Ok((label, prediction)) => {
                row.push(prediction.label.to_string());
                row.push(prediction.probability.to_string());
                flagged += usize::from(prediction.label);
                if let Some(label) = label {
                    y_true.push(label);
                    y_pred.push(prediction.label);
                    y_proba.push(prediction.probability);
                }
            }
            Err(e) if mode == ErrorMode::WholeBatch => {
                return Err(match e {
                    ScoringError::Schema(source) => PipelineError::InvalidRow {
                        path: input.to_path_buf(),
                        line,
                        source,
                    },
                    other => PipelineError::Scoring(other),
                });
            }
            Err(e) => {
                warn!(line, field = e.field().unwrap_or("-"), error = %e, "Row left unscored");
                failed += 1;
                row.push(String::new());
                row.push(String::new());
            }
        }
        if label_idx.is_some() {
            row.push(true_label.unwrap_or_default());
        }
    }

    table.headers.push(PREDICTED_LABEL_COLUMN.to_string());
    table.headers.push(PREDICTED_PROBABILITY_COLUMN.to_string());
    if label_idx.is_some() {
        table.headers.push(TRUE_LABEL_COLUMN.to_string());
    }
    table.write(output)?;
    info!(
        path = %output.display(),
        rows = table.len(),
        flagged,
        failed,
        "Predictions saved"
    );

    let report = if y_true.is_empty() {
        debug!("No labelled rows scored, skipping metrics report");
        None
    } else {
        let report = MetricsReporter::evaluate(&y_true, &y_pred, Some(&y_proba))?;
        report.write_to(report_path)?;
        Some(report)
    };

    Ok(BatchSummary {
        rows: table.len(),
        scored: table.len() - failed,
        failed,
        flagged,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, FeatureConfig};
    use crate::models::DecisionPolicy;
    use crate::testing::{training_records, write_csv};

    fn fitted() -> FittedPipeline {
        let features = FeatureConfig {
            min_count: 10,
            ..FeatureConfig::default()
        };
        FittedPipeline::fit(
            &training_records(300, 5),
            &features,
            &ClassifierConfig::default(),
            DecisionPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_split_is_seeded_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        write_csv(&training_records(11, 1), &raw);

        let train = dir.path().join("train.csv");
        let test = dir.path().join("test.csv");
        assert_eq!(split_dataset(&raw, &train, &test, 0.2, 42).unwrap(), (8, 3));

        let first = Table::read(&test).unwrap();
        split_dataset(&raw, &train, &test, 0.2, 42).unwrap();
        assert_eq!(Table::read(&test).unwrap(), first);

        let mut all: Vec<_> = Table::read(&train).unwrap().rows;
        all.extend(first.rows);
        all.sort();
        let mut expected = Table::read(&raw).unwrap().rows;
        expected.sort();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.csv");
        assert!(matches!(
            split_dataset(&p, &p, &p, 1.0, 42),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_load_records_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        let mut records = training_records(5, 2);
        records[3] = records[3].clone().with("valor_compra", "lots");
        write_csv(&records, &path);

        match load_records(&path, &Schema::batch()) {
            Err(PipelineError::InvalidRow { line, source, .. }) => {
                assert_eq!(line, 5);
                assert_eq!(source.field, "valor_compra");
            }
            other => panic!("expected an invalid row, got {other:?}"),
        }

        records[3] = records[3].clone().with("valor_compra", 12.5);
        write_csv(&records, &path);
        let loaded = load_records(&path, &Schema::batch()).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded[0].label(LABEL_FIELD), records[0].label(LABEL_FIELD));
    }

    #[test]
    fn test_extra_columns_do_not_break_training() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        let records: Vec<Record> = training_records(200, 4)
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                r.with("Unnamed: 0", i as i64)
                    .with("categoria_produto_Kfold_Target_Enc", "0.3")
            })
            .collect();
        write_csv(&records, &path);

        let loaded = load_records(&path, &Schema::batch()).unwrap();
        assert!(!loaded[0].contains("categoria_produto_Kfold_Target_Enc"));

        let features = FeatureConfig {
            min_count: 10,
            ..FeatureConfig::default()
        };
        let pipeline =
            FittedPipeline::fit(&loaded, &features, &ClassifierConfig::default(), DecisionPolicy::default())
                .unwrap();
        assert!(!pipeline.feature_names().iter().any(|n| n.starts_with("Unnamed")));
    }

    #[test]
    fn test_score_table_writes_predictions_and_report() {
        let pipeline = fitted();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("test.csv");
        let output = dir.path().join("out").join("predictions.csv");
        let report = dir.path().join("out").join("metrics.txt");
        write_csv(&training_records(40, 77), &input);

        let summary = score_table(&pipeline, &input, &output, &report, ErrorMode::PerRecord).unwrap();
        assert_eq!(summary.rows, 40);
        assert_eq!(summary.failed, 0);

        let table = Table::read(&output).unwrap();
        let n = table.headers.len();
        assert_eq!(
            &table.headers[n - 3..],
            [PREDICTED_LABEL_COLUMN, PREDICTED_PROBABILITY_COLUMN, TRUE_LABEL_COLUMN]
        );
        let fraude = table.headers.iter().position(|h| h == LABEL_FIELD).unwrap();
        for row in &table.rows {
            assert_eq!(row[n - 1], row[fraude]);
            let p: f64 = row[n - 2].parse().unwrap();
            let label: u8 = row[n - 3].parse().unwrap();
            assert_eq!(label, pipeline.policy().decide(p));
        }

        let text = fs::read_to_string(&report).unwrap();
        assert!(text.starts_with("Accuracy: "));
        assert!(text.contains("ROC AUC: "));
        assert_eq!(summary.report.unwrap().to_string(), text);
    }

    #[test]
    fn test_invalid_rows_follow_error_mode() {
        let pipeline = fitted();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("test.csv");
        let output = dir.path().join("predictions.csv");
        let report = dir.path().join("metrics.txt");
        let mut records = training_records(6, 8);
        records[2] = records[2].clone().with("valor_compra", "n/a");
        write_csv(&records, &input);

        let err = score_table(&pipeline, &input, &output, &report, ErrorMode::WholeBatch).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRow { line: 4, .. }));

        let summary = score_table(&pipeline, &input, &output, &report, ErrorMode::PerRecord).unwrap();
        assert_eq!(summary.failed, 1);
        let table = Table::read(&output).unwrap();
        let n = table.headers.len();
        assert_eq!(table.rows[2][n - 3], "");
        assert_eq!(table.rows[2][n - 2], "");
        assert!(!table.rows[1][n - 2].is_empty());
    }

    #[test]
    fn test_unlabelled_table_has_no_report() {
        let pipeline = fitted();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("live.csv");
        let output = dir.path().join("predictions.csv");
        let report = dir.path().join("metrics.txt");
        let records: Vec<Record> = training_records(5, 3)
            .into_iter()
            .map(|r| r.without(LABEL_FIELD))
            .collect();
        write_csv(&records, &input);

        let summary = score_table(&pipeline, &input, &output, &report, ErrorMode::PerRecord).unwrap();
        assert!(summary.report.is_none());
        assert!(!report.exists());
        let table = Table::read(&output).unwrap();
        assert_eq!(table.headers.last().map(String::as_str), Some(PREDICTED_PROBABILITY_COLUMN));
    }
}
