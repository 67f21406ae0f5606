//! Removal of columns the classifier must never see

use crate::types::record::Record;
use serde::{Deserialize, Serialize};

/// Drops a fixed set of columns (identifiers, raw timestamps, leaked scores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProjector {
    drop: Vec<String>,
}

impl ColumnProjector {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            drop: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dropped(&self) -> &[String] {
        &self.drop
    }

    /// Absent columns are ignored; this never fails.
    pub fn transform(&self, record: &Record) -> Record {
        self.drop
            .iter()
            .fold(record.clone(), |acc, name| acc.without(name))
    }
}
