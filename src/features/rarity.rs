//! Rarity collapsing for high-cardinality categorical columns

use crate::types::record::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Keeps categories seen at least `min_count` times at fit time and maps
/// everything else, including never-seen values and nulls, to the sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityCollapser {
    column: String,
    sentinel: String,
    frequent: BTreeSet<String>,
}

impl RarityCollapser {
    pub fn fit<'a, I>(column: &str, values: I, min_count: usize, sentinel: &str) -> Self
    where
        I: IntoIterator<Item = &'a FieldValue>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in values {
            if let Some(category) = value.as_str() {
                *counts.entry(category).or_insert(0) += 1;
            }
        }

        let distinct = counts.len();
        let frequent: BTreeSet<String> = counts
            .into_iter()
            .filter(|&(_, count)| count >= min_count)
            .map(|(category, _)| category.to_string())
            .collect();

        debug!(
            column = %column,
            distinct,
            frequent = frequent.len(),
            min_count,
            "Fitted rarity vocabulary"
        );

        Self {
            column: column.to_string(),
            sentinel: sentinel.to_string(),
            frequent,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Categories that keep their own value.
    pub fn vocabulary(&self) -> &BTreeSet<String> {
        &self.frequent
    }

    pub fn collapse(&self, value: &FieldValue) -> String {
        match value.as_str() {
            Some(category) if self.frequent.contains(category) => category.to_string(),
            _ => self.sentinel.clone(),
        }
    }

    pub fn transform(&self, record: &Record) -> Record {
        let collapsed = self.collapse(record.value(&self.column));
        record.clone().with(self.column.clone(), FieldValue::Text(collapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &[&str]) -> Vec<FieldValue> {
        raw.iter().map(|s| FieldValue::text(*s)).collect()
    }

    #[test]
    fn test_infrequent_values_become_sentinel() {
        let data = values(&["A", "B", "C", "A", "D"]);
        let collapser = RarityCollapser::fit("categoria_produto", &data, 2, "Other");

        let collapsed: Vec<String> = data.iter().map(|v| collapser.collapse(v)).collect();
        assert_eq!(collapsed, ["A", "Other", "Other", "A", "Other"]);
    }

    #[test]
    fn test_unseen_and_null_map_to_sentinel() {
        let data = values(&["A", "A"]);
        let collapser = RarityCollapser::fit("categoria_produto", &data, 1, "Other");

        assert_eq!(collapser.collapse(&FieldValue::text("never-seen")), "Other");
        assert_eq!(collapser.collapse(&FieldValue::Null), "Other");
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let data = values(&["A", "A", "A", "B", "Other", "C", "C"]);
        let collapser = RarityCollapser::fit("categoria_produto", &data, 2, "Other");

        for raw in ["A", "B", "C", "Other", "Z"] {
            let record = Record::new().with("categoria_produto", raw);
            let once = collapser.transform(&record);
            let twice = collapser.transform(&once);
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn test_sentinel_is_kept_when_frequent() {
        let data = values(&["Other", "Other", "X"]);
        let collapser = RarityCollapser::fit("c", &data, 2, "Other");
        assert!(collapser.vocabulary().contains("Other"));
        assert_eq!(collapser.collapse(&FieldValue::text("X")), "Other");
    }
}
