//! Normalization of boolean-like and low-cardinality string fields

use crate::types::record::{FieldValue, Record};
use serde::{Deserialize, Serialize};

pub const DOC_2_FIELD: &str = "entrega_doc_2";
pub const DOC_3_FIELD: &str = "entrega_doc_3";
pub const COUNTRY_FIELD: &str = "pais";
/// Flag emitted alongside the second document-delivery field.
pub const MISSING_FLAG_FIELD: &str = "is_missing";

/// Deterministic per-field rules; each rule only fires when its field is present.
///
/// - `entrega_doc_2`: emits `is_missing` (1 when null), then maps to 1 for the
///   affirmative token and 0 otherwise (null included).
/// - `pais`: kept only when in the allow-list, otherwise the sentinel.
/// - `entrega_doc_3`: 1 for the affirmative token, else 0. No missing flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNormalizer {
    affirmative_token: String,
    country_allow_list: Vec<String>,
    sentinel: String,
}

impl FieldNormalizer {
    pub fn new(affirmative_token: &str, country_allow_list: &[String], sentinel: &str) -> Self {
        Self {
            affirmative_token: affirmative_token.to_string(),
            country_allow_list: country_allow_list.to_vec(),
            sentinel: sentinel.to_string(),
        }
    }

    fn flag(&self, value: &FieldValue) -> i64 {
        i64::from(value.as_str() == Some(self.affirmative_token.as_str()))
    }

    pub fn transform(&self, record: &Record) -> Record {
        let mut out = record.clone();

        if let Some(doc_2) = record.get(DOC_2_FIELD) {
            out = out
                .with(MISSING_FLAG_FIELD, i64::from(doc_2.is_missing()))
                .with(DOC_2_FIELD, self.flag(doc_2));
        }

        if let Some(country) = record.get(COUNTRY_FIELD) {
            let normalized = match country.as_str() {
                Some(code) if self.country_allow_list.iter().any(|c| c == code) => code,
                _ => self.sentinel.as_str(),
            };
            out = out.with(COUNTRY_FIELD, normalized);
        }

        if let Some(doc_3) = record.get(DOC_3_FIELD) {
            out = out.with(DOC_3_FIELD, self.flag(doc_3));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::new("Y", &["BR".to_string(), "AR".to_string()], "Other")
    }

    #[test]
    fn test_null_doc_2_sets_missing_flag() {
        let record = Record::new().with(DOC_2_FIELD, FieldValue::Null);
        let out = normalizer().transform(&record);

        assert_eq!(out.value(MISSING_FLAG_FIELD), &FieldValue::Int(1));
        assert_eq!(out.value(DOC_2_FIELD), &FieldValue::Int(0));
    }

    #[test]
    fn test_doc_2_present_values() {
        let n = normalizer();
        let yes = n.transform(&Record::new().with(DOC_2_FIELD, "Y"));
        let no = n.transform(&Record::new().with(DOC_2_FIELD, "N"));

        assert_eq!(yes.value(DOC_2_FIELD), &FieldValue::Int(1));
        assert_eq!(yes.value(MISSING_FLAG_FIELD), &FieldValue::Int(0));
        assert_eq!(no.value(DOC_2_FIELD), &FieldValue::Int(0));
        assert_eq!(no.value(MISSING_FLAG_FIELD), &FieldValue::Int(0));
    }

    #[test]
    fn test_country_outside_allow_list_becomes_sentinel() {
        let n = normalizer();
        for (raw, expected) in [("BR", "BR"), ("AR", "AR"), ("US", "Other"), ("br", "Other")] {
            let out = n.transform(&Record::new().with(COUNTRY_FIELD, raw));
            assert_eq!(out.value(COUNTRY_FIELD), &FieldValue::text(expected));
        }
        let null = n.transform(&Record::new().with(COUNTRY_FIELD, FieldValue::Null));
        assert_eq!(null.value(COUNTRY_FIELD), &FieldValue::text("Other"));
    }

    #[test]
    fn test_doc_3_has_no_missing_flag() {
        let out = normalizer().transform(&Record::new().with(DOC_3_FIELD, FieldValue::Null));

        assert_eq!(out.value(DOC_3_FIELD), &FieldValue::Int(0));
        assert!(!out.contains(MISSING_FLAG_FIELD));
    }

    #[test]
    fn test_absent_fields_are_untouched() {
        let record = Record::new().with("score_1", 2_i64);
        assert_eq!(normalizer().transform(&record), record);
    }
}
