//! Input schema for transaction records.
//!
//! Validates raw JSON objects (online path) and CSV rows (batch path) into
//! [`Record`]s, reporting the first offending field as a [`SchemaError`].

use crate::error::SchemaError;
use crate::types::record::{FieldValue, Record};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Name of the ground-truth label column.
pub const LABEL_FIELD: &str = "fraude";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    /// Date or date-time string, kept as text once validated.
    Timestamp,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Text => "string",
            FieldKind::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

const fn field(name: &'static str, kind: FieldKind, nullable: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        nullable,
    }
}

/// Declared fields of an incoming record.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Schema enforced on the online scoring boundary: every score is required.
    pub fn serving() -> Self {
        Self::build(false)
    }

    /// Schema for batch tables, where score columns and country may be empty
    /// and are left to the imputer and normalizer.
    pub fn batch() -> Self {
        Self::build(true)
    }

    fn build(lenient: bool) -> Self {
        use FieldKind::{Float, Integer, Text, Timestamp};
        let fields = vec![
            field("score_1", Integer, false),
            field("score_2", Float, lenient),
            field("score_3", Float, lenient),
            field("score_4", Float, lenient),
            field("score_5", Float, lenient),
            field("score_6", Float, lenient),
            field("pais", Text, lenient),
            field("score_7", Integer, lenient),
            field("produto", Text, false),
            field("categoria_produto", Text, false),
            field("score_8", Float, lenient),
            field("score_9", Float, lenient),
            field("score_10", Float, lenient),
            field("entrega_doc_1", Integer, false),
            field("entrega_doc_2", Text, true),
            field("entrega_doc_3", Text, true),
            field("data_compra", Timestamp, false),
            field("valor_compra", Float, false),
            field("score_fraude_modelo", Integer, false),
        ];
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate a JSON object from the serving boundary.
    pub fn validate_json(&self, raw: &serde_json::Value) -> Result<Record, SchemaError> {
        let object = raw.as_object().ok_or_else(|| SchemaError {
            field: "<record>".to_string(),
            reason: "record must be a JSON object".to_string(),
        })?;

        let mut record = Record::new();
        for (name, value) in object {
            record = record.with(name.clone(), json_to_field(name, value)?);
        }
        self.validate(record)
    }

    /// Validate a CSV row given its header.
    pub fn validate_row(&self, headers: &[String], row: &[String]) -> Result<Record, SchemaError> {
        let record = headers
            .iter()
            .zip(row)
            .map(|(name, cell)| (name.clone(), cell_to_field(cell)))
            .collect();
        self.validate(record)
    }

    /// Check presence and coerce declared fields. Undeclared fields other
    /// than the label are dropped.
    pub fn validate(&self, record: Record) -> Result<Record, SchemaError> {
        let mut out = Record::new();
        for spec in &self.fields {
            let value = record.value(spec.name);
            if value.is_missing() {
                if !spec.nullable {
                    return Err(SchemaError::missing(spec.name));
                }
                out = out.with(spec.name, FieldValue::Null);
                continue;
            }
            out = out.with(spec.name, coerce(spec, value)?);
        }

        let label = record.value(LABEL_FIELD);
        if label.is_missing() {
            return Ok(out);
        }
        let spec = field(LABEL_FIELD, FieldKind::Integer, true);
        match coerce(&spec, label) {
            Ok(FieldValue::Int(v @ (0 | 1))) => Ok(out.with(LABEL_FIELD, v)),
            _ => Err(SchemaError {
                field: LABEL_FIELD.to_string(),
                reason: format!("label must be 0 or 1, found '{label}'"),
            }),
        }
    }
}

fn json_to_field(name: &str, value: &serde_json::Value) -> Result<FieldValue, SchemaError> {
    use serde_json::Value;
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(_) => Err(SchemaError::wrong_type(name, "number or string", "boolean")),
        Value::Number(n) => Ok(n
            .as_i64()
            .map(FieldValue::Int)
            .or_else(|| n.as_f64().map(FieldValue::Float))
            .unwrap_or(FieldValue::Null)),
        Value::String(s) => Ok(FieldValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(SchemaError::wrong_type(
            name,
            "scalar value",
            "nested value",
        )),
    }
}

fn cell_to_field(cell: &str) -> FieldValue {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        FieldValue::Null
    } else {
        FieldValue::Text(trimmed.to_string())
    }
}

fn coerce(spec: &FieldSpec, value: &FieldValue) -> Result<FieldValue, SchemaError> {
    let wrong = || SchemaError::wrong_type(spec.name, spec.kind.name(), value.type_name());
    match (spec.kind, value) {
        (FieldKind::Integer, FieldValue::Int(v)) => Ok(FieldValue::Int(*v)),
        (FieldKind::Integer, FieldValue::Float(v)) => integral(*v).map(FieldValue::Int).ok_or_else(wrong),
        (FieldKind::Integer, FieldValue::Text(s)) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(integral))
            .map(FieldValue::Int)
            .ok_or_else(wrong),
        (FieldKind::Float, FieldValue::Int(v)) => Ok(FieldValue::Float(*v as f64)),
        (FieldKind::Float, FieldValue::Float(v)) => Ok(FieldValue::Float(*v)),
        (FieldKind::Float, FieldValue::Text(s)) => {
            s.parse::<f64>().map(FieldValue::Float).map_err(|_| wrong())
        }
        (FieldKind::Text, FieldValue::Text(s)) => Ok(FieldValue::Text(s.clone())),
        (FieldKind::Timestamp, FieldValue::Text(s)) if is_timestamp(s) => {
            Ok(FieldValue::Text(s.clone()))
        }
        _ => Err(wrong()),
    }
}

/// Whole float representable as `i64` without saturation.
fn integral(v: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    (v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64).then_some(v as i64)
}

fn is_timestamp(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> serde_json::Value {
        json!({
            "score_1": 4, "score_2": 0.73, "score_3": 12.0, "score_4": 0.5,
            "score_5": 0.0, "score_6": 8.1, "pais": "BR", "score_7": 9,
            "produto": "Capa celular", "categoria_produto": "cat_1",
            "score_8": 0.2, "score_9": 10.0, "score_10": 4.0,
            "entrega_doc_1": 1, "entrega_doc_2": null, "entrega_doc_3": "N",
            "data_compra": "2020-03-27 11:51:16", "valor_compra": 5.64,
            "score_fraude_modelo": 66
        })
    }

    #[test]
    fn test_valid_payload_passes() {
        let record = Schema::serving().validate_json(&valid_payload()).unwrap();
        assert_eq!(record.value("score_3"), &FieldValue::Float(12.0));
        assert!(record.value("entrega_doc_2").is_null());
    }

    #[test]
    fn test_missing_required_field_names_field() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("valor_compra");

        let err = Schema::serving().validate_json(&payload).unwrap_err();
        assert_eq!(err.field, "valor_compra");
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let mut payload = valid_payload();
        payload["score_2"] = json!("not a number");

        let err = Schema::serving().validate_json(&payload).unwrap_err();
        assert_eq!(err.field, "score_2");
        assert!(err.reason.contains("float"));
    }

    #[test]
    fn test_batch_schema_allows_missing_scores() {
        let mut payload = valid_payload();
        payload["score_4"] = json!(null);

        assert!(Schema::serving().validate_json(&payload).is_err());
        let record = Schema::batch().validate_json(&payload).unwrap();
        assert!(record.value("score_4").is_null());
    }

    #[test]
    fn test_csv_row_is_coerced() {
        let headers: Vec<String> = ["score_1", "score_2", "entrega_doc_2", "fraude"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row: Vec<String> = ["3", "", "Y", "1"].iter().map(|s| s.to_string()).collect();
        let schema = Schema {
            fields: vec![
                field("score_1", FieldKind::Integer, false),
                field("score_2", FieldKind::Float, true),
                field("entrega_doc_2", FieldKind::Text, true),
            ],
        };

        let record = schema.validate_row(&headers, &row).unwrap();
        assert_eq!(record.value("score_1"), &FieldValue::Int(3));
        assert!(record.value("score_2").is_null());
        assert_eq!(record.label(LABEL_FIELD), Some(1));
    }

    #[test]
    fn test_undeclared_fields_are_dropped() {
        let mut payload = valid_payload();
        payload["Unnamed: 0"] = json!("17");
        payload["categoria_produto_Kfold_Target_Enc"] = json!("0.42");
        payload["fraude"] = json!("1");

        let record = Schema::batch().validate_json(&payload).unwrap();
        assert!(!record.contains("Unnamed: 0"));
        assert!(!record.contains("categoria_produto_Kfold_Target_Enc"));
        assert_eq!(record.label(LABEL_FIELD), Some(1));
        assert_eq!(record.len(), Schema::batch().fields().len() + 1);
    }

    #[test]
    fn test_out_of_range_integers_are_rejected() {
        for bad in [json!("1e300"), json!(1e300), json!(-1e19), json!(2.5)] {
            let mut payload = valid_payload();
            payload["score_1"] = bad;
            let err = Schema::serving().validate_json(&payload).unwrap_err();
            assert_eq!(err.field, "score_1");
        }

        let mut payload = valid_payload();
        payload["score_1"] = json!("3.0");
        let record = Schema::serving().validate_json(&payload).unwrap();
        assert_eq!(record.value("score_1"), &FieldValue::Int(3));
    }

    #[test]
    fn test_booleans_are_wrong_type() {
        let mut payload = valid_payload();
        payload["score_1"] = json!(true);

        let err = Schema::serving().validate_json(&payload).unwrap_err();
        assert_eq!(err.field, "score_1");
        assert!(err.reason.contains("boolean"));
    }

    #[test]
    fn test_bad_label_is_rejected() {
        let mut payload = valid_payload();
        payload["fraude"] = json!(3);
        let err = Schema::serving().validate_json(&payload).unwrap_err();
        assert_eq!(err.field, LABEL_FIELD);
    }
}
