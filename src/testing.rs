//! Deterministic synthetic transactions for unit tests.

use crate::types::record::{FieldValue, Record};
use crate::types::schema::LABEL_FIELD;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CATEGORIES: [&str; 6] = ["cat_a", "cat_b", "cat_c", "cat_d", "cat_rare_1", "cat_rare_2"];
const CATEGORY_WEIGHTS: [u32; 6] = [40, 30, 15, 13, 1, 1];

fn pick_category(rng: &mut StdRng) -> &'static str {
    let total: u32 = CATEGORY_WEIGHTS.iter().sum();
    let mut roll = rng.gen_range(0..total);
    for (category, weight) in CATEGORIES.iter().zip(CATEGORY_WEIGHTS) {
        if roll < weight {
            return *category;
        }
        roll -= weight;
    }
    CATEGORIES[0]
}

/// One labelled record; fraud rows carry shifted scores and amounts.
pub fn sample_record(rng: &mut StdRng, fraud: bool) -> Record {
    let shift = if fraud { 1.0 } else { 0.0 };
    let maybe = |rng: &mut StdRng, value: f64| -> FieldValue {
        if rng.gen_bool(0.1) {
            FieldValue::Null
        } else {
            FieldValue::Float(value)
        }
    };

    let doc_2 = match rng.gen_range(0..10) {
        0..=2 => FieldValue::Null,
        3..=5 if !fraud => FieldValue::text("Y"),
        _ => FieldValue::text("N"),
    };

    let mut record = Record::new()
        .with("score_1", rng.gen_range(1..=4_i64))
        .with("pais", ["BR", "BR", "AR", "US", "MX"][rng.gen_range(0..5)])
        .with("score_7", FieldValue::Int(rng.gen_range(0..20)))
        .with("produto", format!("produto_{}", rng.gen_range(0..50)).as_str())
        .with("categoria_produto", pick_category(rng))
        .with("entrega_doc_1", rng.gen_range(0..=1_i64))
        .with("entrega_doc_2", doc_2)
        .with("entrega_doc_3", if rng.gen_bool(0.5) { "Y" } else { "N" })
        .with("data_compra", "2020-03-27 11:51:16")
        .with("valor_compra", rng.gen_range(5.0..100.0) + shift * 150.0)
        .with("score_fraude_modelo", rng.gen_range(0..100_i64))
        .with(LABEL_FIELD, i64::from(fraud));

    for i in [2, 3, 4, 5, 6, 8, 9, 10] {
        let base = rng.gen_range(0.0..1.0) + if i == 3 { shift * 2.0 } else { 0.0 };
        let value = maybe(rng, base);
        record = record.with(format!("score_{i}"), value);
    }
    record
}

/// `n` records with roughly a 30% fraud rate.
pub fn training_records(n: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let fraud = rng.gen_bool(0.3);
            sample_record(&mut rng, fraud)
        })
        .collect()
}

/// Write records as a CSV table whose header is the union of their field names.
pub fn write_csv(records: &[Record], path: &std::path::Path) {
    let headers: std::collections::BTreeSet<&str> = records.iter().flat_map(Record::names).collect();
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(&headers).unwrap();
    for record in records {
        writer
            .write_record(headers.iter().map(|h| record.value(h).to_string()))
            .unwrap();
    }
    writer.flush().unwrap();
}
