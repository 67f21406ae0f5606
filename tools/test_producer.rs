//! Test Request Producer
//!
//! Generates synthetic scoring requests, sends them to the scoring service over
//! NATS and logs the responses.

use fraud_scoring_pipeline::types::{RecordOutcome, ScoringRequest, ScoringResponse};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// One record in the shape the serving boundary expects
#[derive(Debug, Clone, Serialize)]
struct ScoringRecord {
    score_1: i64,
    score_2: f64,
    score_3: f64,
    score_4: f64,
    score_5: f64,
    score_6: f64,
    pais: String,
    score_7: i64,
    produto: String,
    categoria_produto: String,
    score_8: f64,
    score_9: f64,
    score_10: f64,
    entrega_doc_1: i64,
    entrega_doc_2: Option<String>,
    entrega_doc_3: Option<String>,
    data_compra: String,
    valor_compra: f64,
    score_fraude_modelo: i64,
}

/// Record generator for manual end-to-end runs
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn generate(&mut self, suspicious: bool) -> ScoringRecord {
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let doc = |rng: &mut rand::rngs::ThreadRng, p_yes: f64| -> Option<String> {
            match rng.gen_range(0.0..1.0) {
                r if r < 0.2 => None,
                r if r < 0.2 + p_yes * 0.8 => Some("Y".to_string()),
                _ => Some("N".to_string()),
            }
        };

        ScoringRecord {
            score_1: self.rng.gen_range(1..=4),
            score_2: self.rng.gen_range(0.0..1.0),
            score_3: self.rng.gen_range(0.0..1.0) + if suspicious { 2.0 } else { 0.0 },
            score_4: self.rng.gen_range(0.0..1.0),
            score_5: self.rng.gen_range(0.0..1.0),
            score_6: self.rng.gen_range(0.0..10.0),
            pais: self.random_choice(&["BR", "BR", "AR", "US", "MX"]).to_string(),
            score_7: self.rng.gen_range(0..20),
            produto: format!("produto_{}", self.rng.gen_range(0..500)),
            categoria_produto: format!("cat_{}", self.rng.gen_range(0..40)),
            score_8: self.rng.gen_range(0.0..1.0),
            score_9: self.rng.gen_range(0.0..50.0),
            score_10: self.rng.gen_range(0.0..20.0),
            entrega_doc_1: self.rng.gen_range(0..=1),
            entrega_doc_2: doc(&mut self.rng, if suspicious { 0.1 } else { 0.6 }),
            entrega_doc_3: doc(&mut self.rng, 0.5),
            data_compra: now,
            valor_compra: if suspicious {
                self.rng.gen_range(500.0..5000.0)
            } else {
                self.rng.gen_range(5.0..300.0)
            },
            score_fraude_modelo: self.rng.gen_range(0..100),
        }
    }

    /// Serialize a record, occasionally dropping a required field so the
    /// service's error handling is exercised too
    fn to_payload(&mut self, record: &ScoringRecord, invalid_rate: f64) -> anyhow::Result<serde_json::Value> {
        let mut value = serde_json::to_value(record)?;
        if self.rng.gen_bool(invalid_rate) {
            if let Some(object) = value.as_object_mut() {
                object.remove("valor_compra");
            }
        }
        Ok(value)
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn build_request(
    generator: &mut RecordGenerator,
    batch_size: usize,
    fraud_rate: f64,
    invalid_rate: f64,
) -> anyhow::Result<ScoringRequest> {
    let mut data = Vec::with_capacity(batch_size);
    for _ in 0..batch_size {
        let suspicious = generator.rng.gen_bool(fraud_rate);
        let record = generator.generate(suspicious);
        data.push(generator.to_payload(&record, invalid_rate)?);
    }
    Ok(ScoringRequest { data })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Request Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("scoring.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let batch_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(5);
    let fraud_rate: f64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let invalid_rate: f64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(0.02);
    let delay_ms: u64 = args.get(7).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count,
        batch_size,
        fraud_rate,
        invalid_rate,
        delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, batch_size, fraud_rate, invalid_rate, delay_ms).await;
        }
    };

    let mut generator = RecordGenerator::new();
    let (mut scored, mut flagged, mut failed, mut rejected) = (0u64, 0u64, 0u64, 0u64);

    for i in 0..count {
        let request = build_request(&mut generator, batch_size, fraud_rate, invalid_rate)?;
        let payload = serde_json::to_vec(&request)?;

        let reply = match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(request = i + 1, error = %e, "No response from scoring service");
                continue;
            }
        };

        match serde_json::from_slice::<ScoringResponse>(&reply.payload)? {
            ScoringResponse::Results { results } => {
                for outcome in results {
                    match outcome {
                        RecordOutcome::Scored(p) => {
                            scored += 1;
                            flagged += u64::from(p.label);
                        }
                        RecordOutcome::Failed { .. } => failed += 1,
                    }
                }
            }
            ScoringResponse::Rejected { error, index } => {
                rejected += 1;
                warn!(reason = %error.reason, field = ?error.field, index = ?index, "Request rejected");
            }
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} requests ({} scored, {} flagged, {} failed, {} rejected)",
                i + 1,
                count,
                scored,
                flagged,
                failed,
                rejected
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} scored, {} flagged, {} failed, {} rejected)",
        count, scored, flagged, failed, rejected
    );

    Ok(())
}

async fn run_dry_mode(
    count: u64,
    batch_size: usize,
    fraud_rate: f64,
    invalid_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RecordGenerator::new();

    for i in 0..count {
        let request = build_request(&mut generator, batch_size, fraud_rate, invalid_rate)?;
        let json = serde_json::to_string_pretty(&request)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
