//! Runtime counters for the scoring service.

use crate::types::prediction::{RecordOutcome, ScoringResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Counters shared by every scoring worker
pub struct PipelineMetrics {
    /// Requests answered with per-record results
    pub requests_handled: AtomicU64,
    /// Requests rejected as a whole
    pub requests_rejected: AtomicU64,
    /// Records that produced a prediction
    pub records_scored: AtomicU64,
    /// Scored records decided as fraud
    pub fraud_flagged: AtomicU64,
    /// Records that failed validation or scoring
    pub records_failed: AtomicU64,
    /// Failures keyed by offending field
    failures_by_field: RwLock<HashMap<String, u64>>,
    /// Request latencies (in microseconds)
    request_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            requests_handled: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            records_scored: AtomicU64::new(0),
            fraud_flagged: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
            failures_by_field: RwLock::new(HashMap::new()),
            request_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one answered request and every outcome it carries
    pub fn record_response(&self, response: &ScoringResponse, elapsed: Duration) {
        match response {
            ScoringResponse::Results { results } => {
                self.requests_handled.fetch_add(1, Ordering::Relaxed);
                for outcome in results {
                    match outcome {
                        RecordOutcome::Scored(result) => {
                            self.record_prediction(result.label, result.probability)
                        }
                        RecordOutcome::Failed { error } => self.record_failure(error.field.as_deref()),
                    }
                }
            }
            ScoringResponse::Rejected { error, .. } => {
                self.requests_rejected.fetch_add(1, Ordering::Relaxed);
                self.record_failure(error.field.as_deref());
            }
        }

        if let Ok(mut times) = self.request_times.write() {
            times.push(elapsed.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    pub fn record_prediction(&self, label: u8, probability: f64) {
        self.records_scored.fetch_add(1, Ordering::Relaxed);
        if label == 1 {
            self.fraud_flagged.fetch_add(1, Ordering::Relaxed);
        }

        let bucket = (probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_failure(&self, field: Option<&str>) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_field) = self.failures_by_field.write() {
            *by_field.entry(field.unwrap_or("-").to_string()).or_insert(0) += 1;
        }
    }

    /// Request latency statistics over the retained window
    pub fn get_latency_stats(&self) -> LatencyStats {
        let Ok(times) = self.request_times.read() else {
            return LatencyStats::default();
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Records scored per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    pub fn get_failures_by_field(&self) -> HashMap<String, u64> {
        self.failures_by_field
            .read()
            .map(|by_field| by_field.clone())
            .unwrap_or_default()
    }

    pub fn print_summary(&self) {
        let scored = self.records_scored.load(Ordering::Relaxed);
        let flagged = self.fraud_flagged.load(Ordering::Relaxed);
        let failed = self.records_failed.load(Ordering::Relaxed);
        let flag_rate = if scored > 0 {
            (flagged as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        let latency = self.get_latency_stats();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            FRAUD SCORING SERVICE - METRICS SUMMARY           ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests: {:>8} handled, {:>6} rejected                     ║",
            self.requests_handled.load(Ordering::Relaxed),
            self.requests_rejected.load(Ordering::Relaxed)
        );
        info!(
            "║ Records Scored: {:>8}  │  Throughput: {:>6.1} rec/s       ║",
            scored,
            self.get_throughput()
        );
        info!(
            "║ Flagged as Fraud: {:>6}  │  Flag Rate: {:>6.1}%             ║",
            flagged, flag_rate
        );
        info!(
            "║ Request Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        if failed > 0 {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failed Records by Field ({failed} total):");
            for (field, count) in &self.get_failures_by_field() {
                info!("║   {:24}: {:>6}", field, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Probability Distribution:                                    ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodically logs a [`PipelineMetrics`] summary
pub struct ThroughputReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl ThroughputReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
