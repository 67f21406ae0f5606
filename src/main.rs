//! Fraud Scoring Pipeline - Main Entry Point
//!
//! Offline commands split the raw dataset, fit the feature pipeline and score
//! CSV tables; `serve` answers scoring requests over NATS.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fraud_scoring_pipeline::{
    batch::{load_records, score_table, split_dataset},
    config::{AppConfig, LoggingConfig},
    consumer::{decode_request, drain_workers, ScoringRequestConsumer},
    metrics::{PipelineMetrics, ThroughputReporter},
    models::{Classifier, DecisionPolicy},
    pipeline::{load_pipeline, FittedPipeline},
    producer::ResultProducer,
    types::Schema,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fraud-scoring",
    version,
    about = "Fit and serve the transaction fraud scoring pipeline"
)]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split the raw dataset into train and test tables
    Split {
        #[arg(long, value_name = "CSV")]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Fit the feature pipeline and classifier, then persist the artifact
    Train {
        #[arg(long, value_name = "CSV")]
        input: Option<PathBuf>,
    },

    /// Score a CSV table and write predictions plus a metrics report
    Predict {
        #[arg(long, value_name = "CSV")]
        input: Option<PathBuf>,
        #[arg(long, value_name = "CSV")]
        output: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Answer scoring requests from NATS
    Serve,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fraud_scoring_pipeline={0},fraud_scoring={0}", logging.level)));

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load()?,
    };
    init_logging(&config.logging);
    info!("Configuration loaded successfully");

    match cli.command {
        Command::Split {
            input,
            test_fraction,
            seed,
        } => {
            let input = input.unwrap_or_else(|| config.paths.raw_data.clone());
            split_dataset(
                &input,
                &config.paths.train_data,
                &config.paths.test_data,
                test_fraction,
                seed,
            )?;
        }
        Command::Train { input } => train(&config, input)?,
        Command::Predict {
            input,
            output,
            report,
        } => predict(&config, input, output, report)?,
        Command::Serve => serve(config).await?,
    }

    Ok(())
}

fn train(config: &AppConfig, input: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| config.paths.train_data.clone());
    let records = load_records(&input, &Schema::batch())?;
    info!(path = %input.display(), rows = records.len(), "Training table loaded");

    let policy = DecisionPolicy::new(config.detection.threshold)?;
    let pipeline = FittedPipeline::fit(&records, &config.features, &config.classifier, policy)?;
    info!(
        artifact_id = %pipeline.artifact_id(),
        features = pipeline.vectorizer().width(),
        threshold = pipeline.policy().threshold(),
        "Pipeline fitted"
    );
    pipeline.save(&config.paths.artifact)?;
    Ok(())
}

/// Load the artifact, warning when the configured threshold disagrees with
/// the one fitted into it.
fn load_artifact(config: &AppConfig) -> Result<FittedPipeline> {
    let pipeline = load_pipeline(&config.paths.artifact)?;
    let fitted_threshold = pipeline.policy().threshold();
    if (fitted_threshold - config.detection.threshold).abs() > f64::EPSILON {
        warn!(
            configured = config.detection.threshold,
            artifact = fitted_threshold,
            "Configured threshold differs from the artifact; using the artifact value"
        );
    }
    debug!(
        classifier = pipeline.classifier().name(),
        feature_names = ?pipeline.feature_names(),
        "Pipeline layout"
    );
    Ok(pipeline)
}

fn predict(
    config: &AppConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
) -> Result<()> {
    let pipeline = load_artifact(config)?;
    let input = input.unwrap_or_else(|| config.paths.test_data.clone());
    let output = output.unwrap_or_else(|| config.paths.predictions.clone());
    let report = report.unwrap_or_else(|| config.paths.metrics_report.clone());

    let summary = score_table(&pipeline, &input, &output, &report, config.pipeline.error_mode)?;
    info!(
        rows = summary.rows,
        scored = summary.scored,
        failed = summary.failed,
        flagged = summary.flagged,
        "Batch scoring complete"
    );
    if let Some(report) = &summary.report {
        for (metric, value) in report.entries() {
            info!("{metric}: {value}");
        }
    }
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let pipeline = Arc::new(load_artifact(&config).context("Cannot serve without a valid artifact")?);
    let schema = Arc::new(Schema::serving());
    let metrics = Arc::new(PipelineMetrics::new());

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = ScoringRequestConsumer::new(client.clone(), &config.nats.request_subject);
    let producer = Arc::new(ResultProducer::new(client.clone(), &config.nats.result_subject));

    let num_workers = config.pipeline.workers.max(1);
    let error_mode = config.pipeline.error_mode;
    info!(
        workers = num_workers,
        error_mode = ?error_mode,
        "Listening on subject: {}",
        consumer.subject()
    );
    info!("Publishing unaddressed results to: {}", producer.subject());

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let handled_count = Arc::new(AtomicU64::new(0));

    let reporter = ThroughputReporter::new(metrics.clone(), config.pipeline.summary_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    loop {
        let message = tokio::select! {
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let permit = semaphore.clone().acquire_owned().await?;

        let pipeline = pipeline.clone();
        let schema = schema.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let handled_count = handled_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let response = match decode_request(&message.payload) {
                Ok(request) => {
                    debug!(records = request.data.len(), "Scoring request received");
                    pipeline.score_request(&schema, &request.data, error_mode)
                }
                Err(rejection) => {
                    warn!(bytes = message.payload.len(), "Rejecting malformed request");
                    rejection
                }
            };

            let elapsed = start_time.elapsed();
            metrics.record_response(&response, elapsed);

            if let Err(e) = producer.publish(message.reply.clone(), &response).await {
                error!(error = %e, "Failed to publish scoring response");
            } else {
                debug!(latency_us = elapsed.as_micros(), "Scoring response published");
            }

            let count = handled_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                info!(
                    requests = count,
                    throughput = format!("{:.1} rec/s", metrics.get_throughput()),
                    avg_latency_us = metrics.get_latency_stats().mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Scoring service shutting down, waiting for in-flight requests...");
    drain_workers(&semaphore, num_workers).await?;
    info!(
        requests = handled_count.load(Ordering::Relaxed),
        "All in-flight requests answered"
    );
    metrics.print_summary();
    Ok(())
}
