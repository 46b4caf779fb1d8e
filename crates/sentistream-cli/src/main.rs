//! Sentistream CLI
//!
//! Five-class multilingual sentiment analysis from the command line.
//!
//! - `analyze` labels texts given as arguments or read line by line from stdin
//! - `process` enriches a JSON-lines stream of chat comments with sentiment
//! - `show-config` prints the effective configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use sentistream_analyzer::DeviceSpec;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(name = "sentistream", version)]
#[command(about = "Multilingual five-class sentiment analysis", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "SENTISTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Hugging Face model id or local model directory
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Hub revision to download
    #[arg(long, global = true)]
    revision: Option<String>,

    /// Maximum tokens per text, special tokens included
    #[arg(long, global = true)]
    max_length: Option<usize>,

    /// Inference device: cpu, cuda[:N] or metal[:N]
    #[arg(short, long, global = true)]
    device: Option<DeviceSpec>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Label texts given as arguments, or one per stdin line
    Analyze {
        /// Texts to analyze
        texts: Vec<String>,

        /// Include the confidence score
        #[arg(short, long)]
        scores: bool,

        /// Emit one JSON object per text
        #[arg(long)]
        json: bool,
    },

    /// Enrich JSON-lines comment records with a `sentiment` field
    Process {
        /// Input file; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Comments per forward pass
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Print the effective configuration as YAML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    let metrics_handle = if cli.metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    let config = config::resolve(&cli)?;

    let outcome = match &cli.command {
        Command::Analyze {
            texts,
            scores,
            json,
        } => {
            let format = commands::OutputFormat::from_flags(*scores, *json);
            commands::analyze(config, texts.clone(), format).await
        }
        Command::Process { input, batch_size } => {
            let config = config::with_batch_size(config, *batch_size)?;
            commands::process(config, input.clone(), shutdown_signal()).await
        }
        Command::ShowConfig => commands::show_config(&config),
    };

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    outcome
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("shutdown signal received");
}

/// Initialize tracing; logs go to stderr so stdout carries only results
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("sentistream=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentistream=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Install the Prometheus recorder and describe the exported metrics
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "sentistream_texts_analyzed_total",
        "Total number of texts labeled"
    );
    metrics::describe_counter!(
        "sentistream_batches_total",
        "Total number of batched prediction calls"
    );
    metrics::describe_counter!(
        "sentistream_comments_skipped_total",
        "Comments passed through without text to analyze"
    );
    metrics::describe_counter!(
        "sentistream_malformed_records_total",
        "Input lines that were not valid comment records"
    );
    metrics::describe_counter!("sentistream_errors_total", "Total number of errors by kind");
    metrics::describe_histogram!(
        "sentistream_inference_latency_us",
        metrics::Unit::Microseconds,
        "Latency of one batched prediction call"
    );
    metrics::describe_histogram!(
        "sentistream_batch_size",
        metrics::Unit::Count,
        "Texts per prediction call"
    );
    metrics::describe_histogram!(
        "sentistream_model_load_seconds",
        metrics::Unit::Seconds,
        "Time to resolve and load the model"
    );

    info!("Metrics recorder installed");
    Ok(handle)
}
