//! Analyser binary
//!
//! Usage:
//!   analyser
//!   analyser --vectors-to-receive 5 --output results.json

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vectorlink_analyser::AnalyserService;
use vectorlink_config::LinkConfig;

#[derive(Parser, Debug)]
#[command(name = "analyser")]
#[command(about = "VectorLink vector analyser")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vectors to receive, in thousands
    #[arg(short = 'r', long)]
    vectors_to_receive: Option<u64>,

    /// Where to write the JSON report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sequence fault handling (abort, resync)
    #[arg(long)]
    fault_policy: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = LinkConfig::load(args.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {:#}", e);
        e
    })?;
    if let Some(thousands) = args.vectors_to_receive {
        config.analyser.vectors_to_receive = thousands;
    }
    if let Some(output) = args.output {
        config.analyser.output_path = output;
    }
    if let Some(policy) = args.fault_policy {
        config.analyser.fault_policy = policy;
    }
    config.validate()?;

    let service = AnalyserService::new(&config)?;
    info!(
        addr = %service.addr(),
        vectors = config.analyser.total_vectors(),
        "Starting VectorLink analyser"
    );

    let report = service.run().await.map_err(|e| {
        error!("Analyser failed: {:#}", e);
        e
    })?;
    info!(
        matrices = report.matrices.len(),
        output = ?service.output_path(),
        "Analyser finished"
    );
    Ok(())
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
