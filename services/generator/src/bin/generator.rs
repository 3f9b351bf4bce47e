//! Generator binary
//!
//! Usage:
//!   generator
//!   generator --noisy-mode --config config/vectorlink.toml

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vectorlink_config::LinkConfig;
use vectorlink_generator::GeneratorService;

#[derive(Parser, Debug)]
#[command(name = "generator")]
#[command(about = "VectorLink vector generator")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Periodically skip a sequence number
    #[arg(long)]
    noisy_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = LinkConfig::load(args.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {:#}", e);
        e
    })?;
    if args.noisy_mode {
        config.generator.noisy_mode = true;
    }

    let service = GeneratorService::new(&config)?;
    info!(
        addr = %service.addr(),
        noisy = config.generator.noisy_mode,
        "Starting VectorLink generator"
    );

    let summary = service.run().await?;
    info!(
        sent = summary.vectors_sent,
        skipped = summary.sequences_skipped,
        "Generator stopped"
    );
    Ok(())
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
