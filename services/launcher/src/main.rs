//! VectorLink launcher
//!
//! Starts the `generator` and `analyser` binaries that sit next to this
//! executable, waits for the analyser and then the generator, and reports
//! success only if both exit cleanly.
//!
//! Usage:
//!   vectorlink
//!   vectorlink --noisy-mode -r 5 --output results.json

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vectorlink_config::LinkConfig;

#[derive(Parser, Debug)]
#[command(name = "vectorlink")]
#[command(about = "Run a VectorLink generator/analyser session")]
#[command(version)]
struct Args {
    /// Periodically skip a generator sequence number
    #[arg(long)]
    noisy_mode: bool,

    /// Vectors to receive, in thousands
    #[arg(short = 'r', long)]
    vectors_to_receive: Option<u64>,

    /// Path to configuration file, passed to both services
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where the analyser writes its JSON report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn common_args(&self) -> Vec<OsString> {
        let mut args = vec!["--log-level".into(), self.log_level.clone().into()];
        if let Some(config) = &self.config {
            args.push("--config".into());
            args.push(config.clone().into());
        }
        args
    }

    fn generator_args(&self) -> Vec<OsString> {
        let mut args = self.common_args();
        if self.noisy_mode {
            args.push("--noisy-mode".into());
        }
        args
    }

    fn analyser_args(&self) -> Vec<OsString> {
        let mut args = self.common_args();
        if let Some(thousands) = self.vectors_to_receive {
            args.push("--vectors-to-receive".into());
            args.push(thousands.to_string().into());
        }
        if let Some(output) = &self.output {
            args.push("--output".into());
            args.push(output.clone().into());
        }
        args
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    // Fail fast on a bad file before starting anything
    let config = LinkConfig::load(args.config.as_deref())?;
    info!(
        addr = %config.network.socket_addr()?,
        noisy = args.noisy_mode || config.generator.noisy_mode,
        "Launching VectorLink session"
    );

    let bin_dir = std::env::current_exe()
        .context("Failed to locate launcher executable")?
        .parent()
        .map(Path::to_path_buf)
        .context("Launcher executable has no parent directory")?;

    let mut generator = spawn(&bin_dir, "generator", args.generator_args())?;
    let mut analyser = match spawn(&bin_dir, "analyser", args.analyser_args()) {
        Ok(child) => child,
        Err(e) => {
            stop(&mut generator).await;
            return Err(e);
        }
    };

    let analyser_status = analyser.wait().await.context("Failed to wait for analyser")?;
    if !analyser_status.success() {
        error!(status = %analyser_status, "Analyser failed");
        stop(&mut generator).await;
        bail!("analyser exited with {}", analyser_status);
    }

    let generator_status = generator.wait().await.context("Failed to wait for generator")?;
    check("generator", generator_status)?;

    println!("Successes!");
    Ok(())
}

fn sibling(bin_dir: &Path, name: &str) -> PathBuf {
    bin_dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
}

fn spawn(bin_dir: &Path, name: &str, args: Vec<OsString>) -> Result<Child> {
    let path = sibling(bin_dir, name);
    let child = Command::new(&path)
        .args(&args)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {} ({:?})", name, path))?;
    info!(name, pid = ?child.id(), "Started service");
    Ok(child)
}

async fn stop(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to stop child process: {}", e);
    }
}

fn check(name: &str, status: ExitStatus) -> Result<()> {
    if !status.success() {
        error!(name, status = %status, "Service failed");
        bail!("{} exited with {}", name, status);
    }
    info!(name, "Service finished");
    Ok(())
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_routed_to_the_right_service() {
        let args = Args::parse_from([
            "vectorlink",
            "--noisy-mode",
            "-r",
            "5",
            "--output",
            "out/results.json",
            "--config",
            "config/vectorlink.toml",
        ]);

        let generator = args.generator_args();
        assert!(generator.contains(&OsString::from("--noisy-mode")));
        assert!(!generator.contains(&OsString::from("--vectors-to-receive")));
        assert!(generator.contains(&OsString::from("config/vectorlink.toml")));

        let analyser = args.analyser_args();
        assert!(!analyser.contains(&OsString::from("--noisy-mode")));
        let r = analyser
            .iter()
            .position(|a| a == "--vectors-to-receive")
            .unwrap();
        assert_eq!(analyser[r + 1], "5");
        assert!(analyser.contains(&OsString::from("out/results.json")));
    }

    #[test]
    fn test_defaults_pass_only_log_level() {
        let args = Args::parse_from(["vectorlink"]);
        assert_eq!(args.generator_args(), vec![OsString::from("--log-level"), "info".into()]);
        assert_eq!(args.analyser_args(), args.generator_args());
    }

    #[test]
    fn test_sibling_binary_path() {
        let path = sibling(Path::new("/opt/vectorlink/bin"), "analyser");
        assert_eq!(path.parent().unwrap(), Path::new("/opt/vectorlink/bin"));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("analyser"));
    }
}
