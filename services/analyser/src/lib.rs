//! # VectorLink Analyser
//!
//! Connects to the generator, receives framed vectors through the batch
//! [`Pipeline`], analyses each batch as a matrix and writes an
//! [`AnalysisReport`] with receive rates, sequence-gap counts and per-matrix
//! statistics.
//!
//! The pipeline is cooperative and is meant to run on a current-thread
//! runtime.

pub mod analytics;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod stats;

pub use analytics::MatrixAnalytics;
pub use error::PipelineError;
pub use pipeline::{
    Batch, BatchHandler, BatchQueue, Pipeline, PipelineConfig, PipelineReport, PipelineRun,
};
pub use report::{AnalysisReport, CommunicationReport, MatrixReport, RateAnalytics};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use vectorlink_config::LinkConfig;
use vectorlink_network::{FaultPolicy, FramedConfig, FramedConnection, RetryPolicy, TcpConnection};

pub struct AnalyserService {
    addr: SocketAddr,
    retry: RetryPolicy,
    framed: FramedConfig,
    pipeline: PipelineConfig,
    output_path: PathBuf,
}

impl AnalyserService {
    pub fn new(config: &LinkConfig) -> Result<Self> {
        let network = &config.network;
        let addr = network.socket_addr()?;

        let mut retry = match network.connect_max_attempts() {
            Some(attempts) => RetryPolicy::bounded(attempts, network.connect_retry_delay()),
            None => RetryPolicy {
                delay: network.connect_retry_delay(),
                ..RetryPolicy::unbounded()
            },
        };
        if let Some(timeout) = network.connect_timeout() {
            retry = retry.with_timeout(timeout);
        }

        let fault_policy: FaultPolicy = config
            .analyser
            .fault_policy
            .parse()
            .context("Invalid analyser fault policy")?;

        let pipeline = PipelineConfig::from_settings(&config.analyser);
        pipeline.validate()?;

        Ok(Self {
            addr,
            retry,
            framed: FramedConfig {
                read_chunk: network.read_chunk,
                max_frame_len: network.max_frame_bytes,
                fault_policy,
            },
            pipeline,
            output_path: config.analyser.output_path.clone(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Receive, analyse and write the report for one generator session
    pub async fn run(&self) -> Result<AnalysisReport> {
        let conn = TcpConnection::connect(self.addr, &self.retry)
            .await
            .with_context(|| format!("Failed to connect to generator at {}", self.addr))?;
        info!(
            peer = %self.addr,
            fault_policy = %self.framed.fault_policy,
            "Connected to generator"
        );

        let source = Arc::new(Mutex::new(FramedConnection::with_config(
            conn,
            self.framed.clone(),
        )));
        let handler = Arc::new(MatrixAnalytics::new());

        let metrics = source.lock().await.metrics();

        let run = Pipeline::new(self.pipeline.clone())?
            .run(source.clone(), handler.clone())
            .await;
        source.lock().await.close().await;

        let link = metrics.snapshot();
        info!(
            frames = link.frames_received,
            bytes = link.bytes_received,
            drops = link.drops,
            faults = link.faults,
            errors = link.errors,
            "Link metrics"
        );
        if run.report.failed_batches > 0 {
            warn!(failed = run.report.failed_batches, "Some batches could not be analysed");
        }

        // Batches analysed before an early stop still make it to disk
        let report = AnalysisReport::new(&run, &link, handler.take_matrices());
        info!(
            rate_mean_hz = report.communication.analytics.mean,
            rate_std_hz = report.communication.analytics.standard_deviation,
            matrices = report.matrices.len(),
            complete = report.communication.complete,
            "Session analysed"
        );
        report.write_to(&self.output_path)?;

        match run.error {
            Some(e) => Err(anyhow::Error::new(e).context(format!(
                "Batch pipeline failed; partial report written to {}",
                self.output_path.display()
            ))),
            None => Ok(report),
        }
    }
}
