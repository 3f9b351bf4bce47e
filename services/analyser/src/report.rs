//! Analysis report
//!
//! JSON document written at the end of an analyser session.

use crate::pipeline::PipelineRun;
use crate::stats::{mean, std_dev};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;
use vectorlink_network::LinkMetricsSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub communication: CommunicationReport,
    pub matrices: Vec<MatrixReport>,
}

/// Link-level measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationReport {
    /// Receive rate of each batch (Hz)
    pub rates: Vec<f64>,
    pub analytics: RateAnalytics,
    /// Single-packet gaps recovered by the sequence tracker
    pub dropped_vectors: u64,
    pub sequence_faults: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    /// Frames of a partial batch abandoned when the session ended early
    pub discarded_frames: u64,
    /// False when the session stopped before every batch was received
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateAnalytics {
    pub mean: f64,
    pub standard_deviation: f64,
}

/// One batch stacked as a matrix with per-column statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixReport {
    pub matrix: Vec<Vec<f64>>,
    pub mean: Vec<f64>,
    pub standard_deviation: Vec<f64>,
}

impl AnalysisReport {
    /// Combine pipeline counts, the receive-side link metrics and the analysed matrices
    pub fn new(run: &PipelineRun, link: &LinkMetricsSnapshot, matrices: Vec<MatrixReport>) -> Self {
        let rates = run.report.rates.clone();
        let analytics = RateAnalytics {
            mean: mean(&rates),
            standard_deviation: std_dev(&rates),
        };
        Self {
            communication: CommunicationReport {
                rates,
                analytics,
                dropped_vectors: link.drops,
                sequence_faults: link.faults,
                frames_received: link.frames_received,
                bytes_received: link.bytes_received,
                discarded_frames: run.report.discarded_frames,
                complete: run.is_complete(),
            },
            matrices,
        }
    }

    /// Write the report as pretty-printed JSON, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {:?}", parent))?;
        }

        let file =
            File::create(path).with_context(|| format!("Failed to create report file {:?}", path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("Failed to serialize report")?;
        writer.flush().context("Failed to flush report")?;

        info!(
            path = ?path,
            matrices = self.matrices.len(),
            "Analysis report written"
        );
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open report {:?}", path))?;
        serde_json::from_reader(file).with_context(|| format!("Failed to parse report {:?}", path))
    }
}
