//! Matrix analytics handler
//!
//! Decodes every frame of a batch into a row vector, stacks the rows into a
//! matrix and records per-column mean and standard deviation.

use crate::error::PipelineError;
use crate::pipeline::{Batch, BatchHandler};
use crate::report::MatrixReport;
use crate::stats::column_stats;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use vectorlink_codec::decode_vector;

#[derive(Debug, Default)]
pub struct MatrixAnalytics {
    results: Mutex<Vec<(usize, usize, MatrixReport)>>,
}

impl MatrixAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of matrices analysed so far
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    /// Drain the analysed matrices ordered by producer then batch index
    pub fn take_matrices(&self) -> Vec<MatrixReport> {
        let mut results = std::mem::take(&mut *self.results.lock());
        results.sort_by_key(|(producer, index, _)| (*producer, *index));
        results.into_iter().map(|(_, _, report)| report).collect()
    }

    /// Build the matrix report for one batch
    pub fn analyse(batch: &Batch) -> Result<MatrixReport, PipelineError> {
        let matrix = batch
            .frames
            .iter()
            .map(|frame| decode_vector(frame))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(width) = matrix.first().map(Vec::len) {
            if let Some(row) = matrix.iter().position(|r| r.len() != width) {
                return Err(PipelineError::Handler {
                    producer: batch.producer,
                    batch: batch.index,
                    message: format!(
                        "row {} has {} columns, expected {}",
                        row,
                        matrix[row].len(),
                        width
                    ),
                });
            }
        }

        let (mean, standard_deviation) = column_stats(&matrix);
        Ok(MatrixReport {
            matrix,
            mean,
            standard_deviation,
        })
    }
}

#[async_trait]
impl BatchHandler for MatrixAnalytics {
    async fn handle(&self, batch: &Batch) -> Result<(), PipelineError> {
        let report = Self::analyse(batch)?;
        debug!(
            producer = batch.producer,
            batch = batch.index,
            rows = report.matrix.len(),
            "Matrix analysed"
        );
        self.results.lock().push((batch.producer, batch.index, report));
        Ok(())
    }
}
