//! Population statistics
//!
//! Means and standard deviations use ddof = 0. Empty input yields `0.0` or
//! an empty vector instead of NaN so reports always serialize.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Per-column mean and standard deviation of a row-major matrix
///
/// Columns are taken from the first row; longer rows are truncated to it.
/// Callers check that rows share one width.
pub fn column_stats(rows: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let width = match rows.first() {
        Some(row) => row.len(),
        None => return (Vec::new(), Vec::new()),
    };
    let n = rows.len() as f64;

    let mut means = vec![0.0; width];
    for row in rows {
        for (acc, v) in means.iter_mut().zip(row) {
            *acc += v;
        }
    }
    means.iter_mut().for_each(|m| *m /= n);

    let mut deviations = vec![0.0; width];
    for row in rows {
        for ((acc, v), m) in deviations.iter_mut().zip(row).zip(&means) {
            *acc += (v - m).powi(2);
        }
    }
    let stds = deviations.into_iter().map(|d| (d / n).sqrt()).collect();

    (means, stds)
}
