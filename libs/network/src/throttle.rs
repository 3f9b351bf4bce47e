//! Send pacing
//!
//! [`Throttle`] keeps a wrapped operation on an ideal uniform schedule of
//! `calls` invocations per `period`. After the n-th invocation it sleeps
//! until `start + n * period / calls`. A slow invocation simply skips the
//! sleep and the following fast ones catch up, so the long-run rate
//! converges to the target. Calls are never dropped and never run ahead of
//! schedule; this is not a token bucket.

use crate::{Result, TransportError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Throttle {
    calls: u64,
    period: Duration,
    interval: Duration,
    start: Option<Instant>,
    invocations: u64,
}

impl Throttle {
    /// Pace to `calls` invocations per `period_secs` seconds
    ///
    /// `calls` is clamped to at least 1. The period must be a positive,
    /// finite number of seconds.
    pub fn new(calls: u64, period_secs: f64) -> Result<Self> {
        if !period_secs.is_finite() || period_secs <= 0.0 {
            return Err(TransportError::configuration(
                format!("Throttle period must be a positive number of seconds, got {}", period_secs),
                Some("period"),
            ));
        }

        let calls = calls.max(1);
        let period = Duration::from_secs_f64(period_secs);
        Ok(Self {
            calls,
            period,
            interval: period.div_f64(calls as f64),
            start: None,
            invocations: 0,
        })
    }

    /// Run `op`, then sleep until the schedule allows the next invocation
    pub async fn run<F>(&mut self, op: F) -> F::Output
    where
        F: Future,
    {
        let start = *self.start.get_or_insert_with(Instant::now);

        let value = op.await;
        self.pace(start).await;
        value
    }

    /// Like [`Throttle::run`], but an `Err` returns at once
    ///
    /// A failed invocation is not counted and does not wait for its slot.
    pub async fn try_run<F, T, E>(&mut self, op: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        let start = *self.start.get_or_insert_with(Instant::now);

        let value = op.await?;
        self.pace(start).await;
        Ok(value)
    }

    async fn pace(&mut self, start: Instant) {
        self.invocations += 1;
        let deadline = start + self.interval.mul_f64(self.invocations as f64);
        let now = Instant::now();
        if deadline > now {
            tokio::time::sleep_until(deadline).await;
        } else {
            trace!(behind_us = (now - deadline).as_micros() as u64, "Throttle behind schedule");
        }
    }

    /// Mean seconds per invocation since the first call
    pub fn average_interval(&self) -> Option<f64> {
        let start = self.start?;
        if self.invocations == 0 {
            return None;
        }
        Some(start.elapsed().as_secs_f64() / self.invocations as f64)
    }

    /// Observed invocation rate in Hz since the first call
    pub fn observed_rate(&self) -> Option<f64> {
        self.average_interval()
            .filter(|interval| *interval > 0.0)
            .map(|interval| 1.0 / interval)
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_period() {
        assert!(Throttle::new(10, 0.0).is_err());
        assert!(Throttle::new(10, -1.0).is_err());
        assert!(Throttle::new(10, f64::NAN).is_err());
    }

    #[test]
    fn test_zero_calls_clamped_to_one() {
        let throttle = Throttle::new(0, 1.0).unwrap();
        assert_eq!(throttle.calls(), 1);
    }

    #[tokio::test]
    async fn test_paces_instant_operations_to_schedule() {
        let mut throttle = Throttle::new(10, 1.0).unwrap();
        let started = std::time::Instant::now();

        for i in 0..10 {
            let value = throttle.run(async { i * 2 }).await;
            assert_eq!(value, i * 2);
        }

        let elapsed = started.elapsed().as_secs_f64();
        assert!(elapsed >= 0.9, "finished too early: {elapsed}");
        assert!(elapsed <= 1.1, "finished too late: {elapsed}");
        assert_eq!(throttle.invocations(), 10);
    }

    #[tokio::test]
    async fn test_slow_invocation_is_absorbed() {
        let mut throttle = Throttle::new(20, 1.0).unwrap();
        let started = std::time::Instant::now();

        throttle
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await;
        for _ in 0..3 {
            throttle.run(async {}).await;
        }

        // four slots of 50ms fit inside the first slow call
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(300), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_invocation_skips_sleep() {
        let mut throttle = Throttle::new(1, 10.0).unwrap();
        let started = Instant::now();

        let ok: std::result::Result<u32, &str> = throttle.try_run(async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        assert_eq!(Instant::now() - started, Duration::from_secs(10));

        let failed: std::result::Result<u32, &str> =
            throttle.try_run(async { Err("peer gone") }).await;
        assert_eq!(failed, Err("peer gone"));
        assert_eq!(Instant::now() - started, Duration::from_secs(10));
        assert_eq!(throttle.invocations(), 1);
    }
}
