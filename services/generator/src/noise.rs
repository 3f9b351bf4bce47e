//! Noise injection
//!
//! Periodically burns one send sequence number so the analyser sees a
//! single-packet gap. Each cycle sleeps a uniform random delay in
//! `[min_delay, cycle)`, skips one number, then sleeps out the rest of the
//! cycle.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use vectorlink_codec::SequenceCounter;

pub struct NoiseInjector {
    counter: SequenceCounter,
    cycle: Duration,
    min_delay: Duration,
    rng: StdRng,
}

impl NoiseInjector {
    pub fn new(counter: SequenceCounter, cycle: Duration, min_delay: Duration) -> Self {
        Self {
            counter,
            cycle,
            min_delay: min_delay.min(cycle),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn next_delay(&mut self) -> Duration {
        if self.min_delay >= self.cycle {
            return self.min_delay;
        }
        let secs = self
            .rng
            .gen_range(self.min_delay.as_secs_f64()..self.cycle.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Inject gaps until `shutdown` flips to true or its sender goes away
    ///
    /// Returns the number of sequence numbers skipped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut skipped = 0u64;

        loop {
            let delay = self.next_delay();
            if sleep_or_shutdown(&mut shutdown, delay).await {
                break;
            }

            let sequence = self.counter.skip();
            skipped += 1;
            info!(sequence, "Noise injector skipped a sequence number");

            let remainder = self.cycle.saturating_sub(delay);
            if sleep_or_shutdown(&mut shutdown, remainder).await {
                break;
            }
        }

        debug!(skipped, "Noise injector stopped");
        skipped
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Sleep for `duration`; true if shutdown was requested first
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
