//! Service configuration defaults
//!
//! Default values shared by the generator, the analyser and the launcher.

/// Link endpoint defaults
pub mod network {
    /// Address the generator listens on and the analyser dials
    pub const DEFAULT_IP: &str = "127.0.0.1";

    pub const DEFAULT_PORT: u16 = 50066;

    /// Bytes requested per socket read
    pub const READ_CHUNK_BYTES: usize = 64 * 1024;

    /// Largest payload accepted from the peer (16MB)
    pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

    /// Pause between refused connect attempts (milliseconds)
    pub const CONNECT_RETRY_DELAY_MS: u64 = 1_000;
}

/// Generator service defaults
pub mod generator {
    /// Samples per vector
    pub const VECTOR_SIZE: usize = 50;

    /// Target send rate: calls per period
    pub const SEND_CALLS: u64 = 1_000;

    /// Target send rate: period in seconds
    pub const SEND_PERIOD_SECS: f64 = 1.0;

    /// Sends between info-level frequency reports
    pub const REPORT_EVERY: u64 = 1_000;

    /// Length of one noise injection cycle (milliseconds)
    pub const NOISE_CYCLE_MS: u64 = 3_000;

    /// Earliest point in the cycle a sequence number is skipped (milliseconds)
    pub const NOISE_MIN_DELAY_MS: u64 = 2_000;
}

/// Analyser service defaults
pub mod analyser {
    pub const PRODUCERS: usize = 1;

    pub const CONSUMERS: usize = 4;

    /// Vectors per batch (matrix rows)
    pub const BATCH_SIZE: usize = 100;

    /// Total vectors to receive, in thousands
    pub const VECTORS_TO_RECEIVE_THOUSANDS: u64 = 20;

    /// Batches buffered between producers and consumers
    pub const QUEUE_CAPACITY: usize = 32;

    /// Consumer pause after each batch (milliseconds)
    pub const CONSUMER_PACING_MS: u64 = 100;

    pub const FAULT_POLICY: &str = "abort";

    pub const OUTPUT_PATH: &str = "results.json";
}
