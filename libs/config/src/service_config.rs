//! Service Configuration Module
//!
//! Layered configuration for the VectorLink services, lowest priority first:
//! built-in defaults, an optional TOML file, then `VECTORLINK__` environment
//! variables (`VECTORLINK__ANALYSER__BATCH_SIZE=50`). Command-line flags are
//! applied on top by the binaries.

use crate::service;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "VECTORLINK";

/// Complete configuration for one VectorLink deployment
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    pub network: NetworkSettings,
    pub generator: GeneratorSettings,
    pub analyser: AnalyserSettings,
}

/// Link endpoint and socket settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkSettings {
    pub ip: String,
    pub port: u16,
    pub read_chunk: usize,
    pub max_frame_bytes: usize,
    pub connect_retry_delay_ms: u64,
    /// Refused attempts before giving up; 0 retries forever
    pub connect_max_attempts: u32,
    /// Overall connect deadline; 0 waits forever
    pub connect_timeout_ms: u64,
}

/// Generator service settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GeneratorSettings {
    pub vector_size: usize,
    /// Fixed RNG seed; random when absent
    pub seed: Option<u64>,
    pub send_calls: u64,
    pub send_period_secs: f64,
    pub report_every: u64,
    pub noisy_mode: bool,
    pub noise_cycle_ms: u64,
    pub noise_min_delay_ms: u64,
}

/// Analyser service settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnalyserSettings {
    pub producers: usize,
    pub consumers: usize,
    pub batch_size: usize,
    /// Total vectors to receive, in thousands
    pub vectors_to_receive: u64,
    pub queue_capacity: usize,
    pub consumer_pacing_ms: u64,
    /// `abort` or `resync`
    pub fault_policy: String,
    pub output_path: PathBuf,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            ip: service::network::DEFAULT_IP.to_string(),
            port: service::network::DEFAULT_PORT,
            read_chunk: service::network::READ_CHUNK_BYTES,
            max_frame_bytes: service::network::MAX_FRAME_BYTES,
            connect_retry_delay_ms: service::network::CONNECT_RETRY_DELAY_MS,
            connect_max_attempts: 0,
            connect_timeout_ms: 0,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            vector_size: service::generator::VECTOR_SIZE,
            seed: None,
            send_calls: service::generator::SEND_CALLS,
            send_period_secs: service::generator::SEND_PERIOD_SECS,
            report_every: service::generator::REPORT_EVERY,
            noisy_mode: false,
            noise_cycle_ms: service::generator::NOISE_CYCLE_MS,
            noise_min_delay_ms: service::generator::NOISE_MIN_DELAY_MS,
        }
    }
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            producers: service::analyser::PRODUCERS,
            consumers: service::analyser::CONSUMERS,
            batch_size: service::analyser::BATCH_SIZE,
            vectors_to_receive: service::analyser::VECTORS_TO_RECEIVE_THOUSANDS,
            queue_capacity: service::analyser::QUEUE_CAPACITY,
            consumer_pacing_ms: service::analyser::CONSUMER_PACING_MS,
            fault_policy: service::analyser::FAULT_POLICY.to_string(),
            output_path: PathBuf::from(service::analyser::OUTPUT_PATH),
        }
    }
}

impl NetworkSettings {
    /// Parse `ip:port` into a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.ip, self.port)
            .parse()
            .with_context(|| format!("Invalid endpoint {}:{}", self.ip, self.port))
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn connect_max_attempts(&self) -> Option<u32> {
        (self.connect_max_attempts > 0).then_some(self.connect_max_attempts)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

impl GeneratorSettings {
    pub fn noise_cycle(&self) -> Duration {
        Duration::from_millis(self.noise_cycle_ms)
    }

    pub fn noise_min_delay(&self) -> Duration {
        Duration::from_millis(self.noise_min_delay_ms)
    }
}

impl AnalyserSettings {
    pub fn total_vectors(&self) -> u64 {
        self.vectors_to_receive.saturating_mul(1_000)
    }

    /// Batches each producer must assemble to cover [`total_vectors`](Self::total_vectors)
    pub fn batches_per_producer(&self) -> usize {
        let per_round = (self.batch_size.max(1) * self.producers.max(1)) as u64;
        (self.total_vectors() / per_round).max(1) as usize
    }

    pub fn consumer_pacing(&self) -> Duration {
        Duration::from_millis(self.consumer_pacing_ms)
    }
}

impl LinkConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults =
            Config::try_from(&LinkConfig::default()).context("Failed to encode default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            info!("Loading configuration file: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: LinkConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        self.network.socket_addr()?;

        if self.network.read_chunk == 0 {
            bail!("network.read_chunk must be greater than 0");
        }
        if self.generator.vector_size == 0 {
            bail!("generator.vector_size must be greater than 0");
        }
        if !(self.generator.send_period_secs.is_finite() && self.generator.send_period_secs > 0.0) {
            bail!(
                "generator.send_period_secs must be positive, got {}",
                self.generator.send_period_secs
            );
        }
        if self.generator.noise_min_delay_ms > self.generator.noise_cycle_ms {
            bail!("generator.noise_min_delay_ms must not exceed generator.noise_cycle_ms");
        }
        if self.analyser.producers == 0 || self.analyser.consumers == 0 {
            bail!("analyser needs at least one producer and one consumer");
        }
        if self.analyser.batch_size == 0 {
            bail!("analyser.batch_size must be greater than 0");
        }
        if self.analyser.queue_capacity == 0 {
            bail!("analyser.queue_capacity must be greater than 0");
        }
        match self.analyser.fault_policy.to_ascii_lowercase().as_str() {
            "abort" | "resync" => {}
            other => bail!("analyser.fault_policy must be 'abort' or 'resync', got '{}'", other),
        }
        Ok(())
    }
}
