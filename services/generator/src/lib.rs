//! # VectorLink Generator
//!
//! Serves one analyser over TCP and streams normally-distributed vectors to
//! it at a paced rate until the analyser disconnects. In noisy mode a
//! background [`NoiseInjector`] periodically burns a sequence number so the
//! receiving side can exercise its gap handling.

pub mod noise;
pub mod vectors;

pub use noise::NoiseInjector;
pub use vectors::VectorSource;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vectorlink_codec::encode_vector;
use vectorlink_config::{GeneratorSettings, LinkConfig};
use vectorlink_network::{FramedConfig, FramedConnection, TcpConnection, Throttle};

/// Outcome of one generator session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorSummary {
    pub vectors_sent: u64,
    /// Sequence numbers burned by the noise injector
    pub sequences_skipped: u64,
    /// Next sequence number the send counter would have used
    pub next_sequence: u64,
    pub bytes_sent: u64,
}

pub struct GeneratorService {
    addr: SocketAddr,
    settings: GeneratorSettings,
    framed: FramedConfig,
}

impl GeneratorService {
    pub fn new(config: &LinkConfig) -> Result<Self> {
        let addr = config.network.socket_addr()?;
        Ok(Self {
            addr,
            settings: config.generator.clone(),
            framed: FramedConfig {
                read_chunk: config.network.read_chunk,
                max_frame_len: config.network.max_frame_bytes,
                ..FramedConfig::default()
            },
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Bind the configured address and serve a single analyser session
    pub async fn run(&self) -> Result<GeneratorSummary> {
        let listener = TcpConnection::listen(self.addr)
            .await
            .with_context(|| format!("Failed to listen on {}", self.addr))?;
        self.run_with_listener(listener).await
    }

    /// Serve a single analyser on an already listening connection
    pub async fn run_with_listener(&self, mut listener: TcpConnection) -> Result<GeneratorSummary> {
        let peer = listener
            .accept()
            .await
            .context("Failed to accept analyser connection")?;
        info!(peer = %peer, "Analyser connected");

        let mut framed = FramedConnection::with_config(listener, self.framed.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let noise = if self.settings.noisy_mode {
            info!(
                cycle_ms = self.settings.noise_cycle_ms,
                min_delay_ms = self.settings.noise_min_delay_ms,
                "Noisy mode enabled"
            );
            let mut injector = NoiseInjector::new(
                framed.send_sequence(),
                self.settings.noise_cycle(),
                self.settings.noise_min_delay(),
            );
            if let Some(seed) = self.settings.seed {
                injector = injector.with_seed(seed);
            }
            Some(injector.spawn(shutdown_rx))
        } else {
            None
        };

        let outcome = self.send_loop(&mut framed).await;

        let _ = shutdown_tx.send(true);
        let sequences_skipped = match noise {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!("Noise injector task failed: {}", e);
                0
            }),
            None => 0,
        };
        framed.close().await;

        let link = framed.metrics().snapshot();
        info!(
            frames = link.frames_sent,
            bytes = link.bytes_sent,
            errors = link.errors,
            "Link metrics"
        );

        let vectors_sent = outcome?;
        let summary = GeneratorSummary {
            vectors_sent,
            sequences_skipped,
            next_sequence: framed.send_sequence().current(),
            bytes_sent: link.bytes_sent,
        };
        info!(
            sent = summary.vectors_sent,
            skipped = summary.sequences_skipped,
            "Generator session finished"
        );
        Ok(summary)
    }

    async fn send_loop(&self, framed: &mut FramedConnection) -> Result<u64> {
        let mut source = VectorSource::new(self.settings.vector_size, self.settings.seed);
        let mut throttle = Throttle::new(self.settings.send_calls, self.settings.send_period_secs)
            .context("Invalid send rate")?;
        let report_every = self.settings.report_every.max(1);
        let mut sent = 0u64;

        loop {
            let payload = encode_vector(&source.next_vector())?;

            let started = Instant::now();
            match throttle.try_run(framed.send_frame(&payload)).await {
                Ok(sequence) => {
                    sent += 1;
                    let elapsed = started.elapsed().as_secs_f64();
                    if elapsed > 0.0 {
                        debug!(sequence, "Send frequency is {:.2}[Hz]", 1.0 / elapsed);
                    }
                    if sent % report_every == 0 {
                        info!(
                            sent,
                            rate_hz = throttle.observed_rate().unwrap_or_default(),
                            "Send frequency"
                        );
                    }
                }
                Err(e) if e.is_disconnect() => {
                    info!(sent, "Client disconnected");
                    return Ok(sent);
                }
                Err(e) => {
                    error!(category = e.category(), "Send failed: {}", e);
                    return Err(e).context("Failed to send vector");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vectorlink_codec::decode_vector;
    use vectorlink_network::RetryPolicy;

    fn test_config() -> LinkConfig {
        let mut config = LinkConfig::default();
        config.network.port = 0;
        config.generator.vector_size = 4;
        config.generator.seed = Some(3);
        config.generator.send_calls = 2_000;
        config
    }

    #[tokio::test]
    async fn test_streams_until_analyser_leaves() {
        let service = GeneratorService::new(&test_config()).unwrap();
        let listener = TcpConnection::listen(service.addr()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move { service.run_with_listener(listener).await });

        let conn = TcpConnection::connect(addr, &RetryPolicy::bounded(5, Duration::from_millis(20)))
            .await
            .unwrap();
        let mut framed = FramedConnection::new(conn);
        for expected in 0..20u64 {
            let frame = framed.receive_frame().await.unwrap();
            assert_eq!(frame.sequence, expected);
            assert_eq!(decode_vector(&frame.payload).unwrap().len(), 4);
        }
        framed.close().await;

        let summary = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(summary.vectors_sent >= 20);
        assert_eq!(summary.sequences_skipped, 0);
        assert_eq!(summary.next_sequence, summary.vectors_sent + 1);
        assert!(summary.bytes_sent > 0);
    }
}
