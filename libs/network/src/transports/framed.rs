//! Framed Connection
//!
//! Binds one [`TcpConnection`] to the per-direction state that turns bytes
//! into frames: the receive buffer, the sequence tracker and the shared send
//! counter. Each side of the link owns exactly one of these; nothing here is
//! global.

use super::metrics::LinkMetrics;
use super::tcp::TcpConnection;
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::{debug, error, warn};
use vectorlink_codec::{
    pack_into, Frame, FrameParser, SequenceCounter, SequenceTracker, VerifyOutcome,
    DEFAULT_MAX_FRAME_LEN,
};

/// Default number of bytes requested from the socket per read
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// What to do when the tracker reports a sequence fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Fail the receive with [`TransportError::SequenceFault`]
    #[default]
    Abort,
    /// Log, count and keep delivering frames from the resynchronized point
    Resync,
}

impl FromStr for FaultPolicy {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(FaultPolicy::Abort),
            "resync" => Ok(FaultPolicy::Resync),
            other => Err(TransportError::configuration(
                format!("Unknown fault policy '{}', expected 'abort' or 'resync'", other),
                Some("fault_policy"),
            )),
        }
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPolicy::Abort => f.write_str("abort"),
            FaultPolicy::Resync => f.write_str("resync"),
        }
    }
}

/// Stream settings for a framed connection
#[derive(Debug, Clone)]
pub struct FramedConfig {
    /// Bytes requested per socket read
    pub read_chunk: usize,
    /// Largest payload accepted from the peer
    pub max_frame_len: usize,
    pub fault_policy: FaultPolicy,
}

impl Default for FramedConfig {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            fault_policy: FaultPolicy::Abort,
        }
    }
}

/// Source of reassembled payloads, one frame at a time
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next verified payload
    async fn next_frame(&mut self) -> Result<Bytes>;

    /// Single-packet gaps seen since the previous call
    fn take_drop_report(&mut self) -> u64 {
        0
    }
}

/// A TCP connection speaking the `<length>SEQ<seq>:` framing
pub struct FramedConnection {
    conn: TcpConnection,
    config: FramedConfig,
    parser: FrameParser,
    write_buffer: BytesMut,
    tracker: SequenceTracker,
    send_sequence: SequenceCounter,
    metrics: LinkMetrics,
}

impl FramedConnection {
    pub fn new(conn: TcpConnection) -> Self {
        Self::with_config(conn, FramedConfig::default())
    }

    pub fn with_config(conn: TcpConnection, config: FramedConfig) -> Self {
        Self {
            conn,
            parser: FrameParser::with_max_frame_len(config.max_frame_len),
            write_buffer: BytesMut::with_capacity(DEFAULT_READ_CHUNK),
            config,
            tracker: SequenceTracker::new(),
            send_sequence: SequenceCounter::new(),
            metrics: LinkMetrics::new(),
        }
    }

    /// Handle to the send counter, shared with anything that must skip sequence numbers
    pub fn send_sequence(&self) -> SequenceCounter {
        self.send_sequence.clone()
    }

    /// Handle to this side's counters
    pub fn metrics(&self) -> LinkMetrics {
        self.metrics.clone()
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    pub fn connection(&self) -> &TcpConnection {
        &self.conn
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.conn.peer_addr()
    }

    /// Pack `payload` with the next send sequence number and write it
    ///
    /// Returns the sequence number used.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<u64> {
        let sequence = self.send_sequence.next();

        self.write_buffer.clear();
        pack_into(&mut self.write_buffer, payload, sequence)?;

        if let Err(e) = self.conn.send(&self.write_buffer).await {
            self.metrics.record_error();
            if e.is_disconnect() {
                error!(peer = ?self.conn.peer_addr(), "connection broken");
            }
            return Err(e);
        }

        self.metrics.record_send(self.write_buffer.len());
        debug!(sequence, bytes = payload.len(), "frame sent");
        Ok(sequence)
    }

    /// Read until one complete frame passes sequence verification
    ///
    /// Frames already buffered are returned without touching the socket.
    /// Under [`FaultPolicy::Resync`] a faulted frame is still delivered.
    pub async fn receive_frame(&mut self) -> Result<Frame> {
        loop {
            match self.parser.next_frame() {
                Ok(Some(frame)) => {
                    self.verify(&frame)?;
                    self.metrics.record_receive(frame.payload.len());
                    debug!(sequence = frame.sequence, bytes = frame.length, "frame received");
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    self.metrics.record_error();
                    error!(peer = ?self.conn.peer_addr(), "Malformed frame header: {}", e);
                    return Err(e.into());
                }
            }

            let n = self
                .conn
                .read_into(self.parser.buffer_mut(), self.config.read_chunk)
                .await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed {
                    peer: self.conn.peer_addr(),
                    buffered: self.parser.buffered(),
                });
            }
        }
    }

    fn verify(&mut self, frame: &Frame) -> Result<()> {
        match self.tracker.verify(frame.sequence) {
            VerifyOutcome::InOrder => Ok(()),
            VerifyOutcome::SingleDrop => {
                self.metrics.record_drop();
                Ok(())
            }
            VerifyOutcome::Fault { expected, got } => {
                self.metrics.record_fault();
                match self.config.fault_policy {
                    FaultPolicy::Abort => Err(TransportError::SequenceFault { expected, got }),
                    FaultPolicy::Resync => {
                        warn!(expected, got, "Continuing after sequence fault");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Close the underlying connection; safe to call repeatedly
    pub async fn close(&mut self) {
        if !self.parser.is_empty() {
            debug!(
                buffered = self.parser.buffered(),
                "Discarding partial frame on close"
            );
            self.parser.clear();
        }
        self.conn.close().await;
    }
}

#[async_trait]
impl FrameSource for FramedConnection {
    async fn next_frame(&mut self) -> Result<Bytes> {
        Ok(self.receive_frame().await?.payload)
    }

    fn take_drop_report(&mut self) -> u64 {
        self.tracker.take_drop_report()
    }
}
