//! Link Metrics
//!
//! Lock-free counters for one connection side. Cloning shares the counters,
//! so a snapshot can be taken from another task while frames flow.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters for frames, bytes and sequence irregularities
#[derive(Clone)]
pub struct LinkMetrics {
    frames_sent: Arc<AtomicU64>,
    frames_received: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    drops: Arc<AtomicU64>,
    faults: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,

    last_send: Arc<RwLock<Option<Instant>>>,
    last_receive: Arc<RwLock<Option<Instant>>>,
}

/// Point-in-time copy of [`LinkMetrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkMetricsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub drops: u64,
    pub faults: u64,
    pub errors: u64,
    pub last_activity: Option<Instant>,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self {
            frames_sent: Arc::new(AtomicU64::new(0)),
            frames_received: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            drops: Arc::new(AtomicU64::new(0)),
            faults: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            last_send: Arc::new(RwLock::new(None)),
            last_receive: Arc::new(RwLock::new(None)),
        }
    }

    /// Record one packet written to the socket
    #[inline]
    pub fn record_send(&self, packet_bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Release);
        self.bytes_sent
            .fetch_add(packet_bytes as u64, Ordering::Release);
        *self.last_send.write() = Some(Instant::now());
    }

    /// Record one frame reassembled from the stream
    #[inline]
    pub fn record_receive(&self, payload_bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Release);
        self.bytes_received
            .fetch_add(payload_bytes as u64, Ordering::Release);
        *self.last_receive.write() = Some(Instant::now());
    }

    #[inline]
    pub fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Acquire),
            frames_received: self.frames_received.load(Ordering::Acquire),
            bytes_sent: self.bytes_sent.load(Ordering::Acquire),
            bytes_received: self.bytes_received.load(Ordering::Acquire),
            drops: self.drops.load(Ordering::Acquire),
            faults: self.faults.load(Ordering::Acquire),
            errors: self.errors.load(Ordering::Acquire),
            last_activity: self.last_activity(),
        }
    }

    fn last_activity(&self) -> Option<Instant> {
        let last_send = *self.last_send.read();
        let last_recv = *self.last_receive.read();

        match (last_send, last_recv) {
            (Some(s), Some(r)) => Some(s.max(r)),
            (Some(s), None) => Some(s),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        }
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}
