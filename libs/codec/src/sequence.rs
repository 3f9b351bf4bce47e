//! Sequence integrity for one stream direction
//!
//! The sender stamps every packet with a counter starting at 0. The receiver
//! keeps the value it expects next and classifies each arriving packet:
//!
//! | received            | outcome      | expected afterwards |
//! |---------------------|--------------|---------------------|
//! | `expected`          | `InOrder`    | `seq + 1`           |
//! | `expected + 1`      | `SingleDrop` | `seq + 1`           |
//! | anything else       | `Fault`      | `seq`               |
//!
//! After a fault `expected` is set to the sequence just seen, not one past
//! it, so a sender repeating that value is accepted as in-order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Classification of one received sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Exactly the expected packet
    InOrder,
    /// Exactly one packet went missing; stream continues
    SingleDrop,
    /// Larger gap, repeat or reordering; tracker resynchronized to `got`
    Fault { expected: u64, got: u64 },
}

impl VerifyOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, VerifyOutcome::Fault { .. })
    }
}

/// Receive-side sequence state
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    expected: u64,
    drops_since_last_report: u64,
    total_drops: u64,
    faults: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `seq` against the expected value and advance the state
    pub fn verify(&mut self, seq: u64) -> VerifyOutcome {
        if seq == self.expected {
            self.expected = seq.wrapping_add(1);
            VerifyOutcome::InOrder
        } else if seq == self.expected.wrapping_add(1) {
            warn!(expected = self.expected, got = seq, "Dropped vector detected");
            self.drops_since_last_report += 1;
            self.total_drops += 1;
            self.expected = seq.wrapping_add(1);
            VerifyOutcome::SingleDrop
        } else {
            let expected = self.expected;
            error!(expected, got = seq, "Packet sequence is broken, resynchronizing");
            self.faults += 1;
            self.expected = seq;
            VerifyOutcome::Fault { expected, got: seq }
        }
    }

    /// Sequence number the next in-order packet must carry
    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn drops_since_last_report(&self) -> u64 {
        self.drops_since_last_report
    }

    /// Return the drop count accumulated since the previous call and reset it
    pub fn take_drop_report(&mut self) -> u64 {
        std::mem::take(&mut self.drops_since_last_report)
    }

    pub fn total_drops(&self) -> u64 {
        self.total_drops
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }
}

/// Send-side sequence counter shared between the send path and noise injection
///
/// Cloning shares the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    next: Arc<AtomicU64>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the sequence number for the next outgoing packet
    #[inline]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Burn one sequence number without sending anything
    #[inline]
    pub fn skip(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Value the next call to [`next`](Self::next) will return
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }
}
