//! Connection lifecycle states
//!
//! ```text
//! Unbound ─┬─► Listening ──┬─► Established ─► Closing ─► Closed
//!          └─► Connecting ─┘
//! ```
//!
//! Every state may also move straight to `Closed` when setup fails or
//! `close()` is called early.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket yet
    Unbound,
    /// Bound and waiting for the single peer to arrive
    Listening,
    /// Dialing the peer, possibly retrying
    Connecting,
    /// Stream open in both directions
    Established,
    /// Shutdown in progress
    Closing,
    /// Socket released; terminal
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal lifecycle step
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Unbound, Listening)
                | (Unbound, Connecting)
                | (Listening, Established)
                | (Connecting, Established)
                | (Established, Closing)
                | (Closing, Closed)
                | (Unbound, Closed)
                | (Listening, Closed)
                | (Connecting, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unbound => "unbound",
            ConnectionState::Listening => "listening",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Established => "established",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
