//! Transport Error Types
//!
//! Error handling for connection establishment, byte transfer, frame
//! reassembly and sequence integrity on a VectorLink stream.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use vectorlink_codec::CodecError;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Bind or connect failed for a reason other than "refused"
    #[error("Address error: {message} ({addr})")]
    Address {
        message: String,
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Peer reset or closed the pipe while we were writing
    #[error("Broken connection to {peer:?}: {message}")]
    BrokenConnection {
        message: String,
        peer: Option<SocketAddr>,
        source: Option<std::io::Error>,
    },

    /// Peer closed the stream (read returned end of file)
    #[error("Connection closed by peer {peer:?} ({buffered} bytes left unparsed)")]
    ConnectionClosed {
        peer: Option<SocketAddr>,
        buffered: usize,
    },

    /// Operation requires an established connection
    #[error("Not connected: {operation} requires an established connection (state: {state})")]
    NotConnected {
        operation: &'static str,
        state: String,
    },

    /// Connect retry policy gave up
    #[error("Gave up connecting to {addr} after {attempts} attempts")]
    RetriesExhausted { addr: SocketAddr, attempts: u32 },

    /// Timed out waiting for an operation
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Malformed stream or payload
    #[error("Format error: {0}")]
    Format(#[from] CodecError),

    /// Sequence irregularity larger than a single drop
    #[error("Sequence fault: expected {expected}, got {got}")]
    SequenceFault { expected: u64, got: u64 },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create an address error
    pub fn address(message: impl Into<String>, addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Address {
            message: message.into(),
            addr,
            source,
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Classify an I/O error raised on an established stream
    ///
    /// Reset, aborted and broken-pipe errors mean the peer is gone; anything
    /// else is reported as plain I/O.
    pub fn from_stream_io(
        message: impl Into<String>,
        peer: Option<SocketAddr>,
        error: std::io::Error,
    ) -> Self {
        if is_broken_pipe(&error) {
            Self::BrokenConnection {
                message: message.into(),
                peer,
                source: Some(error),
            }
        } else {
            Self::Io {
                message: message.into(),
                source: error,
            }
        }
    }

    /// Check whether the peer has gone away
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::BrokenConnection { .. } | TransportError::ConnectionClosed { .. }
        )
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Address { .. } => false,
            TransportError::BrokenConnection { .. } => false,
            TransportError::ConnectionClosed { .. } => false,
            TransportError::NotConnected { .. } => false,
            TransportError::RetriesExhausted { .. } => false,
            TransportError::Timeout { .. } => true,
            TransportError::Format(_) => false,
            TransportError::SequenceFault { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Io { .. } => true,
        }
    }

    /// Get error category for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Address { .. } => "address",
            TransportError::BrokenConnection { .. } => "broken_connection",
            TransportError::ConnectionClosed { .. } => "connection_closed",
            TransportError::NotConnected { .. } => "not_connected",
            TransportError::RetriesExhausted { .. } => "retries_exhausted",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Format(_) => "format",
            TransportError::SequenceFault { .. } => "sequence_fault",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Io { .. } => "io",
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

pub(crate) fn is_broken_pipe(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}
