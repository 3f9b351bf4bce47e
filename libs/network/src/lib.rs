//! Network Infrastructure
//!
//! Transport for the VectorLink stream: one TCP connection per session,
//! framed with the codec crate, verified by a per-direction sequence
//! tracker, and paced on the sending side by [`Throttle`].

pub mod error;
pub mod throttle;
pub mod transports;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use throttle::Throttle;
pub use transports::{
    ConnectionState, FaultPolicy, FrameSource, FramedConfig, FramedConnection, LinkMetrics,
    LinkMetricsSnapshot, RetryPolicy, TcpConnection, TcpConnectionStats,
};
