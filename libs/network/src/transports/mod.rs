//! Transport Layer
//!
//! Byte-level TCP connection, its lifecycle and retry policy, and the framed
//! connection that layers the VectorLink wire format on top.

pub mod framed;
pub mod metrics;
pub mod retry;
pub mod state;
pub mod tcp;


pub use framed::{FaultPolicy, FrameSource, FramedConfig, FramedConnection, DEFAULT_READ_CHUNK};
pub use metrics::{LinkMetrics, LinkMetricsSnapshot};
pub use retry::{RetryPolicy, DEFAULT_RETRY_DELAY};
pub use state::ConnectionState;
pub use tcp::{TcpConnection, TcpConnectionStats};
