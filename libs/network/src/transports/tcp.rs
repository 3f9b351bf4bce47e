//! TCP Connection
//!
//! Owns the raw stream socket for one side of the link: the listener and the
//! single accepted peer on the generator side, the dialed stream on the
//! analyser side. Exposes byte-level send/receive only; framing lives in
//! [`super::framed`].

use super::retry::RetryPolicy;
use super::state::ConnectionState;
use crate::error::is_broken_pipe;
use crate::{Result, TransportError};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// One side of a point-to-point TCP link
pub struct TcpConnection {
    state: ConnectionState,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    connected_at: Option<Instant>,
    bytes_sent: u64,
    bytes_received: u64,
}

/// TCP connection statistics
#[derive(Debug, Clone)]
pub struct TcpConnectionStats {
    pub state: ConnectionState,
    pub peer_addr: Option<SocketAddr>,
    pub connected_duration: Option<Duration>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl TcpConnection {
    /// Create an unbound connection
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Unbound,
            listener: None,
            stream: None,
            local_addr: None,
            peer_addr: None,
            connected_at: None,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Bind a listener on `addr`
    ///
    /// Any bind failure is fatal and reported as [`TransportError::Address`].
    pub async fn listen(addr: SocketAddr) -> Result<Self> {
        let mut conn = Self::new();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::address("Failed to bind TCP listener", addr, e))?;

        conn.local_addr = listener.local_addr().ok();
        conn.listener = Some(listener);
        conn.transition(ConnectionState::Listening);

        info!(addr = ?conn.local_addr, "Waiting for a connection");
        Ok(conn)
    }

    /// Accept the single peer this listener serves
    pub async fn accept(&mut self) -> Result<SocketAddr> {
        let listener = match (&self.state, self.listener.as_ref()) {
            (ConnectionState::Listening, Some(listener)) => listener,
            _ => {
                return Err(TransportError::NotConnected {
                    operation: "accept",
                    state: self.state.to_string(),
                })
            }
        };

        let (stream, peer_addr) = listener
            .accept()
            .await
            .map_err(|e| TransportError::from_stream_io("Failed to accept TCP connection", None, e))?;

        self.establish(stream, peer_addr);
        info!(peer = %peer_addr, "Accepted TCP connection");
        Ok(peer_addr)
    }

    /// Bind on `addr` and wait for the peer
    pub async fn serve(addr: SocketAddr) -> Result<Self> {
        let mut conn = Self::listen(addr).await?;
        conn.accept().await?;
        Ok(conn)
    }

    /// Dial `addr`, retrying refused attempts according to `policy`
    ///
    /// Only "connection refused" is retried; every other failure is fatal
    /// and reported as [`TransportError::Address`].
    pub async fn connect(addr: SocketAddr, policy: &RetryPolicy) -> Result<Self> {
        let mut conn = Self::new();
        conn.transition(ConnectionState::Connecting);

        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let attempt = match policy.timeout {
                Some(timeout) => {
                    let remaining = timeout.saturating_sub(started.elapsed());
                    tokio::time::timeout(remaining, TcpStream::connect(addr))
                        .await
                        .map_err(|_| TransportError::timeout("TCP connect", timeout))?
                }
                None => TcpStream::connect(addr).await,
            };

            match attempt {
                Ok(stream) => {
                    let peer_addr = stream.peer_addr().unwrap_or(addr);
                    conn.establish(stream, peer_addr);
                    info!(peer = %peer_addr, attempts, "Connected to TCP peer");
                    return Ok(conn);
                }
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    warn!(
                        ip = %addr.ip(),
                        port = addr.port(),
                        attempt = attempts,
                        "Connection refused, make sure the generator is running"
                    );
                    if !policy.allows_another(attempts, started.elapsed()) {
                        conn.transition(ConnectionState::Closed);
                        return Err(TransportError::RetriesExhausted { addr, attempts });
                    }
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => {
                    conn.transition(ConnectionState::Closed);
                    return Err(TransportError::address(
                        "Failed to connect to TCP peer",
                        addr,
                        e,
                    ));
                }
            }
        }
    }

    fn establish(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        if self.local_addr.is_none() {
            self.local_addr = stream.local_addr().ok();
        }
        self.peer_addr = Some(peer_addr);
        self.connected_at = Some(Instant::now());
        self.stream = Some(stream);
        self.transition(ConnectionState::Established);
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "TCP connection state change");
        self.state = next;
    }

    fn stream_mut(&mut self, operation: &'static str) -> Result<&mut TcpStream> {
        match (self.state, self.stream.as_mut()) {
            (ConnectionState::Established, Some(stream)) => Ok(stream),
            (state, _) => Err(TransportError::NotConnected {
                operation,
                state: state.to_string(),
            }),
        }
    }

    /// Write all of `data` to the peer
    ///
    /// A reset or closed peer surfaces as [`TransportError::BrokenConnection`];
    /// the caller decides whether that ends its send loop.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let peer = self.peer_addr;
        let stream = self.stream_mut("send")?;

        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::from_stream_io("Failed to write to TCP stream", peer, e))?;
        stream
            .flush()
            .await
            .map_err(|e| TransportError::from_stream_io("Failed to flush TCP stream", peer, e))?;

        self.bytes_sent += data.len() as u64;
        Ok(())
    }

    /// Append at most `max_bytes` freshly read bytes to `buf`
    ///
    /// Returns the number of bytes read; `0` means the peer closed the stream.
    pub async fn read_into(&mut self, buf: &mut BytesMut, max_bytes: usize) -> Result<usize> {
        let peer = self.peer_addr;
        let stream = self.stream_mut("read")?;

        buf.reserve(max_bytes);
        let mut limited = (&mut *buf).limit(max_bytes);
        let n = stream
            .read_buf(&mut limited)
            .await
            .map_err(|e| TransportError::from_stream_io("Failed to read from TCP stream", peer, e))?;

        self.bytes_received += n as u64;
        Ok(n)
    }

    /// Read whatever is available, up to `max_bytes`
    ///
    /// An empty result means the peer closed the stream.
    pub async fn read_some(&mut self, max_bytes: usize) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(max_bytes);
        self.read_into(&mut buf, max_bytes).await?;
        Ok(buf.freeze())
    }

    /// Shut the connection down
    ///
    /// Idempotent. Shutdown errors are logged, never returned, because the
    /// peer leaving first is the normal end of a session.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        if self.state == ConnectionState::Established {
            self.transition(ConnectionState::Closing);
        }

        if let Some(mut stream) = self.stream.take() {
            match stream.shutdown().await {
                Ok(()) => {}
                Err(e) if is_broken_pipe(&e) || e.kind() == ErrorKind::NotConnected => {
                    debug!(peer = ?self.peer_addr, "Peer already disconnected: {}", e);
                }
                Err(e) => warn!(peer = ?self.peer_addr, "Error shutting down TCP connection: {}", e),
            }
        }
        self.listener = None;
        self.transition(ConnectionState::Closed);

        info!(peer = ?self.peer_addr, "Closed TCP connection");
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Locally bound address; useful after binding port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stats(&self) -> TcpConnectionStats {
        TcpConnectionStats {
            state: self.state,
            peer_addr: self.peer_addr,
            connected_duration: self.connected_at.map(|t| t.elapsed()),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
        }
    }
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new()
    }
}
