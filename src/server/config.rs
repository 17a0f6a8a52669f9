//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::{
    DEFAULT_PEER_BANDWIDTH, DEFAULT_WINDOW_ACK_SIZE, MAX_CHUNK_SIZE, RTMP_PORT, SERVER_CHUNK_SIZE,
};

/// Ingest server configuration, built fluently:
///
/// ```
/// use rtmp_ingest::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new()
///     .with_bind_addr(([0, 0, 0, 0], 1935).into())
///     .with_chunk_size(8192)
///     .with_idle_timeout(Duration::from_secs(30));
/// assert_eq!(config.chunk_size(), 8192);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    bind_addr: SocketAddr,
    chunk_size: u32,
    window_ack_size: u32,
    peer_bandwidth: u32,
    handshake_timeout: Duration,
    idle_timeout: Duration,
    tcp_nodelay: bool,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], RTMP_PORT)),
            chunk_size: SERVER_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Chunk size the server writes with (announced via Set Chunk Size)
    pub fn with_chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Window governing how often the server acknowledges inbound bytes
    pub fn with_window_ack_size(mut self, size: u32) -> Self {
        if size > 0 {
            self.window_ack_size = size;
        }
        self
    }

    pub fn with_peer_bandwidth(mut self, bandwidth: u32) -> Self {
        self.peer_bandwidth = bandwidth;
        self
    }

    /// How long a freshly accepted connection may take to finish the
    /// handshake before being dropped
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// How long an established connection may stay silent
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn window_ack_size(&self) -> u32 {
        self.window_ack_size
    }

    pub fn peer_bandwidth(&self) -> u32 {
        self.peer_bandwidth
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
