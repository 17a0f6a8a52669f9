//! Connection-scoped bookkeeping
//!
//! Tracks what the command exchange has established so far (app name,
//! stream key, publishing flag) and the acknowledgement window over the
//! inbound byte stream.

use crate::protocol::constants::{DEFAULT_PEER_BANDWIDTH, DEFAULT_WINDOW_ACK_SIZE};

/// Mutable per-connection state, owned by the session
#[derive(Debug)]
pub struct SessionState {
    /// Total bytes received on this connection, counted at the socket
    bytes_received: u64,
    /// Byte total at the last Acknowledgement we sent
    acked_at: u64,
    /// Window size governing when we owe the peer an Acknowledgement;
    /// the peer may shrink or grow it with a Window Ack Size message
    window_ack_size: u32,
    /// Bandwidth we announced to the peer
    peer_bandwidth: u32,
    /// Application name from the connect command object
    app: Option<String>,
    /// Stream key from the publish command
    stream_key: Option<String>,
    /// connect has been accepted
    connected: bool,
    /// publish has been accepted
    publishing: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            bytes_received: 0,
            acked_at: 0,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            app: None,
            stream_key: None,
            connected: false,
            publishing: false,
        }
    }

    /// Count inbound bytes; returns true once the unacknowledged total
    /// crosses the window and an Acknowledgement is owed.
    pub fn add_bytes_received(&mut self, count: usize) -> bool {
        self.bytes_received += count as u64;
        self.bytes_received - self.acked_at >= self.window_ack_size as u64
    }

    /// Record that an Acknowledgement went out; returns the sequence
    /// number to carry (cumulative total, truncated to the 32-bit wire
    /// field).
    pub fn mark_ack_sent(&mut self) -> u32 {
        self.acked_at = self.bytes_received;
        self.bytes_received as u32
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn window_ack_size(&self) -> u32 {
        self.window_ack_size
    }

    pub fn set_window_ack_size(&mut self, size: u32) {
        if size > 0 {
            self.window_ack_size = size;
        }
    }

    pub fn peer_bandwidth(&self) -> u32 {
        self.peer_bandwidth
    }

    pub fn set_peer_bandwidth(&mut self, bandwidth: u32) {
        self.peer_bandwidth = bandwidth;
    }

    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    pub fn set_app(&mut self, app: String) {
        self.app = Some(app);
    }

    pub fn stream_key(&self) -> Option<&str> {
        self.stream_key.as_deref()
    }

    pub fn set_stream_key(&mut self, key: String) {
        self.stream_key = Some(key);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    pub fn is_publishing(&self) -> bool {
        self.publishing
    }

    pub fn set_publishing(&mut self, publishing: bool) {
        self.publishing = publishing;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
