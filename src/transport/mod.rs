// MIT License - Copyright (c) 2026 Peter Wright
// Connection management

pub(crate) mod connection;
pub mod outbound;

pub use outbound::OutboundQueue;

/// Where the connection loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; either never started or waiting out the retry delay
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Transport open, traffic flowing
    Connected,
    /// `stop()` requested; the loop is releasing the transport
    ShuttingDown,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}
