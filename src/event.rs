// MIT License - Copyright (c) 2026 Peter Wright
// Client events

/// Events broadcast by a running client.
///
/// Users subscribe via `client.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<AvrEvent>`. The listener callbacks see
/// the same traffic synchronously; this channel is the async view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvrEvent {
    /// TCP connection to the receiver established
    Connected,
    /// TCP connection lost; a reconnect is scheduled
    Disconnected,
    /// A token decoded into a state update
    StateChanged { key: String, value: String },
    /// A token arrived, decoded or not
    RawToken(String),
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<AvrEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<AvrEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity.max(1))
}
