// MIT License - Copyright (c) 2026 Peter Wright
// Error types

/// All errors that can occur in the denon-avr-net library.
#[derive(Debug, thiserror::Error)]
pub enum AvrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    #[error("Connection closed by receiver")]
    Disconnected,

    #[error("Undecodable token from receiver: {details}")]
    Decode { details: String },

    #[error("Listener {id} failed: {reason}")]
    ListenerFailed { id: u64, reason: String },

    #[error("Invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("Client is already running")]
    AlreadyRunning,

    #[error("No tokio runtime available to start the client")]
    NoRuntime,
}

impl AvrError {
    /// Whether this error ends the current connection but should be followed
    /// by another connection attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AvrError::Io(_)
                | AvrError::ConnectionTimeout { .. }
                | AvrError::Disconnected
                | AvrError::Decode { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AvrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_retryable() {
        let io = AvrError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(io.is_retryable());
        assert!(AvrError::Disconnected.is_retryable());
        assert!(AvrError::ConnectionTimeout { timeout_ms: 10 }.is_retryable());
        assert!(AvrError::Decode { details: "bad utf-8".into() }.is_retryable());
    }

    #[test]
    fn test_caller_errors_are_not_retryable() {
        assert!(!AvrError::AlreadyRunning.is_retryable());
        assert!(!AvrError::NoRuntime.is_retryable());
        assert!(!AvrError::ListenerFailed { id: 1, reason: "boom".into() }.is_retryable());
        assert!(!AvrError::InvalidConfig { details: "empty host".into() }.is_retryable());
    }

    #[test]
    fn test_listener_error_display() {
        let err = AvrError::ListenerFailed { id: 7, reason: "boom".into() };
        assert_eq!(err.to_string(), "Listener 7 failed: boom");
    }
}
