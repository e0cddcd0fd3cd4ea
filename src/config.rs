// MIT License - Copyright (c) 2026 Peter Wright
// Client configuration

use std::time::Duration;

use crate::constants::{DEFAULT_PORT, DEFAULT_RECONNECT_DELAY_MS};
use crate::error::{AvrError, Result};

/// Configuration for connecting to a receiver.
#[derive(Debug, Clone)]
pub struct AvrConfig {
    /// Receiver host name or IP address
    pub host: String,
    /// Receiver control port (default: 23)
    pub port: u16,
    /// Fixed delay between connection attempts in milliseconds (default: 5000)
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single TCP connect in milliseconds (default: 10000)
    pub connect_timeout_ms: u64,
    /// Whether to send the status-request burst after every connect
    pub request_status_on_connect: bool,
    /// Longest unterminated token kept across reads before it is discarded
    pub max_token_len: usize,
    /// Capacity of the broadcast event channel
    pub event_capacity: usize,
}

impl Default for AvrConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.50".to_string(),
            port: DEFAULT_PORT,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connect_timeout_ms: 10_000,
            request_status_on_connect: true,
            max_token_len: 1024,
            event_capacity: 256,
        }
    }
}

impl AvrConfig {
    /// Config for `host:port` with every other setting at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Create a new config builder starting from defaults.
    pub fn builder() -> AvrConfigBuilder {
        AvrConfigBuilder::default()
    }

    /// `host:port` as passed to the socket layer.
    /// `host:port`, with IPv6 literals bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject settings the connection loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AvrError::InvalidConfig {
                details: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(AvrError::InvalidConfig {
                details: "port must not be 0".to_string(),
            });
        }
        if self.max_token_len == 0 {
            return Err(AvrError::InvalidConfig {
                details: "max_token_len must be at least 1".to_string(),
            });
        }
        if self.reconnect_delay_ms == 0 {
            return Err(AvrError::InvalidConfig {
                details: "reconnect_delay_ms must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for AvrConfig.
#[derive(Debug, Clone, Default)]
pub struct AvrConfigBuilder {
    config: AvrConfig,
}

impl AvrConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn request_status_on_connect(mut self, enabled: bool) -> Self {
        self.config.request_status_on_connect = enabled;
        self
    }

    pub fn max_token_len(mut self, len: usize) -> Self {
        self.config.max_token_len = len;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> AvrConfig {
        self.config
    }
}
