// MIT License - Copyright (c) 2026 Peter Wright
// Denon AVR network control client
//
//! # denon-avr-net
//!
//! Client for the line-oriented TCP control protocol spoken by Denon AV
//! receivers (port 23, `\r`-terminated ASCII commands).
//!
//! The client keeps one connection open, reconnecting after a fixed delay
//! whenever it drops. Outbound commands sent while offline are queued and
//! flushed in order on the next connect. Every inbound token is decoded
//! into a `(key, value)` state update, stored in a state table and handed
//! to registered listeners.
//!
//! ## Quick Start
//!
//! ```no_run
//! use denon_avr_net::{AvrClient, AvrConfig, AvrEvent, Command};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AvrConfig::builder()
//!         .host("192.168.0.50")
//!         .port(23)
//!         .reconnect_delay_ms(5000)
//!         .build();
//!
//!     let client = AvrClient::new(config)?;
//!
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let AvrEvent::StateChanged { key, value } = event {
//!                 println!("{key} = {value}");
//!             }
//!         }
//!     });
//!
//!     client.start()?;
//!     client.send_wire(&Command::SetVolume { zone: 1, level: 40 });
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
pub mod protocol;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use client::AvrClient;
pub use config::{AvrConfig, AvrConfigBuilder};
pub use error::{AvrError, Result};
pub use event::{AvrEvent, EventReceiver};
pub use protocol::{decode_token, Command, StateUpdate, TokenFramer};
pub use state::{ListenerError, ListenerId, ListenerResult};
pub use transport::ConnectionState;
pub use devices::{
    Device, Light, MediaPlayer, MediaPlayerCommands, MediaPlayerFeatures, PowerState, Source,
    Switch, SwitchMode,
};
