// MIT License - Copyright (c) 2026 Peter Wright
// Receiver client: public API over the connection loop and state table

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::AvrConfig;
use crate::constants::key;
use crate::error::{AvrError, Result};
use crate::event::{event_channel, AvrEvent, EventReceiver, EventSender};
use crate::protocol::{decode_token, terminate, token_text, Command, TokenFramer};
use crate::state::{ListenerId, ListenerResult, StateStore};
use crate::transport::{connection, ConnectionState, OutboundQueue};

/// State shared between the client handles and the connection task.
pub(crate) struct ClientShared {
    pub(crate) config: AvrConfig,
    pub(crate) store: StateStore,
    pub(crate) outbound: OutboundQueue,
    pub(crate) events: EventSender,
    framer: Mutex<TokenFramer>,
    replay_framer: Mutex<TokenFramer>,
    connection: watch::Sender<ConnectionState>,
}

impl ClientShared {
    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        let previous = self.connection.send_replace(state);
        if previous != state {
            debug!("Connection state: {:?} -> {:?}", previous, state);
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub(crate) fn reset_framer(&self) {
        lock(&self.framer).reset();
    }

    /// Frame a chunk read from the socket and handle each completed token.
    ///
    /// Fails only if a token is not valid UTF-8, which ends the connection.
    pub(crate) fn handle_chunk(&self, chunk: &[u8]) -> Result<()> {
        self.handle_framed(&self.framer, chunk)
    }

    /// Same as `handle_chunk`, but fragments are carried on their own
    /// framer so replayed bytes never join a socket token.
    fn handle_replay(&self, chunk: &[u8]) -> Result<()> {
        self.handle_framed(&self.replay_framer, chunk)
    }

    fn handle_framed(&self, framer: &Mutex<TokenFramer>, chunk: &[u8]) -> Result<()> {
        let tokens = lock(framer).push(chunk);
        for bytes in tokens {
            let token = token_text(bytes)?;
            self.handle_token(&token);
        }
        Ok(())
    }

    /// Raw listeners first (empty tokens included), then `raw_command`,
    /// then the decoded update and its state listeners.
    fn handle_token(&self, token: &str) {
        self.store.dispatch_raw(token);
        let _ = self.events.send(AvrEvent::RawToken(token.to_string()));

        if token.is_empty() {
            return;
        }
        self.store.set_silent(key::RAW_COMMAND, token);

        if let Some(update) = decode_token(token) {
            self.store.set(&update.key, &update.value);
            let _ = self.events.send(AvrEvent::StateChanged {
                key: update.key,
                value: update.value,
            });
        }
    }
}

/// Client for one receiver.
///
/// Cheap to clone; all clones share the same connection, queue, state
/// table and listeners.
///
/// # Example
///
/// ```no_run
/// use denon_avr_net::{AvrClient, AvrConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = AvrClient::new(AvrConfig::new("192.168.0.50", 23))?;
///
///     client.add_state_listener(|key, value| {
///         println!("{key} = {value}");
///         Ok(())
///     });
///
///     // Queued until the connection is up.
///     client.send_command("SI?");
///     client.start()?;
///
///     tokio::signal::ctrl_c().await?;
///     client.stop().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AvrClient {
    shared: Arc<ClientShared>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AvrClient {
    /// Create a client. Nothing touches the network until [`start`](Self::start).
    pub fn new(config: AvrConfig) -> Result<Self> {
        config.validate()?;

        let (events, _) = event_channel(config.event_capacity);
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        let framer = TokenFramer::new(config.max_token_len);
        let replay_framer = TokenFramer::new(config.max_token_len);

        Ok(Self {
            shared: Arc::new(ClientShared {
                config,
                store: StateStore::new(),
                outbound: OutboundQueue::new(),
                events,
                framer: Mutex::new(framer),
                replay_framer: Mutex::new(replay_framer),
                connection,
            }),
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &AvrConfig {
        &self.shared.config
    }

    // --- Lifecycle ---

    /// Spawn the connection loop on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| AvrError::NoRuntime)?;

        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(AvrError::AlreadyRunning);
        }

        info!("Starting client for {}", self.shared.config.address());
        self.shutdown_tx.send_replace(false);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *task = Some(runtime.spawn(connection::run(self.shared.clone(), shutdown_rx)));
        Ok(())
    }

    /// Cancel the connection loop and wait for it to release the transport.
    ///
    /// Stored state is kept; the client can be started again.
    pub async fn stop(&self) {
        let task = lock(&self.task).take();
        let Some(task) = task else {
            return;
        };

        info!("Stopping client for {}", self.shared.config.address());
        self.shutdown_tx.send_replace(true);
        if let Err(e) = task.await
            && e.is_panic()
        {
            error!("Connection task panicked: {}", e);
        }
        self.shared.set_connection_state(ConnectionState::Disconnected);
    }

    /// Whether the connection loop is running (connected or not).
    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Watch the connection state machine.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connection.borrow().is_connected()
    }

    // --- Outbound ---

    /// Send a raw payload as-is. Queued while no connection is open and
    /// written, in order, as soon as one is.
    pub fn send(&self, payload: impl Into<Vec<u8>>) {
        let payload = payload.into();
        if !self.is_connected() {
            debug!(
                "No transport available. Queueing data: {:?}",
                String::from_utf8_lossy(&payload)
            );
        }
        self.shared.outbound.push(payload);
    }

    /// Send a command, appending `\r` if missing.
    pub fn send_command(&self, command: &str) {
        self.send(terminate(command));
    }

    pub fn send_wire(&self, command: &Command) {
        self.send(command.to_wire_bytes());
    }

    /// Payloads waiting for a connection.
    pub fn pending_commands(&self) -> usize {
        self.shared.outbound.len()
    }

    // --- Inbound ---

    /// Feed bytes through framing and decoding as if they had arrived from
    /// the receiver.
    ///
    /// Partial tokens are kept between `ingest` calls only; they are never
    /// joined with data from the live connection.
    pub fn ingest(&self, data: &[u8]) -> Result<()> {
        self.shared.handle_replay(data)
    }

    // --- State ---

    /// Last known value for `key`, or an empty string.
    pub fn get_state(&self, key: &str) -> String {
        self.shared.store.get(key)
    }

    /// Copy of the whole state table.
    pub fn states(&self) -> HashMap<String, String> {
        self.shared.store.snapshot()
    }

    /// Called with `(key, value)` for every decoded update.
    pub fn add_state_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str, &str) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.store.add_state_listener(listener)
    }

    /// Called with every token as received, before decoding.
    pub fn add_raw_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.store.add_raw_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.store.remove_listener(id)
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client() -> AvrClient {
        AvrClient::new(AvrConfig::new("127.0.0.1", 23)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(matches!(
            AvrClient::new(AvrConfig::new("", 23)),
            Err(AvrError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_start_without_runtime() {
        assert!(matches!(client().start(), Err(AvrError::NoRuntime)));
    }

    #[test]
    fn test_send_while_disconnected_queues() {
        let client = client();
        client.send_command("SICD");
        client.send(b"MV40\r".to_vec());
        assert_eq!(client.pending_commands(), 2);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_ingest_decodes_and_sets_raw_command() {
        let client = client();
        client.ingest(b"PWON\rMVMAX 80\r").unwrap();
        assert_eq!(client.get_state("power"), "ON");
        assert_eq!(client.get_state("zone1_vol_max"), "80");
        assert_eq!(client.get_state("zone1_vol"), "");
        assert_eq!(client.get_state("raw_command"), "MVMAX 80");
    }

    #[test]
    fn test_unknown_token_only_sets_raw_command() {
        let client = client();
        client.ingest(b"MSDOLBY DIGITAL\r").unwrap();
        let states = client.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states["raw_command"], "MSDOLBY DIGITAL");
    }

    #[test]
    fn test_empty_token_goes_to_raw_listeners_only() {
        let client = client();
        let raw = Arc::new(Mutex::new(Vec::new()));
        let states = Arc::new(AtomicUsize::new(0));

        let sink = raw.clone();
        client.add_raw_listener(move |token| {
            sink.lock().unwrap().push(token.to_string());
            Ok(())
        });
        let counter = states.clone();
        client.add_state_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        client.ingest(b"\r").unwrap();

        assert_eq!(*raw.lock().unwrap(), vec![String::new()]);
        assert_eq!(states.load(Ordering::SeqCst), 0);
        assert_eq!(client.get_state("raw_command"), "");
    }

    #[test]
    fn test_raw_listeners_run_before_decoding() {
        let client = client();
        let observed = Arc::new(Mutex::new(None));
        let inner = client.clone();
        let sink = observed.clone();
        client.add_raw_listener(move |_| {
            *sink.lock().unwrap() = Some(inner.get_state("zone2"));
            Ok(())
        });

        client.ingest(b"Z2ON\r").unwrap();

        assert_eq!(*observed.lock().unwrap(), Some(String::new()));
        assert_eq!(client.get_state("zone2"), "ON");
    }

    #[test]
    fn test_ingest_fragment_does_not_join_socket_data() {
        let client = client();
        client.ingest(b"PW").unwrap();
        client.shared.handle_chunk(b"MV50\r").unwrap();
        assert_eq!(client.get_state("zone1_vol"), "50");
        assert_eq!(client.get_state("power"), "");

        client.ingest(b"ON\r").unwrap();
        assert_eq!(client.get_state("power"), "ON");
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let client = client();
        assert!(matches!(
            client.ingest(b"SI\xff\r"),
            Err(AvrError::Decode { .. })
        ));
    }

    #[test]
    fn test_events_follow_tokens() {
        let client = client();
        let mut events = client.subscribe();
        client.ingest(b"Z3MUON\r").unwrap();

        assert_eq!(events.try_recv().unwrap(), AvrEvent::RawToken("Z3MUON".into()));
        assert_eq!(
            events.try_recv().unwrap(),
            AvrEvent::StateChanged {
                key: "zone3_mute".into(),
                value: "ON".into()
            }
        );
    }

    #[test]
    fn test_listener_can_send_from_callback() {
        let client = client();
        let inner = client.clone();
        client.add_state_listener(move |key, value| {
            if key == "zone1" && value == "ON" {
                inner.send_command("SI?");
            }
            Ok(())
        });
        client.ingest(b"ZMON\r").unwrap();
        assert_eq!(client.pending_commands(), 1);
    }
}
