// MIT License - Copyright (c) 2026 Peter Wright
// Connection loop: connect, flush, request status, read, reconnect

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::client::ClientShared;
use crate::config::AvrConfig;
use crate::constants::{READ_BUFFER_SIZE, STATUS_REQUESTS};
use crate::error::{AvrError, Result};
use crate::event::AvrEvent;
use crate::protocol::terminate;
use crate::transport::{ConnectionState, OutboundQueue};

/// Reconnect forever until the shutdown flag is raised.
///
/// Connect failures and lost connections are handled the same way: wait
/// the fixed delay, then try again. The state table is left untouched.
pub(crate) async fn run(shared: Arc<ClientShared>, mut shutdown: watch::Receiver<bool>) {
    let address = shared.config.address();
    let delay = shared.config.reconnect_delay();
    info!("Starting connection loop for {}", address);

    loop {
        shared.set_connection_state(ConnectionState::Connecting);

        let attempt = tokio::select! {
            result = open(&shared.config) => result,
            _ = shutdown_requested(&mut shutdown) => break,
        };

        match attempt {
            Ok(stream) => {
                let outcome = run_session(stream, &shared, &mut shutdown).await;

                // Disconnected is only reported for a session that reported Connected.
                let was_ready = shared.connection_state().is_connected();
                shared.set_connection_state(ConnectionState::Disconnected);
                if was_ready {
                    let _ = shared.events.send(AvrEvent::Disconnected);
                }

                match outcome {
                    Ok(()) => break,
                    Err(e) => warn!(
                        "Connection to {} lost: {}. Reconnecting in {:?}",
                        address, e, delay
                    ),
                }
            }
            Err(e) => {
                shared.set_connection_state(ConnectionState::Disconnected);
                warn!(
                    "Unable to connect to {}: {}. Retrying in {:?}",
                    address, e, delay
                );
            }
        }

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }

    shared.set_connection_state(ConnectionState::ShuttingDown);
    info!("Connection loop for {} stopped", address);
}

/// Open the TCP connection, bounded by the connect timeout.
async fn open(config: &AvrConfig) -> Result<TcpStream> {
    debug!("Creating connection to {}", config.address());

    let stream = match timeout(config.connect_timeout(), TcpStream::connect(config.address())).await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(AvrError::Io(e)),
        Err(_) => {
            return Err(AvrError::ConnectionTimeout {
                timeout_ms: config.connect_timeout_ms,
            })
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY: {}", e);
    }
    Ok(stream)
}

/// Drive one connection until it fails or shutdown is requested.
///
/// The client is reported `Connected` only once the queue is drained and the
/// status burst is written.
///
/// `Ok(())` means shutdown; every connection-ending failure is an `Err`.
async fn run_session(
    stream: TcpStream,
    shared: &ClientShared,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    info!("Connection established to {}", shared.config.address());

    let (mut reader, mut writer) = stream.into_split();
    shared.reset_framer();

    // Commands queued while offline go out before anything else.
    flush_queue(&mut writer, &shared.outbound).await?;

    if shared.config.request_status_on_connect {
        request_status(&mut writer).await?;
    }

    shared.set_connection_state(ConnectionState::Connected);
    let _ = shared.events.send(AvrEvent::Connected);

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = shutdown_requested(shutdown) => {
                debug!("Closing connection to {}", shared.config.address());
                let _ = writer.shutdown().await;
                return Ok(());
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Err(AvrError::Disconnected),
                Ok(n) => {
                    debug!("Data received: {:?}", String::from_utf8_lossy(&buf[..n]));
                    shared.handle_chunk(&buf[..n])?;
                }
                Err(e) => return Err(AvrError::Io(e)),
            },
            _ = shared.outbound.notified() => {
                flush_queue(&mut writer, &shared.outbound).await?;
            }
        }
    }
}

/// Write every queued payload in order. A payload whose write fails goes
/// back to the head of the queue for the next connection.
async fn flush_queue(writer: &mut OwnedWriteHalf, queue: &OutboundQueue) -> Result<()> {
    while let Some(payload) = queue.pop() {
        debug!("Sending: {:?}", String::from_utf8_lossy(&payload));
        if let Err(e) = writer.write_all(&payload).await {
            queue.push_front(payload);
            return Err(AvrError::Io(e));
        }
    }
    Ok(())
}

/// Send the status-request burst as one write.
async fn request_status(writer: &mut OwnedWriteHalf) -> Result<()> {
    debug!("Requesting status ({} queries)", STATUS_REQUESTS.len());
    let burst: Vec<u8> = STATUS_REQUESTS
        .iter()
        .flat_map(|query| terminate(query))
        .collect();
    writer.write_all(&burst).await?;
    Ok(())
}

/// Resolves once the shutdown flag is set or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
