//! TCP connection and its I/O loop.
//!
//! Each [`Connection`] owns one stream inside a dedicated tokio task. The
//! task is the only place the stream is touched, so reads and writes on
//! the same socket are serialized without locking.
//!
//! # Event Loop
//!
//! The task `select!`s over:
//!
//! - The next chunk from the socket (decoded, then published)
//! - Write commands from the endpoint
//! - The shutdown signal, which also interrupts a write in progress
//!
//! Every event goes through the owning [`ConnectionSlot`], which drops it if
//! this connection has been retired in the meantime.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{SendError, StreamError};
use crate::events::Event;
use crate::identifiers::ConnectionId;
use crate::protocol::decode_chunk;

use super::slot::ConnectionSlot;

// ============================================================================
// StreamOptions
// ============================================================================

/// Per-stream I/O settings, derived from client or server options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StreamOptions {
    /// Maximum time for one `write_all`.
    pub write_timeout: Duration,
    /// Size of the reusable read buffer; the largest chunk one read yields.
    pub read_buffer_size: usize,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the I/O loop.
enum ConnectionCommand {
    /// Write a payload and report completion.
    Write {
        payload: Vec<u8>,
        done_tx: oneshot::Sender<Result<(), SendError>>,
    },
}

/// Why a write did not complete.
enum WriteAbort {
    /// Shutdown was requested mid-write.
    Shutdown,
    /// The stream failed or the write timed out.
    Stream(StreamError),
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to a live TCP connection.
///
/// Cloning yields another handle to the same I/O task.
#[derive(Clone)]
pub(crate) struct Connection {
    /// Connection identity, checked by the slot before publishing.
    id: ConnectionId,
    /// Remote address.
    peer: SocketAddr,
    /// Channel for sending commands to the I/O loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Shutdown signal; stores a permit if the loop is not waiting yet.
    shutdown: Arc<Notify>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Spawns the I/O loop for `stream`.
    ///
    /// Must be called with the slot lock held, after `Connected` was
    /// published, so that event precedes anything the loop publishes.
    pub(crate) fn spawn(
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        slot: Arc<ConnectionSlot>,
        options: StreamOptions,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(Self::run_event_loop(
            id,
            stream,
            command_rx,
            Arc::clone(&shutdown),
            slot,
            options,
        ));

        Self {
            id,
            peer,
            command_tx,
            shutdown,
        }
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address.
    #[inline]
    #[must_use]
    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues one write and waits for it to finish.
    ///
    /// # Errors
    ///
    /// - [`SendError::Write`] if the write failed or timed out
    /// - [`SendError::Closed`] if the connection was shut down before or
    ///   during the write
    pub(crate) async fn write(&self, payload: Vec<u8>) -> Result<(), SendError> {
        let (done_tx, done_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Write { payload, done_tx })
            .map_err(|_| SendError::Closed)?;

        done_rx.await.map_err(|_| SendError::Closed)?
    }

    /// Asks the I/O loop to close the stream. Returns immediately.
    ///
    /// A write in progress is abandoned and its sender gets
    /// [`SendError::Closed`].
    pub(crate) fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// I/O loop: one per connection.
    async fn run_event_loop(
        id: ConnectionId,
        stream: TcpStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        shutdown: Arc<Notify>,
        slot: Arc<ConnectionSlot>,
        options: StreamOptions,
    ) {
        let (mut reader, mut writer) = stream.into_split();
        let mut buf = vec![0u8; options.read_buffer_size];

        debug!(connection = %id, "I/O loop started");

        let reason = loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!(connection = %id, "Shutdown requested");
                    break None;
                }

                // Incoming chunks from the peer
                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            debug!(connection = %id, "Stream closed by peer");
                            break Some(StreamError::Closed);
                        }

                        Ok(n) => Self::handle_chunk(id, &buf[..n], &slot),

                        Err(e) => {
                            warn!(connection = %id, error = %e, "Read failed");
                            break Some(StreamError::from(&e));
                        }
                    }
                }

                // Commands from the endpoint
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Write { payload, done_tx }) => {
                            let written = tokio::select! {
                                result = Self::handle_write(&mut writer, &payload, options.write_timeout) => {
                                    result.map_err(WriteAbort::Stream)
                                }
                                _ = shutdown.notified() => Err(WriteAbort::Shutdown),
                            };

                            match written {
                                Ok(()) => {
                                    trace!(connection = %id, len = payload.len(), "Payload written");
                                    slot.publish_if_current(id, |endpoint| Event::DataSent {
                                        endpoint,
                                        payload,
                                    });
                                    let _ = done_tx.send(Ok(()));
                                }
                                Err(WriteAbort::Shutdown) => {
                                    debug!(connection = %id, len = payload.len(), "Write abandoned on shutdown");
                                    let _ = done_tx.send(Err(SendError::Closed));
                                    break None;
                                }
                                Err(WriteAbort::Stream(reason)) => {
                                    warn!(connection = %id, error = %reason, "Write failed");
                                    let _ = done_tx.send(Err(SendError::write(reason.to_string())));
                                    break Some(reason);
                                }
                            }
                        }

                        None => {
                            debug!(connection = %id, "Command channel closed");
                            break None;
                        }
                    }
                }
            }
        };

        if let Err(e) = writer.shutdown().await {
            trace!(connection = %id, error = %e, "Write half already closed");
        }

        if let Some(error) = reason {
            slot.close_from_stream(id, error);
        }

        Self::fail_queued_writes(id, &mut command_rx);

        debug!(connection = %id, "I/O loop terminated");
    }

    /// Decodes and publishes one received chunk.
    fn handle_chunk(id: ConnectionId, chunk: &[u8], slot: &ConnectionSlot) {
        match decode_chunk(chunk) {
            Ok(text) => {
                debug!(connection = %id, len = chunk.len(), "Chunk received");
                slot.publish_if_current(id, |endpoint| Event::DataReceived {
                    endpoint,
                    payload: text,
                });
            }
            Err(warning) => {
                warn!(connection = %id, %warning, "Dropping undecodable chunk");
            }
        }
    }

    /// Writes the whole payload, bounded by `write_timeout`.
    async fn handle_write(
        writer: &mut OwnedWriteHalf,
        payload: &[u8],
        write_timeout: Duration,
    ) -> Result<(), StreamError> {
        match timeout(write_timeout, writer.write_all(payload)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StreamError::from(&e)),
            Err(_) => Err(StreamError::WriteTimeout {
                timeout_ms: write_timeout.as_millis() as u64,
            }),
        }
    }

    /// Fails writes that were queued behind the loop's exit.
    fn fail_queued_writes(
        id: ConnectionId,
        command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
    ) {
        command_rx.close();

        let mut count = 0usize;
        while let Ok(ConnectionCommand::Write { done_tx, .. }) = command_rx.try_recv() {
            let _ = done_tx.send(Err(SendError::Closed));
            count += 1;
        }

        if count > 0 {
            debug!(connection = %id, count, "Failed queued writes on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    use crate::events::{EventBus, EventFilter, EventKind};
    use crate::identifiers::EndpointId;

    fn options() -> StreamOptions {
        StreamOptions {
            write_timeout: Duration::from_secs(5),
            read_buffer_size: 1024,
        }
    }

    /// Returns a connected (local, remote) stream pair.
    async fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (local, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (local.expect("connect"), accepted.expect("accept").0)
    }

    #[tokio::test]
    async fn test_write_after_loop_exit_is_closed() {
        let bus = EventBus::new();
        let slot = ConnectionSlot::new(EndpointId::next(), bus);
        let (local, _remote) = stream_pair().await;
        let peer = local.peer_addr().expect("peer");

        let connection = Connection::spawn(ConnectionId::next(), local, peer, slot, options());
        connection.shutdown();

        // Give the loop time to observe the shutdown
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = connection.write(b"late".to_vec()).await;
        assert_eq!(result, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_write() {
        let bus = EventBus::new();
        let slot = ConnectionSlot::new(EndpointId::next(), bus);
        // Remote never reads, so a large write fills both socket buffers
        let (local, _remote) = stream_pair().await;
        let peer = local.peer_addr().expect("peer");
        let options = StreamOptions {
            write_timeout: Duration::from_secs(30),
            read_buffer_size: 1024,
        };

        let connection = Connection::spawn(ConnectionId::next(), local, peer, slot, options);
        let writing = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.write(vec![b'x'; 64 * 1024 * 1024]).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!writing.is_finished(), "write should be blocked");

        connection.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(1), writing)
            .await
            .expect("write released promptly")
            .expect("task joined");

        assert_eq!(result, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_retired_connection_publishes_nothing() {
        let bus = EventBus::new();
        let slot = ConnectionSlot::new(EndpointId::next(), bus.clone());
        let (_handle, mut rx) = bus.subscribe_channel(EventFilter::all());
        let (local, mut remote) = stream_pair().await;
        let peer = local.peer_addr().expect("peer");

        // Spawned without installing it in the slot: never current
        let connection = Connection::spawn(ConnectionId::next(), local, peer, slot, options());

        remote.write_all(b"ignored").await.expect("remote write");
        connection.write(b"also ignored".to_vec()).await.expect("write");
        drop(remote);

        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.flush().await;

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert!(kinds.is_empty(), "unexpected events: {kinds:?}");
    }
}
