//! Single-client TCP server.
//!
//! The server listens on one port and tracks exactly one client. When a
//! second client connects, the admission policy decides: by default the
//! newcomer replaces the current client, which is disconnected first.
//!
//! # Connection Flow
//!
//! 1. `start` binds the listener (port 9090 by default, 0 for any)
//! 2. The accept loop hands each stream to the connection slot
//! 3. The slot retires the previous client (`Disconnected`) and installs
//!    the new one (`Connected`) under one lock
//! 4. `stop` ends the accept loop, releases the port and drops the client

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{BindError, SendError};
use crate::events::EventBus;
use crate::exchange::{AdmissionPolicy, ServerOptions};
use crate::identifiers::EndpointId;

use super::Endpoint;
use super::connection::StreamOptions;
use super::slot::{Admission, ConnectionSlot, ConnectionState};

// ============================================================================
// Constants
// ============================================================================

/// Pause after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ============================================================================
// Types
// ============================================================================

/// A running accept loop.
struct Listening {
    /// Bound address.
    addr: SocketAddr,
    /// Stops the accept loop.
    stop_tx: oneshot::Sender<()>,
    /// Accept loop task; owns the listener.
    task: JoinHandle<()>,
}

/// Internal shared state for a server.
struct ServerInner {
    /// Client connection state machine.
    slot: Arc<ConnectionSlot>,
    /// Bind and I/O settings.
    options: ServerOptions,
    /// Listener state; async lock so `start`/`stop` serialize across awaits.
    listening: AsyncMutex<Option<Listening>>,
    /// Bound address, readable without awaiting.
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

// ============================================================================
// Server
// ============================================================================

/// Server side of the exchange.
///
/// Cloning yields another handle to the same server.
///
/// # Example
///
/// ```ignore
/// let server = exchange.server();
/// server.start(9090).await?;
///
/// // ... later, once a client is connected
/// server.send_text("hello").await?;
///
/// server.stop().await;
/// ```
#[derive(Clone)]
pub struct Server {
    /// Shared inner state.
    inner: Arc<ServerInner>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id())
            .field("local_addr", &self.local_addr())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server - Constructor
// ============================================================================

impl Server {
    /// Creates a stopped server publishing to `bus`.
    pub(crate) fn new(bus: EventBus, options: ServerOptions) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                slot: ConnectionSlot::new(EndpointId::next(), bus),
                options,
                listening: AsyncMutex::new(None),
                local_addr: parking_lot::Mutex::new(None),
            }),
        }
    }
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Returns the endpoint ID stamped on this server's events.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.inner.slot.endpoint()
    }

    /// Returns the state of the client connection.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.slot.state()
    }

    /// Returns `true` while the listener is bound.
    #[inline]
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.local_addr().is_some()
    }

    /// Returns the bound address while listening.
    ///
    /// Reports the OS-assigned port when started with port 0.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    /// Returns the connected client's address.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.slot.peer_addr()
    }

    /// Returns `true` while a client is connected.
    #[inline]
    #[must_use]
    pub fn has_client(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Starts listening on the configured port.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn start_default(&self) -> Result<(), BindError> {
        self.start(self.inner.options.port).await
    }

    /// Binds `bind_ip:port` and starts accepting clients.
    ///
    /// # Errors
    ///
    /// - [`BindError::AlreadyListening`] if already started
    /// - [`BindError::AddrInUse`] if the port is taken
    /// - [`BindError::PermissionDenied`] for privileged ports
    pub async fn start(&self, port: u16) -> Result<(), BindError> {
        let mut listening = self.inner.listening.lock().await;

        if let Some(current) = listening.as_ref() {
            return Err(BindError::AlreadyListening { addr: current.addr });
        }

        let requested = SocketAddr::new(self.inner.options.bind_ip, port);
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|e| BindError::from_io(requested, e))?;
        let addr = listener.local_addr()?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::accept_loop(
            listener,
            Arc::clone(&self.inner.slot),
            self.inner.options.admission,
            self.inner.options.stream(),
            stop_rx,
        ));

        *listening = Some(Listening {
            addr,
            stop_tx,
            task,
        });
        *self.inner.local_addr.lock() = Some(addr);

        info!(endpoint = %self.id(), %addr, "Server started");

        Ok(())
    }

    /// Disconnects the client and stops listening.
    ///
    /// When this returns the port is released. Idempotent.
    pub async fn stop(&self) {
        let mut listening = self.inner.listening.lock().await;

        if let Some(Listening {
            addr,
            stop_tx,
            task,
        }) = listening.take()
        {
            let _ = stop_tx.send(());
            if let Err(e) = task.await {
                error!(error = %e, "Accept loop panicked");
            }
            *self.inner.local_addr.lock() = None;
            info!(endpoint = %self.id(), %addr, "Server stopped");
        }

        self.inner.slot.disconnect();
    }

    /// Drops the current client but keeps listening.
    pub fn disconnect_client(&self) {
        if self.inner.slot.disconnect() {
            info!(endpoint = %self.id(), "Client dropped");
        }
    }

    /// Writes `payload` to the connected client.
    ///
    /// # Errors
    ///
    /// - [`SendError::NoClient`] if no client is connected
    /// - [`SendError::Write`] if the write failed; the client is dropped
    /// - [`SendError::Closed`] if the client went away before the write ran
    pub async fn send(&self, payload: impl AsRef<[u8]>) -> Result<(), SendError> {
        let connection = self.inner.slot.active().ok_or(SendError::NoClient)?;
        connection.write(payload.as_ref().to_vec()).await
    }
}

// ============================================================================
// Server - Accept Loop
// ============================================================================

impl Server {
    /// Background task that accepts clients until stopped.
    async fn accept_loop(
        listener: TcpListener,
        slot: Arc<ConnectionSlot>,
        admission: AdmissionPolicy,
        options: StreamOptions,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        debug!(endpoint = %slot.endpoint(), "Accept loop started");

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    debug!("Accept loop stopping");
                    break;
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                            }

                            let replace = admission == AdmissionPolicy::Replace;
                            if slot.admit(stream, peer, replace, options) == Admission::Rejected {
                                warn!(%peer, "Second client rejected");
                            }
                        }

                        Err(e) => {
                            error!(error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        debug!("Accept loop terminated");
    }
}

// ============================================================================
// Endpoint
// ============================================================================

#[async_trait]
impl Endpoint for Server {
    fn id(&self) -> EndpointId {
        Server::id(self)
    }

    fn state(&self) -> ConnectionState {
        Server::state(self)
    }

    async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        Server::send(self, payload).await
    }
}

// ============================================================================
// Tests
// ============================================================================
