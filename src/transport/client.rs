//! Client endpoint.
//!
//! Connects to a server, exchanges text with it and reports every
//! transition on the event bus.
//!
//! # Connection Flow
//!
//! 1. `connect` retires any current connection or attempt (`Connecting`)
//! 2. Host is resolved and each address tried in turn, bounded by the
//!    connect timeout
//! 3. On success `Connected` is published and the read loop starts
//! 4. `disconnect`, a newer `connect`, or a stream failure ends it with
//!    `Disconnected`

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{ConnectError, SendError};
use crate::events::EventBus;
use crate::exchange::ClientOptions;
use crate::identifiers::EndpointId;

use super::Endpoint;
use super::slot::{ConnectionSlot, ConnectionState};
use super::target::Target;

// ============================================================================
// Client
// ============================================================================

/// Client side of the exchange.
///
/// Cloning yields another handle to the same endpoint.
///
/// # Example
///
/// ```ignore
/// let client = exchange.client();
/// client.connect("192.168.1.20", 9090).await?;
/// client.send_text("hello").await?;
/// client.disconnect();
/// ```
#[derive(Clone)]
pub struct Client {
    /// Connection state machine.
    slot: Arc<ConnectionSlot>,
    /// Timeouts and buffer sizes.
    options: ClientOptions,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Constructor
// ============================================================================

impl Client {
    /// Creates a disconnected client publishing to `bus`.
    pub(crate) fn new(bus: EventBus, options: ClientOptions) -> Self {
        Self {
            slot: ConnectionSlot::new(EndpointId::next(), bus),
            options,
        }
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Returns the endpoint ID stamped on this client's events.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.slot.endpoint()
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.slot.state()
    }

    /// Returns `true` while connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the server address while connected.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.slot.peer_addr()
    }

    /// Connects to `host:port`.
    ///
    /// An existing connection is closed first (publishing its
    /// `Disconnected`); that is never an error.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::InvalidPort`] if `port` is 0
    /// - [`ConnectError::Resolve`] if the host does not resolve
    /// - [`ConnectError::Refused`] if the server refused
    /// - [`ConnectError::Timeout`] if the connect timeout elapsed
    /// - [`ConnectError::Cancelled`] if `disconnect` or another `connect`
    ///   was called meanwhile
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        if port == 0 {
            return Err(ConnectError::InvalidPort);
        }

        let ticket = self.slot.begin_attempt();
        let connect_timeout = self.options.connect_timeout;

        debug!(endpoint = %self.id(), host, port, attempt = ticket.attempt, "Connecting");

        let opened = tokio::select! {
            result = timeout(connect_timeout, Self::open_stream(host, port)) => {
                result.unwrap_or_else(|_| {
                    Err(ConnectError::timeout(connect_timeout.as_millis() as u64))
                })
            }
            _ = ticket.cancelled => Err(ConnectError::Cancelled),
        };

        let result = opened.and_then(|stream| {
            let peer = stream.peer_addr()?;
            if self
                .slot
                .complete_attempt(ticket.attempt, stream, peer, self.options.stream())
            {
                Ok(())
            } else {
                Err(ConnectError::Cancelled)
            }
        });

        if let Err(ref e) = result {
            self.slot.fail_attempt(ticket.attempt);
            if e.is_cancelled() {
                debug!(endpoint = %self.id(), host, port, "Connect cancelled");
            } else {
                warn!(endpoint = %self.id(), host, port, error = %e, "Connect failed");
            }
        }

        result
    }

    /// Connects to a parsed [`Target`].
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_to(&self, target: &Target) -> Result<(), ConnectError> {
        self.connect(target.host(), target.port()).await
    }

    /// Closes the connection, or cancels a pending attempt.
    ///
    /// Publishes `Disconnected { error: None }` only if a connection was
    /// actually closed. Calling it again is a no-op.
    pub fn disconnect(&self) {
        if self.slot.disconnect() {
            info!(endpoint = %self.id(), "Client disconnected");
        }
    }

    /// Writes `payload` to the server.
    ///
    /// Returns after the whole payload was written, and after `DataSent`
    /// carrying the same bytes was published.
    ///
    /// # Errors
    ///
    /// - [`SendError::NotConnected`] if not connected
    /// - [`SendError::Write`] if the write failed; the connection is closed
    /// - [`SendError::Closed`] if the connection closed before the write ran
    pub async fn send(&self, payload: impl AsRef<[u8]>) -> Result<(), SendError> {
        let connection = self.slot.active().ok_or(SendError::NotConnected)?;
        connection.write(payload.as_ref().to_vec()).await
    }
}

// ============================================================================
// Client - Internals
// ============================================================================

impl Client {
    /// Resolves `host` and connects to the first address that accepts.
    async fn open_stream(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|e| ConnectError::resolve(host, e.to_string()))?
            .collect();

        if addrs.is_empty() {
            return Err(ConnectError::resolve(host, "no addresses found"));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "Address failed");
                    last_error = Some(ConnectError::from_io(addr, e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectError::resolve(host, "no addresses found")))
    }
}

// ============================================================================
// Endpoint
// ============================================================================

#[async_trait]
impl Endpoint for Client {
    fn id(&self) -> EndpointId {
        Client::id(self)
    }

    fn state(&self) -> ConnectionState {
        Client::state(self)
    }

    async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        Client::send(self, payload).await
    }
}

// ============================================================================
// Tests
// ============================================================================
