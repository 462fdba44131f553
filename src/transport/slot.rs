//! Single-connection state machine shared by client and server.
//!
//! A [`ConnectionSlot`] holds at most one active [`Connection`] and the
//! endpoint's [`ConnectionState`]. Every transition and every event
//! publication happens under the slot lock, which gives two guarantees:
//!
//! - `Connected` is published before the I/O loop starts, so it precedes
//!   any data event of that connection.
//! - Once a connection is retired (and its `Disconnected` published), the
//!   slot no longer recognizes its ID, so nothing it publishes gets through.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::StreamError;
use crate::events::{Event, EventBus};
use crate::identifiers::{ConnectionId, EndpointId};

use super::connection::{Connection, StreamOptions};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of an endpoint's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// A connection is active and its read loop is running.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Types
// ============================================================================

/// A connect attempt that has not completed yet.
struct PendingAttempt {
    /// Attempt number, unique within the slot.
    attempt: u64,
    /// Resolves the attempt's cancel receiver.
    cancel_tx: oneshot::Sender<()>,
}

/// Mutable slot state.
#[derive(Default)]
struct SlotInner {
    state: ConnectionState,
    active: Option<Connection>,
    pending: Option<PendingAttempt>,
    next_attempt: u64,
}

/// Ticket for a connect attempt started with [`ConnectionSlot::begin_attempt`].
pub(crate) struct AttemptTicket {
    /// Attempt number to present on completion.
    pub attempt: u64,
    /// Resolves when the attempt is cancelled.
    pub cancelled: oneshot::Receiver<()>,
}

/// Outcome of offering an accepted stream to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Stream became the active connection.
    Admitted,
    /// Stream was turned away; the previous connection stays.
    Rejected,
}

// ============================================================================
// ConnectionSlot
// ============================================================================

/// Holder of an endpoint's single connection.
pub(crate) struct ConnectionSlot {
    /// Endpoint stamped on every event.
    endpoint: EndpointId,
    /// Bus that receives the events.
    bus: EventBus,
    /// State, guarded as one unit.
    inner: Mutex<SlotInner>,
}

impl fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSlot")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionSlot - Queries
// ============================================================================

impl ConnectionSlot {
    /// Creates an empty slot in `Disconnected` state.
    pub(crate) fn new(endpoint: EndpointId, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            bus,
            inner: Mutex::new(SlotInner::default()),
        })
    }

    /// Returns the owning endpoint.
    #[inline]
    pub(crate) fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Returns the current state.
    #[inline]
    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns a handle to the active connection.
    #[inline]
    pub(crate) fn active(&self) -> Option<Connection> {
        self.inner.lock().active.clone()
    }

    /// Returns the active connection's peer.
    #[inline]
    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().active.as_ref().map(Connection::peer)
    }
}

// ============================================================================
// ConnectionSlot - Client Transitions
// ============================================================================

impl ConnectionSlot {
    /// Starts a connect attempt.
    ///
    /// Retires the active connection and cancels any older attempt, then
    /// moves to `Connecting`.
    pub(crate) fn begin_attempt(&self) -> AttemptTicket {
        let mut inner = self.inner.lock();

        self.retire_locked(&mut inner);
        Self::cancel_pending_locked(&mut inner);

        inner.next_attempt += 1;
        let attempt = inner.next_attempt;
        let (cancel_tx, cancelled) = oneshot::channel();

        inner.pending = Some(PendingAttempt { attempt, cancel_tx });
        inner.state = ConnectionState::Connecting;

        AttemptTicket { attempt, cancelled }
    }

    /// Installs the stream of a finished attempt.
    ///
    /// Returns `false` (dropping the stream) if the attempt was cancelled
    /// after the stream was opened.
    pub(crate) fn complete_attempt(
        self: &Arc<Self>,
        attempt: u64,
        stream: TcpStream,
        peer: SocketAddr,
        options: StreamOptions,
    ) -> bool {
        let mut inner = self.inner.lock();

        match inner.pending.take() {
            Some(pending) if pending.attempt == attempt => {
                self.install_locked(&mut inner, stream, peer, options);
                true
            }
            other => {
                inner.pending = other;
                debug!(endpoint = %self.endpoint, attempt, "Dropping stream of cancelled attempt");
                false
            }
        }
    }

    /// Ends a failed attempt. No-op if it was already superseded.
    pub(crate) fn fail_attempt(&self, attempt: u64) {
        let mut inner = self.inner.lock();

        if inner.pending.as_ref().is_some_and(|p| p.attempt == attempt) {
            inner.pending = None;
            inner.state = ConnectionState::Disconnected;
        }
    }
}

// ============================================================================
// ConnectionSlot - Server Transitions
// ============================================================================

impl ConnectionSlot {
    /// Offers an accepted stream.
    ///
    /// With `replace` set, the current connection is retired (publishing its
    /// `Disconnected`) and the new one takes over atomically. Otherwise a
    /// stream arriving while another is active is rejected.
    pub(crate) fn admit(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        replace: bool,
        options: StreamOptions,
    ) -> Admission {
        let mut inner = self.inner.lock();

        if inner.active.is_some() && !replace {
            return Admission::Rejected;
        }

        self.retire_locked(&mut inner);
        self.install_locked(&mut inner, stream, peer, options);
        Admission::Admitted
    }
}

// ============================================================================
// ConnectionSlot - Shared Transitions
// ============================================================================

impl ConnectionSlot {
    /// Closes the active connection and cancels any pending attempt.
    ///
    /// Returns `true` if a connection was closed (and `Disconnected`
    /// published). Idempotent.
    pub(crate) fn disconnect(&self) -> bool {
        let mut inner = self.inner.lock();

        let cancelled = Self::cancel_pending_locked(&mut inner);
        let retired = self.retire_locked(&mut inner);

        if cancelled && !retired {
            debug!(endpoint = %self.endpoint, "Pending connect cancelled");
        }

        retired
    }

    /// Publishes an event built from the endpoint ID, if `id` is still the
    /// active connection. Returns whether it was published.
    pub(crate) fn publish_if_current<F>(&self, id: ConnectionId, build: F) -> bool
    where
        F: FnOnce(EndpointId) -> Event,
    {
        let inner = self.inner.lock();

        if inner.active.as_ref().is_some_and(|c| c.id() == id) {
            self.bus.publish(build(self.endpoint));
            true
        } else {
            false
        }
    }

    /// Called by the I/O loop when the stream ended on its own.
    ///
    /// Publishes `Disconnected { error: Some(..) }` unless the connection
    /// was already retired.
    pub(crate) fn close_from_stream(&self, id: ConnectionId, error: StreamError) {
        let mut inner = self.inner.lock();

        if !inner.active.as_ref().is_some_and(|c| c.id() == id) {
            return;
        }

        inner.active = None;
        inner.state = ConnectionState::Disconnected;

        info!(endpoint = %self.endpoint, connection = %id, %error, "Connection lost");

        self.bus.publish(Event::Disconnected {
            endpoint: self.endpoint,
            error: Some(error),
        });
    }

    /// Makes `stream` the active connection and publishes `Connected`.
    fn install_locked(
        self: &Arc<Self>,
        inner: &mut SlotInner,
        stream: TcpStream,
        peer: SocketAddr,
        options: StreamOptions,
    ) {
        let id = ConnectionId::next();

        inner.state = ConnectionState::Connected;
        self.bus.publish(Event::Connected {
            endpoint: self.endpoint,
            peer,
        });

        let connection = Connection::spawn(id, stream, peer, Arc::clone(self), options);
        inner.active = Some(connection);

        info!(endpoint = %self.endpoint, connection = %id, %peer, "Connected");
    }

    /// Retires the active connection, publishing `Disconnected { None }`.
    fn retire_locked(&self, inner: &mut SlotInner) -> bool {
        let Some(connection) = inner.active.take() else {
            return false;
        };

        inner.state = ConnectionState::Disconnected;
        connection.shutdown();

        info!(
            endpoint = %self.endpoint,
            connection = %connection.id(),
            peer = %connection.peer(),
            "Disconnected"
        );

        self.bus.publish(Event::Disconnected {
            endpoint: self.endpoint,
            error: None,
        });

        true
    }

    /// Cancels the pending attempt, if any.
    fn cancel_pending_locked(inner: &mut SlotInner) -> bool {
        let Some(pending) = inner.pending.take() else {
            return false;
        };

        let _ = pending.cancel_tx.send(());
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;

    use crate::events::{EventFilter, EventKind};

    fn options() -> StreamOptions {
        StreamOptions {
            write_timeout: Duration::from_secs(5),
            read_buffer_size: 1024,
        }
    }

    async fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (local, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (local.expect("connect"), accepted.expect("accept").0)
    }

    #[tokio::test]
    async fn test_new_slot_is_disconnected() {
        let slot = ConnectionSlot::new(EndpointId::next(), EventBus::new());
        assert_eq!(slot.state(), ConnectionState::Disconnected);
        assert!(slot.active().is_none());
        assert!(slot.peer_addr().is_none());
        assert!(!slot.disconnect());
    }

    #[tokio::test]
    async fn test_attempt_lifecycle() {
        let slot = ConnectionSlot::new(EndpointId::next(), EventBus::new());

        let ticket = slot.begin_attempt();
        assert_eq!(slot.state(), ConnectionState::Connecting);

        slot.fail_attempt(ticket.attempt);
        assert_eq!(slot.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_newer_attempt_cancels_older() {
        let slot = ConnectionSlot::new(EndpointId::next(), EventBus::new());

        let first = slot.begin_attempt();
        let second = slot.begin_attempt();

        assert!(first.cancelled.await.is_ok());
        assert_eq!(slot.state(), ConnectionState::Connecting);

        // Late failure of the first attempt must not touch the second
        slot.fail_attempt(first.attempt);
        assert_eq!(slot.state(), ConnectionState::Connecting);

        slot.fail_attempt(second.attempt);
        assert_eq!(slot.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_cancelled_attempt_is_not_installed() {
        let bus = EventBus::new();
        let slot = ConnectionSlot::new(EndpointId::next(), bus.clone());
        let (_handle, mut rx) = bus.subscribe_channel(EventFilter::all());

        let ticket = slot.begin_attempt();
        assert!(!slot.disconnect());

        let (local, _remote) = stream_pair().await;
        let peer = local.peer_addr().expect("peer");
        assert!(!slot.complete_attempt(ticket.attempt, local, peer, options()));

        bus.flush().await;
        assert_eq!(slot.state(), ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admit_replaces_and_orders_events() {
        let bus = EventBus::new();
        let slot = ConnectionSlot::new(EndpointId::next(), bus.clone());
        let (_handle, mut rx) = bus.subscribe_channel(EventFilter::lifecycle());

        let (first, _first_remote) = stream_pair().await;
        let (second, _second_remote) = stream_pair().await;
        let first_peer = first.peer_addr().expect("peer");
        let second_peer = second.peer_addr().expect("peer");

        assert_eq!(slot.admit(first, first_peer, true, options()), Admission::Admitted);
        assert_eq!(slot.admit(second, second_peer, true, options()), Admission::Admitted);
        bus.flush().await;

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Connected,
                EventKind::Disconnected,
                EventKind::Connected
            ]
        );
        assert_eq!(slot.peer_addr(), Some(second_peer));
    }

    #[tokio::test]
    async fn test_admit_reject_keeps_first() {
        let slot = ConnectionSlot::new(EndpointId::next(), EventBus::new());

        let (first, _first_remote) = stream_pair().await;
        let (second, _second_remote) = stream_pair().await;
        let first_peer = first.peer_addr().expect("peer");
        let second_peer = second.peer_addr().expect("peer");

        assert_eq!(slot.admit(first, first_peer, false, options()), Admission::Admitted);
        assert_eq!(slot.admit(second, second_peer, false, options()), Admission::Rejected);
        assert_eq!(slot.peer_addr(), Some(first_peer));
    }

    #[tokio::test]
    async fn test_disconnect_publishes_once() {
        let bus = EventBus::new();
        let slot = ConnectionSlot::new(EndpointId::next(), bus.clone());
        let (_handle, mut rx) = bus.subscribe_channel(EventKind::Disconnected);

        let (local, _remote) = stream_pair().await;
        let peer = local.peer_addr().expect("peer");
        slot.admit(local, peer, true, options());

        assert!(slot.disconnect());
        assert!(!slot.disconnect());
        bus.flush().await;

        assert_eq!(
            rx.try_recv().ok(),
            Some(Event::Disconnected {
                endpoint: slot.endpoint(),
                error: None
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
