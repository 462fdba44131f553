//! Event types published by endpoints.
//!
//! Every lifecycle transition and every completed transfer of a client or
//! server becomes one immutable [`Event`]. Subscribers select the events
//! they care about with an [`EventFilter`].
//!
//! | Kind | Raised when |
//! |------|-------------|
//! | `Connected` | stream established (connect or accept) |
//! | `Disconnected` | stream closed, locally or by the peer |
//! | `DataSent` | a `send` call finished writing its payload |
//! | `DataReceived` | a chunk arrived and decoded as UTF-8 |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;

use crate::error::StreamError;
use crate::identifiers::EndpointId;

// ============================================================================
// Event
// ============================================================================

/// A lifecycle or data event from an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A connection became active.
    Connected {
        /// Endpoint that owns the connection.
        endpoint: EndpointId,
        /// Remote address.
        peer: SocketAddr,
    },

    /// The active connection ended.
    ///
    /// `error` is `None` for local disconnects (including replacement by a
    /// newer client) and `Some` when the stream failed or the peer closed it.
    Disconnected {
        /// Endpoint that owned the connection.
        endpoint: EndpointId,
        /// Why the stream ended, if it ended on its own.
        error: Option<StreamError>,
    },

    /// A payload was fully written.
    DataSent {
        /// Endpoint that wrote.
        endpoint: EndpointId,
        /// Exactly the bytes passed to `send`.
        payload: Vec<u8>,
    },

    /// A chunk was read and decoded.
    DataReceived {
        /// Endpoint that read.
        endpoint: EndpointId,
        /// Decoded chunk.
        payload: String,
    },
}

impl Event {
    /// Returns the tag of this event.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::DataSent { .. } => EventKind::DataSent,
            Self::DataReceived { .. } => EventKind::DataReceived,
        }
    }

    /// Returns the endpoint that published this event.
    #[inline]
    #[must_use]
    pub const fn endpoint(&self) -> EndpointId {
        match self {
            Self::Connected { endpoint, .. }
            | Self::Disconnected { endpoint, .. }
            | Self::DataSent { endpoint, .. }
            | Self::DataReceived { endpoint, .. } => *endpoint,
        }
    }

    /// Returns the payload as text for data events.
    ///
    /// `DataSent` payloads that are not UTF-8 yield `None`.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::DataSent { payload, .. } => std::str::from_utf8(payload).ok(),
            Self::DataReceived { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Tag of an [`Event`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`Event::Connected`].
    Connected,
    /// [`Event::Disconnected`].
    Disconnected,
    /// [`Event::DataSent`].
    DataSent,
    /// [`Event::DataReceived`].
    DataReceived,
}

impl EventKind {
    /// All kinds, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Connected,
        Self::Disconnected,
        Self::DataSent,
        Self::DataReceived,
    ];

    #[inline]
    const fn bit(self) -> u8 {
        match self {
            Self::Connected => 0b0001,
            Self::Disconnected => 0b0010,
            Self::DataSent => 0b0100,
            Self::DataReceived => 0b1000,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::DataSent => "dataSent",
            Self::DataReceived => "dataReceived",
        };
        f.write_str(name)
    }
}

// ============================================================================
// EventFilter
// ============================================================================

/// Selects which events a subscriber receives.
///
/// # Example
///
/// ```ignore
/// use tcp_exchange::{EventFilter, EventKind};
///
/// // Lifecycle only, from one endpoint
/// let filter = EventFilter::only(EventKind::Connected)
///     .with(EventKind::Disconnected)
///     .from_endpoint(server.id());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    /// Bit set of accepted kinds.
    kinds: u8,
    /// Restrict to a single endpoint.
    endpoint: Option<EndpointId>,
}

impl EventFilter {
    /// Accepts every event.
    #[inline]
    #[must_use]
    pub const fn all() -> Self {
        Self {
            kinds: 0b1111,
            endpoint: None,
        }
    }

    /// Accepts nothing; extend with [`with`](Self::with).
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self {
            kinds: 0,
            endpoint: None,
        }
    }

    /// Accepts a single kind.
    #[inline]
    #[must_use]
    pub const fn only(kind: EventKind) -> Self {
        Self::none().with(kind)
    }

    /// Accepts `Connected` and `Disconnected`.
    #[inline]
    #[must_use]
    pub const fn lifecycle() -> Self {
        Self::only(EventKind::Connected).with(EventKind::Disconnected)
    }

    /// Accepts `DataSent` and `DataReceived`.
    #[inline]
    #[must_use]
    pub const fn data() -> Self {
        Self::only(EventKind::DataSent).with(EventKind::DataReceived)
    }

    /// Adds a kind.
    #[inline]
    #[must_use]
    pub const fn with(mut self, kind: EventKind) -> Self {
        self.kinds |= kind.bit();
        self
    }

    /// Restricts the filter to events from one endpoint.
    #[inline]
    #[must_use]
    pub const fn from_endpoint(mut self, endpoint: EndpointId) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Returns `true` if `kind` is accepted.
    #[inline]
    #[must_use]
    pub const fn accepts(&self, kind: EventKind) -> bool {
        self.kinds & kind.bit() != 0
    }

    /// Returns `true` if the event passes the filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if !self.accepts(event.kind()) {
            return false;
        }
        match self.endpoint {
            Some(endpoint) => endpoint == event.endpoint(),
            None => true,
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        Self::only(kind)
    }
}

impl FromIterator<EventKind> for EventFilter {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use proptest::prelude::*;

    fn endpoint(raw: u32) -> EndpointId {
        EndpointId::from_u32(raw).unwrap()
    }

    fn sample(kind: EventKind, from: EndpointId) -> Event {
        match kind {
            EventKind::Connected => Event::Connected {
                endpoint: from,
                peer: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9090),
            },
            EventKind::Disconnected => Event::Disconnected {
                endpoint: from,
                error: None,
            },
            EventKind::DataSent => Event::DataSent {
                endpoint: from,
                payload: b"ping".to_vec(),
            },
            EventKind::DataReceived => Event::DataReceived {
                endpoint: from,
                payload: "pong".into(),
            },
        }
    }

    #[test]
    fn test_event_kind_and_endpoint() {
        let event = sample(EventKind::DataSent, endpoint(4));
        assert_eq!(event.kind(), EventKind::DataSent);
        assert_eq!(event.endpoint(), endpoint(4));
    }

    #[test]
    fn test_event_text() {
        assert_eq!(
            sample(EventKind::DataSent, endpoint(1)).text(),
            Some("ping")
        );
        assert_eq!(
            sample(EventKind::DataReceived, endpoint(1)).text(),
            Some("pong")
        );
        assert_eq!(sample(EventKind::Connected, endpoint(1)).text(), None);

        let binary = Event::DataSent {
            endpoint: endpoint(1),
            payload: vec![0xff, 0x00],
        };
        assert_eq!(binary.text(), None);
    }

    #[test]
    fn test_lifecycle_filter() {
        let filter = EventFilter::lifecycle();
        assert!(filter.accepts(EventKind::Connected));
        assert!(filter.accepts(EventKind::Disconnected));
        assert!(!filter.accepts(EventKind::DataSent));
        assert!(!filter.accepts(EventKind::DataReceived));
    }

    #[test]
    fn test_endpoint_restriction() {
        let filter = EventFilter::all().from_endpoint(endpoint(2));
        assert!(filter.matches(&sample(EventKind::Connected, endpoint(2))));
        assert!(!filter.matches(&sample(EventKind::Connected, endpoint(3))));
    }

    #[test]
    fn test_filter_from_iter() {
        let filter: EventFilter = [EventKind::DataSent, EventKind::DataReceived]
            .into_iter()
            .collect();
        assert_eq!(filter, EventFilter::data());
    }

    fn any_kind() -> impl Strategy<Value = EventKind> {
        prop::sample::select(EventKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_filter_accepts_exactly_added_kinds(
            added in prop::collection::vec(any_kind(), 0..4),
            probe in any_kind(),
        ) {
            let filter: EventFilter = added.iter().copied().collect();
            prop_assert_eq!(filter.accepts(probe), added.contains(&probe));
            prop_assert_eq!(
                filter.matches(&sample(probe, endpoint(1))),
                added.contains(&probe)
            );
        }
    }
}
