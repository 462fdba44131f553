//! Type-safe identifiers.
//!
//! Newtype wrappers keep endpoint, connection and subscription IDs from
//! being mixed up. All three are allocated from process-wide counters, so
//! independent [`Exchange`](crate::Exchange) instances never collide.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Counters
// ============================================================================

static NEXT_ENDPOINT_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// EndpointId
// ============================================================================

/// Identifies a client or server endpoint.
///
/// Stamped on every event the endpoint publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(NonZeroU32);

impl EndpointId {
    /// Allocates the next endpoint ID.
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed);
        // Counter starts at 1; wrapping past u32::MAX is not reachable in practice.
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    /// Wraps a raw value. Returns `None` for 0.
    #[inline]
    #[must_use]
    pub fn from_u32(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Identifies one TCP connection over its whole life.
///
/// An endpoint keeps the ID of its current connection; I/O tasks compare
/// against it to detect that they have been retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next connection ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifies an event bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next subscription ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_ids_are_unique() {
        let a = EndpointId::next();
        let b = EndpointId::next();
        assert_ne!(a, b);
        assert!(a.as_u32() > 0);
    }

    #[test]
    fn test_endpoint_id_rejects_zero() {
        assert!(EndpointId::from_u32(0).is_none());
        assert_eq!(EndpointId::from_u32(7).map(EndpointId::as_u32), Some(7));
    }

    #[test]
    fn test_connection_ids_increase() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert!(b > a);
    }

    #[test]
    fn test_display_formats() {
        let endpoint = EndpointId::from_u32(3).unwrap();
        assert_eq!(endpoint.to_string(), "3");
        assert!(ConnectionId::next().to_string().starts_with("conn-"));
        assert!(SubscriptionId::next().to_string().starts_with("sub-"));
    }
}
