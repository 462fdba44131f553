//! TCP transport layer.
//!
//! Both sides of the exchange are endpoints that own at most one live
//! connection. Each connection runs its own I/O task and reports through
//! the [`EventBus`](crate::events::EventBus).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client         │                              │  Server         │
//! │                 │            TCP               │                 │
//! │  ConnectionSlot │◄────────────────────────────►│  ConnectionSlot │
//! │  → Connection   │        host:9090             │  → Connection   │
//! │                 │                              │  (one client)   │
//! └────────┬────────┘                              └────────┬────────┘
//!          │                  EventBus                      │
//!          └────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Outbound connections with cancellable connect |
//! | `connection` | Per-stream I/O task |
//! | `server` | Listener holding a single client |
//! | `slot` | Connection state machine shared by both endpoints |
//! | `target` | `tcp://host:port` parsing |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::SendError;
use crate::identifiers::EndpointId;
use crate::protocol::timestamp_payload;

// ============================================================================
// Submodules
// ============================================================================

/// Client endpoint.
pub mod client;

/// Per-stream I/O task.
pub(crate) mod connection;

/// Server endpoint.
pub mod server;

/// Connection state machine.
pub mod slot;

/// Connect targets.
pub mod target;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::Client;
pub use server::Server;
pub use slot::ConnectionState;
pub use target::Target;

// ============================================================================
// Endpoint
// ============================================================================

/// Behaviour shared by [`Client`] and [`Server`].
///
/// Lets callers such as [`AutoTransmit`](crate::transmit::AutoTransmit)
/// drive either side without knowing which one it is.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Returns the ID stamped on this endpoint's events.
    fn id(&self) -> EndpointId;

    /// Returns the current connection state.
    fn state(&self) -> ConnectionState;

    /// Writes raw bytes to the peer.
    async fn send(&self, payload: &[u8]) -> Result<(), SendError>;

    /// Writes UTF-8 text to the peer.
    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.send(text.as_bytes()).await
    }

    /// Sends the current UTC time and returns the text that was sent.
    async fn send_timestamp(&self) -> Result<String, SendError> {
        let payload = timestamp_payload();
        self.send(payload.as_bytes()).await?;
        Ok(payload)
    }
}
