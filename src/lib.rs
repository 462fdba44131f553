//! TCP exchange - single-client text messaging with a typed event bus.
//!
//! This library connects a client and a single-client server over plain
//! TCP and reports everything that happens on the wire as typed events.
//!
//! # Architecture
//!
//! Both roles share the same connection core:
//!
//! - **Client**: connects to `host:port`, one connection at a time
//! - **Server**: listens (port 9090 by default), holds one client and
//!   replaces it when another connects
//!
//! Key design principles:
//!
//! - Each connection owns its stream inside one I/O task
//! - Payloads are raw UTF-8 text; one read is one message (no framing)
//! - All events flow through one [`EventBus`] dispatch task, so handlers
//!   never run concurrently
//! - A retired connection never publishes after its `Disconnected`
//!
//! # Quick Start
//!
//! ```no_run
//! use tcp_exchange::{Event, EventFilter, Exchange, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let exchange = Exchange::builder().build()?;
//!
//!     exchange.bus().subscribe(EventFilter::data(), |event: &Event| {
//!         println!("{:?}: {:?}", event.kind(), event.text());
//!     });
//!
//!     let server = exchange.server();
//!     server.start(9090).await?;
//!
//!     let client = exchange.client();
//!     client.connect("127.0.0.1", 9090).await?;
//!     client.send("2024-01-01T00:00:00Z").await?;
//!
//!     client.disconnect();
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | [`Event`] types and the [`EventBus`] |
//! | [`exchange`] | [`Exchange`] context and options |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Chunk decoding and timestamp payloads |
//! | [`transmit`] | Periodic timestamp sending |
//! | [`transport`] | [`Client`], [`Server`] and their connections |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// Fallible operations return their own error enum; all of them convert
/// into [`Error`].
pub mod error;

/// Typed events and the publish/subscribe bus.
pub mod events;

/// Exchange context and configuration.
///
/// Use [`Exchange::builder()`] to create a configured instance.
pub mod exchange;

/// Type-safe identifiers for endpoints, connections and subscriptions.
pub mod identifiers;

/// Payload encoding.
pub mod protocol;

/// Periodic timestamp transmission.
pub mod transmit;

/// TCP transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{BindError, ConnectError, Error, Result, SendError, StreamError};

// Event types
pub use events::{Event, EventBus, EventFilter, EventKind, SubscriptionHandle, WeakEventBus};

// Exchange types
pub use exchange::{
    AdmissionPolicy, ClientOptions, DEFAULT_PORT, Exchange, ExchangeBuilder, ServerOptions,
};

// Identifier types
pub use identifiers::{ConnectionId, EndpointId, SubscriptionId};

// Transmit types
pub use transmit::{AutoTransmit, TransmitInterval};

// Transport types
pub use transport::{Client, ConnectionState, Endpoint, Server, Target};
