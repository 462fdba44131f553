//! Exchange context and configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Exchange`] | Owns the event bus, creates clients and servers |
//! | [`ExchangeBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Connect and stream settings for clients |
//! | [`ServerOptions`] | Bind, stream and admission settings for servers |
//! | [`AdmissionPolicy`] | Handling of a second client |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for the exchange.
pub mod builder;

/// Core exchange implementation.
pub mod core;

/// Client and server options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ExchangeBuilder;
pub use core::Exchange;
pub use options::{AdmissionPolicy, ClientOptions, DEFAULT_PORT, ServerOptions};
