//! Builder pattern for exchange configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tcp_exchange::{ClientOptions, Exchange};
//!
//! # async fn example() -> tcp_exchange::Result<()> {
//! let exchange = Exchange::builder()
//!     .client_options(ClientOptions::new().with_connect_timeout(Duration::from_secs(5)))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use tokio::runtime::Handle;

use crate::error::{Error, Result};

use super::core::Exchange;
use super::options::{ClientOptions, ServerOptions};

// ============================================================================
// ExchangeBuilder
// ============================================================================

/// Builder for configuring an [`Exchange`].
///
/// Use [`Exchange::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ExchangeBuilder {
    /// Client settings.
    client: ClientOptions,
    /// Server settings.
    server: ServerOptions,
}

// ============================================================================
// ExchangeBuilder Implementation
// ============================================================================

impl ExchangeBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client options.
    #[inline]
    #[must_use]
    pub fn client_options(mut self, options: ClientOptions) -> Self {
        self.client = options;
        self
    }

    /// Sets the server options.
    #[inline]
    #[must_use]
    pub fn server_options(mut self, options: ServerOptions) -> Self {
        self.server = options;
        self
    }

    /// Builds the exchange with validation.
    ///
    /// Must be called inside a tokio runtime; the event bus spawns its
    /// dispatch task here.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for a zero timeout or buffer size
    /// - [`Error::Config`] if called outside a tokio runtime
    pub fn build(self) -> Result<Exchange> {
        self.client.validate()?;
        self.server.validate()?;

        if Handle::try_current().is_err() {
            return Err(Error::config(
                "Exchange must be built inside a tokio runtime.\n\
                 Example: call build() from within #[tokio::main]",
            ));
        }

        Ok(Exchange::new(self.client, self.server))
    }
}

// ============================================================================
// Tests
// ============================================================================
