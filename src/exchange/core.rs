//! Exchange context.
//!
//! The [`Exchange`] is built once at startup. It owns the [`EventBus`] and
//! hands out clients and servers that publish to it.
//!
//! # Example
//!
//! ```no_run
//! use tcp_exchange::{Event, EventFilter, Exchange};
//!
//! # async fn example() -> tcp_exchange::Result<()> {
//! let exchange = Exchange::builder().build()?;
//!
//! exchange.bus().subscribe(EventFilter::all(), |event: &Event| {
//!     println!("{event:?}");
//! });
//!
//! let server = exchange.server();
//! server.start(9090).await?;
//!
//! let client = exchange.client();
//! client.connect("127.0.0.1", 9090).await?;
//! client.send("2024-01-01T00:00:00Z").await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::events::EventBus;
use crate::transport::{Client, Server};

use super::builder::ExchangeBuilder;
use super::options::{ClientOptions, ServerOptions};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the exchange.
struct ExchangeInner {
    /// Bus shared by every endpoint.
    bus: EventBus,
    /// Settings for new clients.
    client_options: ClientOptions,
    /// Settings for new servers.
    server_options: ServerOptions,
}

// ============================================================================
// Exchange
// ============================================================================

/// Shared context for clients, servers and their events.
///
/// Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct Exchange {
    /// Shared inner state.
    inner: Arc<ExchangeInner>,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("client_options", &self.inner.client_options)
            .field("server_options", &self.inner.server_options)
            .field("subscribers", &self.inner.bus.subscriber_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Exchange - Public API
// ============================================================================

impl Exchange {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ExchangeBuilder {
        ExchangeBuilder::new()
    }

    /// Returns the shared event bus.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Returns the options given to new clients.
    #[inline]
    #[must_use]
    pub fn client_options(&self) -> &ClientOptions {
        &self.inner.client_options
    }

    /// Returns the options given to new servers.
    #[inline]
    #[must_use]
    pub fn server_options(&self) -> &ServerOptions {
        &self.inner.server_options
    }

    /// Creates a disconnected client on this exchange's bus.
    #[must_use]
    pub fn client(&self) -> Client {
        let client = Client::new(self.inner.bus.clone(), self.inner.client_options.clone());
        debug!(endpoint = %client.id(), "Client created");
        client
    }

    /// Creates a stopped server on this exchange's bus.
    #[must_use]
    pub fn server(&self) -> Server {
        let server = Server::new(self.inner.bus.clone(), self.inner.server_options.clone());
        debug!(endpoint = %server.id(), "Server created");
        server
    }

    /// Closes the event bus. Endpoints keep working but nothing is delivered.
    pub fn close(&self) {
        self.inner.bus.close();
    }
}

// ============================================================================
// Exchange - Internal API
// ============================================================================

impl Exchange {
    /// Creates the context. Options are already validated.
    pub(crate) fn new(client_options: ClientOptions, server_options: ServerOptions) -> Self {
        Self {
            inner: Arc::new(ExchangeInner {
                bus: EventBus::new(),
                client_options,
                server_options,
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::events::{Event, EventFilter, EventKind};
    use crate::transport::Endpoint;

    async fn next_event(rx: &mut UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("bus open")
    }

    fn exchange() -> Exchange {
        Exchange::builder()
            .server_options(ServerOptions::new().with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)))
            .build()
            .expect("build")
    }

    #[tokio::test]
    async fn test_endpoints_get_distinct_ids() {
        let exchange = exchange();
        let a = exchange.client();
        let b = exchange.client();
        let server = exchange.server();

        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), server.id());
    }

    #[tokio::test]
    async fn test_timestamp_round_trip() {
        let exchange = exchange();
        let server = exchange.server();
        let client = exchange.client();

        let (_server_events, mut server_rx) =
            exchange.bus().subscribe_channel(EventFilter::data().from_endpoint(server.id()));
        let (_client_events, mut client_rx) =
            exchange.bus().subscribe_channel(EventFilter::data().from_endpoint(client.id()));

        server.start(0).await.expect("start");
        let port = server.local_addr().expect("bound").port();
        client.connect("127.0.0.1", port).await.expect("connect");

        client.send("2024-01-01T00:00:00Z").await.expect("send");

        let sent = next_event(&mut client_rx).await;
        assert_eq!(sent.kind(), EventKind::DataSent);
        assert_eq!(sent.text(), Some("2024-01-01T00:00:00Z"));

        let received = next_event(&mut server_rx).await;
        assert_eq!(
            received,
            Event::DataReceived {
                endpoint: server.id(),
                payload: "2024-01-01T00:00:00Z".to_string(),
            }
        );

        // Either side through the shared trait
        let endpoint: &dyn Endpoint = &server;
        let stamp = endpoint.send_timestamp().await.expect("send timestamp");
        let echoed = next_event(&mut client_rx).await;
        assert_eq!(echoed.kind(), EventKind::DataReceived);
        assert_eq!(echoed.text(), Some(stamp.as_str()));

        client.disconnect();
        server.stop().await;
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let exchange = exchange();
        let (_handle, mut rx) = exchange.bus().subscribe_channel(EventFilter::all());

        exchange.close();
        assert!(exchange.bus().is_closed());

        let server = exchange.server();
        server.start(0).await.expect("start still works");
        server.stop().await;

        assert!(rx.recv().await.is_none());
    }
}
