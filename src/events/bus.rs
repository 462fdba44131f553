//! Publish/subscribe channel for endpoint events.
//!
//! Publishing is a non-blocking channel send, so I/O tasks never wait on
//! subscribers. A single dispatch task drains the channel and invokes
//! handlers one at a time, in publish order. Handlers therefore never run
//! concurrently with each other.
//!
//! # Example
//!
//! ```ignore
//! use tcp_exchange::{EventBus, EventFilter, EventKind};
//!
//! let bus = EventBus::new();
//! let handle = bus.subscribe(EventKind::DataReceived, |event| {
//!     println!("received {:?}", event.text());
//! });
//!
//! // ...
//! bus.unsubscribe(handle);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::identifiers::SubscriptionId;

use super::event::{Event, EventFilter};

// ============================================================================
// Types
// ============================================================================

/// Subscriber callback.
///
/// Runs on the dispatch task, never concurrently with another handler.
pub type EventHandler = Box<dyn FnMut(&Event) + Send + 'static>;

/// Shared handler cell; locked only by the dispatch task.
type SharedHandler = Arc<Mutex<EventHandler>>;

/// Messages consumed by the dispatch task.
enum BusMessage {
    /// Deliver an event.
    Event(Event),
    /// Acknowledge once every earlier message has been handled.
    Flush(oneshot::Sender<()>),
    /// Stop the dispatch task.
    Close,
}

/// A registered subscriber.
struct Subscription {
    filter: EventFilter,
    handler: SharedHandler,
}

/// State shared between bus handles and the dispatch task.
struct BusShared {
    subscriptions: Mutex<FxHashMap<SubscriptionId, Subscription>>,
    closed: AtomicBool,
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Opaque handle returned by [`EventBus::subscribe`].
///
/// Pass it to [`EventBus::unsubscribe`] to stop delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
}

impl SubscriptionHandle {
    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Event bus with a serialized dispatch task.
///
/// Cloning is cheap; clones publish to and subscribe on the same bus.
#[derive(Clone)]
pub struct EventBus {
    /// Channel into the dispatch task.
    tx: mpsc::UnboundedSender<BusMessage>,
    /// Subscriptions and close flag.
    shared: Arc<BusShared>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EventBus - Constructor
// ============================================================================

impl EventBus {
    /// Creates a bus and spawns its dispatch task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(BusShared {
            subscriptions: Mutex::new(FxHashMap::default()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(Self::run_dispatch_loop(rx, Arc::clone(&shared)));

        Self { tx, shared }
    }
}

// ============================================================================
// EventBus - Public API
// ============================================================================

impl EventBus {
    /// Registers `handler` for every event matching `filter`.
    ///
    /// The handler may call [`subscribe`](Self::subscribe),
    /// [`unsubscribe`](Self::unsubscribe) or [`publish`](Self::publish) on
    /// this bus.
    ///
    /// The dispatch task runs until [`close`](Self::close) or until the last
    /// `EventBus` handle is dropped. A handler that owns an `EventBus` clone
    /// keeps it alive on its own; capture a [`WeakEventBus`] from
    /// [`downgrade`](Self::downgrade) instead.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> SubscriptionHandle
    where
        F: FnMut(&Event) + Send + 'static,
    {
        let id = SubscriptionId::next();
        let subscription = Subscription {
            filter: filter.into(),
            handler: Arc::new(Mutex::new(Box::new(handler))),
        };

        self.shared.subscriptions.lock().insert(id, subscription);
        debug!(subscription = %id, "Subscribed");

        SubscriptionHandle { id }
    }

    /// Registers a subscription that forwards matching events to a channel.
    ///
    /// Useful for async consumers that want to `.recv().await` events.
    pub fn subscribe_channel(
        &self,
        filter: impl Into<EventFilter>,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(filter, move |event| {
            let _ = tx.send(event.clone());
        });
        (handle, rx)
    }

    /// Removes a subscription.
    ///
    /// Returns `false` if it was already removed. Events published after this
    /// call are not delivered to it; a delivery already running may finish.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.shared.subscriptions.lock().remove(&handle.id).is_some();
        if removed {
            debug!(subscription = %handle.id, "Unsubscribed");
        }
        removed
    }

    /// Enqueues an event for delivery. Never blocks.
    pub fn publish(&self, event: Event) {
        if self.is_closed() {
            trace!(kind = %event.kind(), "Bus closed, event dropped");
            return;
        }
        if self.tx.send(BusMessage::Event(event)).is_err() {
            trace!("Dispatch task gone, event dropped");
        }
    }

    /// Waits until every event published before this call was delivered.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(BusMessage::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Returns a handle that does not keep the dispatch task alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            tx: self.tx.downgrade(),
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Returns the number of active subscriptions.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriptions.lock().len()
    }

    /// Returns `true` once [`close`](Self::close) was called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stops the dispatch task after delivering already-queued events.
    ///
    /// Later publishes are dropped. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(BusMessage::Close);
        debug!("Event bus closing");
    }
}

// ============================================================================
// WeakEventBus
// ============================================================================

/// Non-owning bus handle, for use inside handlers.
#[derive(Clone)]
pub struct WeakEventBus {
    tx: mpsc::WeakUnboundedSender<BusMessage>,
    shared: Weak<BusShared>,
}

impl WeakEventBus {
    /// Returns the bus if any strong handle is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<EventBus> {
        Some(EventBus {
            tx: self.tx.upgrade()?,
            shared: self.shared.upgrade()?,
        })
    }
}

impl fmt::Debug for WeakEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEventBus").finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// EventBus - Dispatch Loop
// ============================================================================

impl EventBus {
    /// Dispatch task: delivers events in order until closed.
    async fn run_dispatch_loop(mut rx: mpsc::UnboundedReceiver<BusMessage>, shared: Arc<BusShared>) {
        debug!("Dispatch loop started");

        while let Some(message) = rx.recv().await {
            match message {
                BusMessage::Event(event) => Self::dispatch(&shared, &event),
                BusMessage::Flush(ack) => {
                    let _ = ack.send(());
                }
                BusMessage::Close => break,
            }
        }

        shared.subscriptions.lock().clear();
        debug!("Dispatch loop terminated");
    }

    /// Delivers one event to every matching subscriber.
    fn dispatch(shared: &BusShared, event: &Event) {
        let mut targets: Vec<(SubscriptionId, SharedHandler)> = {
            let subscriptions = shared.subscriptions.lock();
            subscriptions
                .iter()
                .filter(|(_, sub)| sub.filter.matches(event))
                .map(|(id, sub)| (*id, Arc::clone(&sub.handler)))
                .collect()
        };
        targets.sort_unstable_by_key(|(id, _)| *id);

        for (id, handler) in targets {
            // An earlier handler in this round may have unsubscribed it
            if !shared.subscriptions.lock().contains_key(&id) {
                continue;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let mut handler = handler.lock();
                (handler)(event);
            }));

            if outcome.is_err() {
                error!(subscription = %id, kind = %event.kind(), "Event handler panicked");
            }
        }

        trace!(kind = %event.kind(), "Event dispatched");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    use crate::events::EventKind;
    use crate::identifiers::EndpointId;

    fn received(endpoint: EndpointId, text: &str) -> Event {
        Event::DataReceived {
            endpoint,
            payload: text.into(),
        }
    }

    #[tokio::test]
    async fn test_delivery_in_publish_order() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();
        let (_handle, mut rx) = bus.subscribe_channel(EventFilter::all());

        for i in 0..50 {
            bus.publish(received(endpoint, &i.to_string()));
        }

        for i in 0..50 {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("event in time")
                .expect("channel open");
            assert_eq!(event.text(), Some(i.to_string().as_str()));
        }
    }

    #[tokio::test]
    async fn test_filter_applies() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();
        let (_handle, mut rx) = bus.subscribe_channel(EventKind::Disconnected);

        bus.publish(received(endpoint, "ignored"));
        bus.publish(Event::Disconnected {
            endpoint,
            error: None,
        });
        bus.flush().await;

        let event = rx.try_recv().expect("disconnected delivered");
        assert_eq!(event.kind(), EventKind::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();
        let (handle, mut rx) = bus.subscribe_channel(EventFilter::all());

        bus.publish(received(endpoint, "before"));
        bus.flush().await;
        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));

        bus.publish(received(endpoint, "after"));
        bus.flush().await;

        assert_eq!(rx.try_recv().ok().as_ref().and_then(Event::text), Some("before"));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_during_delivery() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();

        // First subscriber removes itself on the first event it sees
        let self_handle: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        let handle = {
            let bus_for_handler = bus.clone();
            let self_handle = Arc::clone(&self_handle);
            let seen = Arc::clone(&seen);
            bus.subscribe(EventFilter::all(), move |event| {
                seen.lock().push(event.text().unwrap_or_default().to_string());
                if let Some(handle) = self_handle.lock().take() {
                    bus_for_handler.unsubscribe(handle);
                }
            })
        };
        *self_handle.lock() = Some(handle);

        // Second subscriber must keep receiving everything
        let (_other, mut rx) = bus.subscribe_channel(EventFilter::all());

        bus.publish(received(endpoint, "one"));
        bus.publish(received(endpoint, "two"));
        bus.flush().await;

        assert_eq!(*seen.lock(), vec!["one".to_string()]);
        assert_eq!(rx.try_recv().ok().as_ref().and_then(Event::text), Some("one"));
        assert_eq!(rx.try_recv().ok().as_ref().and_then(Event::text), Some("two"));
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();

        bus.subscribe(EventFilter::all(), |_| panic!("handler failure"));
        let (_handle, mut rx) = bus.subscribe_channel(EventFilter::all());

        bus.publish(received(endpoint, "first"));
        bus.publish(received(endpoint, "second"));
        bus.flush().await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_handlers_never_overlap() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();
        let running = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));

        for _ in 0..4 {
            let running = Arc::clone(&running);
            let overlapped = Arc::clone(&overlapped);
            bus.subscribe(EventFilter::all(), move |_| {
                if running.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                std::thread::yield_now();
                running.store(false, Ordering::SeqCst);
            });
        }

        let publishers: Vec<_> = (0..4)
            .map(|n| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        bus.publish(received(endpoint, &format!("{n}-{i}")));
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.await.expect("publisher task");
        }
        bus.flush().await;

        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_drops_later_events() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();
        let (_handle, mut rx) = bus.subscribe_channel(EventFilter::all());

        bus.publish(received(endpoint, "queued"));
        bus.close();
        bus.close();
        bus.publish(received(endpoint, "dropped"));

        let first = timeout(Duration::from_secs(1), rx.recv()).await.expect("in time");
        assert_eq!(first.as_ref().and_then(Event::text), Some("queued"));

        // Dispatch task clears subscriptions on exit, closing the channel
        let next = timeout(Duration::from_secs(1), rx.recv()).await.expect("in time");
        assert!(next.is_none());
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_last_handle_stops_dispatch() {
        let bus = EventBus::new();
        let endpoint = EndpointId::next();
        let (_handle, mut rx) = bus.subscribe_channel(EventFilter::all());

        // Republishes through a weak handle; must not keep the bus alive
        let weak = bus.downgrade();
        bus.subscribe(EventKind::Connected, move |_| {
            if let Some(bus) = weak.upgrade() {
                bus.publish(Event::DataReceived {
                    endpoint,
                    payload: "echo".into(),
                });
            }
        });

        bus.publish(received(endpoint, "last"));
        drop(bus);

        let first = timeout(Duration::from_secs(1), rx.recv()).await.expect("in time");
        assert_eq!(first.as_ref().and_then(Event::text), Some("last"));

        let next = timeout(Duration::from_secs(1), rx.recv()).await.expect("dispatch task exits");
        assert!(next.is_none());
    }
}
