//! Local synchronization bus
//!
//! In-process publish/subscribe for notification state. Handlers run
//! synchronously, in subscription order, for each event in publish order.
//! After local delivery the bus writes a count-only [`RelaySignal`] to the
//! attached cross-client channel.
//!
//! Handlers must tolerate duplicate and out-of-order events: the same
//! unread count can arrive from a local reconcile and from a relay.

use super::relay::{RelaySignal, SignalChannel};
use crate::inbox::{max_timestamp, AccountSnapshot, Message};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Type alias for the handler registry to reduce complexity
type Handlers = Arc<RwLock<Vec<(u64, Handler)>>>;

/// Notification-state change delivered to presenters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    /// Full message list, or `None` for a count-only relay
    pub messages: Option<Vec<Message>>,
    /// Unread count at the time of the event
    pub unread_count: usize,
}

impl BusEvent {
    /// Event carrying a whole snapshot
    pub fn full(snapshot: AccountSnapshot) -> Self {
        Self {
            unread_count: snapshot.unread_count(),
            messages: Some(snapshot.messages),
        }
    }

    /// Count-only event (cross-client relay)
    pub fn count_only(unread_count: usize) -> Self {
        Self {
            messages: None,
            unread_count,
        }
    }

    pub fn is_count_only(&self) -> bool {
        self.messages.is_none()
    }

    /// Newest message time, `None` for count-only or empty events
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.messages.as_deref().and_then(max_timestamp)
    }

    /// Total message count, `None` for count-only events
    pub fn total(&self) -> Option<usize> {
        self.messages.as_ref().map(Vec::len)
    }
}

/// Handle returned by [`SyncBus::subscribe`]
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    handlers: Weak<RwLock<Vec<(u64, Handler)>>>,
}

impl Subscription {
    /// Remove the handler now
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn remove(&self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

/// In-process bus with an optional cross-client relay
pub struct SyncBus {
    handlers: Handlers,
    next_id: AtomicU64,
    relay: Option<Arc<dyn SignalChannel>>,
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncBus {
    /// Bus without a relay (single client)
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            relay: None,
        }
    }

    /// Bus that mirrors every publish to `relay`
    pub fn with_relay(relay: Arc<dyn SignalChannel>) -> Self {
        Self {
            relay: Some(relay),
            ..Self::new()
        }
    }

    /// The attached relay channel, if any
    pub fn relay(&self) -> Option<&Arc<dyn SignalChannel>> {
        self.relay.as_ref()
    }

    /// Register a handler
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Forward events into a channel, for async consumers
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<BusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Number of live handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver locally, then relay the count to other clients
    pub fn publish(&self, event: BusEvent) {
        let unread = event.unread_count;
        self.publish_local(event);

        if let Some(relay) = &self.relay {
            match relay.write(RelaySignal::now(unread)) {
                Ok(()) => crate::metrics::record_relay("sent"),
                Err(e) => {
                    crate::metrics::record_relay("failed");
                    tracing::warn!(error = %e, "Failed to write relay signal");
                }
            }
        }
    }

    /// Deliver to in-process subscribers only
    pub fn publish_local(&self, event: BusEvent) {
        // Snapshot the handler list so handlers may (un)subscribe re-entrantly
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        tracing::trace!(
            unread = event.unread_count,
            count_only = event.is_count_only(),
            subscribers = handlers.len(),
            "Publishing bus event"
        );
        for handler in handlers {
            handler(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::MessageKind;
    use crate::sync::relay::LocalSignalHub;
    use std::sync::Mutex;

    #[test]
    fn test_fifo_delivery() {
        let bus = SyncBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = bus.subscribe(move |e| sink.lock().unwrap().push(e.unread_count));

        for n in [1, 2, 3, 2] {
            bus.publish(BusEvent::count_only(n));
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 2]);
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let bus = SyncBus::new();
        let first = bus.subscribe(|_| {});
        let second = bus.subscribe(|_| {});
        assert_eq!(bus.subscriber_count(), 2);

        first.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(second);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_reentrant_subscribe_does_not_deadlock() {
        let bus = Arc::new(SyncBus::new());
        let inner = bus.clone();
        let _sub = bus.subscribe(move |_| {
            let _nested = inner.subscribe(|_| {});
        });
        bus.publish(BusEvent::count_only(1));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_full_event_fields() {
        let snapshot = AccountSnapshot::new(vec![
            Message::new(MessageKind::Admin, "a"),
            Message::new(MessageKind::Admin, "b").read(),
        ]);
        let event = BusEvent::full(snapshot);
        assert_eq!(event.unread_count, 1);
        assert_eq!(event.total(), Some(2));
        assert!(event.max_timestamp().is_some());

        let relay = BusEvent::count_only(7);
        assert!(relay.is_count_only());
        assert_eq!(relay.total(), None);
        assert_eq!(relay.max_timestamp(), None);
    }

    #[tokio::test]
    async fn test_publish_relays_count_but_local_does_not() {
        let hub = LocalSignalHub::new();
        let mut tap = hub.tap();
        let bus = SyncBus::with_relay(Arc::new(hub.channel()));

        bus.publish_local(BusEvent::count_only(9));
        assert!(hub.latest_raw().is_none());

        let snapshot = AccountSnapshot::new(vec![Message::new(MessageKind::Admin, "body text")]);
        bus.publish(BusEvent::full(snapshot));

        let envelope = tap.recv().await.unwrap();
        assert!(!envelope.payload.contains("body text"));
        assert!(envelope.payload.contains("\"unreadCount\":1"));
    }

    #[tokio::test]
    async fn test_subscribe_channel() {
        let bus = SyncBus::new();
        let (_sub, mut rx) = bus.subscribe_channel();
        bus.publish(BusEvent::count_only(2));
        assert_eq!(rx.recv().await.unwrap().unread_count, 2);
    }
}
