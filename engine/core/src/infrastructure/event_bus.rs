// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Resource Events
//
// Delivers every published event to registered handlers and listeners
// synchronously, in registration order, before `publish` returns.
//
// Two kinds of subscriber:
// - handlers: async observers (resource tree, collection membership)
// - listeners: predicate-filtered inboxes behind `EventListener`, the
//   "listen before act" primitive. Registration establishes the delivery
//   guarantee, so an event published after `listen` returns is never missed,
//   even if `wait` has not been called yet.
//
// The engine runs two buses: the main bus for committed resource events and
// the results bus for `HttpCommandProcessed` completions.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::domain::context::CallContext;
use crate::domain::events::ResourceEvent;

/// Async observer invoked inline by `publish`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ResourceEvent);
}

pub type EventPredicate = Box<dyn Fn(&ResourceEvent) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct ListenerSlot {
    predicate: EventPredicate,
    inbox: mpsc::Sender<ResourceEvent>,
}

impl ListenerSlot {
    fn offer(&self, bus: &str, event: &ResourceEvent) {
        if !(self.predicate)(event) {
            return;
        }
        match self.inbox.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(bus = bus, event = event.name(), "Listener inbox full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[derive(Clone)]
enum Subscriber {
    Handler(Arc<dyn EventHandler>),
    Listener(Arc<ListenerSlot>),
}

struct BusInner {
    name: &'static str,
    queue_len: usize,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
}

impl BusInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }
}

/// Event bus for publishing and subscribing to resource events
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose listeners buffer up to `queue_len` unread events
    pub fn new(name: &'static str, queue_len: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name,
                queue_len: queue_len.max(1),
                next_id: AtomicU64::new(1),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register an async observer
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = self.next_id();
        self.inner
            .subscribers
            .write()
            .push((id, Subscriber::Handler(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.remove(id)
    }

    /// Register a filtered inbox. Every matching event published after this
    /// returns will be delivered to the listener.
    pub fn listen<F>(&self, predicate: F) -> EventListener
    where
        F: Fn(&ResourceEvent) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(self.inner.queue_len);
        let id = self.next_id();
        let slot = Arc::new(ListenerSlot {
            predicate: Box::new(predicate),
            inbox: tx,
        });
        self.inner
            .subscribers
            .write()
            .push((id, Subscriber::Listener(slot)));
        debug!(bus = self.inner.name, subscription = id.0, "Listener registered");
        EventListener {
            id,
            bus: Arc::downgrade(&self.inner),
            inbox: rx,
            closed: false,
        }
    }

    /// Deliver `event` to every subscriber in registration order.
    ///
    /// The subscriber list is copied before delivery, so handlers may
    /// publish, subscribe or close listeners without deadlocking.
    pub async fn publish(&self, event: ResourceEvent) {
        let subscribers: Vec<Subscriber> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();

        debug!(
            bus = self.inner.name,
            event = event.name(),
            subscribers = subscribers.len(),
            "Publishing event"
        );
        metrics::counter!("redfish_events_published_total", "bus" => self.inner.name).increment(1);

        for subscriber in subscribers {
            match subscriber {
                Subscriber::Handler(handler) => handler.handle(&event).await,
                Subscriber::Listener(slot) => slot.offer(self.inner.name, &event),
            }
        }
    }

    pub async fn publish_all(&self, events: Vec<ResourceEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Get the number of registered handlers and listeners
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

/// Handle on a registered listener. Dropping it deregisters the listener.
pub struct EventListener {
    id: SubscriptionId,
    bus: Weak<BusInner>,
    inbox: mpsc::Receiver<ResourceEvent>,
    closed: bool,
}

impl EventListener {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Block until a matching event arrives, the context is cancelled or its
    /// deadline passes.
    pub async fn wait(&mut self, ctx: &CallContext) -> Result<ResourceEvent, WaitError> {
        if ctx.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        tokio::select! {
            biased;
            event = self.inbox.recv() => event.ok_or(WaitError::Closed),
            _ = ctx.cancelled() => Err(WaitError::Cancelled),
            _ = tokio::time::sleep_until(ctx.deadline()) => Err(WaitError::TimedOut),
        }
    }

    /// Next matching event with no deadline; `None` once closed.
    pub async fn recv(&mut self) -> Option<ResourceEvent> {
        self.inbox.recv().await
    }

    /// Non-blocking read of the inbox.
    pub fn try_recv(&mut self) -> Option<ResourceEvent> {
        self.inbox.try_recv().ok()
    }

    /// Deregister from the bus. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
        self.inbox.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A listener is also a stream of its matching events, ending once closed.
impl Stream for EventListener {
    type Item = ResourceEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbox.poll_recv(cx)
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Errors that can occur while waiting for an event
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("Listener closed before a matching event arrived")]
    Closed,

    #[error("Wait cancelled")]
    Cancelled,

    #[error("Timed out waiting for event")]
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregate::AggregateId;
    use crate::domain::events::CommandId;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn processed(command_id: CommandId) -> ResourceEvent {
        ResourceEvent::HttpCommandProcessed {
            command_id,
            status: 200,
            results: json!({}),
            headers: BTreeMap::new(),
            processed_at: Utc::now(),
        }
    }

    fn created(uri: &str) -> ResourceEvent {
        ResourceEvent::ResourceCreated {
            id: AggregateId::new(),
            resource_uri: uri.to_string(),
            collection: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_listen_before_act_sees_event_published_before_wait() {
        let bus = EventBus::new("test", 8);
        let target = CommandId::new();
        let mut listener = bus.listen(move |e| e.command_id() == Some(target));

        bus.publish(processed(CommandId::new())).await;
        bus.publish(processed(target)).await;

        let ctx = CallContext::with_timeout(Duration::from_millis(100));
        let event = listener.wait(&ctx).await.unwrap();
        assert_eq!(event.command_id(), Some(target));
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let bus = EventBus::new("test", 8);
        let mut listener = bus.listen(|_| true);
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        assert_eq!(listener.wait(&ctx).await.unwrap_err(), WaitError::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_returns_on_cancel() {
        let bus = EventBus::new("test", 8);
        let mut listener = bus.listen(|_| true);
        let ctx = CallContext::with_timeout(Duration::from_secs(30));
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        assert_eq!(listener.wait(&ctx).await.unwrap_err(), WaitError::Cancelled);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_deregisters() {
        let bus = EventBus::new("test", 8);
        let mut listener = bus.listen(|_| true);
        assert_eq!(bus.subscriber_count(), 1);

        listener.close();
        listener.close();
        assert!(listener.is_closed());
        assert_eq!(bus.subscriber_count(), 0);

        let other = bus.listen(|_| true);
        assert_eq!(bus.subscriber_count(), 1);
        drop(other);
        assert_eq!(bus.subscriber_count(), 0);
    }

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &ResourceEvent) {
            self.log
                .lock()
                .await
                .push(format!("{}:{}", self.tag, event.resource_uri().unwrap_or("")));
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order_before_publish_returns() {
        let bus = EventBus::new("test", 8);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(Recorder { tag: "first", log: log.clone() }));
        bus.subscribe(Arc::new(Recorder { tag: "second", log: log.clone() }));

        bus.publish(created("/a")).await;
        bus.publish(created("/b")).await;

        assert_eq!(
            *log.lock().await,
            vec!["first:/a", "second:/a", "first:/b", "second:/b"]
        );
    }

    #[tokio::test]
    async fn test_full_inbox_drops_instead_of_blocking() {
        let bus = EventBus::new("test", 2);
        let mut listener = bus.listen(|_| true);
        for i in 0..5 {
            bus.publish(created(&format!("/r/{i}"))).await;
        }
        assert!(listener.try_recv().is_some());
        assert!(listener.try_recv().is_some());
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_no_missed_wakeups_under_concurrency() {
        let bus = EventBus::new("test", 4);
        let mut tasks = Vec::new();
        for _ in 0..100 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                let id = CommandId::new();
                let mut listener = bus.listen(move |e| e.command_id() == Some(id));
                let publisher = bus.clone();
                tokio::spawn(async move { publisher.publish(processed(id)).await });
                let ctx = CallContext::with_timeout(Duration::from_secs(5));
                listener.wait(&ctx).await.map(|e| e.command_id() == Some(id))
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(true));
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_listener_as_stream() {
        use tokio_stream::StreamExt;

        let bus = EventBus::new("test", 8);
        let listener = bus.listen(|e| e.resource_uri() == Some("/a"));
        bus.publish(created("/b")).await;
        bus.publish(created("/a")).await;

        let mut names = listener.map(|e| e.resource_uri().map(str::to_string));
        assert_eq!(names.next().await, Some(Some("/a".to_string())));
    }
}
