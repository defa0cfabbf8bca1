//! In-process typed pub/sub.
//!
//! Publishing never blocks: every subscriber owns a bounded ring, and a
//! full ring drops that subscriber's oldest entry without touching the
//! publisher or any other subscriber. The bus is best-effort and is NOT
//! a durability mechanism — durability lives in the event store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;

use fathom_domain::event::EventEnvelope;

/// Default per-subscriber buffer size.
const DEFAULT_CAPACITY: usize = 256;

/// Everything observable on the bus: durable domain events plus
/// ephemeral agent activity (tool calls, streamed output).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    #[serde(rename = "domain")]
    Domain { event: EventEnvelope },

    #[serde(rename = "tool_call")]
    ToolCall {
        agent: String,
        tool: String,
        args: Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        agent: String,
        tool: String,
        /// First 200 chars of the result.
        preview: String,
        is_error: bool,
    },

    /// Streamed assistant text, observable but never durable.
    #[serde(rename = "agent_delta")]
    AgentDelta { agent: String, text: String },
}

impl BusEvent {
    /// The type string `subscribe` filters on. Domain events use their
    /// event discriminator (`"worker.completed"`), the rest use the
    /// serde tag.
    pub fn kind(&self) -> &str {
        match self {
            BusEvent::Domain { event } => event.event_type(),
            BusEvent::ToolCall { .. } => "tool_call",
            BusEvent::ToolResult { .. } => "tool_result",
            BusEvent::AgentDelta { .. } => "agent_delta",
        }
    }
}

struct Subscriber {
    id: u64,
    /// Empty = all types.
    types: Vec<String>,
    queue: Mutex<VecDeque<BusEvent>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
    dropped: AtomicU64,
}

impl Subscriber {
    fn matches(&self, kind: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == kind)
    }

    fn push(&self, event: BusEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

struct Shared {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle to the bus.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Deliver an event to every matching subscriber. Never blocks.
    pub fn publish(&self, event: BusEvent) {
        let kind = event.kind().to_string();
        let subscribers = self.shared.subscribers.read();
        for subscriber in subscribers.iter() {
            if !subscriber.closed.load(Ordering::Acquire) && subscriber.matches(&kind) {
                subscriber.push(event.clone());
            }
        }
    }

    pub fn publish_domain(&self, event: &EventEnvelope) {
        self.publish(BusEvent::Domain {
            event: event.clone(),
        });
    }

    /// Subscribe to the given event types (empty = all).
    pub fn subscribe(&self, types: &[&str]) -> BusReceiver {
        let subscriber = Arc::new(Subscriber {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            types: types.iter().map(|t| t.to_string()).collect(),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity: self.capacity,
            dropped: AtomicU64::new(0),
        });
        self.shared.subscribers.write().push(subscriber.clone());
        BusReceiver {
            shared: self.shared.clone(),
            subscriber,
        }
    }

    /// Close every subscriber. Pending queued events remain readable.
    pub fn close(&self) {
        let subscribers = self.shared.subscribers.read();
        for subscriber in subscribers.iter() {
            subscriber.closed.store(true, Ordering::Release);
            subscriber.notify.notify_one();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }
}

/// Receive side of one subscription. Dropping it unsubscribes.
pub struct BusReceiver {
    shared: Arc<Shared>,
    subscriber: Arc<Subscriber>,
}

impl BusReceiver {
    /// Next event, or `None` once the subscription is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            {
                let mut queue = self.subscriber.queue.lock();
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
            }
            if self.subscriber.closed.load(Ordering::Acquire) {
                return None;
            }
            // notify_one stores a permit when nobody is waiting, so a
            // publish between the check above and this await is not lost.
            self.subscriber.notify.notified().await;
        }
    }

    /// Non-blocking variant.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.subscriber.queue.lock().pop_front()
    }

    /// Events discarded from this subscriber's ring due to overflow.
    pub fn dropped(&self) -> u64 {
        self.subscriber.dropped.load(Ordering::Relaxed)
    }

    /// Close this subscription only.
    pub fn close(&self) {
        self.subscriber.closed.store(true, Ordering::Release);
        self.subscriber.notify.notify_one();
    }
}

impl Drop for BusReceiver {
    fn drop(&mut self) {
        self.close();
        let mut subscribers = self.shared.subscribers.write();
        subscribers.retain(|s| s.id != self.subscriber.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_domain::event::EventPayload;
    use fathom_domain::research::ResearchMode;

    fn domain_event(version: u64) -> BusEvent {
        BusEvent::Domain {
            event: EventEnvelope::new(
                "agg",
                version,
                EventPayload::ResearchStarted {
                    query: "q".into(),
                    mode: ResearchMode::Fast,
                },
            ),
        }
    }

    fn delta(text: &str) -> BusEvent {
        BusEvent::AgentDelta {
            agent: "a".into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn fanout_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe(&[]);
        let mut rx2 = bus.subscribe(&[]);

        bus.publish(delta("x"));

        assert!(matches!(rx1.recv().await, Some(BusEvent::AgentDelta { .. })));
        assert!(matches!(rx2.recv().await, Some(BusEvent::AgentDelta { .. })));
    }

    #[tokio::test]
    async fn type_filter_applies() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&["research.started"]);

        bus.publish(delta("ignored"));
        bus.publish(domain_event(1));

        match rx.recv().await {
            Some(BusEvent::Domain { event }) => {
                assert_eq!(event.event_type(), "research.started");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_for_that_subscriber_only() {
        let bus = EventBus::with_capacity(2);
        let mut slow = bus.subscribe(&[]);
        let mut fast = bus.subscribe(&[]);

        bus.publish(delta("1"));
        bus.publish(delta("2"));
        // Drain the fast subscriber; the slow one lags.
        assert!(fast.try_recv().is_some());
        assert!(fast.try_recv().is_some());

        bus.publish(delta("3"));

        // Slow subscriber lost "1" but kept "2" and "3".
        assert_eq!(slow.dropped(), 1);
        match slow.try_recv() {
            Some(BusEvent::AgentDelta { text, .. }) => assert_eq!(text, "2"),
            other => panic!("unexpected: {other:?}"),
        }
        // Fast subscriber got "3" without loss.
        assert_eq!(fast.dropped(), 0);
        match fast.try_recv() {
            Some(BusEvent::AgentDelta { text, .. }) => assert_eq!(text, "3"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_ends_recv_after_drain() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&[]);
        bus.publish(delta("last"));
        bus.close();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let bus = EventBus::new();
        let rx = bus.subscribe(&[]);
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn recv_wakes_on_later_publish() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&[]);

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                bus.publish(delta("late"));
            })
        };

        let event = rx.recv().await;
        assert!(event.is_some());
        publisher.await.unwrap();
    }
}
