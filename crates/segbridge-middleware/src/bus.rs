//! Headless, named-topic publish/subscribe event bus.
//!
//! Every subscription owns a bounded queue.  When a publisher outruns a
//! subscriber the queue's [`QueuePolicy`] decides which event is lost, which
//! mirrors the per-subscriber `queue_size` of a ROS topic.  The default is a
//! single-slot queue where the newest message wins.
//!
//! # Example
//!
//! ```rust
//! use segbridge_middleware::bus::{EventBus, QueuePolicy};
//! use segbridge_types::{Event, EventPayload, TrackedHumans};
//!
//! # tokio_test_block(async {
//! let bus = EventBus::default();
//! let mut rx = bus.subscribe_to("/in_humans", QueuePolicy::default());
//!
//! let event = Event::new("doc", EventPayload::TrackedHumans(TrackedHumans::default()));
//! assert_eq!(bus.publish_to("/in_humans", event).unwrap(), 1);
//! assert!(rx.recv().await.is_some());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use segbridge_types::{BridgeError, Event};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

/// Default number of events a subscription buffers.
pub const DEFAULT_QUEUE_DEPTH: usize = 1;

/// Which event is discarded when a full queue receives another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eviction {
    /// Discard the oldest queued event; the newest always gets in.
    #[default]
    DropOldest,
    /// Keep what is queued and discard the incoming event.
    DropNewest,
}

/// Bounded-queue behaviour for a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub depth: usize,
    pub eviction: Eviction,
}

impl QueuePolicy {
    pub fn new(depth: usize, eviction: Eviction) -> Self {
        Self { depth, eviction }
    }

    /// Effective capacity; a depth of zero still holds one event.
    fn capacity(&self) -> usize {
        self.depth.max(1)
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH, Eviction::default())
    }
}

/// Resolve `topic` in the private namespace of `node_name`.
///
/// Absolute names (leading `/`) are returned unchanged; relative names and
/// `~/`-prefixed names land under `/<node_name>/`.
pub fn resolve_private_topic(node_name: &str, topic: &str) -> String {
    if topic.starts_with('/') {
        return topic.to_string();
    }
    let relative = topic.trim_start_matches("~/").trim_start_matches('~');
    format!("/{}/{}", node_name.trim_matches('/'), relative)
}

// ---------------------------------------------------------------------------
// Subscriber queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    events: VecDeque<Event>,
    dropped: u64,
    closed: bool,
}

struct SubscriberQueue {
    topic: String,
    policy: QueuePolicy,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SubscriberQueue {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `event`, applying the eviction policy.  Returns `false` when
    /// the incoming event itself was discarded.
    fn push(&self, event: Event) -> bool {
        let accepted = {
            let mut state = self.state();
            if state.closed {
                return false;
            }
            if state.events.len() < self.policy.capacity() {
                state.events.push_back(event);
                true
            } else {
                state.dropped += 1;
                match self.policy.eviction {
                    Eviction::DropOldest => {
                        state.events.pop_front();
                        state.events.push_back(event);
                        debug!(topic = %self.topic, dropped = state.dropped, "queue full; dropped oldest event");
                        true
                    }
                    Eviction::DropNewest => {
                        debug!(topic = %self.topic, dropped = state.dropped, "queue full; dropped incoming event");
                        false
                    }
                }
            }
        };
        if accepted {
            self.notify.notify_one();
        }
        accepted
    }

    fn close(&self) {
        self.state().closed = true;
        self.notify.notify_one();
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BusInner {
    topics: HashMap<String, Vec<Weak<SubscriberQueue>>>,
    closed: bool,
}

/// Shared event bus. Clone it cheaply – all clones share the same topic
/// table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("EventBus")
            .field("topics", &inner.topics.keys().collect::<Vec<_>>())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `event` to every live subscription on `topic`.
    ///
    /// Returns the number of subscriptions that accepted the event.
    /// Returns `Ok(0)` when nobody listens on the topic (this is a normal
    /// condition, not an error) and [`BridgeError::Channel`] once the bus
    /// has been closed.
    pub fn publish_to(&self, topic: &str, event: Event) -> Result<usize, BridgeError> {
        // Snapshot live queues, then push outside the table lock.
        let queues: Vec<Arc<SubscriberQueue>> = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(BridgeError::Channel(format!("bus closed; cannot publish to {topic}")));
            }
            let Some(subs) = inner.topics.get_mut(topic) else {
                return Ok(0);
            };
            subs.retain(|weak| weak.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };

        Ok(queues
            .iter()
            .filter(|queue| queue.push(event.clone()))
            .count())
    }

    /// Subscribe to `topic` with a private queue governed by `policy`.
    ///
    /// Subscribing to a closed bus yields a receiver that is already closed.
    pub fn subscribe_to(&self, topic: &str, policy: QueuePolicy) -> TopicReceiver {
        let queue = Arc::new(SubscriberQueue {
            topic: topic.to_string(),
            policy,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        });
        let mut inner = self.lock();
        if inner.closed {
            queue.close();
        } else {
            inner
                .topics
                .entry(topic.to_string())
                .or_default()
                .push(Arc::downgrade(&queue));
        }
        TopicReceiver { queue }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |subs| subs.iter().filter(|w| w.strong_count() > 0).count())
    }

    /// Close the bus.  Pending events stay readable; afterwards every
    /// receiver yields `None` and publishing fails.
    pub fn close(&self) {
        let queues: Vec<Arc<SubscriberQueue>> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner
                .topics
                .drain()
                .flat_map(|(_, subs)| subs)
                .filter_map(|weak| weak.upgrade())
                .collect()
        };
        for queue in queues {
            queue.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Topic receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single topic subscription.
///
/// Obtained via [`EventBus::subscribe_to`].  Dropping it unsubscribes.
pub struct TopicReceiver {
    queue: Arc<SubscriberQueue>,
}

impl TopicReceiver {
    /// Wait for the next queued event.
    ///
    /// Returns `None` once the bus is closed and the queue has drained.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            {
                let mut state = self.queue.state();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit, so a push between the check above
            // and this await is not lost.
            self.queue.notify.notified().await;
        }
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.queue.state().events.pop_front()
    }

    /// Events this subscription lost to its eviction policy so far.
    pub fn dropped(&self) -> u64 {
        self.queue.state().dropped
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.queue.topic
    }

    pub fn policy(&self) -> QueuePolicy {
        self.queue.policy
    }
}
