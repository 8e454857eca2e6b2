use dashmap::DashMap;
use events::{Event, Topic};
use log::*;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a listener. Clones of a `Listener` share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = dyn Fn(&Event) + Send + Sync;

/// A callback with a stable identity.
///
/// Subscribing the same `Listener` (or a clone of it) to the same topic twice
/// registers it once, so it is invoked once per event.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    callback: Arc<Callback>,
}

impl Listener {
    pub fn new(callback: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self {
            id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Maps topics to the set of listeners interested in them. `Topic::All` is
/// the wildcard set that sees every event.
pub struct SubscriberRegistry {
    topics: DashMap<Topic, HashMap<ListenerId, Listener>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Add a listener to a topic's set, creating the set if needed. Returns
    /// false when that listener was already subscribed to the topic.
    pub fn insert(&self, topic: Topic, listener: &Listener) -> bool {
        self.topics
            .entry(topic)
            .or_default()
            .insert(listener.id, listener.clone())
            .is_none()
    }

    /// Remove a listener from a topic. Absent listeners are a no-op.
    /// A set left empty is dropped entirely.
    pub fn remove(&self, topic: &Topic, listener_id: ListenerId) -> bool {
        let Some(mut entry) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = entry.remove(&listener_id).is_some();

        if entry.is_empty() {
            drop(entry); // Release lock before removal
            self.topics.remove_if(topic, |_, set| set.is_empty());
        }

        removed
    }

    /// Invoke every listener of the event's topic, then every wildcard
    /// listener. Returns how many listeners ran.
    ///
    /// A panicking listener is logged and skipped; the rest still run. An
    /// event without a specific topic only reaches wildcard listeners.
    pub fn dispatch(&self, event: &Event) -> usize {
        let mut listeners = Vec::new();
        if event.topic != Topic::All {
            listeners.extend(self.snapshot(&event.topic));
        }
        listeners.extend(self.snapshot(&Topic::All));

        for listener in &listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| (listener.callback)(event)));
            if outcome.is_err() {
                error!(
                    "Listener {:?} panicked while handling {} for {}",
                    listener.id, event.kind, event.topic
                );
            }
        }

        listeners.len()
    }

    // Cloned out so no shard lock is held while callbacks run; a callback may
    // subscribe or unsubscribe.
    fn snapshot(&self, topic: &Topic) -> Vec<Listener> {
        self.topics
            .get(topic)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|set| set.len()).unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&self) {
        self.topics.clear();
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by subscribe. `unsubscribe` may be called any number of
/// times; only the first call has an effect. Dropping the handle does not
/// unsubscribe.
pub struct Subscription {
    registry: Arc<SubscriberRegistry>,
    topic: Topic,
    listener_id: ListenerId,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        registry: Arc<SubscriberRegistry>,
        topic: Topic,
        listener_id: ListenerId,
    ) -> Self {
        Self {
            registry,
            topic,
            listener_id,
            active: AtomicBool::new(true),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.registry.remove(&self.topic, self.listener_id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
