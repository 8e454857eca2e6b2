use crate::consumer::{ConnectionStatus, StreamConsumer};
use crate::registry::{Listener, Subscription};
use events::{Event, Topic};
use tokio::sync::{mpsc, watch};

/// Observable view of one topic for UI code.
///
/// Subscribes exactly once when created and unsubscribes exactly once when
/// dropped, so a component that owns a `TopicWatch` for its lifetime cannot
/// leak subscriptions across remounts.
pub struct TopicWatch {
    subscription: Subscription,
    latest: watch::Receiver<Option<Event>>,
    status: watch::Receiver<ConnectionStatus>,
}

impl TopicWatch {
    pub fn new(consumer: &StreamConsumer, topic: Topic) -> Self {
        let (tx, latest) = watch::channel(None);
        let listener = Listener::new(move |event| {
            tx.send_replace(Some(event.clone()));
        });

        Self {
            subscription: consumer.subscribe(topic, &listener),
            latest,
            status: consumer.status_updates(),
        }
    }

    /// Watches every event regardless of topic.
    pub fn all(consumer: &StreamConsumer) -> Self {
        Self::new(consumer, Topic::All)
    }

    pub fn topic(&self) -> &Topic {
        self.subscription.topic()
    }

    /// Most recent event for the topic, if any arrived yet.
    pub fn latest(&self) -> Option<Event> {
        self.latest.borrow().clone()
    }

    /// Waits for the next event. Returns `None` once the consumer has been
    /// torn down and no more events can arrive.
    pub async fn changed(&mut self) -> Option<Event> {
        self.latest.changed().await.ok()?;
        self.latest.borrow_and_update().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn status_updates(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

impl Drop for TopicWatch {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

/// Every event for one topic, queued in arrival order.
///
/// Where `TopicWatch` only keeps the newest event, a feed never coalesces:
/// a burst of frames comes out of `recv` one by one. Unsubscribes on drop.
pub struct TopicFeed {
    subscription: Subscription,
    events: mpsc::UnboundedReceiver<Event>,
}

impl TopicFeed {
    pub fn new(consumer: &StreamConsumer, topic: Topic) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let listener = Listener::new(move |event| {
            // Receiver gone means the feed is being dropped
            let _ = tx.send(event.clone());
        });

        Self {
            subscription: consumer.subscribe(topic, &listener),
            events,
        }
    }

    pub fn all(consumer: &StreamConsumer) -> Self {
        Self::new(consumer, Topic::All)
    }

    pub fn topic(&self) -> &Topic {
        self.subscription.topic()
    }

    /// Next queued event. Returns `None` once the consumer has dropped the
    /// subscription and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

impl Drop for TopicFeed {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
