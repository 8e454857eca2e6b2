use crate::registry::{Listener, SubscriberRegistry, Subscription};
use crate::transport::{EventSourceTransport, Transport};
use events::{EventKind, Frame, Topic};
use futures_util::StreamExt;
use log::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Base URL of the hub, e.g. `http://localhost:4000`.
    pub base_url: String,
    /// Delay before the first reconnect attempt; doubles on every further one.
    pub base_delay: Duration,
    /// Reconnect attempts after which the consumer gives up.
    pub max_reconnect_attempts: u32,
}

impl ConsumerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            base_delay: DEFAULT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Reconnect attempts are exhausted. Only an explicit `connect()` leaves
    /// this state.
    GaveUp,
}

/// Diagnostics snapshot for "Live"/offline badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub reconnect_attempts: u32,
}

/// Delay before reconnect attempt `attempt` (1-based): `base * 2^(attempt-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    match 1u32.checked_shl(attempt.saturating_sub(1)) {
        Some(factor) => base.saturating_mul(factor),
        None => Duration::MAX,
    }
}

struct Lifecycle {
    /// Bumped by every `connect` and `disconnect`. A lifecycle task whose
    /// generation is stale must not touch the state any more.
    generation: u64,
    state: ConnectionState,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    client_id: Option<String>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    config: ConsumerConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriberRegistry>,
    lifecycle: Mutex<Lifecycle>,
    status_tx: watch::Sender<ConnectionStatus>,
    has_subscribed: AtomicBool,
}

/// The one shared event-stream connection of a client process.
///
/// Construct it once at startup and hand clones to whatever needs live
/// updates; clones share the connection and the subscriber registry.
/// `connect` and the reconnect timer spawn onto the current Tokio runtime;
/// without one, `connect` logs an error and stays disconnected.
///
/// Event types this crate does not know are still dispatched, as
/// `EventKind::Other(tag)`. Listeners that only care about known kinds
/// should ignore them.
#[derive(Clone)]
pub struct StreamConsumer {
    inner: Arc<Inner>,
}

impl StreamConsumer {
    pub fn new(config: ConsumerConfig) -> Self {
        let transport = Arc::new(EventSourceTransport::new(&config.base_url));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ConsumerConfig, transport: Arc<dyn Transport>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        let lifecycle = Lifecycle {
            generation: 0,
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            reconnect_delay: config.base_delay,
            client_id: None,
            task: None,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                registry: Arc::new(SubscriberRegistry::new()),
                lifecycle: Mutex::new(lifecycle),
                status_tx,
                has_subscribed: AtomicBool::new(false),
            }),
        }
    }

    /// Start the connection lifecycle. A no-op while a connection is open,
    /// being opened, or waiting to be retried.
    pub fn connect(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        match lifecycle.state {
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => return,
            ConnectionState::Disconnected | ConnectionState::GaveUp => {}
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Cannot open event stream outside a Tokio runtime: {e}");
                // Let the next subscription try again
                self.inner.has_subscribed.store(false, Ordering::Release);
                return;
            }
        };

        lifecycle.generation += 1;
        lifecycle.state = ConnectionState::Connecting;
        lifecycle.reconnect_attempts = 0;
        lifecycle.reconnect_delay = self.inner.config.base_delay;
        lifecycle.task = Some(runtime.spawn(run(
            Arc::downgrade(&self.inner),
            lifecycle.generation,
        )));
        self.inner.publish_status(&lifecycle);
    }

    /// Tear everything down: cancel the lifecycle task (and any pending
    /// reconnect timer), release the transport, forget every subscription.
    pub fn disconnect(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if let Some(task) = lifecycle.task.take() {
            task.abort();
        }
        lifecycle.generation += 1;
        lifecycle.state = ConnectionState::Disconnected;
        lifecycle.reconnect_attempts = 0;
        lifecycle.reconnect_delay = self.inner.config.base_delay;
        lifecycle.client_id = None;
        self.inner.registry.clear();
        self.inner.has_subscribed.store(false, Ordering::Release);
        self.inner.publish_status(&lifecycle);
        info!("Event stream consumer disconnected");
    }

    /// Subscribe a listener to one topic. The first subscription opens the
    /// shared connection.
    pub fn subscribe(&self, topic: Topic, listener: &Listener) -> Subscription {
        if !self.inner.registry.insert(topic.clone(), listener) {
            debug!("Listener {:?} already subscribed to {}", listener.id(), topic);
        }
        let subscription =
            Subscription::new(self.inner.registry.clone(), topic, listener.id());

        if !self.inner.has_subscribed.swap(true, Ordering::AcqRel) {
            self.connect();
        }

        subscription
    }

    /// Subscribe a listener to every event regardless of topic.
    pub fn subscribe_all(&self, listener: &Listener) -> Subscription {
        self.subscribe(Topic::All, listener)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    /// Receiver that observes every status change.
    pub fn status_updates(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().state
    }

    /// Id the hub assigned in its handshake, while connected.
    pub fn client_id(&self) -> Option<String> {
        self.inner.lifecycle.lock().client_id.clone()
    }

    /// Delay that was (or will be) waited before the latest reconnect attempt.
    pub fn reconnect_delay(&self) -> Duration {
        self.inner.lifecycle.lock().reconnect_delay
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.inner.registry
    }
}

impl Inner {
    fn publish_status(&self, lifecycle: &Lifecycle) {
        self.status_tx.send_replace(ConnectionStatus {
            is_connected: lifecycle.state == ConnectionState::Connected,
            reconnect_attempts: lifecycle.reconnect_attempts,
        });
    }

    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            return false;
        }
        lifecycle.state = state;
        self.publish_status(&lifecycle);
        true
    }

    fn on_open(&self, generation: u64) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            return false;
        }
        lifecycle.state = ConnectionState::Connected;
        lifecycle.reconnect_attempts = 0;
        lifecycle.reconnect_delay = self.config.base_delay;
        self.publish_status(&lifecycle);
        info!("Event stream connected");
        true
    }

    /// Called once the transport is closed. Returns the delay before the
    /// next attempt, or `None` after giving up or being superseded.
    fn schedule_reconnect(&self, generation: u64) -> Option<Duration> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            return None;
        }
        lifecycle.client_id = None;

        if lifecycle.reconnect_attempts < self.config.max_reconnect_attempts {
            lifecycle.reconnect_attempts += 1;
            let delay = backoff_delay(self.config.base_delay, lifecycle.reconnect_attempts);
            lifecycle.reconnect_delay = delay;
            lifecycle.state = ConnectionState::Reconnecting;
            self.publish_status(&lifecycle);
            info!(
                "Reconnecting event stream in {:?} (attempt {}/{})",
                delay, lifecycle.reconnect_attempts, self.config.max_reconnect_attempts
            );
            Some(delay)
        } else {
            lifecycle.state = ConnectionState::GaveUp;
            self.publish_status(&lifecycle);
            error!(
                "Event stream unavailable after {} reconnect attempts; live updates are off",
                lifecycle.reconnect_attempts
            );
            None
        }
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        match Frame::decode(text) {
            Ok(Frame::Connected { client_id, .. }) => {
                debug!("Event stream handshake, client id {client_id}");
                let mut lifecycle = self.lifecycle.lock();
                if lifecycle.generation == generation {
                    lifecycle.client_id = Some(client_id);
                }
            }
            Ok(Frame::Update(event)) => {
                // Frames still buffered on a connection that was torn down
                if self.lifecycle.lock().generation != generation {
                    trace!("Dropping {} from a superseded connection", event.kind);
                    return;
                }
                if let EventKind::Other(tag) = &event.kind {
                    debug!("Unrecognized event type {tag} for {}", event.topic);
                }
                let delivered = self.registry.dispatch(&event);
                trace!("Dispatched {} to {delivered} listener(s)", event.kind);
            }
            Err(e) => warn!("Dropping malformed event frame: {e}"),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.lifecycle.get_mut().task.take() {
            task.abort();
        }
    }
}

// The lifecycle task. Holds only a weak handle so dropping the last
// `StreamConsumer` ends it.
async fn run(consumer: Weak<Inner>, generation: u64) {
    loop {
        let Some(inner) = consumer.upgrade() else {
            return;
        };
        if !inner.set_state(generation, ConnectionState::Connecting) {
            return;
        }
        let transport = inner.transport.clone();
        drop(inner);

        match transport.open().await {
            Ok(mut frames) => {
                match consumer.upgrade() {
                    Some(inner) if inner.on_open(generation) => {}
                    _ => return,
                }

                while let Some(item) = frames.next().await {
                    let Some(inner) = consumer.upgrade() else {
                        return;
                    };
                    match item {
                        Ok(text) => inner.handle_frame(generation, &text),
                        Err(e) => {
                            warn!("{e}");
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!("Failed to open event stream: {e}"),
        }

        let Some(inner) = consumer.upgrade() else {
            return;
        };
        let Some(delay) = inner.schedule_reconnect(generation) else {
            return;
        };
        drop(inner);

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::FrameStream;
    use async_trait::async_trait;
    use events::Event;
    use futures_util::stream;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    enum Attempt {
        Fail,
        /// Opens, then relays whatever the test pushes until the sender drops.
        Live(mpsc::UnboundedReceiver<Result<String, Error>>),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Attempt>>,
        opened_at: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn with(attempts: Vec<Attempt>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(attempts.into()),
                opened_at: Mutex::new(Vec::new()),
            })
        }

        fn opens(&self) -> Vec<Instant> {
            self.opened_at.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&self) -> Result<FrameStream, Error> {
            self.opened_at.lock().push(Instant::now());
            // Unscripted attempts fail
            let attempt = self.script.lock().pop_front().unwrap_or(Attempt::Fail);
            match attempt {
                Attempt::Fail => Err(Error::Transport("connection refused".to_string())),
                Attempt::Live(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed()),
            }
        }
    }

    fn live() -> (Attempt, mpsc::UnboundedSender<Result<String, Error>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Attempt::Live(rx), tx)
    }

    fn scripted_consumer(transport: Arc<ScriptedTransport>) -> StreamConsumer {
        StreamConsumer::with_transport(ConsumerConfig::new("http://hub.test"), transport)
    }

    fn frame(event: Event) -> Result<String, Error> {
        Ok(Frame::Update(event).encode().unwrap())
    }

    async fn wait_for_state(consumer: &StreamConsumer, state: ConnectionState) {
        // Paused clock: this covers a few minutes of virtual time
        for _ in 0..20_000 {
            if consumer.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {state:?}, stuck in {:?}", consumer.state());
    }

    // Never earlier than the backoff delay, and not meaningfully later.
    fn assert_gap(gap: Duration, millis: u64) {
        let expected = Duration::from_millis(millis);
        assert!(gap >= expected, "retried after {gap:?}, expected {expected:?}");
        assert!(gap < expected + Duration::from_millis(50));
    }

    fn channel_listener() -> (Listener, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Listener::new(move |event| {
            let _ = tx.send(event.clone());
        });
        (listener, rx)
    }

    #[test]
    fn backoff_doubles_from_the_base_delay() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(base, 5), Duration::from_millis(16000));
        assert_eq!(backoff_delay(base, 64), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_exponential_backoff_then_gives_up() {
        let transport = ScriptedTransport::with(vec![]);
        let consumer = scripted_consumer(transport.clone());

        consumer.connect();
        wait_for_state(&consumer, ConnectionState::GaveUp).await;

        let opens = transport.opens();
        // The initial attempt plus one per reconnect
        assert_eq!(opens.len(), 1 + DEFAULT_MAX_RECONNECT_ATTEMPTS as usize);

        let expected = [1000, 2000, 4000, 8000, 16000];
        for (gap, millis) in opens.windows(2).map(|w| w[1] - w[0]).zip(expected) {
            assert_gap(gap, millis);
        }

        assert_eq!(
            consumer.status(),
            ConnectionStatus {
                is_connected: false,
                reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            }
        );

        // Terminal: nothing else is attempted on its own
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.opens().len(), opens.len());
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_schedule_one_two_and_four_seconds() {
        let (attempt, _tx) = live();
        let transport =
            ScriptedTransport::with(vec![Attempt::Fail, Attempt::Fail, Attempt::Fail, attempt]);
        let consumer = scripted_consumer(transport.clone());

        consumer.connect();
        wait_for_state(&consumer, ConnectionState::Connected).await;

        let opens = transport.opens();
        assert_eq!(opens.len(), 4);
        assert_gap(opens[1] - opens[0], 1000);
        assert_gap(opens[2] - opens[1], 2000);
        assert_gap(opens[3] - opens[2], 4000);

        // A successful open resets the counters
        assert_eq!(
            consumer.status(),
            ConnectionStatus {
                is_connected: true,
                reconnect_attempts: 0,
            }
        );
        assert_eq!(consumer.reconnect_delay(), DEFAULT_BASE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_stream_starts_backoff_from_the_base_delay() {
        let (first, first_tx) = live();
        let (second, _second_tx) = live();
        let transport = ScriptedTransport::with(vec![first, second]);
        let consumer = scripted_consumer(transport.clone());

        consumer.connect();
        wait_for_state(&consumer, ConnectionState::Connected).await;

        drop(first_tx);
        wait_for_state(&consumer, ConnectionState::Reconnecting).await;
        assert_eq!(consumer.status().reconnect_attempts, 1);
        assert!(!consumer.status().is_connected);

        wait_for_state(&consumer, ConnectionState::Connected).await;
        let opens = transport.opens();
        assert_eq!(opens.len(), 2);
        assert!(opens[1] - opens[0] >= DEFAULT_BASE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn mid_stream_error_triggers_reconnect() {
        let (first, first_tx) = live();
        let (second, _second_tx) = live();
        let transport = ScriptedTransport::with(vec![first, second]);
        let consumer = scripted_consumer(transport.clone());

        consumer.connect();
        wait_for_state(&consumer, ConnectionState::Connected).await;

        first_tx
            .send(Err(Error::Transport("reset by peer".to_string())))
            .unwrap();
        wait_for_state(&consumer, ConnectionState::Reconnecting).await;
        wait_for_state(&consumer, ConnectionState::Connected).await;

        assert_eq!(transport.opens().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn redundant_connect_calls_open_one_transport() {
        let (attempt, _tx) = live();
        let transport = ScriptedTransport::with(vec![attempt]);
        let consumer = scripted_consumer(transport.clone());

        consumer.connect();
        consumer.connect();
        wait_for_state(&consumer, ConnectionState::Connected).await;
        consumer.connect();
        consumer.clone().connect();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.opens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn many_subscriptions_share_one_connection() {
        let (attempt, tx) = live();
        let transport = ScriptedTransport::with(vec![attempt]);
        let consumer = scripted_consumer(transport.clone());

        let (school_listener, mut school_rx) = channel_listener();
        let (all_listener, mut all_rx) = channel_listener();
        let _school = consumer.subscribe(Topic::entity("school-1"), &school_listener);
        let _all = consumer.subscribe_all(&all_listener);
        wait_for_state(&consumer, ConnectionState::Connected).await;

        tx.send(Ok(Frame::connected("client-7").encode().unwrap()))
            .unwrap();
        let sent = Event::new(Topic::entity("school-1"), "photo_added", json!({"id": "p1"}));
        tx.send(frame(sent.clone())).unwrap();

        assert_eq!(school_rx.recv().await.unwrap(), sent);
        assert_eq!(all_rx.recv().await.unwrap(), sent);
        // The handshake is bookkeeping only
        assert!(all_rx.try_recv().is_err());
        assert_eq!(consumer.client_id().as_deref(), Some("client-7"));
        assert_eq!(transport.opens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_dropped_and_the_stream_stays_open() {
        let (attempt, tx) = live();
        let transport = ScriptedTransport::with(vec![attempt]);
        let consumer = scripted_consumer(transport.clone());
        let (listener, mut rx) = channel_listener();
        let _subscription = consumer.subscribe_all(&listener);
        wait_for_state(&consumer, ConnectionState::Connected).await;

        tx.send(Ok("data: {not json\n\n".to_string())).unwrap();
        let sent = Event::new(Topic::entity("school-2"), "photo_deleted", json!({"id": "p9"}));
        tx.send(frame(sent.clone())).unwrap();

        assert_eq!(rx.recv().await.unwrap(), sent);
        assert_eq!(consumer.state(), ConnectionState::Connected);
        assert_eq!(transport.opens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_event_types_are_dispatched_as_other() {
        let (attempt, tx) = live();
        let consumer = scripted_consumer(ScriptedTransport::with(vec![attempt]));
        let (listener, mut rx) = channel_listener();
        let _subscription = consumer.subscribe(Topic::entity("school-3"), &listener);
        wait_for_state(&consumer, ConnectionState::Connected).await;

        tx.send(Ok(
            r#"{"type":"inspection_scheduled","schoolId":"school-3","data":{}}"#.to_string(),
        ))
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received.kind,
            EventKind::Other("inspection_scheduled".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_the_pending_reconnect() {
        let transport = ScriptedTransport::with(vec![]);
        let consumer = scripted_consumer(transport.clone());
        let (listener, _rx) = channel_listener();
        let subscription = consumer.subscribe(Topic::entity("school-1"), &listener);

        wait_for_state(&consumer, ConnectionState::Reconnecting).await;
        consumer.disconnect();

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.opens().len(), 1);
        assert_eq!(consumer.state(), ConnectionState::Disconnected);
        assert_eq!(consumer.status(), ConnectionStatus::default());
        assert!(consumer.registry().is_empty());
        // Unsubscribing after teardown is harmless
        subscription.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn connect_after_giving_up_starts_a_fresh_cycle() {
        let mut attempts: Vec<Attempt> = (0..=DEFAULT_MAX_RECONNECT_ATTEMPTS)
            .map(|_| Attempt::Fail)
            .collect();
        let (attempt, _tx) = live();
        attempts.push(attempt);
        let transport = ScriptedTransport::with(attempts);
        let consumer = scripted_consumer(transport.clone());

        consumer.connect();
        wait_for_state(&consumer, ConnectionState::GaveUp).await;

        consumer.connect();
        wait_for_state(&consumer, ConnectionState::Connected).await;
        assert_eq!(consumer.status().reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_updates_follow_the_lifecycle() {
        let (attempt, _tx) = live();
        let consumer = scripted_consumer(ScriptedTransport::with(vec![Attempt::Fail, attempt]));
        let mut updates = consumer.status_updates();

        consumer.connect();

        let status = *updates
            .wait_for(|status| status.reconnect_attempts == 1)
            .await
            .unwrap();
        assert!(!status.is_connected);

        let status = *updates.wait_for(|status| status.is_connected).await.unwrap();
        assert_eq!(status.reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_last_handle_stops_the_lifecycle() {
        let transport = ScriptedTransport::with(vec![]);
        let consumer = scripted_consumer(transport.clone());

        consumer.connect();
        wait_for_state(&consumer, ConnectionState::Reconnecting).await;
        drop(consumer);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.opens().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_buffered_on_a_torn_down_connection_are_not_dispatched() {
        let (first, first_tx) = live();
        let (second, second_tx) = live();
        let transport = ScriptedTransport::with(vec![first, second]);
        let consumer = scripted_consumer(transport.clone());
        let topic = Topic::entity("school-1");

        // Both frames sit in the buffer before the stream is read
        first_tx
            .send(frame(Event::new(topic.clone(), "photo_added", json!({"id": "p1"}))))
            .unwrap();
        first_tx
            .send(frame(Event::new(topic.clone(), "photo_deleted", json!({"id": "old"}))))
            .unwrap();

        let (fresh, mut fresh_rx) = channel_listener();
        let restarted = Arc::new(AtomicBool::new(false));
        let restarting = {
            let consumer = consumer.clone();
            let topic = topic.clone();
            let restarted = restarted.clone();
            let fresh = fresh.clone();
            Listener::new(move |_| {
                if !restarted.swap(true, Ordering::SeqCst) {
                    consumer.disconnect();
                    consumer.subscribe(topic.clone(), &fresh);
                }
            })
        };
        consumer.subscribe(topic.clone(), &restarting);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(restarted.load(Ordering::SeqCst));
        assert_eq!(transport.opens().len(), 2);
        assert_eq!(consumer.state(), ConnectionState::Connected);
        assert!(fresh_rx.try_recv().is_err());

        let sent = Event::new(topic, "photo_added", json!({"id": "p2"}));
        second_tx.send(frame(sent.clone())).unwrap();
        assert_eq!(fresh_rx.recv().await.unwrap(), sent);
    }

    #[test]
    fn subscribing_outside_a_runtime_stays_disconnected() {
        let consumer = scripted_consumer(ScriptedTransport::with(vec![]));
        let (listener, _rx) = channel_listener();

        let subscription = consumer.subscribe(Topic::entity("school-1"), &listener);

        assert_eq!(consumer.state(), ConnectionState::Disconnected);
        assert!(!consumer.status().is_connected);
        assert!(subscription.is_active());
        assert_eq!(consumer.registry().listener_count(&Topic::entity("school-1")), 1);

        // A later subscription inside a runtime still opens the stream
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            let (other, _other_rx) = channel_listener();
            consumer.subscribe_all(&other);
            wait_for_state(&consumer, ConnectionState::Reconnecting).await;
        });
    }
}
