//! Channel facade.
//!
//! Wires platform delivery into the transport binding, the handshake, and
//! the router. All platform callbacks hold a weak reference to the shared
//! state, so dropping the last [`Channel`] handle tears everything down and
//! turns late timers and deliveries into no-ops.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ChannelId, ListenerId};
use crate::platform::{Endpoint, InboundMessage, Platform, TimerHandle};
use crate::protocol::{Envelope, Payload, ReservedEvent, WireCodec};
use crate::transport::TransportBinding;

use super::builder::{ChannelBuilder, FailureCallback};
use super::handshake::{ConnectionState, Handshake, HandshakeStep};
use super::options::ChannelOptions;
use super::router::{EmitOutcome, EventRouter, Handler};

// ============================================================================
// ChannelInner
// ============================================================================

/// Shared state behind every [`Channel`] handle.
struct ChannelInner {
    /// Unique identifier for logging.
    id: ChannelId,
    /// Normalized options.
    options: ChannelOptions,
    /// Host services.
    platform: Platform,
    /// Remote endpoint and raw send path.
    transport: TransportBinding,
    /// Handshake state machine.
    handshake: Mutex<Handshake>,
    /// Handlers and pending emits.
    router: EventRouter,
    /// Published connection state.
    state_tx: watch::Sender<ConnectionState>,
    /// Failure callback.
    on_connection_fail: Option<FailureCallback>,
    /// Bus subscription, removed on drop.
    listener: OnceLock<ListenerId>,
    /// Handshake timeout timer.
    timeout_timer: Mutex<Option<TimerHandle>>,
    /// Pending-emit retry tick.
    retry_timer: Mutex<Option<TimerHandle>>,
}

// ============================================================================
// ChannelInner - Inbound
// ============================================================================

impl ChannelInner {
    /// Current handshake state.
    fn state(&self) -> ConnectionState {
        self.handshake.lock().state()
    }

    /// Handles one message from the bus.
    fn handle_inbound(&self, message: InboundMessage) {
        let Some(received) = self.transport.receive(message) else {
            return;
        };

        if received.newly_bound {
            debug!(
                channel_id = %self.id,
                origin = %received.origin,
                "Remote endpoint discovered"
            );
            self.drain_pending();
        }

        let Some(envelope) = self.router.decode(&received.raw) else {
            return;
        };

        trace!(
            channel_id = %self.id,
            event = envelope.event(),
            origin = %received.origin,
            "Inbound message"
        );

        let step = self.handshake.lock().on_event(envelope.reserved());
        match step {
            HandshakeStep::PassThrough => {
                self.router.dispatch(envelope);
            }
            HandshakeStep::Connected => self.on_connected(),
            HandshakeStep::ConnectedReplyPong => {
                self.on_connected();
                self.send_handshake(ReservedEvent::Pong);
            }
        }
    }

    /// Handles the provisioned frame finishing its load.
    fn on_frame_load(&self, endpoint: Endpoint) {
        let endpoint_id = endpoint.id();
        if self.transport.attach(endpoint) {
            debug!(channel_id = %self.id, endpoint = %endpoint_id, "Frame loaded");
        } else {
            warn!(
                channel_id = %self.id,
                endpoint = %endpoint_id,
                "Remote endpoint already bound, ignoring loaded frame"
            );
        }

        if self.state() == ConnectionState::Unconfirmed {
            self.send_handshake(ReservedEvent::Ping);
        }

        self.drain_pending();
    }

    /// Sends `ping` or `pong` straight through the transport.
    fn send_handshake(&self, event: ReservedEvent) {
        let envelope = Envelope::handshake(event);
        if let Err(err) = self.router.send(&self.transport, &envelope) {
            warn!(channel_id = %self.id, %event, error = %err, "Failed to send handshake");
        }
    }

    fn on_connected(&self) {
        if let Some(timer) = self.timeout_timer.lock().take() {
            timer.cancel();
        }
        self.state_tx.send_replace(ConnectionState::Connected);
        debug!(channel_id = %self.id, "Handshake complete");
    }
}

// ============================================================================
// ChannelInner - Timers
// ============================================================================

impl ChannelInner {
    /// Handles the connection timer firing.
    ///
    /// Returns the timeout error when no failure callback is configured.
    fn on_handshake_timeout(&self) -> Result<()> {
        self.timeout_timer.lock().take();

        if !self.handshake.lock().on_timeout() {
            return Ok(());
        }

        self.state_tx.send_replace(ConnectionState::Failed);
        if let Some(timer) = self.retry_timer.lock().take() {
            timer.cancel();
        }
        let dropped = self.router.drop_pending();

        let err = Error::handshake_timeout(self.options.timeout_ms());
        debug!(channel_id = %self.id, dropped, "Handshake timed out");

        match &self.on_connection_fail {
            Some(callback) => {
                callback(&err);
                Ok(())
            }
            None => Err(err),
        }
    }

    /// Arms the retry tick unless one is already armed.
    fn arm_retry(self: &Arc<Self>) {
        let mut slot = self.retry_timer.lock();
        if slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let handle = self.platform.scheduler().schedule(
            self.options.connection_timeout,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.retry_pending();
                }
                Ok(())
            }),
        );
        *slot = Some(handle);
    }

    /// Retry tick: drain if ready, drop if failed, otherwise wait again.
    fn retry_pending(self: &Arc<Self>) {
        self.retry_timer.lock().take();

        if self.router.pending_len() == 0 {
            return;
        }

        if self.transport.is_ready() {
            self.drain_pending();
        } else if self.state() == ConnectionState::Failed {
            let dropped = self.router.drop_pending();
            trace!(channel_id = %self.id, dropped, "Dropped queued emits after failure");
        } else {
            self.arm_retry();
        }
    }

    /// Sends every queued emit and disarms the retry tick.
    fn drain_pending(&self) {
        if let Some(timer) = self.retry_timer.lock().take() {
            timer.cancel();
        }

        let sent = self.router.drain(&self.transport);
        if sent > 0 {
            debug!(channel_id = %self.id, sent, "Flushed queued emits");
        }
    }
}

// ============================================================================
// ChannelInner - Outbound
// ============================================================================

impl ChannelInner {
    fn emit(self: &Arc<Self>, envelope: Envelope) -> Result<()> {
        let failed = self.state() == ConnectionState::Failed;

        match self.router.emit(&self.transport, envelope, failed)? {
            EmitOutcome::Queued => self.arm_retry(),
            EmitOutcome::Sent | EmitOutcome::Dropped => {}
        }

        Ok(())
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get() {
            self.platform.bus().remove_listener(*listener);
        }

        for slot in [&self.timeout_timer, &self.retry_timer] {
            if let Some(timer) = slot.lock().take() {
                timer.cancel();
            }
        }

        debug!(channel_id = %self.id, "Channel dropped");
    }
}

// ============================================================================
// Channel
// ============================================================================

/// One side of a cross-window event link.
///
/// Cheap to clone; all clones share the same connection. The link is torn
/// down when the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// use crosswindow::{Channel, ChannelOptions};
///
/// let channel = Channel::new(platform, ChannelOptions::active("B.html"))?;
/// channel.on("greet", |payload| println!("{payload:?}"))?;
/// channel.emit_value("greet", &serde_json::json!({ "msg": "hi" }))?;
/// ```
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

// ============================================================================
// Channel - Constructors
// ============================================================================

impl Channel {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::new()
    }

    /// Creates a channel with `options` and no failure callback.
    ///
    /// # Errors
    ///
    /// See [`ChannelBuilder::build`].
    pub fn new(platform: Platform, options: ChannelOptions) -> Result<Self> {
        ChannelBuilder::new().options(options).build(platform)
    }

    /// Creates the channel from validated options.
    ///
    /// Subscribes to the bus, starts the connection timer, and in active
    /// mode provisions the remote frame.
    pub(crate) fn from_parts(
        platform: Platform,
        options: ChannelOptions,
        on_connection_fail: Option<FailureCallback>,
        codec: Arc<dyn WireCodec>,
    ) -> Result<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Unconfirmed);

        let inner = Arc::new(ChannelInner {
            id: ChannelId::generate(),
            transport: TransportBinding::new(options.origin.clone()),
            handshake: Mutex::new(Handshake::new()),
            router: EventRouter::new(codec),
            state_tx,
            on_connection_fail,
            listener: OnceLock::new(),
            timeout_timer: Mutex::new(None),
            retry_timer: Mutex::new(None),
            platform,
            options,
        });

        debug!(
            channel_id = %inner.id,
            origin = %inner.options.origin,
            source = ?inner.options.source,
            timeout_ms = inner.options.timeout_ms(),
            "Creating channel"
        );

        let weak = Arc::downgrade(&inner);
        let listener = inner
            .platform
            .bus()
            .add_listener(Arc::new(move |message: InboundMessage| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_inbound(message);
                }
            }));
        let _ = inner.listener.set(listener);

        let weak = Arc::downgrade(&inner);
        let timer = inner.platform.scheduler().schedule(
            inner.options.connection_timeout,
            Box::new(move || match weak.upgrade() {
                Some(inner) => inner.on_handshake_timeout(),
                None => Ok(()),
            }),
        );
        *inner.timeout_timer.lock() = Some(timer);

        if let Some(source) = inner.options.source.as_deref() {
            let weak: Weak<ChannelInner> = Arc::downgrade(&inner);
            inner.platform.frames().create_frame(
                source,
                Box::new(move |endpoint: Endpoint| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_frame_load(endpoint);
                    }
                }),
            )?;
        }

        Ok(Self { inner })
    }
}

// ============================================================================
// Channel - Accessors
// ============================================================================

impl Channel {
    /// Returns the channel's unique identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    /// Returns the normalized options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ChannelOptions {
        &self.inner.options
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Returns `true` once the handshake succeeded.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns `true` once the remote endpoint is known.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.transport.is_ready()
    }

    /// Returns the number of emits waiting for the remote endpoint.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.router.pending_len()
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Waits until the handshake settles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTimeout`] if the handshake failed.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.subscribe_state();
        let state = *rx.wait_for(|state| state.is_terminal()).await?;

        match state {
            ConnectionState::Connected => Ok(()),
            _ => Err(Error::handshake_timeout(self.inner.options.timeout_ms())),
        }
    }
}

// ============================================================================
// Channel - Handlers
// ============================================================================

impl Channel {
    /// Registers `handler` for `event`, replacing any previous handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedEvent`] for `ping` and `pong`.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let event = event.into();
        ensure_not_reserved(&event)?;
        self.register(event, Arc::new(handler));
        Ok(())
    }

    /// Registers several handlers at once.
    ///
    /// Nothing is registered if any name is reserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedEvent`] for the first reserved name.
    pub fn on_many<I, S>(&self, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: Into<String>,
    {
        let handlers: Vec<(String, Handler)> = handlers
            .into_iter()
            .map(|(event, handler)| (event.into(), handler))
            .collect();

        for (event, _) in &handlers {
            ensure_not_reserved(event)?;
        }

        for (event, handler) in handlers {
            self.register(event, handler);
        }
        Ok(())
    }

    /// Registers a handler that receives the payload deserialized as `T`.
    ///
    /// Payloads that do not deserialize are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedEvent`] for `ping` and `pong`.
    pub fn on_typed<T, F>(&self, event: impl Into<String>, handler: F) -> Result<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let event = event.into();
        let name = event.clone();

        self.on(event, move |payload| {
            match serde_json::from_value::<T>(Value::Object(payload)) {
                Ok(value) => handler(value),
                Err(err) => {
                    warn!(event = %name, error = %err, "Payload does not match handler type");
                }
            }
        })
    }

    /// Removes the handler for `event`. Returns `true` if one existed.
    pub fn off(&self, event: &str) -> bool {
        self.inner.router.unregister(event)
    }

    /// Returns `true` if a handler is registered for `event`.
    #[inline]
    #[must_use]
    pub fn has_handler(&self, event: &str) -> bool {
        self.inner.router.has_handler(event)
    }

    fn register(&self, event: String, handler: Handler) {
        if self.inner.router.register(event.as_str(), handler).is_some() {
            trace!(channel_id = %self.inner.id, event = %event, "Replaced handler");
        }
    }
}

// ============================================================================
// Channel - Emit
// ============================================================================

impl Channel {
    /// Sends `event` with `payload` to the remote window.
    ///
    /// Before the remote endpoint is known the emit is queued and sent once
    /// it is. After a failed handshake queued emits are dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::ReservedEvent`] for `ping` and `pong`
    /// - [`Error::ReservedField`] if `payload` has an `event` key
    /// - Platform errors from an immediate send
    pub fn emit(&self, event: impl Into<String>, payload: Payload) -> Result<()> {
        let event = event.into();
        ensure_not_reserved(&event)?;
        self.inner.emit(Envelope::new(event, payload)?)
    }

    /// Sends `event` with an empty payload.
    ///
    /// # Errors
    ///
    /// See [`emit`](Self::emit).
    pub fn emit_empty(&self, event: impl Into<String>) -> Result<()> {
        self.emit(event, Payload::new())
    }

    /// Sends `event` with `value` serialized as the payload.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPayload`] if `value` is not a JSON object or null
    /// - See [`emit`](Self::emit)
    pub fn emit_value<T>(&self, event: impl Into<String>, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let event = event.into();
        ensure_not_reserved(&event)?;
        self.inner.emit(Envelope::from_value(event, value)?)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("transport", &self.inner.transport)
            .field("router", &self.inner.router)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn ensure_not_reserved(event: &str) -> Result<()> {
    if ReservedEvent::is_reserved(event) {
        return Err(Error::reserved_event(event));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde::Deserialize;
    use serde_json::json;

    use crate::platform::{MessageBus, Scheduler, Task, TokioScheduler};
    use crate::sim::{SimWindow, SimWorld};

    const HOST_URL: &str = "https://b.example/host.html";
    const REMOTE_URL: &str = "https://b.example/B.html";

    type Slot = Arc<Mutex<Option<Channel>>>;
    type Log = Arc<Mutex<Vec<Value>>>;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn recorder(log: &Log) -> impl Fn(Payload) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |payload| log.lock().push(Value::Object(payload))
    }

    /// Registers a page whose script opens a passive channel, runs `setup`
    /// on it, and parks it in the returned slot.
    fn passive_page<F>(world: &SimWorld, url: &str, setup: F) -> Slot
    where
        F: Fn(&Channel) -> Result<()> + Send + Sync + 'static,
    {
        let slot: Slot = Arc::new(Mutex::new(None));
        let parked = Arc::clone(&slot);

        world
            .register_page(url, move |window: &SimWindow| {
                let channel = Channel::new(window.platform(), ChannelOptions::new())?;
                setup(&channel)?;
                *parked.lock() = Some(channel);
                Ok(())
            })
            .unwrap();

        slot
    }

    fn active_channel(host: &SimWindow) -> Channel {
        Channel::builder()
            .source("B.html")
            .origin("https://b.example")
            .connection_timeout(Duration::from_millis(50))
            .build(host.platform())
            .unwrap()
    }

    fn slot_channel(slot: &Slot) -> Channel {
        slot.lock().clone().expect("page script did not run")
    }

    /// Records every raw message reaching `window`, parsed as JSON.
    fn capture(window: &SimWindow) -> Log {
        let inbox: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        window.add_listener(Arc::new(move |message: InboundMessage| {
            sink.lock().push(serde_json::from_str(&message.data).unwrap());
        }));
        inbox
    }

    /// Scheduler that only runs tasks when told to.
    #[derive(Default)]
    struct ManualScheduler {
        tasks: Mutex<Vec<(Duration, TimerHandle, Option<Task>)>>,
    }

    impl ManualScheduler {
        fn len(&self) -> usize {
            self.tasks.lock().len()
        }

        fn delay(&self, index: usize) -> Duration {
            self.tasks.lock()[index].0
        }

        /// Runs task `index` unless it was cancelled.
        fn fire(&self, index: usize) -> Result<()> {
            let (handle, task) = {
                let mut tasks = self.tasks.lock();
                let (_, handle, task) = &mut tasks[index];
                (handle.clone(), task.take().expect("task already fired"))
            };

            if handle.is_cancelled() {
                return Ok(());
            }
            task()
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
            let handle = TimerHandle::new();
            self.tasks.lock().push((delay, handle.clone(), Some(task)));
            handle
        }
    }

    /// Passive channel whose timers are driven by hand. Task 0 is the
    /// connection timer.
    fn manual_channel(window: &SimWindow) -> (Arc<ManualScheduler>, Channel) {
        let scheduler = Arc::new(ManualScheduler::default());
        let channel = Channel::builder()
            .on_connection_fail(|_| {})
            .build(window.platform().with_scheduler(scheduler.clone()))
            .unwrap();
        assert_eq!(scheduler.len(), 1);
        (scheduler, channel)
    }

    #[test]
    fn test_greet_before_ready_is_delivered_once() {
        let world = SimWorld::new();
        let greetings: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&greetings);
        let b_slot = passive_page(&world, REMOTE_URL, move |channel| {
            channel.on("greet", recorder(&sink))
        });

        let host = world.open_window(HOST_URL).unwrap();
        let a = active_channel(&host);
        a.emit("greet", payload(json!({ "msg": "hi" }))).unwrap();
        assert_eq!(a.pending_count(), 1);
        assert!(!a.is_ready());

        world.run_until_idle();

        let b = slot_channel(&b_slot);
        assert!(a.is_connected());
        assert!(b.is_connected());
        assert_eq!(a.pending_count(), 0);
        assert_eq!(*greetings.lock(), vec![json!({ "msg": "hi" })]);
        assert!(world.take_uncaught().is_empty());
    }

    #[test]
    fn test_passive_side_connects_first() {
        let world = SimWorld::new();
        let b_slot = passive_page(&world, REMOTE_URL, |_| Ok(()));
        let host = world.open_window(HOST_URL).unwrap();
        let a = active_channel(&host);

        let mut b_connected_at = None;
        let mut a_connected_at = None;
        let mut steps = 0;
        while world.step() {
            steps += 1;
            let b_connected = b_slot.lock().as_ref().is_some_and(Channel::is_connected);
            if b_connected_at.is_none() && b_connected {
                b_connected_at = Some(steps);
            }
            if a_connected_at.is_none() && a.is_connected() {
                a_connected_at = Some(steps);
            }
        }

        let b_at = b_connected_at.expect("B never connected");
        let a_at = a_connected_at.expect("A never connected");
        assert!(b_at < a_at);
        assert!(world.now() < Duration::from_millis(50));
    }

    #[test]
    fn test_passive_queue_drains_on_first_inbound() {
        let world = SimWorld::new();
        let b_slot = passive_page(&world, REMOTE_URL, |channel| {
            channel.emit("hello", payload(json!({ "from": "B" })))
        });

        let host = world.open_window(HOST_URL).unwrap();
        let a = active_channel(&host);
        let hellos: Log = Arc::new(Mutex::new(Vec::new()));
        a.on("hello", recorder(&hellos)).unwrap();

        world.run_until_idle();

        assert_eq!(slot_channel(&b_slot).pending_count(), 0);
        assert_eq!(*hellos.lock(), vec![json!({ "from": "B" })]);
    }

    #[test]
    fn test_last_handler_wins() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let peer = world.open_window("https://a.example/peer.html").unwrap();
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();

        let first: Log = Arc::new(Mutex::new(Vec::new()));
        let second: Log = Arc::new(Mutex::new(Vec::new()));
        channel.on("foo", recorder(&first)).unwrap();
        channel.on("foo", recorder(&second)).unwrap();

        peer.post_to(&window, r#"{"event":"foo","x":1}"#, "*").unwrap();
        world.run_for(Duration::from_millis(1));

        assert!(first.lock().is_empty());
        assert_eq!(*second.lock(), vec![json!({ "x": 1 })]);
    }

    #[test]
    fn test_malformed_inbound_is_ignored() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let peer = world.open_window("https://c.example/").unwrap();
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();

        let calls: Log = Arc::new(Mutex::new(Vec::new()));
        channel.on("foo", recorder(&calls)).unwrap();

        for garbage in ["not json", "[1,2]", r#"{"x":1}"#, r#"{"event":7}"#] {
            peer.post_to(&window, garbage, "*").unwrap();
        }
        world.run_for(Duration::from_millis(1));

        assert!(calls.lock().is_empty());
        assert!(channel.is_ready());
        assert_eq!(channel.state(), ConnectionState::Unconfirmed);
    }

    #[test]
    fn test_timeout_invokes_callback_once() {
        let world = SimWorld::new();
        let host = world.open_window(HOST_URL).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let failed_at = Arc::new(Mutex::new(None));

        let counter = Arc::clone(&calls);
        let clock = world.clone();
        let stamp = Arc::clone(&failed_at);
        let channel = Channel::builder()
            .source("missing.html")
            .on_connection_fail(move |err| {
                assert!(err.is_handshake_timeout());
                counter.fetch_add(1, Ordering::SeqCst);
                *stamp.lock() = Some(clock.now());
            })
            .build(host.platform())
            .unwrap();

        world.run_until_idle();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!((*failed_at.lock()).unwrap() >= Duration::from_millis(50));
        assert_eq!(channel.state(), ConnectionState::Failed);
        assert!(world.take_uncaught().is_empty());
    }

    #[test]
    fn test_timeout_without_callback_is_uncaught_once() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();

        world.run_until_idle();

        let uncaught = world.take_uncaught();
        assert_eq!(uncaught.len(), 1);
        assert!(uncaught[0].is_handshake_timeout());
        assert_eq!(
            uncaught[0].to_string(),
            "Unable to connect to remote endpoint within 50ms"
        );
        assert_eq!(channel.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_pending_emits_dropped_on_failure() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let channel = Channel::builder()
            .on_connection_fail(|_| {})
            .build(window.platform())
            .unwrap();

        channel.emit_empty("first").unwrap();
        channel.emit_empty("second").unwrap();
        assert_eq!(channel.pending_count(), 2);

        world.run_until_idle();

        assert_eq!(channel.state(), ConnectionState::Failed);
        assert_eq!(channel.pending_count(), 0);

        channel.emit_empty("late").unwrap();
        assert_eq!(channel.pending_count(), 0);
    }

    #[test]
    fn test_dropped_channel_makes_timers_inert() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();
        channel.emit_empty("queued").unwrap();
        assert_eq!(window.listener_count(), 1);

        drop(channel);
        assert_eq!(window.listener_count(), 0);

        world.run_until_idle();
        assert!(world.take_uncaught().is_empty());
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();

        for name in ["ping", "pong"] {
            assert!(matches!(
                channel.on(name, |_| {}),
                Err(Error::ReservedEvent { .. })
            ));
            assert!(matches!(
                channel.emit_empty(name),
                Err(Error::ReservedEvent { .. })
            ));
        }

        let ok: Handler = Arc::new(|_: Payload| {});
        let ping: Handler = Arc::new(|_: Payload| {});
        let handlers = vec![("ok", ok), ("ping", ping)];
        assert!(channel.on_many(handlers).is_err());
        assert!(!channel.has_handler("ok"));
        assert!(!channel.off("ok"));
        assert_eq!(channel.pending_count(), 0);
    }

    #[test]
    fn test_reserved_field_is_rejected() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();

        let err = channel
            .emit("foo", payload(json!({ "event": "bar" })))
            .unwrap_err();
        assert!(matches!(err, Error::ReservedField { .. }));
        assert_eq!(channel.pending_count(), 0);
    }

    #[test]
    fn test_origin_mismatch_fails_handshake() {
        let world = SimWorld::new();
        let b_slot = passive_page(&world, "https://a.example/B.html", |_| Ok(()));
        let host = world.open_window("https://a.example/host.html").unwrap();
        let a = active_channel(&host);

        world.run_until_idle();

        assert_eq!(a.state(), ConnectionState::Failed);
        assert_eq!(slot_channel(&b_slot).state(), ConnectionState::Failed);
        assert!(!slot_channel(&b_slot).is_ready());
        assert_eq!(world.take_uncaught().len(), 2);
    }

    #[test]
    fn test_on_many_registers_all() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let peer = world.open_window("https://a.example/peer").unwrap();
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let on_a: Handler = Arc::new(recorder(&log));
        let on_b: Handler = Arc::new(recorder(&log));
        let handlers = vec![("a", on_a), ("b", on_b)];
        channel.on_many(handlers).unwrap();

        peer.post_to(&window, r#"{"event":"a","n":1}"#, "*").unwrap();
        peer.post_to(&window, r#"{"event":"b","n":2}"#, "*").unwrap();
        world.run_for(Duration::from_millis(1));

        assert_eq!(*log.lock(), vec![json!({ "n": 1 }), json!({ "n": 2 })]);
        assert!(channel.has_handler("b"));
        assert!(channel.off("a"));
        assert!(!channel.has_handler("a"));
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Greeting {
        msg: String,
    }

    #[test]
    fn test_typed_round_trip() {
        let world = SimWorld::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let b_slot = passive_page(&world, REMOTE_URL, move |channel| {
            let sink = Arc::clone(&sink);
            channel.on_typed("greet", move |greeting: Greeting| sink.lock().push(greeting))
        });

        let host = world.open_window(HOST_URL).unwrap();
        let a = active_channel(&host);
        a.emit_value("greet", &Greeting { msg: "hi".into() }).unwrap();
        a.emit_value("greet", &json!({ "wrong": true })).unwrap();
        assert!(matches!(
            a.emit_value("greet", &5),
            Err(Error::InvalidPayload { .. })
        ));

        world.run_until_idle();

        assert!(slot_channel(&b_slot).is_connected());
        assert_eq!(*received.lock(), vec![Greeting { msg: "hi".into() }]);
    }

    #[test]
    fn test_state_watch_and_wait_connected() {
        let world = SimWorld::new();
        let _b_slot = passive_page(&world, REMOTE_URL, |_| Ok(()));
        let host = world.open_window(HOST_URL).unwrap();
        let a = active_channel(&host);
        let rx = a.subscribe_state();
        assert_eq!(*rx.borrow(), ConnectionState::Unconfirmed);

        world.run_until_idle();

        assert_eq!(*rx.borrow(), ConnectionState::Connected);
        tokio_test::block_on(a.wait_connected()).unwrap();
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();

        let err = Channel::builder()
            .origin("not an origin")
            .build(window.platform())
            .unwrap_err();
        assert!(err.is_misuse());
        assert_eq!(window.listener_count(), 0);
    }

    #[test]
    fn test_retry_tick_rearms_while_unbound() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let (scheduler, channel) = manual_channel(&window);

        channel.emit_empty("first").unwrap();
        channel.emit_empty("second").unwrap();
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.delay(1), Duration::from_millis(50));

        scheduler.fire(1).unwrap();
        assert_eq!(scheduler.len(), 3);
        assert_eq!(channel.pending_count(), 2);
        assert_eq!(channel.state(), ConnectionState::Unconfirmed);
    }

    #[test]
    fn test_retry_tick_drains_once_bound() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let peer = world.open_window("https://a.example/peer.html").unwrap();
        let inbox = capture(&peer);
        let (scheduler, channel) = manual_channel(&window);

        channel.emit("queued", payload(json!({ "n": 1 }))).unwrap();

        // Endpoint bound behind the router's back, as when an emit races
        // the readiness drain.
        assert!(channel.inner.transport.attach(window.endpoint_for(&peer)));
        assert_eq!(channel.pending_count(), 1);

        scheduler.fire(1).unwrap();
        assert_eq!(channel.pending_count(), 0);
        assert_eq!(scheduler.len(), 2);

        world.run_until_idle();
        assert_eq!(*inbox.lock(), vec![json!({ "event": "queued", "n": 1 })]);
    }

    #[test]
    fn test_retry_tick_drops_after_failure() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let (scheduler, channel) = manual_channel(&window);

        channel.emit_empty("queued").unwrap();

        // Handshake settles as failed without the timer's own cleanup.
        assert!(channel.inner.handshake.lock().on_timeout());

        scheduler.fire(1).unwrap();
        assert_eq!(channel.pending_count(), 0);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(channel.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_handler_may_emit_on_its_own_channel() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let peer = world.open_window("https://a.example/peer.html").unwrap();
        let inbox = capture(&peer);
        let channel = Channel::new(window.platform(), ChannelOptions::new()).unwrap();

        let slot: Slot = Arc::new(Mutex::new(Some(channel.clone())));
        let responder = Arc::clone(&slot);
        channel
            .on("ask", move |payload| {
                let channel = responder.lock().clone();
                if let Some(channel) = channel {
                    channel.emit("answer", payload).unwrap();
                }
            })
            .unwrap();

        peer.post_to(&window, r#"{"event":"ask","n":1}"#, "*").unwrap();
        world.run_for(Duration::from_millis(1));

        assert_eq!(*inbox.lock(), vec![json!({ "event": "answer", "n": 1 })]);
        slot.lock().take();
    }

    #[test]
    fn test_frame_load_after_foreign_discovery_keeps_first_endpoint() {
        let world = SimWorld::new();
        let b_slot = passive_page(&world, REMOTE_URL, |_| Ok(()));
        let host = world.open_window(HOST_URL).unwrap();
        let foreign = world.open_window("https://b.example/foreign.html").unwrap();
        let inbox = capture(&foreign);
        let a = active_channel(&host);

        foreign.post_to(&host, r#"{"event":"hello"}"#, "*").unwrap();
        world.run_for(Duration::from_millis(10));

        let bound = a.inner.transport.endpoint().map(|endpoint| endpoint.id());
        assert_eq!(bound, Some(foreign.id()));
        assert_eq!(*inbox.lock(), vec![json!({ "event": "ping" })]);
        assert!(!slot_channel(&b_slot).is_ready());
    }

    #[test]
    fn test_frame_load_after_failure_sends_no_ping() {
        let world = SimWorld::new().with_load_latency(Duration::from_millis(100));
        let frame_inbox: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frame_inbox);
        world
            .register_page(REMOTE_URL, move |window: &SimWindow| {
                let sink = Arc::clone(&sink);
                window.add_listener(Arc::new(move |message: InboundMessage| {
                    sink.lock().push(serde_json::from_str(&message.data).unwrap());
                }));
                Ok(())
            })
            .unwrap();

        let host = world.open_window(HOST_URL).unwrap();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        let a = Channel::builder()
            .source("B.html")
            .origin("https://b.example")
            .connection_timeout(Duration::from_millis(50))
            .on_connection_fail(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build(host.platform())
            .unwrap();
        a.emit_empty("early").unwrap();

        world.run_until_idle();

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(a.state(), ConnectionState::Failed);
        assert_eq!(a.pending_count(), 0);
        assert!(a.is_ready());
        assert!(frame_inbox.lock().is_empty());

        a.emit_empty("late").unwrap();
        world.run_until_idle();
        assert_eq!(*frame_inbox.lock(), vec![json!({ "event": "late" })]);
        assert!(world.take_uncaught().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_timeout() {
        let world = SimWorld::new();
        let window = world.open_window("https://a.example/").unwrap();
        let (scheduler, mut uncaught) = TokioScheduler::current().unwrap();
        let platform = window.platform().with_scheduler(Arc::new(scheduler));

        let channel = Channel::new(platform, ChannelOptions::new()).unwrap();
        let err = channel.wait_connected().await.unwrap_err();
        assert!(err.is_handshake_timeout());

        let surfaced = uncaught.recv().await.unwrap();
        assert!(surfaced.is_handshake_timeout());
    }
}
