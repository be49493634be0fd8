//! Virtual clock and task queue.

// ============================================================================
// Imports
// ============================================================================

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{error, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{EndpointId, ListenerId};
use crate::platform::{MessageListener, Scheduler, Task, TimerHandle};

use super::window::SimWindow;

// ============================================================================
// Constants
// ============================================================================

/// Default delay between provisioning a frame and its load event.
pub const DEFAULT_LOAD_LATENCY: Duration = Duration::from_millis(5);

// ============================================================================
// Types
// ============================================================================

/// Script run inside a freshly loaded frame.
pub type PageScript = Arc<dyn Fn(&SimWindow) -> Result<()> + Send + Sync>;

pub(crate) type WorldRef = Weak<Mutex<WorldState>>;

/// Task waiting in the queue.
struct QueuedTask {
    at: Duration,
    seq: u64,
    token: TimerHandle,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Per-window bookkeeping.
pub(crate) struct WindowState {
    pub(crate) origin: String,
    pub(crate) listeners: Vec<(ListenerId, MessageListener)>,
}

/// Everything behind the world lock.
pub(crate) struct WorldState {
    now: Duration,
    seq: u64,
    next_listener: u64,
    queue: BinaryHeap<Reverse<QueuedTask>>,
    pub(crate) windows: FxHashMap<EndpointId, WindowState>,
    pages: FxHashMap<String, PageScript>,
    load_latency: Duration,
    uncaught: Vec<Error>,
}

impl WorldState {
    pub(crate) fn load_latency(&self) -> Duration {
        self.load_latency
    }

    pub(crate) fn page(&self, url: &Url) -> Option<PageScript> {
        self.pages.get(url.as_str()).cloned()
    }

    pub(crate) fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId::new(self.next_listener)
    }

    /// Queues `task` to run `delay` after the current virtual time.
    pub(crate) fn push(&mut self, delay: Duration, task: Task) -> TimerHandle {
        let token = TimerHandle::new();
        self.seq += 1;
        self.queue.push(Reverse(QueuedTask {
            at: self.now + delay,
            seq: self.seq,
            token: token.clone(),
            task,
        }));
        token
    }

    /// Pops the next live task without moving the clock past cancelled
    /// ones. Cancelled tasks are moved into `discarded` so the caller can
    /// drop them after releasing the lock.
    fn pop_live(
        &mut self,
        deadline: Option<Duration>,
        discarded: &mut Vec<QueuedTask>,
    ) -> Option<Task> {
        loop {
            let at = self.queue.peek()?.0.at;
            if deadline.is_some_and(|deadline| at > deadline) {
                return None;
            }

            let Reverse(next) = self.queue.pop()?;
            if next.token.is_cancelled() {
                discarded.push(next);
                continue;
            }

            self.now = self.now.max(next.at);
            return Some(next.task);
        }
    }
}

// ============================================================================
// SimWorld
// ============================================================================

/// A deterministic stand-in for a browser: windows, frames, message
/// delivery, and timers on one virtual clock.
///
/// Nothing runs until the world is stepped. Tasks run in (time, insertion)
/// order and never while the world lock is held, so they may schedule
/// further work.
///
/// # Example
///
/// ```ignore
/// let world = SimWorld::new();
/// world.register_page("https://b.example/B.html", |window| {
///     let channel = Channel::new(window.platform(), ChannelOptions::new())?;
///     // keep `channel` somewhere
///     Ok(())
/// })?;
///
/// let host = world.open_window("https://b.example/host.html")?;
/// let channel = Channel::new(host.platform(), ChannelOptions::active("B.html"))?;
/// world.run_until_idle();
/// ```
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// Creates an empty world at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                now: Duration::ZERO,
                seq: 0,
                next_listener: 0,
                queue: BinaryHeap::new(),
                windows: FxHashMap::default(),
                pages: FxHashMap::default(),
                load_latency: DEFAULT_LOAD_LATENCY,
                uncaught: Vec::new(),
            })),
        }
    }

    /// Sets the frame load latency.
    #[must_use]
    pub fn with_load_latency(self, latency: Duration) -> Self {
        self.state.lock().load_latency = latency;
        self
    }

    /// Returns the virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Returns the number of queued tasks, cancelled ones included.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.state.lock().queue.len()
    }

    // ========================================================================
    // Windows and Pages
    // ========================================================================

    /// Opens a top-level window at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `url` does not parse.
    pub fn open_window(&self, url: &str) -> Result<SimWindow> {
        let url = Url::parse(url)?;
        Ok(open_window(&self.state, url))
    }

    /// Registers the script that runs when a frame loads `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `url` does not parse.
    pub fn register_page<F>(&self, url: &str, script: F) -> Result<()>
    where
        F: Fn(&SimWindow) -> Result<()> + Send + Sync + 'static,
    {
        let url = Url::parse(url)?;
        let replaced = self
            .state
            .lock()
            .pages
            .insert(url.as_str().to_string(), Arc::new(script));

        // The old script may own channels whose teardown takes the lock.
        drop(replaced);
        Ok(())
    }

    // ========================================================================
    // Running
    // ========================================================================

    /// Runs the next live task. Returns `false` if the queue is empty.
    pub fn step(&self) -> bool {
        self.step_until(None)
    }

    /// Runs tasks until the queue is empty. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.step() {
            ran += 1;
        }
        ran
    }

    /// Runs every task due within `duration`, then moves the clock to the
    /// end of that window.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = self.now() + duration;
        self.advance_to(deadline)
    }

    /// Runs every task due at or before `deadline`, then moves the clock
    /// there.
    pub fn advance_to(&self, deadline: Duration) -> usize {
        let mut ran = 0;
        while self.step_until(Some(deadline)) {
            ran += 1;
        }

        let mut state = self.state.lock();
        state.now = state.now.max(deadline);
        ran
    }

    /// Returns and clears the errors raised by tasks.
    pub fn take_uncaught(&self) -> Vec<Error> {
        mem::take(&mut self.state.lock().uncaught)
    }

    fn step_until(&self, deadline: Option<Duration>) -> bool {
        let mut discarded = Vec::new();
        let next = self.state.lock().pop_live(deadline, &mut discarded);

        // Cancelled tasks may own channels whose teardown takes the lock.
        drop(discarded);

        let Some(task) = next else {
            return false;
        };

        if let Err(err) = task() {
            error!(error = %err, "Uncaught error in simulated task");
            self.state.lock().uncaught.push(err);
        }
        true
    }
}

impl Scheduler for SimWorld {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        self.state.lock().push(delay, task)
    }
}

impl fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimWorld")
            .field("now", &state.now)
            .field("queued", &state.queue.len())
            .field("windows", &state.windows.len())
            .field("pages", &state.pages.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Adds a window to the world and returns its handle.
pub(crate) fn open_window(state: &Arc<Mutex<WorldState>>, url: Url) -> SimWindow {
    let id = EndpointId::next();
    let origin = url.origin().ascii_serialization();

    state.lock().windows.insert(
        id,
        WindowState {
            origin: origin.clone(),
            listeners: Vec::new(),
        },
    );
    trace!(window = %id, %url, "Window opened");

    SimWindow::new(Arc::downgrade(state), id, url, origin)
}

/// Queues `task` on the world behind `world`.
///
/// A vanished world drops the task and hands back a cancelled handle.
pub(crate) fn schedule_on(world: &WorldRef, delay: Duration, task: Task) -> TimerHandle {
    match world.upgrade() {
        Some(state) => state.lock().push(delay, task),
        None => {
            let handle = TimerHandle::new();
            handle.cancel();
            handle
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
