//! Simulated browsing contexts.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;
use url::Url;

use crate::channel::{ANY_ORIGIN, SAME_ORIGIN};
use crate::error::{Error, Result};
use crate::identifiers::{EndpointId, ListenerId};
use crate::platform::{
    Endpoint, FrameProvisioner, InboundMessage, LoadCallback, MessageBus, MessageListener,
    MessageTarget, Platform, Scheduler, Task, TimerHandle,
};

use super::world::{WorldRef, open_window, schedule_on};

// ============================================================================
// SimWindow
// ============================================================================

/// A window or frame inside a [`SimWorld`](super::SimWorld).
///
/// Acts as the message bus, frame provisioner, and timer source for code
/// running in it.
#[derive(Clone)]
pub struct SimWindow {
    world: WorldRef,
    id: EndpointId,
    url: Url,
    origin: String,
}

impl SimWindow {
    pub(crate) fn new(world: WorldRef, id: EndpointId, url: Url, origin: String) -> Self {
        Self {
            world,
            id,
            url,
            origin,
        }
    }

    /// Returns the window's identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Returns the document URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the serialized origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the platform services for code running in this window.
    #[must_use]
    pub fn platform(&self) -> Platform {
        let this = Arc::new(self.clone());
        Platform::new(this.clone(), this.clone(), this)
    }

    /// Returns this window's reference to `target`.
    #[must_use]
    pub fn endpoint_for(&self, target: &SimWindow) -> Endpoint {
        Arc::new(SimEndpoint {
            world: self.world.clone(),
            target: target.id,
            sender: self.id,
        })
    }

    /// Posts `data` from this window to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if `target_origin` is not `*`, `/`,
    /// or a URL.
    pub fn post_to(&self, target: &SimWindow, data: &str, target_origin: &str) -> Result<()> {
        self.endpoint_for(target).post_message(data, target_origin)
    }

    /// Returns the number of bus listeners attached to this window.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.world.upgrade().map_or(0, |state| {
            state
                .lock()
                .windows
                .get(&self.id)
                .map_or(0, |window| window.listeners.len())
        })
    }
}

impl MessageBus for SimWindow {
    fn add_listener(&self, listener: MessageListener) -> ListenerId {
        let Some(state) = self.world.upgrade() else {
            return ListenerId::new(0);
        };

        let mut state = state.lock();
        let id = state.next_listener_id();
        if let Some(window) = state.windows.get_mut(&self.id) {
            window.listeners.push((id, listener));
        }
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        let Some(state) = self.world.upgrade() else {
            return;
        };

        let removed = state.lock().windows.get_mut(&self.id).and_then(|window| {
            let index = window.listeners.iter().position(|(listener, _)| *listener == id)?;
            Some(window.listeners.remove(index))
        });

        // Listeners are user closures; release them outside the lock.
        drop(removed);
    }
}

impl FrameProvisioner for SimWindow {
    fn create_frame(&self, source: &str, on_load: LoadCallback) -> Result<()> {
        let url = self.url.join(source)?;
        let state = self
            .world
            .upgrade()
            .ok_or_else(|| Error::platform("world is gone"))?;
        let latency = state.lock().load_latency();

        trace!(parent = %self.id, %url, "Provisioning frame");

        let world = self.world.clone();
        let parent = self.id;
        state.lock().push(
            latency,
            Box::new(move || {
                let Some(state) = world.upgrade() else {
                    return Ok(());
                };

                let child = open_window(&state, url);
                let script = state.lock().page(child.url());

                let loaded = match script {
                    Some(script) => script(&child),
                    None => {
                        trace!(url = %child.url(), "No page registered, frame is blank");
                        Ok(())
                    }
                };

                on_load(Arc::new(SimEndpoint {
                    world,
                    target: child.id,
                    sender: parent,
                }));
                loaded
            }),
        );

        Ok(())
    }
}

impl Scheduler for SimWindow {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        schedule_on(&self.world, delay, task)
    }
}

impl fmt::Debug for SimWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimWindow")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SimEndpoint
// ============================================================================

/// One window's reference to another.
struct SimEndpoint {
    world: WorldRef,
    target: EndpointId,
    sender: EndpointId,
}

impl MessageTarget for SimEndpoint {
    fn id(&self) -> EndpointId {
        self.target
    }

    /// Queues delivery at the current time. Messages whose target origin
    /// does not match the receiver are dropped silently.
    fn post_message(&self, data: &str, target_origin: &str) -> Result<()> {
        let Some(state) = self.world.upgrade() else {
            return Ok(());
        };
        let mut state = state.lock();

        let (Some(sender_origin), Some(receiver_origin)) = (
            state.windows.get(&self.sender).map(|w| w.origin.clone()),
            state.windows.get(&self.target).map(|w| w.origin.clone()),
        ) else {
            trace!(window = %self.target, "Posting to closed window");
            return Ok(());
        };

        let allowed = match target_origin {
            ANY_ORIGIN => true,
            SAME_ORIGIN => receiver_origin == sender_origin,
            other => {
                let wanted = Url::parse(other)
                    .map_err(|_| Error::invalid_origin(other))?
                    .origin()
                    .ascii_serialization();
                receiver_origin == wanted
            }
        };

        if !allowed {
            trace!(
                window = %self.target,
                target_origin,
                receiver_origin = %receiver_origin,
                "Target origin mismatch, dropping message"
            );
            return Ok(());
        }

        let world = self.world.clone();
        let (target, sender) = (self.target, self.sender);
        let data = data.to_string();

        state.push(
            Duration::ZERO,
            Box::new(move || {
                deliver(&world, target, sender, data, sender_origin);
                Ok(())
            }),
        );
        Ok(())
    }
}

/// Hands one message to every listener attached to `target` at delivery
/// time.
fn deliver(world: &WorldRef, target: EndpointId, sender: EndpointId, data: String, origin: String) {
    let Some(state) = world.upgrade() else {
        return;
    };

    let listeners: Vec<MessageListener> = state
        .lock()
        .windows
        .get(&target)
        .map(|window| {
            window
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        })
        .unwrap_or_default();

    for listener in listeners {
        listener(InboundMessage {
            data: data.clone(),
            origin: origin.clone(),
            source: Some(Arc::new(SimEndpoint {
                world: world.clone(),
                target: sender,
                sender: target,
            })),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
