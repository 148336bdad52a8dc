//! Unload guard — any number of triggers, exactly one unload
//!
//! The page teardown signal and the controller's remote notification both
//! call [`UnloadGuard::fire`]. The first call runs the unload hooks and
//! broadcasts [`AgentEvent::Unloading`]; every later call does nothing.

use crate::events::{AgentEvent, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type UnloadHook = Arc<dyn Fn() + Send + Sync>;

pub struct UnloadGuard {
    fired: AtomicBool,
    hooks: Mutex<Vec<UnloadHook>>,
    events: EventBus,
}

impl UnloadGuard {
    pub fn new(events: EventBus) -> Self {
        Self {
            fired: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Add work to run on unload. Hooks run in the order they were added.
    pub fn on_unload(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Fire the unload. Returns `true` only for the call that did the work.
    pub fn fire(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Unload already fired, ignoring");
            return false;
        }

        // Snapshot so a hook may register further hooks without deadlocking.
        let hooks: Vec<UnloadHook> = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook();
        }
        self.events.emit(AgentEvent::Unloading);
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
