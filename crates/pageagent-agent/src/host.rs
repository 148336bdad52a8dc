//! Host page — the untrusted document the agent is injected into
//!
//! Owns three event surfaces (page messages, teardown, re-install signal) and
//! the shared entry-point slot feature modules use to join the agent. Any
//! script on the page can dispatch messages here, so listeners must treat
//! message payloads as adversarial.

use crate::orchestrator::EntryPoint;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEventKind {
    /// A message posted to the page (from the parent frame or anyone else).
    Message,
    /// The page is being torn down.
    Unload,
    /// The host asks the agent to re-install its entry point.
    Reinstall,
}

/// One dispatched event. Listeners may stop further propagation.
#[derive(Debug)]
pub struct HostEvent {
    kind: HostEventKind,
    data: Value,
    stopped: AtomicBool,
}

impl HostEvent {
    pub fn new(kind: HostEventKind, data: Value) -> Self {
        Self {
            kind,
            data,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> HostEventKind {
        self.kind
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// No listener after the current one will see this event.
    pub fn stop_immediate_propagation(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub type HostListener = Arc<dyn Fn(&HostEvent) + Send + Sync>;

#[derive(Default)]
pub struct HostPage {
    listeners: Mutex<Vec<(HostEventKind, HostListener)>>,
    entry_point: RwLock<Option<EntryPoint>>,
    claimed: AtomicBool,
}

impl HostPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a listener. Listeners of a kind run in the order they were added.
    pub fn add_listener(&self, kind: HostEventKind, listener: impl Fn(&HostEvent) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, Arc::new(listener)));
    }

    /// Dispatch an event to the listeners of its kind. Returns the event so
    /// callers can inspect whether propagation was stopped.
    pub fn dispatch(&self, event: HostEvent) -> HostEvent {
        let listeners: Vec<HostListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(&event);
            if event.propagation_stopped() {
                trace!("Propagation of {:?} stopped", event.kind);
                break;
            }
        }
        event
    }

    pub fn dispatch_message(&self, data: Value) -> HostEvent {
        self.dispatch(HostEvent::new(HostEventKind::Message, data))
    }

    pub fn dispatch_unload(&self) -> HostEvent {
        self.dispatch(HostEvent::new(HostEventKind::Unload, Value::Null))
    }

    pub fn dispatch_reinstall(&self) -> HostEvent {
        self.dispatch(HostEvent::new(HostEventKind::Reinstall, Value::Null))
    }

    /// Claim this page for one agent. Only the first claim succeeds.
    pub fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    pub fn install_entry_point(&self, entry_point: EntryPoint) {
        *self.entry_point.write().unwrap_or_else(PoisonError::into_inner) = Some(entry_point);
    }

    /// The currently installed entry point, if the host still has it.
    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entry_point
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_entry_point(&self) -> bool {
        self.entry_point
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the installed entry point. Some hosts lose it on their own
    /// shortly after injection; this is how that shows up here.
    pub fn clear_entry_point(&self) -> Option<EntryPoint> {
        self.entry_point
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
