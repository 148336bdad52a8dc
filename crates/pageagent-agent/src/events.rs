//! Event bus shared by the agent and its modules

use serde_json::Value;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Events broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The page is being torn down. Emitted exactly once.
    Unloading,
    /// Module-defined event.
    Custom { name: String, payload: Value },
}

impl AgentEvent {
    pub fn custom(name: impl Into<String>, payload: Value) -> Self {
        Self::Custom {
            name: name.into(),
            payload,
        }
    }
}

/// Cheaply cloneable emitter; clones publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn emit(&self, event: AgentEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
