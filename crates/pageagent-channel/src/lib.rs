//! pageagent channel — the transport facade the agent talks through
//!
//! The agent only depends on the [`Channel`] trait. Two transports ship here:
//! an in-process pair for embedding and tests, and a WebSocket client for a
//! controller running in another process.

pub mod channel;
pub mod dispatch;
pub mod memory;
pub mod ws;

pub use channel::{handler, sync_handler, Channel, MethodHandler};
pub use dispatch::Dispatcher;
pub use memory::MemoryChannel;
pub use ws::WsChannel;
