//! pageagent agent - the embedded agent: module registry, unload guard,
//! frame token authentication and the bootstrap orchestrator

pub mod coverage;
pub mod events;
pub mod frame_token;
pub mod host;
pub mod module;
pub mod orchestrator;
pub mod registry;
pub mod unload;

pub use coverage::{CoverageCounters, CoverageSource};
pub use events::{AgentEvent, EventBus};
pub use frame_token::{FrameTokenAuthenticator, HandshakeSchema};
pub use host::{HostEvent, HostEventKind, HostPage};
pub use module::{CoreModule, ModuleContext, ModuleFactory, ModuleFuture};
pub use orchestrator::{Agent, EntryPoint};
pub use registry::{ModuleInstance, ModuleLookup, ModuleRegistry, ModuleState};
pub use unload::UnloadGuard;
