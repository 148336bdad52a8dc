//! pageagent core - wire vocabulary, shared types, configuration and errors

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::AgentConfig;
pub use error::{Error, Result};
pub use protocol::*;
pub use types::*;
