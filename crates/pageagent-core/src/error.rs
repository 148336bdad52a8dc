//! Error types for pageagent

use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("agent already initialized: another instance owns this page")]
    AlreadyInitialized,

    #[error("module already registered: {0}")]
    DuplicateModule(String),

    #[error("invalid factory for module {0}: no initializer")]
    InvalidFactory(String),

    #[error("agent not ready (state: {state}); controller has not sent init data")]
    NotReady { state: String },

    #[error("module {name} failed to initialize: {source}")]
    ModuleInitialization {
        name: String,
        #[source]
        source: Arc<Error>,
    },

    #[error("module {name} is not of the requested type")]
    ModuleType { name: String },

    #[error("module error: {0}")]
    ModuleFailed(String),

    #[error("channel not attached")]
    ChannelNotAttached,

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_ready(state: impl std::fmt::Display) -> Self {
        Self::NotReady {
            state: state.to_string(),
        }
    }

    pub fn module_initialization(name: impl Into<String>, source: Arc<Error>) -> Self {
        Self::ModuleInitialization {
            name: name.into(),
            source,
        }
    }

    pub fn module_failed(message: impl Into<String>) -> Self {
        Self::ModuleFailed(message.into())
    }

    pub fn remote(code: i32, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    /// JSON-RPC style error code used when this error is sent back over the wire.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::MethodNotFound(_) => -32601,
            Self::InvalidMessage(_) | Self::JsonError(_) => -32602,
            Self::Remote { code, .. } => *code,
            _ => -32603,
        }
    }
}
