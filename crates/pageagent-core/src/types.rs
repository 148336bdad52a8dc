//! Core types for pageagent

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Data the controller sends once, after the agent announced itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitData {
    pub script_api_version: u32,
}

/// Opaque handshake token minted by a parent frame - cheaply cloneable.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct FrameToken(Arc<str>);

impl FrameToken {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FrameToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one agent instance.
///
/// `Uninitialized → Attached → AwaitingInitData → Ready → Unloading → Unloaded`.
/// Unloading may also start before `Ready` if the page goes away early.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Uninitialized,
    Attached,
    AwaitingInitData,
    Ready,
    Unloading,
    Unloaded,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Attached => "attached",
            Self::AwaitingInitData => "awaiting_init_data",
            Self::Ready => "ready",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
        }
    }

    /// True once teardown has started.
    pub fn is_unloading(&self) -> bool {
        matches!(self, Self::Unloading | Self::Unloaded)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of a registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Pending,
    Resolved,
    Rejected,
}

/// Introspection record for one registry entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub status: ModuleStatus,
    /// False when the entry only exists because something is waiting for it.
    pub registered: bool,
}
