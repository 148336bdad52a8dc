//! Module registry — named, eventually-resolved module instances
//!
//! Waiting for a module that has not been registered yet creates a pending
//! placeholder; the wait suspends on that placeholder until `register` is
//! called and the instance future settles. Registration order between modules
//! therefore never matters.

use dashmap::DashMap;
use pageagent_core::{Error, ModuleInfo, ModuleStatus, Result};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};

/// A module instance as stored in the registry.
pub type ModuleInstance = Arc<dyn Any + Send + Sync>;

/// Settlement state shared with every waiter of an entry.
#[derive(Clone)]
pub enum ModuleState {
    Pending,
    Resolved(ModuleInstance),
    Rejected(Arc<Error>),
}

impl ModuleState {
    pub fn status(&self) -> ModuleStatus {
        match self {
            Self::Pending => ModuleStatus::Pending,
            Self::Resolved(_) => ModuleStatus::Resolved,
            Self::Rejected(_) => ModuleStatus::Rejected,
        }
    }
}

struct ModuleEntry {
    /// Set by the first `register`; a placeholder created by a waiter is not registered.
    registered: bool,
    state: Arc<watch::Sender<ModuleState>>,
}

impl ModuleEntry {
    fn placeholder() -> Self {
        let (tx, _) = watch::channel(ModuleState::Pending);
        Self {
            registered: false,
            state: Arc::new(tx),
        }
    }
}

/// Cheaply cloneable handle; clones share the same entries.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    entries: Arc<DashMap<String, ModuleEntry>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, driving `instance` to completion on the Tokio runtime.
    ///
    /// Fails with [`Error::DuplicateModule`] if `name` was registered before.
    /// Must be called from within a Tokio runtime.
    pub fn register<F>(&self, name: &str, instance: F) -> Result<()>
    where
        F: Future<Output = Result<ModuleInstance>> + Send + 'static,
    {
        let state = {
            let mut entry = self
                .entries
                .entry(name.to_string())
                .or_insert_with(ModuleEntry::placeholder);
            if entry.registered {
                return Err(Error::DuplicateModule(name.to_string()));
            }
            entry.registered = true;
            entry.state.clone()
        };
        debug!("Module {} registered", name);

        let name = name.to_string();
        tokio::spawn(async move {
            let settled = match instance.await {
                Ok(instance) => {
                    debug!("Module {} resolved", name);
                    ModuleState::Resolved(instance)
                }
                Err(e) => {
                    error!(module = %name, "Module failed to initialize: {}", e);
                    ModuleState::Rejected(Arc::new(e))
                }
            };
            state.send_replace(settled);
        });
        Ok(())
    }

    /// Register an instance that is already available.
    pub fn register_ready<T>(&self, name: &str, instance: T) -> Result<()>
    where
        T: Any + Send + Sync,
    {
        let instance: ModuleInstance = Arc::new(instance);
        self.register(name, futures::future::ready(Ok(instance)))
    }

    /// Wait until `name` is registered and its instance has settled.
    pub async fn wait_for(&self, name: &str) -> Result<ModuleInstance> {
        let mut rx = self
            .entries
            .entry(name.to_string())
            .or_insert_with(ModuleEntry::placeholder)
            .state
            .subscribe();

        let settled = rx
            .wait_for(|s| !matches!(s, ModuleState::Pending))
            .await
            .map_err(|_| Error::Internal(format!("registry entry for {} dropped", name)))?
            .clone();

        match settled {
            ModuleState::Resolved(instance) => Ok(instance),
            ModuleState::Rejected(cause) => Err(Error::module_initialization(name, cause)),
            ModuleState::Pending => unreachable!("wait_for only returns settled states"),
        }
    }

    /// [`wait_for`](Self::wait_for) plus a downcast to the module's concrete type.
    pub async fn wait_for_typed<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let instance = self.wait_for(name).await?;
        instance.downcast::<T>().map_err(|_| Error::ModuleType {
            name: name.to_string(),
        })
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.get(name).map(|e| e.registered).unwrap_or(false)
    }

    /// Status of one entry, registered or only awaited.
    pub fn status(&self, name: &str) -> Option<ModuleInfo> {
        self.entries.get(name).map(|e| ModuleInfo {
            name: name.to_string(),
            status: e.state.borrow().status(),
            registered: e.registered,
        })
    }

    /// All entries, sorted by name.
    pub fn snapshot(&self) -> Vec<ModuleInfo> {
        let mut infos: Vec<ModuleInfo> = self
            .entries
            .iter()
            .map(|e| ModuleInfo {
                name: e.key().clone(),
                status: e.state.borrow().status(),
                registered: e.registered,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

/// Read-only view of the registry handed to modules: they may wait for each
/// other but never register on their own.
#[derive(Clone)]
pub struct ModuleLookup {
    registry: ModuleRegistry,
}

impl ModuleLookup {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    pub async fn wait_for(&self, name: &str) -> Result<ModuleInstance> {
        self.registry.wait_for(name).await
    }

    pub async fn wait_for_typed<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.registry.wait_for_typed(name).await
    }
}
