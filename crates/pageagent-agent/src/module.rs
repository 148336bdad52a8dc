//! What feature modules hand to the agent and what they get back

use crate::events::EventBus;
use crate::registry::{ModuleInstance, ModuleLookup};
use futures::future::BoxFuture;
use futures::FutureExt;
use pageagent_channel::Channel;
use pageagent_core::Result;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Capabilities passed to a module factory.
#[derive(Clone)]
pub struct ModuleContext {
    pub events: EventBus,
    pub modules: ModuleLookup,
    pub channel: Arc<dyn Channel>,
    pub script_api_version: u32,
}

/// The asynchronous part of a module's initialization.
pub type ModuleFuture = BoxFuture<'static, Result<ModuleInstance>>;

type FactoryFn = Box<dyn FnOnce(ModuleContext) -> Result<ModuleFuture> + Send>;

/// A module's initializer, as handed over by whatever loaded the module.
///
/// The initializer may fail synchronously (reported to the caller of the
/// entry point) or asynchronously (reported to everything waiting for the
/// module). A factory without an initializer is rejected at the entry point.
pub struct ModuleFactory {
    init: Option<FactoryFn>,
}

impl ModuleFactory {
    /// Factory from an async initializer producing the module instance.
    pub fn new<F, Fut, T>(init: F) -> Self
    where
        F: FnOnce(ModuleContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Any + Send + Sync,
    {
        Self::try_new(move |ctx| {
            let fut = init(ctx);
            Ok(async move {
                let instance: ModuleInstance = Arc::new(fut.await?);
                Ok(instance)
            }
            .boxed())
        })
    }

    /// Factory whose synchronous setup can fail before any async work starts.
    pub fn try_new<F>(init: F) -> Self
    where
        F: FnOnce(ModuleContext) -> Result<ModuleFuture> + Send + 'static,
    {
        Self {
            init: Some(Box::new(init)),
        }
    }

    /// A factory with no initializer, e.g. a loaded module that exported none.
    pub fn empty() -> Self {
        Self { init: None }
    }

    pub fn is_invocable(&self) -> bool {
        self.init.is_some()
    }

    pub(crate) fn into_init(self) -> Option<FactoryFn> {
        self.init
    }
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("invocable", &self.is_invocable())
            .finish()
    }
}

/// Instance of the module the agent registers for itself. Other modules can
/// wait for it to reach the shared event bus and channel.
#[derive(Clone)]
pub struct CoreModule {
    pub events: EventBus,
    pub modules: ModuleLookup,
    pub channel: Arc<dyn Channel>,
}
