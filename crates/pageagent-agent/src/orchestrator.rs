//! Bootstrap orchestrator — owns the agent's state for its whole lifetime
//!
//! Bootstrap order:
//!   1. claim the host page (fails if another agent already did)
//!   2. attach the channel
//!   3. register the built-in handlers and host listeners
//!   4. register the built-in module and install the entry point
//!   5. announce presence and wait for the controller's init data
//!
//! Feature modules join through the installed [`EntryPoint`] once the init
//! data has arrived.

use crate::coverage::CoverageSource;
use crate::events::EventBus;
use crate::frame_token::{FrameTokenAuthenticator, HandshakeSchema};
use crate::host::{HostEventKind, HostPage};
use crate::module::{CoreModule, ModuleContext, ModuleFactory};
use crate::registry::{ModuleLookup, ModuleRegistry};
use crate::unload::UnloadGuard;
use futures::future::BoxFuture;
use futures::FutureExt;
use pageagent_channel::{sync_handler, Channel};
use pageagent_core::{
    AgentConfig, AgentState, Error, InitData, ModuleInfo, Result, COVERAGE_SUBMIT,
    INIT_DATA_ACK, MODULE_INIT_NOTIFY, PRESENCE_ANNOUNCE, REMOTE_UNLOAD_NOTIFY, STATUS_QUERY,
};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

type RegisterFn = dyn Fn(String, ModuleFactory) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// The function feature modules call to join the agent.
///
/// Clones share one function; [`EntryPoint::ptr_eq`] tells whether two
/// handles are the same installation.
#[derive(Clone)]
pub struct EntryPoint {
    register: Arc<RegisterFn>,
}

impl EntryPoint {
    /// Register module `name` built by `factory`.
    pub async fn call(&self, name: impl Into<String>, factory: ModuleFactory) -> Result<()> {
        (self.register)(name.into(), factory).await
    }

    pub fn ptr_eq(&self, other: &EntryPoint) -> bool {
        Arc::ptr_eq(&self.register, &other.register)
    }
}

impl std::fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntryPoint({:p})", Arc::as_ptr(&self.register))
    }
}

struct AgentInner {
    config: AgentConfig,
    host: Arc<HostPage>,
    channel: Arc<dyn Channel>,
    registry: ModuleRegistry,
    events: EventBus,
    unload: UnloadGuard,
    init_data: OnceLock<InitData>,
    state: watch::Sender<AgentState>,
    coverage: Option<Arc<dyn CoverageSource>>,
}

impl AgentInner {
    /// Move to `to` if the current state satisfies `from`.
    fn advance(&self, to: AgentState, from: impl Fn(AgentState) -> bool) -> bool {
        self.state.send_if_modified(|state| {
            if from(*state) {
                debug!("Agent state {} -> {}", state, to);
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn current_state(&self) -> AgentState {
        *self.state.borrow()
    }

    fn receive_init_data(&self, data: InitData) {
        if self.init_data.set(data).is_err() {
            warn!("Init data received twice, keeping the first");
            return;
        }
        let ready = self.advance(AgentState::Ready, |s| {
            matches!(s, AgentState::Attached | AgentState::AwaitingInitData)
        });
        if ready {
            info!("Ready (scriptApiVersion {})", data.script_api_version);
        } else {
            warn!("Init data arrived in state {}", self.current_state());
        }
    }

    fn fire_unload(&self) -> bool {
        let fired = self.unload.fire();
        if fired {
            self.advance(AgentState::Unloaded, |s| s == AgentState::Unloading);
            info!("Unloaded");
        }
        fired
    }

    fn flush_coverage(&self) {
        let Some(source) = &self.coverage else {
            return;
        };
        if let Some(payload) = source.snapshot() {
            debug!("Submitting coverage payload");
            self.channel.call_and_forget(COVERAGE_SUBMIT, payload);
        }
    }

    fn status(&self) -> Value {
        json!({
            "context": self.config.context,
            "state": self.current_state(),
            "scriptApiVersion": self.init_data.get().map(|d| d.script_api_version),
            "modules": self.registry.snapshot(),
        })
    }

    async fn register_module(self: Arc<Self>, name: String, factory: ModuleFactory) -> Result<()> {
        let result = self.try_register_module(&name, factory).await;
        if let Err(e) = &result {
            error!(module = %name, "Error during module registration: {}", e);
        }
        result
    }

    async fn try_register_module(&self, name: &str, factory: ModuleFactory) -> Result<()> {
        let init = factory
            .into_init()
            .ok_or_else(|| Error::InvalidFactory(name.to_string()))?;

        let state = self.current_state();
        let init_data = match (state, self.init_data.get()) {
            (AgentState::Ready, Some(data)) => *data,
            _ => return Err(Error::not_ready(state)),
        };

        let ctx = ModuleContext {
            events: self.events.clone(),
            modules: ModuleLookup::new(self.registry.clone()),
            channel: self.channel.clone(),
            script_api_version: init_data.script_api_version,
        };
        let instance = init(ctx)?;
        self.registry.register(name, instance)?;

        debug!(module = %name, "Module registered, notifying the controller");
        self.channel
            .call(MODULE_INIT_NOTIFY, json!({ "moduleName": name }))
            .await?;
        Ok(())
    }
}

/// A bootstrapped agent. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
    entry_point: EntryPoint,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Bootstrap an agent on `host`, talking to the controller over `channel`.
    ///
    /// Errors are logged and returned; nothing is retried. On error the page
    /// is left without a working agent.
    pub async fn bootstrap(
        config: AgentConfig,
        host: Arc<HostPage>,
        channel: Arc<dyn Channel>,
        coverage: Option<Arc<dyn CoverageSource>>,
    ) -> Result<Agent> {
        debug!(context = %config.context, "Initializing...");
        match Self::try_bootstrap(config, host, channel, coverage).await {
            Ok(agent) => Ok(agent),
            Err(e) => {
                error!("Error during initialization: {}", e);
                Err(e)
            }
        }
    }

    async fn try_bootstrap(
        config: AgentConfig,
        host: Arc<HostPage>,
        channel: Arc<dyn Channel>,
        coverage: Option<Arc<dyn CoverageSource>>,
    ) -> Result<Agent> {
        if host.has_entry_point() || !host.claim() {
            return Err(Error::AlreadyInitialized);
        }

        let events = EventBus::new();
        let (state, _) = watch::channel(AgentState::Uninitialized);
        let inner = Arc::new(AgentInner {
            config,
            host,
            channel,
            registry: ModuleRegistry::new(),
            unload: UnloadGuard::new(events.clone()),
            events,
            init_data: OnceLock::new(),
            state,
            coverage,
        });

        inner.channel.attach().await?;
        inner.advance(AgentState::Attached, |s| s == AgentState::Uninitialized);

        let entry_point = {
            let inner = inner.clone();
            EntryPoint {
                register: Arc::new(move |name, factory| {
                    inner.clone().register_module(name, factory).boxed()
                }),
            }
        };

        Self::register_handlers(&inner);
        Self::register_unload_hooks(&inner);
        Self::install_host_listeners(&inner, &entry_point);

        inner.registry.register_ready(
            &inner.config.builtin_module,
            CoreModule {
                events: inner.events.clone(),
                modules: ModuleLookup::new(inner.registry.clone()),
                channel: inner.channel.clone(),
            },
        )?;

        inner.host.install_entry_point(entry_point.clone());
        // Some hosts drop the slot right after injection; install once more on
        // the next scheduling opportunity.
        {
            let host = inner.host.clone();
            let entry_point = entry_point.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                host.install_entry_point(entry_point);
                trace!("Re-installed entry point after first tick");
            });
        }

        debug!("Initialized, announcing presence to the controller");
        inner.channel.call_and_forget(PRESENCE_ANNOUNCE, Value::Null);
        inner.advance(AgentState::AwaitingInitData, |s| s == AgentState::Attached);

        Ok(Agent { inner, entry_point })
    }

    fn register_handlers(inner: &Arc<AgentInner>) {
        let agent = inner.clone();
        inner.channel.method(
            INIT_DATA_ACK,
            sync_handler(move |params| {
                let data: InitData = serde_json::from_value(params)
                    .map_err(|e| Error::InvalidMessage(format!("init data: {}", e)))?;
                agent.receive_init_data(data);
                Ok(Value::Null)
            }),
        );

        let agent = inner.clone();
        inner.channel.method(
            REMOTE_UNLOAD_NOTIFY,
            sync_handler(move |_| {
                agent.fire_unload();
                Ok(Value::Null)
            }),
        );

        let agent = inner.clone();
        inner
            .channel
            .method(STATUS_QUERY, sync_handler(move |_| Ok(agent.status())));
    }

    fn register_unload_hooks(inner: &Arc<AgentInner>) {
        let agent = inner.clone();
        inner.unload.on_unload(move || {
            debug!("Content is about to unload");
            agent.advance(AgentState::Unloading, |s| !s.is_unloading());
            agent.flush_coverage();
        });
    }

    fn install_host_listeners(inner: &Arc<AgentInner>, entry_point: &EntryPoint) {
        let agent = inner.clone();
        inner.host.add_listener(HostEventKind::Unload, move |_| {
            agent.fire_unload();
        });

        let authenticator = FrameTokenAuthenticator::new(
            HandshakeSchema::new(inner.config.handshake_key.clone()),
            inner.channel.clone(),
        );
        inner.host.add_listener(HostEventKind::Message, move |event| {
            authenticator.handle(event);
        });

        let host = Arc::downgrade(&inner.host);
        let entry_point = entry_point.clone();
        inner.host.add_listener(HostEventKind::Reinstall, move |event| {
            event.stop_immediate_propagation();
            if let Some(host) = host.upgrade() {
                host.install_entry_point(entry_point.clone());
                debug!("Re-installed entry point on host signal");
            }
        });
    }

    /// The installed entry point (the same handle the host holds).
    pub fn entry_point(&self) -> EntryPoint {
        self.entry_point.clone()
    }

    /// Shorthand for calling the entry point.
    pub async fn register_agent_module(
        &self,
        name: impl Into<String>,
        factory: ModuleFactory,
    ) -> Result<()> {
        self.entry_point.call(name, factory).await
    }

    pub fn state(&self) -> AgentState {
        self.inner.current_state()
    }

    /// Wait until the agent reaches `target` or any later state.
    pub async fn wait_for_state(&self, target: AgentState) -> Result<AgentState> {
        let mut rx = self.inner.state.subscribe();
        let state = *rx
            .wait_for(|s| *s >= target)
            .await
            .map_err(|_| Error::Internal("agent state channel closed".into()))?;
        Ok(state)
    }

    pub fn init_data(&self) -> Option<InitData> {
        self.inner.init_data.get().copied()
    }

    pub fn modules(&self) -> ModuleLookup {
        ModuleLookup::new(self.inner.registry.clone())
    }

    pub fn module_snapshot(&self) -> Vec<ModuleInfo> {
        self.inner.registry.snapshot()
    }

    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    pub fn host(&self) -> &Arc<HostPage> {
        &self.inner.host
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    /// Same as the controller's `status-query` response.
    pub fn status(&self) -> Value {
        self.inner.status()
    }

    /// Trigger unload directly. Returns `true` if this call did the work.
    pub fn fire_unload(&self) -> bool {
        self.inner.fire_unload()
    }
}
