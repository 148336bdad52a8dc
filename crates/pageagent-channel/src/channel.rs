//! The channel facade and handler helpers

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use pageagent_core::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A method handler. The handler function itself is invoked synchronously in
/// frame delivery order; the returned future is driven afterwards and its
/// value becomes the response.
pub type MethodHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wrap an async function as a [`MethodHandler`].
pub fn handler<F, Fut>(f: F) -> MethodHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |params| f(params).boxed())
}

/// Wrap a synchronous function as a [`MethodHandler`]. The body runs at
/// invocation time, so its effects are ordered with frame delivery.
pub fn sync_handler<F>(f: F) -> MethodHandler
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |params| {
        let result = f(params);
        futures::future::ready(result).boxed()
    })
}

/// What the agent requires from a transport.
///
/// `attach` must be called before `call`. Handlers may be registered at any
/// time; a request for a method with no handler gets a method-not-found error.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Bind the channel to its transport. Idempotent per instance.
    async fn attach(&self) -> Result<()>;

    /// Register the handler for requests and notifications named `name`.
    fn method(&self, name: &str, handler: MethodHandler);

    /// Register several handlers at once.
    fn methods(&self, handlers: HashMap<String, MethodHandler>) {
        for (name, handler) in handlers {
            self.method(&name, handler);
        }
    }

    /// Send a correlated request and wait for its response.
    async fn call(&self, name: &str, payload: Value) -> Result<Value>;

    /// Send a notification. Never waits; delivery failures are only logged.
    fn call_and_forget(&self, name: &str, payload: Value);
}
