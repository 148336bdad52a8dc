//! Frame dispatcher — routes inbound frames to handlers and pending calls
//!
//! Shared by every transport. A transport feeds each inbound frame to
//! [`Dispatcher::handle_frame`] in the order it arrived and hands over the
//! sender its responses should go out on.

use crate::channel::MethodHandler;
use dashmap::DashMap;
use pageagent_core::{Error, Frame, Notification, Result, RpcRequest, RpcResponse};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

pub struct Dispatcher {
    context: String,
    handlers: DashMap<String, MethodHandler>,
    pending: DashMap<String, oneshot::Sender<Result<Value>>>,
    /// Set once the transport is gone; no call can start afterwards.
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            handlers: DashMap::new(),
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Register a handler. Replaces any existing handler with the same name.
    pub fn register(&self, name: &str, handler: MethodHandler) {
        if self.handlers.insert(name.to_string(), handler).is_some() {
            warn!("[{}] Replaced handler for {}", self.context, name);
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Allocate a request id and a slot for its response.
    ///
    /// Fails with [`Error::ConnectionClosed`] once [`fail_pending`](Self::fail_pending)
    /// has run.
    pub fn begin_call(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(RpcRequest, oneshot::Receiver<Result<Value>>)> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed(format!("{} is closed", self.context)));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        // A close that raced the insert may have missed this entry.
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(Error::ConnectionClosed(format!("{} is closed", self.context)));
        }
        let request = RpcRequest {
            id,
            method: method.to_string(),
            params,
        };
        Ok((request, rx))
    }

    /// Forget a call whose request never made it onto the wire.
    pub fn abandon(&self, id: &str) {
        self.pending.remove(id);
    }

    /// Mark the transport gone and fail every outstanding call.
    pub fn fail_pending(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        if !ids.is_empty() {
            debug!("[{}] Failing {} pending calls: {}", self.context, ids.len(), reason);
        }
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(Error::ConnectionClosed(reason.to_string())));
            }
        }
    }

    fn handler(&self, name: &str) -> Option<MethodHandler> {
        // Clone out so the map shard is not held while the handler runs.
        self.handlers.get(name).map(|h| h.value().clone())
    }

    /// Route one inbound frame.
    pub fn handle_frame(&self, frame: Frame, outbound: &mpsc::UnboundedSender<Frame>) {
        match frame {
            Frame::Request(req) => self.handle_request(req, outbound),
            Frame::Notification(note) => self.handle_notification(note),
            Frame::Response(resp) => match self.pending.remove(&resp.id) {
                Some((_, tx)) => {
                    let _ = tx.send(resp.into_result());
                }
                None => warn!("[{}] Response for unknown request {}", self.context, resp.id),
            },
        }
    }

    fn handle_request(&self, req: RpcRequest, outbound: &mpsc::UnboundedSender<Frame>) {
        let Some(handler) = self.handler(&req.method) else {
            debug!("[{}] No handler for request {}", self.context, req.method);
            let _ = outbound.send(Frame::Response(RpcResponse::method_not_found(
                &req.id,
                &req.method,
            )));
            return;
        };

        let fut = handler(req.params);
        let outbound = outbound.clone();
        let context = self.context.clone();
        let RpcRequest { id, method, .. } = req;
        tokio::spawn(async move {
            let response = match fut.await {
                Ok(value) => RpcResponse::ok(&id, value),
                Err(e) => {
                    warn!("[{}] Handler {} failed: {}", context, method, e);
                    RpcResponse::from_error(&id, &e)
                }
            };
            if outbound.send(Frame::Response(response)).is_err() {
                debug!("[{}] Dropped response to {}: channel closed", context, method);
            }
        });
    }

    fn handle_notification(&self, note: Notification) {
        let Some(handler) = self.handler(&note.method) else {
            trace!("[{}] Ignoring notification {}", self.context, note.method);
            return;
        };

        let fut = handler(note.params);
        let context = self.context.clone();
        let method = note.method;
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                warn!("[{}] Notification handler {} failed: {}", context, method, e);
            }
        });
    }
}
