//! In-process channel pair
//!
//! Both ends implement [`Channel`]. Frames sent before the peer attaches are
//! buffered and delivered once it does.

use crate::channel::{Channel, MethodHandler};
use crate::dispatch::Dispatcher;
use async_trait::async_trait;
use pageagent_core::{Error, Frame, Notification, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct MemoryChannel {
    dispatcher: Arc<Dispatcher>,
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    attached: AtomicBool,
    shutdown: CancellationToken,
}

impl MemoryChannel {
    /// Two connected ends, named "agent" and "controller" in logs.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_context("agent", "controller")
    }

    pub fn pair_with_context(a: &str, b: &str) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a, a_tx, a_rx), Self::new(b, b_tx, b_rx))
    }

    fn new(
        context: &str,
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::UnboundedReceiver<Frame>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(context)),
            outbound,
            inbound: Mutex::new(Some(inbound)),
            attached: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Stop reading inbound frames and fail outstanding and later calls.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.dispatcher.fail_pending("memory channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn attach(&self) -> Result<()> {
        let taken = self
            .inbound
            .lock()
            .map_err(|_| Error::Internal("inbound lock poisoned".into()))?
            .take();
        let Some(mut inbound) = taken else {
            return Ok(());
        };
        self.attached.store(true, Ordering::SeqCst);

        let dispatcher = self.dispatcher.clone();
        let outbound = self.outbound.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    frame = inbound.recv() => match frame {
                        Some(frame) => dispatcher.handle_frame(frame, &outbound),
                        None => break,
                    },
                }
            }
            debug!("[{}] Memory channel reader stopped", dispatcher.context());
            dispatcher.fail_pending("memory channel closed");
        });
        debug!("[{}] Memory channel attached", self.dispatcher.context());
        Ok(())
    }

    fn method(&self, name: &str, handler: MethodHandler) {
        self.dispatcher.register(name, handler);
    }

    async fn call(&self, name: &str, payload: Value) -> Result<Value> {
        if !self.is_attached() {
            return Err(Error::ChannelNotAttached);
        }
        let (request, response) = self.dispatcher.begin_call(name, payload)?;
        let id = request.id.clone();
        if self.outbound.send(Frame::Request(request)).is_err() {
            self.dispatcher.abandon(&id);
            return Err(Error::ConnectionClosed("peer dropped".into()));
        }
        response
            .await
            .map_err(|_| Error::ConnectionClosed("response dropped".into()))?
    }

    fn call_and_forget(&self, name: &str, payload: Value) {
        if !self.is_attached() {
            warn!("[{}] Dropped {}: channel not attached", self.dispatcher.context(), name);
            return;
        }
        if self.is_closed() {
            warn!("[{}] Dropped {}: channel closed", self.dispatcher.context(), name);
            return;
        }
        let note = Frame::Notification(Notification::new(name, payload));
        if self.outbound.send(note).is_err() {
            warn!("[{}] Dropped {}: peer dropped", self.dispatcher.context(), name);
        }
    }
}
