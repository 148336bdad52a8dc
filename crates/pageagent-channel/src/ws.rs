//! WebSocket client channel — connects the agent to a controller process
//!
//! One JSON [`Frame`] per text message. A writer task drains the outbound
//! queue; a reader task feeds inbound frames to the dispatcher in arrival
//! order.

use crate::channel::{Channel, MethodHandler};
use crate::dispatch::Dispatcher;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use pageagent_core::{Error, Frame, Notification, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMsg};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct WsChannel {
    url: String,
    dispatcher: Arc<Dispatcher>,
    outbound: mpsc::UnboundedSender<Frame>,
    /// Taken by the writer task on the first successful attach.
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    attached: AtomicBool,
    shutdown: CancellationToken,
    writer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WsChannel {
    pub fn new(url: impl Into<String>, context: &str) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            dispatcher: Arc::new(Dispatcher::new(context)),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            attached: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            writer: std::sync::Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Close the socket and fail outstanding and later calls.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.dispatcher.fail_pending("websocket closed");
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Resolves once the channel is closed from either side.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Close and wait until the frames queued so far have been written.
    pub async fn shutdown(&self) {
        self.close();
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("[{}] Writer task failed: {}", self.dispatcher.context(), e);
            }
        }
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn attach(&self) -> Result<()> {
        let mut slot = self.outbound_rx.lock().await;
        if slot.is_none() {
            return Ok(());
        }

        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::WebSocket(format!("failed to connect to {}: {}", self.url, e)))?;
        let Some(mut outbound_rx) = slot.take() else {
            return Ok(());
        };
        let (mut ws_tx, mut ws_rx) = stream.split();
        self.attached.store(true, Ordering::SeqCst);
        info!("[{}] Connected to controller at {}", self.dispatcher.context(), self.url);

        let shutdown = self.shutdown.clone();
        let context = self.dispatcher.context().to_string();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        // Flush what was queued before the close.
                        while let Ok(frame) = outbound_rx.try_recv() {
                            let Ok(text) = serde_json::to_string(&frame) else { continue };
                            if ws_tx.send(WsMsg::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        let _ = ws_tx.send(WsMsg::Close(None)).await;
                        break;
                    }
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("[{}] Failed to encode frame: {}", context, e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_tx.send(WsMsg::Text(text)).await {
                            warn!("[{}] WebSocket send failed: {}", context, e);
                            break;
                        }
                    }
                }
            }
            debug!("[{}] Writer stopped", context);
        });
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);

        let dispatcher = self.dispatcher.clone();
        let outbound = self.outbound.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    msg = ws_rx.next() => match msg {
                        Some(Ok(WsMsg::Text(text))) => match serde_json::from_str::<Frame>(&text) {
                            Ok(frame) => dispatcher.handle_frame(frame, &outbound),
                            Err(e) => warn!("[{}] Ignoring malformed frame: {}", dispatcher.context(), e),
                        },
                        Some(Ok(WsMsg::Close(_))) | None => {
                            info!("[{}] Controller closed the connection", dispatcher.context());
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("[{}] WebSocket error: {}", dispatcher.context(), e);
                            break;
                        }
                        _ => {} // Binary, Ping, Pong
                    },
                }
            }
            dispatcher.fail_pending("websocket closed");
            // Nothing can answer any more; stop the writer too.
            shutdown.cancel();
        });

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
            return Err(Error::ConnectionClosed("writer stopped".into()));
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
        if self
            .outbound
            .send(Frame::Notification(Notification::new(name, payload)))
            .is_err()
        {
            warn!("[{}] Dropped {}: writer stopped", self.dispatcher.context(), name);
        }
    }
}
