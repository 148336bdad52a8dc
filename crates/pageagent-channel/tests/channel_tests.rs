//! Tests for pageagent-channel: in-process pair and WebSocket transport

use futures::{SinkExt, StreamExt};
use pageagent_channel::*;
use pageagent_core::{Error, Frame, RpcResponse};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMsg;

// ===========================================================================
// MemoryChannel
// ===========================================================================

#[tokio::test]
async fn memory_call_roundtrip() {
    let (agent, controller) = MemoryChannel::pair();
    controller.method(
        "double",
        handler(|params| async move { Ok(json!(params.as_i64().unwrap_or(0) * 2)) }),
    );
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();

    let result = agent.call("double", json!(21)).await.unwrap();
    assert_eq!(result, 42);
}

#[tokio::test]
async fn memory_call_before_attach_fails() {
    let (agent, _controller) = MemoryChannel::pair();
    let err = agent.call("anything", Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::ChannelNotAttached));
}

#[tokio::test]
async fn memory_attach_is_idempotent() {
    let (agent, controller) = MemoryChannel::pair();
    controller.method("ping", sync_handler(|_| Ok(json!("pong"))));
    agent.attach().await.unwrap();
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();
    assert!(agent.is_attached());
    assert_eq!(agent.call("ping", Value::Null).await.unwrap(), "pong");
}

#[tokio::test]
async fn memory_unknown_method_is_remote_error() {
    let (agent, controller) = MemoryChannel::pair();
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();
    let err = agent.call("missing", Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::Remote { code: -32601, .. }));
}

#[tokio::test]
async fn memory_frames_buffer_until_peer_attaches() {
    let (agent, controller) = MemoryChannel::pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.method(
        "hello",
        sync_handler(move |params| {
            let _ = tx.send(params);
            Ok(Value::Null)
        }),
    );
    agent.attach().await.unwrap();
    agent.call_and_forget("hello", json!("early"));

    controller.attach().await.unwrap();
    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, "early");
}

#[tokio::test]
async fn memory_notifications_keep_delivery_order() {
    let (agent, controller) = MemoryChannel::pair();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    controller.method(
        "n",
        sync_handler(move |params| {
            log.lock().unwrap().push(params.as_u64().unwrap());
            Ok(Value::Null)
        }),
    );
    controller.method("sync", sync_handler(|_| Ok(Value::Null)));
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();

    for i in 0..20u64 {
        agent.call_and_forget("n", json!(i));
    }
    // A round-trip after the notifications guarantees they were all routed.
    agent.call("sync", Value::Null).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn memory_handlers_can_be_registered_in_bulk() {
    let (agent, controller) = MemoryChannel::pair();
    let mut map = std::collections::HashMap::new();
    map.insert("a".to_string(), sync_handler(|_| Ok(json!("A"))));
    map.insert("b".to_string(), sync_handler(|_| Ok(json!("B"))));
    controller.methods(map);
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();
    assert_eq!(agent.call("a", Value::Null).await.unwrap(), "A");
    assert_eq!(agent.call("b", Value::Null).await.unwrap(), "B");
}

#[tokio::test]
async fn memory_call_fails_when_peer_dropped() {
    let (agent, controller) = MemoryChannel::pair();
    agent.attach().await.unwrap();
    drop(controller);
    let err = agent.call("x", Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed(_)));
}

#[tokio::test]
async fn memory_close_fails_pending_calls() {
    let (agent, controller) = MemoryChannel::pair();
    // The controller never answers.
    controller.method("hang", handler(|_| futures::future::pending()));
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();

    let agent = Arc::new(agent);
    let caller = agent.clone();
    let pending = tokio::spawn(async move { caller.call("hang", Value::Null).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    agent.close();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::ConnectionClosed(_))));
}

#[tokio::test]
async fn memory_call_after_close_fails() {
    let (agent, controller) = MemoryChannel::pair();
    controller.method("ping", sync_handler(|_| Ok(json!("pong"))));
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();

    agent.close();
    assert!(agent.is_closed());
    let result = tokio::time::timeout(Duration::from_millis(500), agent.call("ping", Value::Null))
        .await
        .expect("call after close must not hang");
    assert!(matches!(result, Err(Error::ConnectionClosed(_))));
    // Fire-and-forget after close is dropped quietly.
    agent.call_and_forget("ping", Value::Null);
}

#[tokio::test]
async fn memory_call_after_peer_went_away_fails() {
    let (agent, controller) = MemoryChannel::pair();
    agent.attach().await.unwrap();
    controller.attach().await.unwrap();
    drop(controller);

    let result = tokio::time::timeout(Duration::from_secs(1), agent.call("ping", Value::Null))
        .await
        .expect("call after the peer left must not hang");
    assert!(matches!(result, Err(Error::ConnectionClosed(_))));
}

// ===========================================================================
// WsChannel
// ===========================================================================

/// Minimal controller: answers every request with `{"echo": params}` and
/// forwards notifications to the returned receiver.
async fn spawn_controller() -> (String, mpsc::UnboundedReceiver<(String, Value)>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            let WsMsg::Text(text) = msg else { continue };
            match serde_json::from_str::<Frame>(&text).unwrap() {
                Frame::Request(req) => {
                    let resp = Frame::Response(RpcResponse::ok(&req.id, json!({ "echo": req.params })));
                    ws.send(WsMsg::Text(serde_json::to_string(&resp).unwrap()))
                        .await
                        .unwrap();
                }
                Frame::Notification(note) => {
                    let _ = tx.send((note.method, note.params));
                }
                Frame::Response(_) => {}
            }
        }
    });
    (format!("ws://{}", addr), rx)
}

#[tokio::test]
async fn ws_call_and_notify() {
    let (url, mut notes) = spawn_controller().await;
    let channel = WsChannel::new(url, "agent");
    channel.attach().await.unwrap();
    assert!(channel.is_attached());

    let result = channel.call("module-init-notify", json!({"moduleName": "alpha"})).await.unwrap();
    assert_eq!(result["echo"]["moduleName"], "alpha");

    channel.call_and_forget("presence-announce", Value::Null);
    let (method, params) = tokio::time::timeout(Duration::from_secs(2), notes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(method, "presence-announce");
    assert!(params.is_null());
    channel.close();
}

#[tokio::test]
async fn ws_shutdown_flushes_queued_notifications() {
    let (url, mut notes) = spawn_controller().await;
    let channel = WsChannel::new(url, "agent");
    channel.attach().await.unwrap();

    for i in 0..5 {
        channel.call_and_forget("coverage-submit", json!({ "seq": i }));
    }
    channel.shutdown().await;

    for i in 0..5 {
        let (method, params) = tokio::time::timeout(Duration::from_secs(2), notes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(method, "coverage-submit");
        assert_eq!(params["seq"], i);
    }
}

#[tokio::test]
async fn ws_call_after_controller_closes_fails() {
    // Controller that hangs up right after the handshake.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let _ = ws.send(WsMsg::Close(None)).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let channel = WsChannel::new(format!("ws://{}", addr), "agent");
    channel.attach().await.unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        channel.call("module-init-notify", Value::Null),
    )
    .await
    .expect("call after the controller closed must not hang");
    assert!(matches!(result, Err(Error::ConnectionClosed(_))));

    // Once the reader noticed, later calls fail straight away.
    tokio::time::timeout(Duration::from_secs(2), channel.closed())
        .await
        .unwrap();
    assert!(channel.is_closed());
    assert!(matches!(
        channel.call("module-init-notify", Value::Null).await,
        Err(Error::ConnectionClosed(_))
    ));
}

#[tokio::test]
async fn ws_attach_to_missing_controller_fails() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = WsChannel::new(format!("ws://{}", addr), "agent");
    let err = channel.attach().await.unwrap_err();
    assert!(matches!(err, Error::WebSocket(_)));
    assert!(!channel.is_attached());
}

#[tokio::test]
async fn ws_call_before_attach_fails() {
    let channel = WsChannel::new("ws://127.0.0.1:1", "agent");
    assert!(matches!(
        channel.call("x", Value::Null).await,
        Err(Error::ChannelNotAttached)
    ));
}
