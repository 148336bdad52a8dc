//! Tests for pageagent-core: frames, types, config, errors

use pageagent_core::*;
use std::sync::Arc;

// ===========================================================================
// Frame parsing
// ===========================================================================

#[test]
fn frame_parses_request() {
    let json = r#"{"id":"r1","method":"init-data-ack","params":{"scriptApiVersion":3}}"#;
    match serde_json::from_str::<Frame>(json).unwrap() {
        Frame::Request(req) => {
            assert_eq!(req.id, "r1");
            assert_eq!(req.method, INIT_DATA_ACK);
            assert_eq!(req.params["scriptApiVersion"], 3);
        }
        other => panic!("Expected request, got {:?}", other),
    }
}

#[test]
fn frame_parses_response_ok_and_error() {
    let ok = serde_json::from_str::<Frame>(r#"{"id":"r1","result":{"ok":true}}"#).unwrap();
    assert!(matches!(ok, Frame::Response(ref r) if r.result.is_some()));

    let err = serde_json::from_str::<Frame>(
        r#"{"id":"r2","error":{"code":-32601,"message":"Method not found: x"}}"#,
    )
    .unwrap();
    match err {
        Frame::Response(resp) => {
            let e = resp.into_result().unwrap_err();
            assert!(matches!(e, Error::Remote { code: -32601, .. }));
        }
        other => panic!("Expected response, got {:?}", other),
    }
}

#[test]
fn frame_parses_notification_without_params() {
    let frame = serde_json::from_str::<Frame>(r#"{"method":"presence-announce"}"#).unwrap();
    match frame {
        Frame::Notification(n) => {
            assert_eq!(n.method, PRESENCE_ANNOUNCE);
            assert!(n.params.is_null());
        }
        other => panic!("Expected notification, got {:?}", other),
    }
}

#[test]
fn frame_method_accessor() {
    let n = Frame::Notification(Notification::new(COVERAGE_SUBMIT, serde_json::json!({})));
    assert_eq!(n.method(), Some(COVERAGE_SUBMIT));
    let r = Frame::Response(RpcResponse::ok("1", serde_json::Value::Null));
    assert_eq!(r.method(), None);
}

#[test]
fn response_without_result_is_null() {
    let resp: RpcResponse = serde_json::from_str(r#"{"id":"r1","result":null}"#).unwrap();
    assert_eq!(resp.into_result().unwrap(), serde_json::Value::Null);
}

#[test]
fn response_skips_absent_fields() {
    let json = serde_json::to_string(&RpcResponse::method_not_found("r9", "nope")).unwrap();
    assert!(!json.contains("result"));
    assert!(json.contains("-32601"));
    assert!(json.contains("method not found: nope"));
}

// ===========================================================================
// Types
// ===========================================================================

#[test]
fn init_data_uses_camel_case() {
    let data: InitData = serde_json::from_value(serde_json::json!({"scriptApiVersion": 3})).unwrap();
    assert_eq!(data.script_api_version, 3);
    assert!(serde_json::from_value::<InitData>(serde_json::json!({"script_api_version": 3})).is_err());
}

#[test]
fn frame_token_display() {
    let token = FrameToken::new("abc");
    assert_eq!(token.as_str(), "abc");
    assert_eq!(token.to_string(), "abc");
    assert_eq!(token.clone(), token);
}

#[test]
fn agent_state_order_and_names() {
    assert!(AgentState::Uninitialized < AgentState::Ready);
    assert!(AgentState::Ready < AgentState::Unloaded);
    assert_eq!(AgentState::AwaitingInitData.to_string(), "awaiting_init_data");
    assert!(AgentState::Unloading.is_unloading());
    assert!(!AgentState::Ready.is_unloading());
    assert_eq!(serde_json::to_string(&AgentState::Ready).unwrap(), r#""ready""#);
}

// ===========================================================================
// Config
// ===========================================================================

#[test]
fn config_defaults() {
    let config = AgentConfig::default();
    assert_eq!(config.handshake_key, "frameToken");
    assert_eq!(config.builtin_module, "agent");
}

#[test]
fn config_partial_toml_fills_defaults() {
    let config = AgentConfig::from_toml("handshake_key = \"openFrame\"\n").unwrap();
    assert_eq!(config.handshake_key, "openFrame");
    assert_eq!(config.builtin_module, "agent");
}

#[test]
fn config_toml_roundtrip() {
    let config = AgentConfig {
        context: "frame-7".into(),
        ..AgentConfig::default()
    };
    let back = AgentConfig::from_toml(&config.to_toml()).unwrap();
    assert_eq!(back, config);
}

#[test]
fn config_load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig::load(&dir.path().join("absent.toml"));
    assert_eq!(config, AgentConfig::default());
}

#[test]
fn config_load_malformed_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.toml");
    std::fs::write(&path, "handshake_key = [").unwrap();
    assert_eq!(AgentConfig::load(&path), AgentConfig::default());
    assert!(matches!(
        AgentConfig::from_toml("handshake_key = ["),
        Err(Error::ConfigError(_))
    ));
}

#[test]
fn config_load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.toml");
    std::fs::write(&path, "controller_url = \"ws://10.0.0.2:9000/agent\"\n").unwrap();
    assert_eq!(AgentConfig::load(&path).controller_url, "ws://10.0.0.2:9000/agent");
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn error_display_messages() {
    assert_eq!(
        Error::DuplicateModule("alpha".into()).to_string(),
        "module already registered: alpha"
    );
    assert!(Error::not_ready(AgentState::AwaitingInitData)
        .to_string()
        .contains("awaiting_init_data"));
}

#[test]
fn module_initialization_keeps_source() {
    use std::error::Error as _;
    let cause = Arc::new(Error::module_failed("boom"));
    let err = Error::module_initialization("alpha", cause);
    assert!(err.to_string().contains("alpha"));
    assert!(err.source().unwrap().to_string().contains("boom"));
}

#[test]
fn rpc_codes() {
    assert_eq!(Error::MethodNotFound("x".into()).rpc_code(), CODE_METHOD_NOT_FOUND);
    let resp = RpcResponse::from_error("r1", &Error::InvalidMessage("bad".into()));
    assert_eq!(resp.error.unwrap().code, CODE_INVALID_PARAMS);
    assert_eq!(Error::InvalidMessage("x".into()).rpc_code(), CODE_INVALID_PARAMS);
    assert_eq!(Error::remote(-1, "x").rpc_code(), -1);
    assert_eq!(Error::Internal("x".into()).rpc_code(), CODE_INTERNAL_ERROR);
}
