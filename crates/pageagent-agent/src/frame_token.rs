//! Frame token authentication
//!
//! A parent frame hands its child a token by posting `{ "<key>": "<token>" }`
//! to the child page. Every script on the page shares that message surface,
//! so only that exact shape is accepted: a JSON object with a single key equal
//! to the handshake key, whose value is a string. Everything else is ignored
//! without error.

use crate::host::HostEvent;
use pageagent_channel::Channel;
use pageagent_core::{FrameToken, FRAME_TOKEN_RELAY};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// The validation gate on its own, usable without a channel.
#[derive(Clone, Debug)]
pub struct HandshakeSchema {
    key: String,
}

impl HandshakeSchema {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Extract the token if `data` is exactly `{ key: "<string>" }`.
    pub fn extract(&self, data: &Value) -> Option<FrameToken> {
        let object = data.as_object()?;
        if object.len() != 1 {
            return None;
        }
        match object.get(&self.key)? {
            Value::String(token) => Some(FrameToken::new(token.as_str())),
            _ => None,
        }
    }
}

/// Listens on the host message surface and relays valid tokens to the
/// controller.
pub struct FrameTokenAuthenticator {
    schema: HandshakeSchema,
    channel: Arc<dyn Channel>,
}

impl FrameTokenAuthenticator {
    pub fn new(schema: HandshakeSchema, channel: Arc<dyn Channel>) -> Self {
        Self { schema, channel }
    }

    /// Handle one page message. Returns the token when the message matched.
    pub fn handle(&self, event: &HostEvent) -> Option<FrameToken> {
        let Some(token) = self.schema.extract(event.data()) else {
            trace!("Ignoring page message that is not a handshake");
            return None;
        };

        event.stop_immediate_propagation();
        debug!(frame_token = %token, "Received frame token from parent frame");
        self.channel
            .call_and_forget(FRAME_TOKEN_RELAY, Value::String(token.as_str().to_string()));
        Some(token)
    }
}
