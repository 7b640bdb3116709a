//! Gateway frame envelope
//!
//! Every payload in either direction is one JSON object with an opcode,
//! data, and, on dispatch frames, a sequence number and event name.

use crate::protocol::GatewayOpcode;
use concord_core::Intents;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One gateway payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: GatewayOpcode,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Parse an inbound frame from its JSON text
    ///
    /// # Errors
    /// Fails when the text is not a frame-shaped JSON object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize for sending
    ///
    /// # Errors
    /// Fails only if the payload contains non-serializable values.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Keepalive frame carrying the last seen sequence number
    #[must_use]
    pub fn heartbeat(sequence: u64) -> Self {
        let d = if sequence == 0 {
            Value::Null
        } else {
            json!(sequence)
        };
        Self {
            op: GatewayOpcode::Heartbeat,
            d,
            s: None,
            t: None,
        }
    }

    /// Opening payload of a fresh session
    #[must_use]
    pub fn identify(
        token: &str,
        shard_id: u32,
        shard_count: u32,
        intents: Intents,
        large_threshold: u32,
    ) -> Self {
        Self {
            op: GatewayOpcode::Identify,
            d: json!({
                "token": token,
                "intents": intents.bits(),
                "large_threshold": large_threshold,
                "shard": [shard_id, shard_count],
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "concord",
                    "device": "concord",
                },
            }),
            s: None,
            t: None,
        }
    }

    /// Opening payload when continuing an interrupted session
    #[must_use]
    pub fn resume(token: &str, session_id: &str, sequence: u64) -> Self {
        Self {
            op: GatewayOpcode::Resume,
            d: json!({
                "token": token,
                "session_id": session_id,
                "seq": sequence,
            }),
            s: None,
            t: None,
        }
    }
}
