//! Scripted gateway frames for integration tests

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// A session id no other test uses
pub fn unique_session_id() -> String {
    format!("session-{}", unique_suffix())
}

/// Server hello with a heartbeat interval in milliseconds
pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({
        "op": 10,
        "d": { "heartbeat_interval": heartbeat_interval_ms },
    })
}

/// Ready dispatch establishing a fresh session
pub fn ready(session_id: &str, seq: u64) -> Value {
    json!({
        "op": 0,
        "t": "READY",
        "s": seq,
        "d": {
            "v": 10,
            "session_id": session_id,
            "user": { "id": "999", "username": "testbot", "bot": true },
            "guilds": [],
        },
    })
}

/// Resumed dispatch closing a replay
pub fn resumed(seq: u64) -> Value {
    json!({
        "op": 0,
        "t": "RESUMED",
        "s": seq,
        "d": {},
    })
}

/// Heartbeat acknowledgement
pub fn heartbeat_ack() -> Value {
    json!({ "op": 11 })
}

/// Server-requested reconnect
pub fn reconnect() -> Value {
    json!({ "op": 7, "d": null })
}

/// Session invalidation, resumable or not
pub fn invalid_session(resumable: bool) -> Value {
    json!({ "op": 9, "d": resumable })
}

/// Message dispatch in one server's context
pub fn message_create(seq: u64, server_id: &str, content: &str) -> Value {
    json!({
        "op": 0,
        "t": "MESSAGE_CREATE",
        "s": seq,
        "d": {
            "id": unique_suffix().to_string(),
            "channel_id": "222",
            "guild_id": server_id,
            "content": content,
        },
    })
}

/// Dispatch without a server, landing in the global context
pub fn user_update(seq: u64) -> Value {
    json!({
        "op": 0,
        "t": "USER_UPDATE",
        "s": seq,
        "d": { "id": "999", "username": "renamed" },
    })
}
