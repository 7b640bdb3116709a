//! Decoded dispatch records and the context key that orders them

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

use crate::events::EventKind;
use crate::value_objects::Snowflake;

/// Grouping key for ordered event delivery
///
/// Events sharing a context are delivered to listeners in arrival order;
/// events in different contexts may be delivered concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchContext {
    /// Events not owned by any server (READY, USER_UPDATE, direct messages)
    Global,
    /// Events owned by one server
    Server(Snowflake),
}

impl DispatchContext {
    /// Derive the context from a dispatch payload
    ///
    /// Any payload carrying a `guild_id` belongs to that server's context.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        payload
            .get("guild_id")
            .and_then(|id| serde_json::from_value::<Snowflake>(id.clone()).ok())
            .map_or(Self::Global, Self::Server)
    }

    /// The owning server id, if any
    #[must_use]
    pub fn server_id(&self) -> Option<Snowflake> {
        match self {
            Self::Global => None,
            Self::Server(id) => Some(*id),
        }
    }
}

impl fmt::Display for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Server(id) => write!(f, "server:{id}"),
        }
    }
}

/// One decoded dispatch frame
///
/// The payload stays raw JSON; decoding into domain entities is the
/// listener's job.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Shard that received the frame
    pub shard_id: u32,
    /// Event kind from the frame's `t` field
    pub kind: EventKind,
    /// Ordering context derived from the payload
    pub context: DispatchContext,
    /// Sequence number from the frame's `s` field
    pub sequence: u64,
    /// Raw `d` payload
    pub payload: Value,
    /// Local receive time
    pub received_at: DateTime<Utc>,
}

impl EventRecord {
    /// Build a record from decoded frame parts
    #[must_use]
    pub fn new(shard_id: u32, kind: EventKind, sequence: u64, payload: Value) -> Self {
        let context = DispatchContext::from_payload(&payload);
        Self {
            shard_id,
            kind,
            context,
            sequence,
            payload,
            received_at: Utc::now(),
        }
    }
}
