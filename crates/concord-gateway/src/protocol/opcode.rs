//! Gateway opcodes
//!
//! Opcodes travel as plain numbers in the frame's `op` field. Numbers the
//! client does not know map to `Unknown` instead of failing the frame, so
//! new server-side opcodes degrade to a logged no-op.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Operation code of a gateway frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOpcode {
    /// Server pushes an event; `t` names it, `s` orders it
    Dispatch,
    /// Keepalive sent by the client, or demanded by the server
    Heartbeat,
    /// First payload of a fresh session
    Identify,
    /// First payload when continuing an interrupted session
    Resume,
    /// Server asks the client to disconnect and resume
    Reconnect,
    /// Server rejected the session; `d` says whether it can be resumed
    InvalidSession,
    /// First server payload after connecting, carries the heartbeat interval
    Hello,
    /// Server acknowledged a heartbeat
    HeartbeatAck,
    /// Opcode this client does not understand
    Unknown(u8),
}

impl GatewayOpcode {
    /// Wire number for this opcode
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(code) => code,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            6 => Self::Resume,
            7 => Self::Reconnect,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for GatewayOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch => write!(f, "DISPATCH"),
            Self::Heartbeat => write!(f, "HEARTBEAT"),
            Self::Identify => write!(f, "IDENTIFY"),
            Self::Resume => write!(f, "RESUME"),
            Self::Reconnect => write!(f, "RECONNECT"),
            Self::InvalidSession => write!(f, "INVALID_SESSION"),
            Self::Hello => write!(f, "HELLO"),
            Self::HeartbeatAck => write!(f, "HEARTBEAT_ACK"),
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

impl Serialize for GatewayOpcode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for GatewayOpcode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        Ok(Self::from_code(code))
    }
}
