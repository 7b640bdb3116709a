//! Gateway close codes
//!
//! The close code a connection ends with decides what happens next:
//! reconnect and resume, reconnect with a fresh identify, or give up
//! because no retry can succeed.

use std::fmt;

/// Close code received when the gateway connection ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    UnknownError,
    UnknownOpcode,
    DecodeError,
    NotAuthenticated,
    AuthenticationFailed,
    AlreadyAuthenticated,
    InvalidSequence,
    RateLimited,
    SessionTimedOut,
    InvalidShard,
    ShardingRequired,
    InvalidApiVersion,
    InvalidIntents,
    DisallowedIntents,
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::UnknownError => 4000,
            Self::UnknownOpcode => 4001,
            Self::DecodeError => 4002,
            Self::NotAuthenticated => 4003,
            Self::AuthenticationFailed => 4004,
            Self::AlreadyAuthenticated => 4005,
            Self::InvalidSequence => 4007,
            Self::RateLimited => 4008,
            Self::SessionTimedOut => 4009,
            Self::InvalidShard => 4010,
            Self::ShardingRequired => 4011,
            Self::InvalidApiVersion => 4012,
            Self::InvalidIntents => 4013,
            Self::DisallowedIntents => 4014,
            Self::Other(code) => code,
        }
    }

    /// Whether reconnecting can never succeed after this code
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::InvalidShard
                | Self::ShardingRequired
                | Self::InvalidApiVersion
                | Self::InvalidIntents
                | Self::DisallowedIntents
        )
    }

    /// Whether the session died with this code and cannot be resumed
    #[must_use]
    pub const fn invalidates_session(self) -> bool {
        matches!(
            self,
            Self::InvalidSequence | Self::SessionTimedOut | Self::Other(1000) | Self::Other(1001)
        )
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "unknown error",
            Self::UnknownOpcode => "unknown opcode sent",
            Self::DecodeError => "malformed payload sent",
            Self::NotAuthenticated => "payload sent before identifying",
            Self::AuthenticationFailed => "authentication failed",
            Self::AlreadyAuthenticated => "identified more than once",
            Self::InvalidSequence => "invalid resume sequence",
            Self::RateLimited => "payloads sent too quickly",
            Self::SessionTimedOut => "session timed out",
            Self::InvalidShard => "invalid shard sent",
            Self::ShardingRequired => "sharding required",
            Self::InvalidApiVersion => "invalid gateway version",
            Self::InvalidIntents => "invalid intents",
            Self::DisallowedIntents => "disallowed intents",
            Self::Other(_) => "unclassified close code",
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_codes() {
        assert!(CloseCode::AuthenticationFailed.is_fatal());
        assert!(CloseCode::InvalidShard.is_fatal());
        assert!(CloseCode::ShardingRequired.is_fatal());
        assert!(CloseCode::DisallowedIntents.is_fatal());
        assert!(!CloseCode::SessionTimedOut.is_fatal());
        assert!(!CloseCode::RateLimited.is_fatal());
        assert!(!CloseCode::Other(1000).is_fatal());
    }

    #[test]
    fn test_session_invalidating_codes() {
        assert!(CloseCode::InvalidSequence.invalidates_session());
        assert!(CloseCode::SessionTimedOut.invalidates_session());
        assert!(CloseCode::Other(1000).invalidates_session());
        assert!(CloseCode::Other(1001).invalidates_session());
        assert!(!CloseCode::UnknownError.invalidates_session());
        assert!(!CloseCode::RateLimited.invalidates_session());
    }

    #[test]
    fn test_round_trip() {
        for code in 4000..=4014u16 {
            if code == 4006 {
                continue;
            }
            assert_eq!(CloseCode::from_u16(code).code(), code);
        }
        assert_eq!(CloseCode::from_u16(1006), CloseCode::Other(1006));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CloseCode::AuthenticationFailed.to_string(),
            "4004 (authentication failed)"
        );
    }
}
