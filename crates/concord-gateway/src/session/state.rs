//! Session connection states

use std::fmt;

/// Lifecycle state of one gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection and none being attempted
    #[default]
    Disconnected,
    /// Websocket connect in progress
    Connecting,
    /// Connected, waiting for the server hello
    WaitingHello,
    /// Hello received, identify sent or queued behind the identify gate
    Identifying,
    /// Hello received, resume sent for an earlier session
    Resuming,
    /// Session established, events flowing
    Connected,
    /// Connection lost, waiting to reconnect
    Reconnecting,
    /// Closed for good; reconnecting cannot succeed
    FatallyClosed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::WaitingHello => "waiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::FatallyClosed => "fatally_closed",
        }
    }

    /// Whether events can currently arrive on this session
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether this state can never be left again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::FatallyClosed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
