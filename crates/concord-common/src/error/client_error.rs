//! Client error types
//!
//! Unified error handling for the REST and gateway layers.

use crate::config::ConfigError;

/// Main client error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure: connect errors, timeouts, dropped sockets
    #[error("Network error: {0}")]
    Network(String),

    /// The server sent something the client cannot make sense of
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The token was rejected; retrying cannot help
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A request exhausted its delivery attempts against rate limiting
    #[error("Rate limit budget exhausted for {route} after {attempts} attempts")]
    RateLimitExceeded { route: String, attempts: u32 },

    /// The server rejected the shard configuration; retrying cannot help
    #[error("Shard configuration rejected: {0}")]
    ShardConfig(String),

    /// The client is shutting down and no longer accepts work
    #[error("Client is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Short code for this error, used in structured log fields
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK",
            Self::Protocol(_) => "PROTOCOL",
            Self::Authentication(_) => "AUTHENTICATION",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::ShardConfig(_) => "SHARD_CONFIG",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Config(_) => "CONFIG",
        }
    }

    /// Whether this error terminates the whole client
    ///
    /// Fatal errors mean reconnecting or retrying cannot succeed, such as
    /// a rejected token or an impossible shard layout.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::ShardConfig(_) | Self::Config(_)
        )
    }

    /// Whether this error is expected to clear on its own
    ///
    /// Transient errors are handled by reconnect or retry machinery rather
    /// than surfaced to the caller where possible.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_))
    }

    // Convenience constructors

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn shard_config(message: impl Into<String>) -> Self {
        Self::ShardConfig(message.into())
    }

    pub fn rate_limit_exceeded(route: impl Into<String>, attempts: u32) -> Self {
        Self::RateLimitExceeded {
            route: route.into(),
            attempts,
        }
    }
}

/// Result type alias using `ClientError`
pub type ClientResult<T> = Result<T, ClientError>;
