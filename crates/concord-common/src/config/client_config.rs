//! Client configuration structs
//!
//! Loads configuration from environment variables, with builder-style
//! setters for programmatic construction.

use concord_core::Intents;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;

/// Main client configuration
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Bot token used for REST authorization and gateway identify
    pub token: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// REST layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the platform's REST API
    #[serde(default = "default_api_base")]
    pub base_url: String,
    /// Total per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Maximum delivery attempts per request (429 re-enqueues included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Platform-wide request ceiling per second
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
}

/// Gateway layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Use this gateway URL instead of the bootstrap-provided one
    #[serde(default)]
    pub url_override: Option<String>,
    /// Fixed shard count; the bootstrap recommendation is used when unset
    #[serde(default)]
    pub shard_count: Option<u32>,
    /// Event groups to subscribe to
    #[serde(default)]
    pub intents: Intents,
    /// Member-list threshold sent in the identify payload
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    /// How long to wait for the server hello before reconnecting, seconds
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
}

/// Event dispatch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on concurrently draining context queues
    #[serde(default = "default_dispatch_workers")]
    pub worker_count: usize,
}

// Default value functions
fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_global_requests_per_second() -> u32 {
    50
}

fn default_large_threshold() -> u32 {
    250
}

fn default_hello_timeout_secs() -> u64 {
    60
}

fn default_dispatch_workers() -> usize {
    16
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_attempts: default_max_attempts(),
            global_requests_per_second: default_global_requests_per_second(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url_override: None,
            shard_count: None,
            intents: Intents::default(),
            large_threshold: default_large_threshold(),
            hello_timeout_secs: default_hello_timeout_secs(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: default_dispatch_workers(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with the given token and default settings
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api: ApiConfig::default(),
            gateway: GatewayConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or
    /// carry unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token =
            env::var("CONCORD_TOKEN").map_err(|_| ConfigError::MissingVar("CONCORD_TOKEN"))?;

        let mut config = Self::new(token);

        if let Ok(base) = env::var("CONCORD_API_BASE") {
            config.api.base_url = base;
        }
        config.api.request_timeout_secs =
            parse_var("CONCORD_API_TIMEOUT_SECS", default_request_timeout_secs())?;
        config.api.connect_timeout_secs = parse_var(
            "CONCORD_API_CONNECT_TIMEOUT_SECS",
            default_connect_timeout_secs(),
        )?;
        config.api.max_attempts = parse_var("CONCORD_MAX_ATTEMPTS", default_max_attempts())?;
        config.api.global_requests_per_second = parse_var(
            "CONCORD_GLOBAL_REQUESTS_PER_SECOND",
            default_global_requests_per_second(),
        )?;

        config.gateway.url_override = env::var("CONCORD_GATEWAY_URL").ok();
        config.gateway.shard_count = match env::var("CONCORD_SHARD_COUNT") {
            Ok(s) => {
                let count: u32 = s.parse().map_err(|_| {
                    ConfigError::InvalidValue("CONCORD_SHARD_COUNT", s.clone())
                })?;
                if count == 0 {
                    return Err(ConfigError::InvalidValue("CONCORD_SHARD_COUNT", s));
                }
                Some(count)
            }
            Err(_) => None,
        };
        if let Ok(s) = env::var("CONCORD_INTENTS") {
            let intents = Intents::parse(&s)
                .map_err(|_| ConfigError::InvalidValue("CONCORD_INTENTS", s))?;
            config.gateway.intents = intents;
        }
        config.gateway.large_threshold =
            parse_var("CONCORD_LARGE_THRESHOLD", default_large_threshold())?;
        config.gateway.hello_timeout_secs =
            parse_var("CONCORD_HELLO_TIMEOUT_SECS", default_hello_timeout_secs())?;

        config.dispatch.worker_count =
            parse_var("CONCORD_DISPATCH_WORKERS", default_dispatch_workers())?;

        Ok(config)
    }

    /// Set the REST base URL
    #[must_use]
    pub fn with_api_base(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }

    /// Force a specific gateway URL, skipping the bootstrap-provided one
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway.url_override = Some(url.into());
        self
    }

    /// Fix the shard count instead of using the bootstrap recommendation
    #[must_use]
    pub fn with_shard_count(mut self, count: u32) -> Self {
        self.gateway.shard_count = Some(count);
        self
    }

    /// Set the gateway intents
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.gateway.intents = intents;
        self
    }

    /// Set the maximum delivery attempts per REST request
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.api.max_attempts = attempts;
        self
    }

    /// Total per-request timeout as a Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Connect timeout as a Duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.api.connect_timeout_secs)
    }

    /// Hello timeout as a Duration
    #[must_use]
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.hello_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(s) => s
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, s)),
        Err(_) => Ok(default),
    }
}

// The token never appears in debug output
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"<redacted>")
            .field("api", &self.api)
            .field("gateway", &self.gateway)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
