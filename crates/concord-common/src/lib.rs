//! # concord-common
//!
//! Shared utilities including configuration, the client error taxonomy, and
//! telemetry setup.

pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{ApiConfig, ClientConfig, ConfigError, DispatchConfig, GatewayConfig};
pub use error::{ClientError, ClientResult};
pub use telemetry::{
    init_telemetry, init_telemetry_with_config, try_init_telemetry,
    try_init_telemetry_with_config, TelemetryConfig, TelemetryError,
};
