//! Telemetry and structured logging setup

mod tracing_setup;

pub use tracing_setup::{
    init_telemetry, init_telemetry_with_config, try_init_telemetry, try_init_telemetry_with_config,
    TelemetryConfig, TelemetryError,
};
