//! Tracing subscriber configuration
//!
//! Structured logging for the client. Applications embedding the client
//! can call `init_telemetry` early in main, or install their own
//! subscriber and skip this module entirely.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Record span open/close events
    pub span_events: bool,
    /// Include file and line number in output
    pub file_line: bool,
    /// Include thread names in output
    pub thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            span_events: false,
            file_line: false,
            thread_names: false,
        }
    }
}

impl TelemetryConfig {
    /// Verbose preset for local development
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "concord=debug,info".to_string(),
            json: false,
            span_events: true,
            file_line: true,
            thread_names: true,
        }
    }

    /// JSON preset for deployed environments
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            span_events: false,
            file_line: false,
            thread_names: false,
        }
    }
}

/// Initialize telemetry with default settings
///
/// # Panics
/// Panics if a global subscriber is already installed. Use
/// `try_init_telemetry` when that is not certain.
pub fn init_telemetry() {
    init_telemetry_with_config(&TelemetryConfig::default());
}

/// Initialize telemetry with the given configuration
///
/// # Panics
/// Panics if a global subscriber is already installed.
pub fn init_telemetry_with_config(config: &TelemetryConfig) {
    if let Err(e) = try_init_telemetry_with_config(config) {
        panic!("failed to initialize telemetry: {e}");
    }
}

/// Initialize telemetry with default settings, without panicking
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn try_init_telemetry() -> Result<(), TelemetryError> {
    try_init_telemetry_with_config(&TelemetryConfig::default())
}

/// Initialize telemetry with the given configuration, without panicking
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn try_init_telemetry_with_config(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .with_thread_names(config.thread_names);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|_| TelemetryError::AlreadyInitialized)?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_span_events(span_events)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .with_thread_names(config.thread_names);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|_| TelemetryError::AlreadyInitialized)?;
    }

    Ok(())
}

/// Telemetry setup errors
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}
