//! # concord-core
//!
//! Domain layer containing platform value objects, decoded event records, and
//! the listener trait. This crate has zero dependencies on transport
//! infrastructure (HTTP client, WebSocket, etc.).

pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use events::{DispatchContext, EventKind, EventRecord};
pub use traits::EventHandler;
pub use value_objects::{Intents, Snowflake, SnowflakeParseError};
