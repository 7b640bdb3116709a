//! # concord-gateway
//!
//! Real-time half of the client: websocket sessions per shard, identify
//! pacing, heartbeats, resume handling, and ordered event dispatch to
//! registered listeners.

pub mod client;
pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod shard;

pub use client::Client;
pub use dispatch::{EventDispatcher, ListenerRegistry};
pub use protocol::{CloseCode, GatewayFrame, GatewayOpcode, GATEWAY_VERSION};
pub use session::{GatewaySession, SessionState};
pub use shard::{IdentifyGate, ShardSupervisor};
