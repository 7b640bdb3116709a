//! Per-shard session lifecycle

mod backoff;
mod heartbeat;
mod session;
mod state;

pub use backoff::ReconnectBackoff;
pub use session::GatewaySession;
pub use state::SessionState;
