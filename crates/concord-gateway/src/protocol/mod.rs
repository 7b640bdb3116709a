//! Gateway wire protocol: opcodes, frames, and close codes

mod close_code;
mod frame;
mod opcode;

pub use close_code::CloseCode;
pub use frame::GatewayFrame;
pub use opcode::GatewayOpcode;

/// Gateway protocol version spoken by this client
pub const GATEWAY_VERSION: u8 = 10;
