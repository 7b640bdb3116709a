//! Shard fleet management

mod identify_gate;
mod supervisor;

pub use identify_gate::IdentifyGate;
pub use supervisor::ShardSupervisor;
