//! Decoded gateway events and their dispatch grouping

mod event_kind;
mod record;

pub use event_kind::EventKind;
pub use record::{DispatchContext, EventRecord};
