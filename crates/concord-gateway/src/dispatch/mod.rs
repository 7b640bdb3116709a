//! Event delivery to registered listeners

mod dispatcher;
mod registry;

pub use dispatcher::EventDispatcher;
pub use registry::ListenerRegistry;
