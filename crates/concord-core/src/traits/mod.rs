//! Listener traits (ports) - the seam between the core and entity code

mod handlers;

pub use handlers::EventHandler;
