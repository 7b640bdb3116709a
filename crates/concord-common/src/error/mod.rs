//! Error types shared across the client

mod client_error;

pub use client_error::{ClientError, ClientResult};
