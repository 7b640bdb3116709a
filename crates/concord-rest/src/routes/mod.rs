//! REST route catalog and rate limit keys

mod route;

pub use route::{RestRoute, RouteKey};
