//! # concord-rest
//!
//! Rate-limited REST layer for the Concord chat client.
//!
//! Every request is submitted to the [`RateLimiter`], which groups requests
//! into server-assigned buckets, keeps at most one request per bucket in
//! flight, and honors the rate limit headers returned with each response.
//! The HTTP transport itself sits behind the [`RequestExecutor`] trait so
//! tests can script responses without a network.

pub mod bucket;
pub mod client;
pub mod executor;
pub mod headers;
pub mod limiter;
pub mod request;
pub mod routes;

pub use client::{GatewayInfo, RestClient, SessionStartLimit};
pub use executor::{HttpExecutor, RequestExecutor};
pub use headers::RateLimitHeaders;
pub use limiter::RateLimiter;
pub use request::{RestRequest, RestResponse};
pub use routes::{RestRoute, RouteKey};
