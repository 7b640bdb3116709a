//! Rate limit header parsing
//!
//! The server describes each route's budget in response headers. Header
//! names are matched case-insensitively; any header may be absent, and a
//! response with none of them leaves the bucket untouched.

use reqwest::header::HeaderMap;
use std::time::Duration;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Parsed rate limit metadata from one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Total budget of the bucket within one window
    pub limit: Option<u32>,
    /// Requests left in the current window
    pub remaining: Option<u32>,
    /// Seconds until the window resets, possibly fractional
    pub reset_after: Option<Duration>,
    /// Server-assigned bucket id for this route
    pub bucket_id: Option<String>,
    /// Whether a 429 applies to the whole platform rather than one bucket
    pub global: bool,
    /// How long a 429 asks us to wait before retrying
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Extract rate limit metadata from a response header map
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        Self {
            limit: header_value(headers, HEADER_LIMIT),
            remaining: header_value(headers, HEADER_REMAINING),
            reset_after: header_value::<f64>(headers, HEADER_RESET_AFTER)
                .and_then(duration_from_secs),
            bucket_id: headers
                .get(HEADER_BUCKET)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
            global: headers
                .get(HEADER_GLOBAL)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            retry_after: header_value::<f64>(headers, HEADER_RETRY_AFTER)
                .and_then(duration_from_secs),
        }
    }

    /// Whether the response carried any budget description at all
    #[must_use]
    pub fn has_bucket_info(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset_after.is_some()
    }
}

/// Read the `retry_after` field from a 429 response body, in seconds
///
/// Newer API versions put a fractional value in the body that is more
/// precise than the integral `Retry-After` header.
#[must_use]
pub fn retry_after_from_body(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after")
        .and_then(serde_json::Value::as_f64)
        .and_then(duration_from_secs)
}

/// Read the `global` flag from a 429 response body
#[must_use]
pub fn global_from_body(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("global").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn duration_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
