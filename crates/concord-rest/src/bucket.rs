//! Rate limit bucket budget
//!
//! A bucket tracks what the server last told us about one rate limit
//! group: total budget, requests left, and when the window resets. The
//! response headers are authoritative; a new bucket optimistically allows
//! a single probe request and learns its budget from the reply.

use crate::headers::RateLimitHeaders;
use std::time::Duration;
use tokio::time::Instant;

/// Budget state of one rate limit bucket
#[derive(Debug, Clone)]
pub struct Bucket {
    limit: u32,
    remaining: u32,
    reset_at: Option<Instant>,
    bucket_id: Option<String>,
}

impl Bucket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            limit: 1,
            remaining: 1,
            reset_at: None,
            bucket_id: None,
        }
    }

    /// Server-assigned id, once a response has revealed it
    #[must_use]
    pub fn bucket_id(&self) -> Option<&str> {
        self.bucket_id.as_deref()
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Overwrite budget state with what a response reported
    pub fn apply_headers(&mut self, headers: &RateLimitHeaders, now: Instant) {
        if let Some(limit) = headers.limit {
            self.limit = limit;
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = remaining;
        }
        if let Some(reset_after) = headers.reset_after {
            self.reset_at = Some(now + reset_after);
        }
        if let Some(bucket_id) = &headers.bucket_id {
            if self.bucket_id.as_deref() != Some(bucket_id) {
                self.bucket_id = Some(bucket_id.clone());
            }
        }
    }

    /// Mark the bucket empty until the given deadline
    pub fn exhaust_until(&mut self, until: Instant) {
        self.remaining = 0;
        self.reset_at = Some(until);
    }

    /// How long the next request must wait, or `None` if it may go now
    ///
    /// A passed reset refills the budget. A bucket that is empty but has
    /// no known reset is treated as available; waiting on an unknown
    /// deadline would park it forever.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        if self.remaining > 0 {
            return None;
        }
        match self.reset_at {
            Some(reset_at) if now < reset_at => Some(reset_at - now),
            Some(_) => {
                self.remaining = self.limit.max(1);
                self.reset_at = None;
                None
            }
            None => None,
        }
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}
