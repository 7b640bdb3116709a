//! Reconnect delay policy

use std::time::Duration;

use rand::Rng;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);
const MULTIPLIER: f64 = 2.0;

/// Exponential backoff with jitter for reconnect attempts.
///
/// Each failure doubles the base delay up to a cap, and the returned delay
/// is scattered between 50% and 150% of the base so that shards which lost
/// their connections together do not reconnect together.
#[derive(Debug)]
pub struct ReconnectBackoff {
    attempt: u32,
}

impl ReconnectBackoff {
    #[must_use]
    pub const fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Number of consecutive failures so far
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next attempt; advances the counter
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let base = INITIAL_DELAY.as_secs_f64() * MULTIPLIER.powi(exponent as i32);
        let capped = base.min(MAX_DELAY.as_secs_f64());
        let jittered = capped * rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(jittered.min(MAX_DELAY.as_secs_f64()))
    }

    /// Clear the counter once a connection is established again
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}
