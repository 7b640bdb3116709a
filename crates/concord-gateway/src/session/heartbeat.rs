//! Heartbeat scheduling for one gateway connection

use std::time::Duration;

use tokio::time::Instant;

/// Tracks when the next heartbeat is due and whether the last one was
/// acknowledged.
///
/// The first beat fires after a random fraction of the interval so that
/// many sessions started at once do not all beat in the same instant.
/// From then on beats are spaced exactly one interval apart.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    next: Instant,
    acked: bool,
    last_sent: Instant,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        let first = interval.mul_f64(rand::random::<f64>());
        Self {
            interval,
            next: now + first,
            acked: true,
            last_sent: now,
        }
    }

    /// When the next beat should be sent
    pub(crate) fn next_beat(&self) -> Instant {
        self.next
    }

    /// Whether the previous beat got its ack back
    pub(crate) fn is_acked(&self) -> bool {
        self.acked
    }

    /// Record that a beat went out; returns false if the previous one was
    /// never acknowledged, which means the connection is a zombie.
    pub(crate) fn on_sent(&mut self, now: Instant) -> bool {
        let was_acked = self.acked;
        self.acked = false;
        self.last_sent = now;
        self.next = now + self.interval;
        was_acked
    }

    /// Record the ack and return the round trip latency
    pub(crate) fn on_ack(&mut self, now: Instant) -> Duration {
        self.acked = true;
        now.saturating_duration_since(self.last_sent)
    }
}
