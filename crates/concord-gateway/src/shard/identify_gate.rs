//! Serialized identify admission across shards
//!
//! The platform allows only a limited number of fresh identifies: one per
//! rate limit bucket every few seconds, and a daily budget of session
//! starts. Every session asks the gate for a slot before sending its
//! identify, and a single runner task hands slots out in arrival order
//! per bucket.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use concord_rest::SessionStartLimit;

/// Pause between identifies within one bucket
const DEFAULT_IDENTIFY_SPACING: Duration = Duration::from_secs(5);

/// Period after which the session start budget refills
const SESSION_START_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

struct Waiter {
    shard_id: u32,
    grant: oneshot::Sender<()>,
}

/// Hands out identify slots, paced per bucket and capped by the session
/// start budget
pub struct IdentifyGate {
    tx: mpsc::UnboundedSender<Waiter>,
}

impl IdentifyGate {
    #[must_use]
    pub fn new(limit: &SessionStartLimit) -> Self {
        Self::with_spacing(limit, DEFAULT_IDENTIFY_SPACING)
    }

    /// Build a gate with a custom pause between identifies
    #[must_use]
    pub fn with_spacing(limit: &SessionStartLimit, spacing: Duration) -> Self {
        let concurrency = limit.max_concurrency.max(1) as usize;
        let now = Instant::now();
        let runner = GateRunner {
            spacing,
            buckets: (0..concurrency).map(|_| VecDeque::new()).collect(),
            next_grant: vec![now; concurrency],
            remaining: limit.remaining,
            total: limit.total.max(1),
            reset_at: now + Duration::from_millis(limit.reset_after),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(runner.run(rx));
        Self { tx }
    }

    /// Queue up for an identify slot.
    ///
    /// The returned receiver resolves when the shard may send its
    /// identify. Dropping it gives the slot up without spending any
    /// budget.
    #[must_use]
    pub fn acquire(&self, shard_id: u32) -> oneshot::Receiver<()> {
        let (grant, permit) = oneshot::channel();
        let _ = self.tx.send(Waiter { shard_id, grant });
        permit
    }
}

struct GateRunner {
    spacing: Duration,
    buckets: Vec<VecDeque<oneshot::Sender<()>>>,
    next_grant: Vec<Instant>,
    remaining: u32,
    total: u32,
    reset_at: Instant,
}

impl GateRunner {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Waiter>) {
        loop {
            match self.next_wake() {
                None => match rx.recv().await {
                    Some(waiter) => self.admit(waiter),
                    None => return,
                },
                Some(wake) => {
                    tokio::select! {
                        received = rx.recv() => match received {
                            Some(waiter) => self.admit(waiter),
                            None => return,
                        },
                        () = sleep_until(wake) => self.grant_due(),
                    }
                }
            }
        }
    }

    fn admit(&mut self, waiter: Waiter) {
        let bucket = (waiter.shard_id as usize) % self.buckets.len();
        debug!(shard = waiter.shard_id, bucket, "shard queued for identify");
        self.buckets[bucket].push_back(waiter.grant);
    }

    /// Earliest moment any queued waiter could be granted
    fn next_wake(&self) -> Option<Instant> {
        let mut wake: Option<Instant> = None;
        for (bucket, queue) in self.buckets.iter().enumerate() {
            if queue.is_empty() {
                continue;
            }
            let mut due = self.next_grant[bucket];
            if self.remaining == 0 && self.reset_at > due {
                due = self.reset_at;
            }
            wake = Some(wake.map_or(due, |wake| wake.min(due)));
        }
        wake
    }

    fn grant_due(&mut self) {
        let now = Instant::now();
        self.refill(now);
        for bucket in 0..self.buckets.len() {
            loop {
                if self.remaining == 0 || self.next_grant[bucket] > now {
                    break;
                }
                let Some(grant) = self.buckets[bucket].pop_front() else {
                    break;
                };
                if grant.send(()).is_ok() {
                    self.remaining -= 1;
                    self.next_grant[bucket] = now + self.spacing;
                    debug!(bucket, remaining = self.remaining, "identify slot granted");
                }
                // A dropped waiter neither paces the bucket nor spends budget.
            }
        }
    }

    fn refill(&mut self, now: Instant) {
        while self.reset_at <= now {
            self.reset_at += SESSION_START_WINDOW;
            self.remaining = self.total;
            debug!(remaining = self.remaining, "session start budget refilled");
        }
    }
}
