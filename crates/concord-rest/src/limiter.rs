//! Request scheduling against server rate limits
//!
//! Every request joins a FIFO queue keyed by method, route template, and
//! major parameter. Each queue has at most one request in flight; a
//! drainer task works the queue off, pausing whenever the server-reported
//! budget is spent. When responses reveal that several route keys share a
//! server-side bucket, their queues are merged so the shared budget is
//! respected.
//!
//! On top of the per-bucket budgets sits a platform-wide ceiling and a
//! global block set by 429 responses marked global.

use crate::bucket::Bucket;
use crate::executor::RequestExecutor;
use crate::headers::global_from_body;
use crate::request::{RestRequest, RestResponse};
use crate::routes::RouteKey;
use concord_common::{ClientError, ClientResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Extra delivery tries after a server error response
const SERVER_ERROR_RETRIES: u32 = 3;
/// Base of the linear backoff between server error retries
const SERVER_ERROR_BACKOFF: Duration = Duration::from_millis(500);
/// Wait applied to a 429 that carried no usable retry information
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);
/// Width of the platform-wide request counting window
const GLOBAL_WINDOW: Duration = Duration::from_secs(1);

/// Rate-limited request scheduler
///
/// Cheap to clone; all clones share the same queues and budgets.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    executor: Arc<dyn RequestExecutor>,
    /// Route key to its waiting queue. Several keys may point at one
    /// queue once the server reveals they share a bucket.
    routes: DashMap<RouteKey, Arc<QueueHandle>>,
    /// Server-assigned bucket id to the queue that owns it
    by_bucket_id: DashMap<String, Arc<QueueHandle>>,
    global: GlobalLimit,
    max_attempts: u32,
    shutdown: AtomicBool,
}

struct QueueHandle {
    state: Mutex<QueueState>,
}

struct QueueState {
    queue: VecDeque<Pending>,
    /// Whether a drainer task currently owns this queue. Set under this
    /// lock before spawning, cleared under it only after observing an
    /// empty queue, so no push can be left behind without a drainer.
    draining: bool,
    bucket: Bucket,
}

impl QueueHandle {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                draining: false,
                bucket: Bucket::new(),
            }),
        }
    }
}

struct Pending {
    request: RestRequest,
    /// Delivery attempts consumed so far, counting 429 re-runs
    attempts: u32,
    tx: oneshot::Sender<ClientResult<RestResponse>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        max_attempts: u32,
        global_requests_per_second: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                routes: DashMap::new(),
                by_bucket_id: DashMap::new(),
                global: GlobalLimit::new(global_requests_per_second),
                max_attempts: max_attempts.max(1),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a request and wait for its final outcome
    ///
    /// Requests with the same key complete in submission order. A request
    /// resolves once it got a non-429 response, ran out of attempts, hit
    /// a terminal error, or the limiter shut down.
    ///
    /// # Errors
    /// See [`ClientError`]; rate limit waits themselves are not errors.
    pub async fn submit(&self, request: RestRequest) -> ClientResult<RestResponse> {
        if self.is_shutdown() {
            return Err(ClientError::ShuttingDown);
        }

        let key = request.key();
        let handle = self
            .inner
            .routes
            .entry(key)
            .or_insert_with(|| Arc::new(QueueHandle::new()))
            .value()
            .clone();

        let (tx, rx) = oneshot::channel();
        {
            let mut st = handle.state.lock();
            if self.is_shutdown() {
                return Err(ClientError::ShuttingDown);
            }
            st.queue.push_back(Pending {
                request,
                attempts: 0,
                tx,
            });
            if !st.draining {
                st.draining = true;
                tokio::spawn(drain(self.inner.clone(), handle.clone()));
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ShuttingDown),
        }
    }

    /// Stop accepting work and fail everything still queued
    ///
    /// Requests already on the wire run to completion; nothing new is
    /// sent afterwards.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("rate limiter shutting down, failing queued requests");

        let handles: Vec<Arc<QueueHandle>> = self
            .inner
            .routes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handle in handles {
            let drained: Vec<Pending> = {
                let mut st = handle.state.lock();
                st.queue.drain(..).collect()
            };
            for pending in drained {
                let _ = pending.tx.send(Err(ClientError::ShuttingDown));
            }
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }
}

type DrainFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>>;

/// Works one queue off until it is empty
///
/// Boxed so that queue handoffs can respawn drainers from within a drain.
fn drain(inner: Arc<Inner>, handle: Arc<QueueHandle>) -> DrainFuture {
    Box::pin(async move {
        loop {
            let step = {
                let mut st = handle.state.lock();
                if inner.shutdown.load(Ordering::SeqCst) {
                    st.draining = false;
                    Step::FailShutdown(st.queue.drain(..).collect())
                } else if st.queue.is_empty() {
                    st.draining = false;
                    Step::Idle
                } else {
                    match st.bucket.next_delay(Instant::now()) {
                        Some(delay) => Step::Wait(delay),
                        None => match st.queue.pop_front() {
                            Some(pending) => Step::Run(pending),
                            None => {
                                st.draining = false;
                                Step::Idle
                            }
                        },
                    }
                }
            };

            match step {
                Step::Idle => return,
                Step::FailShutdown(pendings) => {
                    for pending in pendings {
                        let _ = pending.tx.send(Err(ClientError::ShuttingDown));
                    }
                    return;
                }
                Step::Wait(delay) => {
                    debug!(
                        delay_ms = delay.as_millis() as u64,
                        "bucket exhausted, waiting for reset"
                    );
                    sleep(delay).await;
                }
                Step::Run(pending) => run_one(&inner, &handle, pending).await,
            }
        }
    })
}

enum Step {
    Idle,
    FailShutdown(Vec<Pending>),
    Wait(Duration),
    Run(Pending),
}

/// Deliver one queued request and settle its outcome
async fn run_one(inner: &Arc<Inner>, handle: &Arc<QueueHandle>, mut pending: Pending) {
    let key = pending.request.key();

    // The key may have been merged into another queue while this request
    // sat waiting; hand it over instead of running it on a stale budget.
    if let Some(current) = inner.routes.get(&key).map(|entry| entry.value().clone()) {
        if !Arc::ptr_eq(&current, handle) {
            let mut st = current.state.lock();
            st.queue.push_back(pending);
            if !st.draining {
                st.draining = true;
                tokio::spawn(drain(inner.clone(), current.clone()));
            }
            return;
        }
    }

    // Platform-wide ceiling and global 429 block
    if let Err(wait) = inner.global.try_acquire(Instant::now()) {
        handle.state.lock().queue.push_front(pending);
        debug!(wait_ms = wait.as_millis() as u64, "holding for the platform-wide limit");
        sleep(wait).await;
        return;
    }

    pending.attempts += 1;
    let mut response = match inner.executor.execute(&pending.request).await {
        Ok(response) => response,
        Err(e) => {
            let _ = pending.tx.send(Err(e));
            return;
        }
    };

    let mut retries = 0;
    while response.status.is_server_error() && retries < SERVER_ERROR_RETRIES {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        retries += 1;
        let backoff = SERVER_ERROR_BACKOFF * retries;
        warn!(
            status = %response.status,
            retry = retries,
            route = %key,
            "server error, retrying after backoff"
        );
        sleep(backoff).await;
        wait_global(inner).await;
        match inner.executor.execute(&pending.request).await {
            Ok(r) => response = r,
            Err(e) => {
                let _ = pending.tx.send(Err(e));
                return;
            }
        }
    }

    settle(inner, handle, pending, response);
}

/// Apply the response to bucket state and complete or re-queue the request
fn settle(inner: &Arc<Inner>, handle: &Arc<QueueHandle>, pending: Pending, response: RestResponse) {
    let now = Instant::now();
    let ratelimit = response.ratelimit();
    let key = pending.request.key();

    let owner = match &ratelimit.bucket_id {
        Some(id) => resolve_bucket(inner, handle, &key, id),
        None => handle.clone(),
    };

    {
        let mut st = owner.state.lock();
        st.bucket.apply_headers(&ratelimit, now);
    }

    if response.status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .retry_after()
            .or(ratelimit.reset_after)
            .unwrap_or(DEFAULT_RETRY_AFTER);

        if ratelimit.global || global_from_body(&response.body) {
            warn!(
                retry_after_ms = retry_after.as_millis() as u64,
                "hit the global rate limit, blocking all requests"
            );
            inner.global.block_until(now + retry_after);
        } else {
            warn!(
                route = %key,
                retry_after_ms = retry_after.as_millis() as u64,
                "hit a bucket rate limit"
            );
            owner.state.lock().bucket.exhaust_until(now + retry_after);
        }

        if inner.shutdown.load(Ordering::SeqCst) {
            let _ = pending.tx.send(Err(ClientError::ShuttingDown));
            return;
        }
        if pending.attempts >= inner.max_attempts {
            let _ = pending.tx.send(Err(ClientError::rate_limit_exceeded(
                key.to_string(),
                pending.attempts,
            )));
            return;
        }

        // Back to the head of the queue: this was the oldest request for
        // its key and must stay ahead of everything queued behind it.
        let mut st = owner.state.lock();
        st.queue.push_front(pending);
        if !st.draining {
            st.draining = true;
            tokio::spawn(drain(inner.clone(), owner.clone()));
        }
        return;
    }

    if response.status == StatusCode::UNAUTHORIZED {
        let _ = pending.tx.send(Err(ClientError::authentication(
            "the server rejected the token (status 401)",
        )));
        return;
    }

    // Routes without rate limit headers get paced by a fixed interval
    if !ratelimit.has_bucket_info() {
        if let Some(interval) = pending.request.route.ratelimit_override() {
            owner.state.lock().bucket.exhaust_until(now + interval);
        }
    }

    let _ = pending.tx.send(Ok(response));
}

/// Find the queue owning the server-assigned bucket id, merging this key
/// into it when the id turns out to belong to another key's queue
fn resolve_bucket(
    inner: &Arc<Inner>,
    current: &Arc<QueueHandle>,
    key: &RouteKey,
    bucket_id: &str,
) -> Arc<QueueHandle> {
    let canonical = inner
        .by_bucket_id
        .entry(bucket_id.to_string())
        .or_insert_with(|| current.clone())
        .value()
        .clone();
    if Arc::ptr_eq(&canonical, current) {
        return canonical;
    }

    debug!(bucket_id, route = %key, "merging route into shared rate limit bucket");

    // Move this key's queued requests over before re-pointing the route,
    // so later submissions cannot overtake them.
    let moved: Vec<Pending> = {
        let mut st = current.state.lock();
        let mut kept = VecDeque::with_capacity(st.queue.len());
        let mut moved = Vec::new();
        while let Some(pending) = st.queue.pop_front() {
            if pending.request.key() == *key {
                moved.push(pending);
            } else {
                kept.push_back(pending);
            }
        }
        st.queue = kept;
        moved
    };
    if !moved.is_empty() {
        let mut st = canonical.state.lock();
        st.queue.extend(moved);
        if !st.draining {
            st.draining = true;
            tokio::spawn(drain(inner.clone(), canonical.clone()));
        }
    }
    inner.routes.insert(key.clone(), canonical.clone());
    canonical
}

/// Wait until the platform-wide limit admits one more request
async fn wait_global(inner: &Arc<Inner>) {
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        match inner.global.try_acquire(Instant::now()) {
            Ok(()) => return,
            Err(wait) => sleep(wait).await,
        }
    }
}

/// Platform-wide request accounting
///
/// Combines a fixed one-second counting window with a block deadline set
/// by global 429 responses.
struct GlobalLimit {
    state: Mutex<GlobalState>,
}

struct GlobalState {
    blocked_until: Option<Instant>,
    window_start: Instant,
    used: u32,
    per_second: u32,
}

impl GlobalLimit {
    fn new(per_second: u32) -> Self {
        Self {
            state: Mutex::new(GlobalState {
                blocked_until: None,
                window_start: Instant::now(),
                used: 0,
                per_second: per_second.max(1),
            }),
        }
    }

    /// Claim one request slot, or report how long to wait for one
    fn try_acquire(&self, now: Instant) -> Result<(), Duration> {
        let mut st = self.state.lock();
        if let Some(blocked_until) = st.blocked_until {
            if now < blocked_until {
                return Err(blocked_until - now);
            }
            st.blocked_until = None;
        }
        if now >= st.window_start + GLOBAL_WINDOW {
            st.window_start = now;
            st.used = 0;
        }
        if st.used < st.per_second {
            st.used += 1;
            Ok(())
        } else {
            Err(st.window_start + GLOBAL_WINDOW - now)
        }
    }

    /// Hold back every request until the deadline; never shortens an
    /// existing block
    fn block_until(&self, until: Instant) {
        let mut st = self.state.lock();
        match st.blocked_until {
            Some(existing) if existing >= until => {}
            _ => st.blocked_until = Some(until),
        }
    }
}
