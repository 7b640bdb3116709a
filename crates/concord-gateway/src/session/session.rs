//! Gateway session state machine
//!
//! One `GatewaySession` owns one shard's websocket connection through its
//! whole life: connect, hello, identify or resume, heartbeats, dispatches,
//! and reconnects. The session only ever returns an error for conditions
//! that no reconnect can fix; everything else is retried with backoff.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use concord_common::{ClientConfig, ClientError, ClientResult};
use concord_core::{EventKind, EventRecord};

use crate::dispatch::EventDispatcher;
use crate::protocol::{CloseCode, GatewayFrame, GatewayOpcode, GATEWAY_VERSION};
use crate::session::backoff::ReconnectBackoff;
use crate::session::heartbeat::Heartbeat;
use crate::session::state::SessionState;
use crate::shard::IdentifyGate;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Close code sent when tearing a connection down without giving the
/// session up; 1000 and 1001 would mark it unresumable on the server.
const RESUMABLE_CLOSE: u16 = 4000;

/// Outbound frames allowed per sliding window
const SEND_LIMIT: usize = 120;
const SEND_WINDOW: Duration = Duration::from_secs(60);
/// Slots withheld from payload frames so a heartbeat always fits
const HEARTBEAT_RESERVE: usize = 5;

const LATENCY_UNKNOWN: u64 = u64::MAX;

/// What to do after a connection ends
#[derive(Debug)]
enum Disposition {
    /// Stop for good; the client asked for it
    Shutdown,
    /// Connect again, optionally keeping the session for a resume
    Retry {
        keep_session: bool,
        delay: Option<Duration>,
    },
}

/// Resume credentials carried across connections
#[derive(Debug, Default)]
struct ResumeState {
    session_id: Option<String>,
    last_seq: u64,
    resume_url: Option<String>,
}

/// Mutable state of one live websocket connection
struct ConnState {
    writer: mpsc::Sender<Outbound>,
    heartbeat: Option<Heartbeat>,
    hello_deadline: Option<Instant>,
    pending_permit: Option<oneshot::Receiver<()>>,
}

/// One shard's connection to the gateway
pub struct GatewaySession {
    shard_id: u32,
    shard_count: u32,
    config: Arc<ClientConfig>,
    gateway_url: String,
    gate: Arc<IdentifyGate>,
    dispatcher: EventDispatcher,
    state_tx: watch::Sender<SessionState>,
    resume: Mutex<ResumeState>,
    latency_micros: AtomicU64,
}

impl GatewaySession {
    #[must_use]
    pub fn new(
        shard_id: u32,
        shard_count: u32,
        config: Arc<ClientConfig>,
        gateway_url: String,
        gate: Arc<IdentifyGate>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            shard_id,
            shard_count,
            config,
            gateway_url,
            gate,
            dispatcher,
            state_tx,
            resume: Mutex::new(ResumeState::default()),
            latency_micros: AtomicU64::new(LATENCY_UNKNOWN),
        }
    }

    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch every state transition
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Round trip time of the last acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        match self.latency_micros.load(Ordering::Relaxed) {
            LATENCY_UNKNOWN => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }

    /// Session id of the current or last established session
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.resume.lock().session_id.clone()
    }

    /// Drive the session until shutdown or a fatal close.
    ///
    /// # Errors
    /// Returns an error only when reconnecting cannot help: the token was
    /// rejected or the shard configuration is wrong.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ClientResult<()> {
        let mut backoff = ReconnectBackoff::new();
        loop {
            if *shutdown.borrow() {
                self.set_state(SessionState::Disconnected);
                return Ok(());
            }
            match self.run_connection(&mut shutdown, &mut backoff).await {
                Ok(Disposition::Shutdown) => {
                    self.set_state(SessionState::Disconnected);
                    return Ok(());
                }
                Ok(Disposition::Retry {
                    keep_session,
                    delay,
                }) => {
                    if !keep_session {
                        self.clear_session();
                    }
                    self.set_state(SessionState::Reconnecting);
                    let wait = delay.unwrap_or_else(|| backoff.next_delay());
                    info!(
                        shard = self.shard_id,
                        wait_ms = wait.as_millis() as u64,
                        resumable = self.resume.lock().session_id.is_some(),
                        "reconnecting after delay"
                    );
                    if !wait_or_shutdown(&mut shutdown, wait).await {
                        self.set_state(SessionState::Disconnected);
                        return Ok(());
                    }
                }
                Err(err) => {
                    self.set_state(SessionState::FatallyClosed);
                    return Err(err);
                }
            }
        }
    }

    /// One connection from dial to close
    async fn run_connection(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut ReconnectBackoff,
    ) -> ClientResult<Disposition> {
        self.set_state(SessionState::Connecting);
        let url = self.connect_url();
        debug!(shard = self.shard_id, %url, "opening gateway connection");

        let stream = match connect_async(&url).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                warn!(shard = self.shard_id, error = %err, "gateway connect failed");
                return Ok(Disposition::Retry {
                    keep_session: true,
                    delay: None,
                });
            }
        };
        let (sink, mut source) = stream.split();

        let (writer_tx, writer_rx) = mpsc::channel(64);
        let mut writer = tokio::spawn(write_loop(sink, writer_rx));

        self.set_state(SessionState::WaitingHello);
        let mut conn = ConnState {
            writer: writer_tx,
            heartbeat: None,
            hello_deadline: Some(Instant::now() + self.config.hello_timeout()),
            pending_permit: None,
        };

        let disposition = loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        send_close(&conn.writer, 1000, "shutting down").await;
                        break Ok(Disposition::Shutdown);
                    }
                }

                message = source.next() => {
                    match message {
                        Some(Ok(msg)) => match self.on_message(msg, &mut conn, backoff).await {
                            Ok(None) => {}
                            Ok(Some(disposition)) => break Ok(disposition),
                            Err(err) => break Err(err),
                        },
                        Some(Err(err)) => {
                            warn!(shard = self.shard_id, error = %err, "gateway read failed");
                            break Ok(Disposition::Retry { keep_session: true, delay: None });
                        }
                        None => {
                            info!(shard = self.shard_id, "gateway connection closed by peer");
                            break Ok(Disposition::Retry { keep_session: true, delay: None });
                        }
                    }
                }

                permit = recv_permit(&mut conn.pending_permit) => {
                    conn.pending_permit = None;
                    if permit.is_err() {
                        // The gate runner is gone, which only happens on teardown.
                        break Ok(Disposition::Shutdown);
                    }
                    debug!(shard = self.shard_id, "identify slot granted");
                    self.send_identify(&conn.writer).await;
                }

                () = sleep_until(conn.heartbeat.as_ref().map_or_else(far_future, Heartbeat::next_beat)) => {
                    if !self.beat(&mut conn).await {
                        info!(shard = self.shard_id, "heartbeat ack missing, discarding connection");
                        send_close(&conn.writer, RESUMABLE_CLOSE, "heartbeat ack missing").await;
                        break Ok(Disposition::Retry { keep_session: true, delay: None });
                    }
                }

                () = sleep_until(conn.hello_deadline.unwrap_or_else(far_future)) => {
                    warn!(shard = self.shard_id, "no hello within the deadline");
                    send_close(&conn.writer, RESUMABLE_CLOSE, "hello timeout").await;
                    break Ok(Disposition::Retry { keep_session: true, delay: None });
                }
            }
        };

        finish_writer(conn.writer, &mut writer).await;
        disposition
    }

    async fn on_message(
        &self,
        message: Message,
        conn: &mut ConnState,
        backoff: &mut ReconnectBackoff,
    ) -> ClientResult<Option<Disposition>> {
        match message {
            Message::Text(text) => {
                let frame = match GatewayFrame::parse(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(shard = self.shard_id, error = %err, "discarding malformed frame");
                        return Ok(None);
                    }
                };
                self.on_frame(frame, conn, backoff).await
            }
            Message::Close(frame) => {
                let close = frame.map_or(CloseCode::Other(1005), |frame| {
                    CloseCode::from_u16(u16::from(frame.code))
                });
                info!(shard = self.shard_id, code = %close, "gateway sent close");
                close_disposition(close).map(Some)
            }
            Message::Ping(payload) => {
                let _ = conn
                    .writer
                    .send(Outbound::Control(Message::Pong(payload)))
                    .await;
                Ok(None)
            }
            Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => Ok(None),
        }
    }

    async fn on_frame(
        &self,
        frame: GatewayFrame,
        conn: &mut ConnState,
        backoff: &mut ReconnectBackoff,
    ) -> ClientResult<Option<Disposition>> {
        match frame.op {
            GatewayOpcode::Hello => Ok(self.on_hello(&frame.d, conn).await),
            GatewayOpcode::Dispatch => {
                self.on_dispatch(frame, backoff);
                Ok(None)
            }
            GatewayOpcode::Heartbeat => {
                // The server wants a beat right now, outside the cadence.
                let seq = self.resume.lock().last_seq;
                if let Some(hb) = conn.heartbeat.as_mut() {
                    hb.on_sent(Instant::now());
                }
                let _ = conn
                    .writer
                    .send(Outbound::Heartbeat(GatewayFrame::heartbeat(seq)))
                    .await;
                Ok(None)
            }
            GatewayOpcode::HeartbeatAck => {
                if let Some(hb) = conn.heartbeat.as_mut() {
                    let latency = hb.on_ack(Instant::now());
                    self.latency_micros
                        .store(latency.as_micros() as u64, Ordering::Relaxed);
                    debug!(
                        shard = self.shard_id,
                        latency_ms = latency.as_millis() as u64,
                        "heartbeat acknowledged"
                    );
                }
                Ok(None)
            }
            GatewayOpcode::Reconnect => {
                info!(shard = self.shard_id, "server requested reconnect");
                send_close(&conn.writer, RESUMABLE_CLOSE, "reconnect requested").await;
                Ok(Some(Disposition::Retry {
                    keep_session: true,
                    delay: None,
                }))
            }
            GatewayOpcode::InvalidSession => {
                let resumable = frame.d.as_bool().unwrap_or(false);
                let delay = Duration::from_secs(rand::thread_rng().gen_range(1..=5));
                info!(shard = self.shard_id, resumable, "session invalidated");
                send_close(&conn.writer, RESUMABLE_CLOSE, "session invalidated").await;
                Ok(Some(Disposition::Retry {
                    keep_session: resumable,
                    delay: Some(delay),
                }))
            }
            GatewayOpcode::Identify | GatewayOpcode::Resume | GatewayOpcode::Unknown(_) => {
                debug!(shard = self.shard_id, op = %frame.op, "ignoring unexpected opcode");
                Ok(None)
            }
        }
    }

    /// Start heartbeating and open the session, resuming when possible
    async fn on_hello(&self, data: &Value, conn: &mut ConnState) -> Option<Disposition> {
        conn.hello_deadline = None;
        let Some(interval_ms) = data.get("heartbeat_interval").and_then(Value::as_u64) else {
            warn!(shard = self.shard_id, "hello frame without heartbeat interval");
            send_close(&conn.writer, RESUMABLE_CLOSE, "malformed hello").await;
            return Some(Disposition::Retry {
                keep_session: true,
                delay: None,
            });
        };
        let interval = Duration::from_millis(interval_ms);
        conn.heartbeat = Some(Heartbeat::new(interval, Instant::now()));

        let (session_id, seq) = {
            let resume = self.resume.lock();
            (resume.session_id.clone(), resume.last_seq)
        };
        if let Some(session_id) = session_id {
            self.set_state(SessionState::Resuming);
            info!(shard = self.shard_id, seq, "resuming session");
            let frame = GatewayFrame::resume(&self.config.token, &session_id, seq);
            let _ = conn.writer.send(Outbound::Payload(frame)).await;
        } else {
            // A fresh identify has to wait for its slot behind the gate.
            self.set_state(SessionState::Identifying);
            debug!(shard = self.shard_id, "waiting for identify slot");
            conn.pending_permit = Some(self.gate.acquire(self.shard_id));
        }
        None
    }

    async fn send_identify(&self, writer: &mpsc::Sender<Outbound>) {
        info!(shard = self.shard_id, "identifying");
        let frame = GatewayFrame::identify(
            &self.config.token,
            self.shard_id,
            self.shard_count,
            self.config.gateway.intents,
            self.config.gateway.large_threshold,
        );
        let _ = writer.send(Outbound::Payload(frame)).await;
    }

    fn on_dispatch(&self, frame: GatewayFrame, backoff: &mut ReconnectBackoff) {
        let sequence = frame.s.unwrap_or(0);
        if sequence > 0 {
            let mut resume = self.resume.lock();
            if sequence > resume.last_seq {
                resume.last_seq = sequence;
            }
        }

        let Some(name) = frame.t.as_deref() else {
            warn!(shard = self.shard_id, "dispatch frame without event name");
            return;
        };

        match name {
            "READY" => {
                let session_id = frame
                    .d
                    .get("session_id")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let resume_url = frame
                    .d
                    .get("resume_gateway_url")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                {
                    let mut resume = self.resume.lock();
                    resume.session_id = session_id;
                    resume.resume_url = resume_url;
                }
                backoff.reset();
                self.set_state(SessionState::Connected);
                info!(shard = self.shard_id, "session established");
            }
            "RESUMED" => {
                backoff.reset();
                self.set_state(SessionState::Connected);
                info!(shard = self.shard_id, "session resumed");
            }
            _ => {}
        }

        match EventKind::from_str(name) {
            Some(kind) => {
                let record = EventRecord::new(self.shard_id, kind, sequence, frame.d);
                self.dispatcher.enqueue(record);
            }
            None => {
                debug!(shard = self.shard_id, event = name, "dropping unrecognized event");
            }
        }
    }

    /// Send the scheduled heartbeat; false means the last one was never acked
    async fn beat(&self, conn: &mut ConnState) -> bool {
        let Some(hb) = conn.heartbeat.as_mut() else {
            return true;
        };
        if !hb.is_acked() {
            return false;
        }
        let seq = self.resume.lock().last_seq;
        hb.on_sent(Instant::now());
        let _ = conn
            .writer
            .send(Outbound::Heartbeat(GatewayFrame::heartbeat(seq)))
            .await;
        true
    }

    fn connect_url(&self) -> String {
        let resume_url = self.resume.lock().resume_url.clone();
        let base = resume_url.unwrap_or_else(|| self.gateway_url.clone());
        format!(
            "{}/?v={GATEWAY_VERSION}&encoding=json",
            base.trim_end_matches('/')
        )
    }

    fn clear_session(&self) {
        let mut resume = self.resume.lock();
        if resume.session_id.is_some() {
            debug!(shard = self.shard_id, "dropping session credentials");
        }
        *resume = ResumeState::default();
    }

    fn set_state(&self, next: SessionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                debug!(shard = self.shard_id, from = %state, to = %next, "session state changed");
                *state = next;
                true
            }
        });
    }
}

/// Map a close code to what the session should do about it
fn close_disposition(close: CloseCode) -> ClientResult<Disposition> {
    if close.is_fatal() {
        let message = format!("gateway refused the connection: {close}");
        return match close {
            CloseCode::AuthenticationFailed => Err(ClientError::authentication(message)),
            _ => Err(ClientError::shard_config(message)),
        };
    }
    Ok(Disposition::Retry {
        keep_session: !close.invalidates_session(),
        delay: None,
    })
}

/// Sleep out the wait, or return false when shutdown arrives first
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        tokio::select! {
            () = sleep_until(deadline) => return true,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}

async fn recv_permit(
    slot: &mut Option<oneshot::Receiver<()>>,
) -> Result<(), oneshot::error::RecvError> {
    match slot.as_mut() {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365)
}

async fn send_close(writer: &mpsc::Sender<Outbound>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: WsCloseCode::from(code),
        reason: reason.to_owned().into(),
    };
    let _ = writer
        .send(Outbound::Control(Message::Close(Some(frame))))
        .await;
}

/// Give the writer a moment to flush the close frame, then cut it loose
async fn finish_writer(writer_tx: mpsc::Sender<Outbound>, writer: &mut JoinHandle<()>) {
    drop(writer_tx);
    if timeout(Duration::from_secs(5), &mut *writer).await.is_err() {
        writer.abort();
    }
}

/// Frame queued for the writer task
enum Outbound {
    /// Identify, resume, and other payload frames
    Payload(GatewayFrame),
    /// Heartbeats, which may also use the reserved slots
    Heartbeat(GatewayFrame),
    /// Raw control messages (pong, close)
    Control(Message),
}

/// Writer task: serializes frames onto the socket under the send budget
async fn write_loop(mut sink: WsSink, mut rx: mpsc::Receiver<Outbound>) {
    let mut budget = SendBudget::new();
    while let Some(outbound) = rx.recv().await {
        let (frame, heartbeat) = match outbound {
            Outbound::Payload(frame) => (frame, false),
            Outbound::Heartbeat(frame) => (frame, true),
            Outbound::Control(message) => {
                if sink.send(message).await.is_err() {
                    break;
                }
                continue;
            }
        };
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "dropping unserializable frame");
                continue;
            }
        };
        budget.acquire(heartbeat).await;
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Sliding window budget for outbound frames.
///
/// The platform drops connections that send too many frames per minute.
/// Payload frames may use the window minus a reserve; heartbeats may use
/// the whole window, so a busy writer can never starve the keepalive.
struct SendBudget {
    limit: usize,
    reserve: usize,
    window: Duration,
    sent: VecDeque<Instant>,
}

impl SendBudget {
    fn new() -> Self {
        Self {
            limit: SEND_LIMIT,
            reserve: HEARTBEAT_RESERVE,
            window: SEND_WINDOW,
            sent: VecDeque::with_capacity(SEND_LIMIT),
        }
    }

    #[cfg(test)]
    fn with_limits(limit: usize, reserve: usize, window: Duration) -> Self {
        Self {
            limit,
            reserve,
            window,
            sent: VecDeque::with_capacity(limit),
        }
    }

    async fn acquire(&mut self, heartbeat: bool) {
        let cap = if heartbeat {
            self.limit
        } else {
            self.limit - self.reserve
        };
        loop {
            let now = Instant::now();
            while self
                .sent
                .front()
                .is_some_and(|&sent| now.duration_since(sent) >= self.window)
            {
                self.sent.pop_front();
            }
            if self.sent.len() < cap {
                self.sent.push_back(now);
                return;
            }
            // Oldest send whose expiry frees a slot for this class.
            let wake = self.sent[self.sent.len() - cap] + self.window;
            sleep_until(wake).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payload_sends_leave_room_for_heartbeats() {
        let mut budget = SendBudget::with_limits(3, 1, Duration::from_millis(300));
        let start = Instant::now();
        budget.acquire(false).await;
        budget.acquire(false).await;
        assert!(start.elapsed() < Duration::from_millis(100));

        // The payload cap is reached but the reserved slot is still open.
        budget.acquire(true).await;
        assert!(start.elapsed() < Duration::from_millis(100));

        // The next payload frame has to wait for the window to roll.
        budget.acquire(false).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_fatal_close_codes_map_to_errors() {
        let err = close_disposition(CloseCode::AuthenticationFailed).unwrap_err();
        assert!(matches!(err, ClientError::Authentication(_)));

        let err = close_disposition(CloseCode::ShardingRequired).unwrap_err();
        assert!(matches!(err, ClientError::ShardConfig(_)));

        let err = close_disposition(CloseCode::DisallowedIntents).unwrap_err();
        assert!(matches!(err, ClientError::ShardConfig(_)));
    }

    #[test]
    fn test_close_codes_that_drop_the_session() {
        match close_disposition(CloseCode::SessionTimedOut) {
            Ok(Disposition::Retry { keep_session, .. }) => assert!(!keep_session),
            other => panic!("unexpected disposition: {other:?}"),
        }
        match close_disposition(CloseCode::Other(1000)) {
            Ok(Disposition::Retry { keep_session, .. }) => assert!(!keep_session),
            other => panic!("unexpected disposition: {other:?}"),
        }
        match close_disposition(CloseCode::RateLimited) {
            Ok(Disposition::Retry { keep_session, .. }) => assert!(keep_session),
            other => panic!("unexpected disposition: {other:?}"),
        }
    }
}
