//! Test helpers for integration tests
//!
//! Provides a scripted gateway server the client can connect to, plus
//! utilities for watching session state and collecting delivered events.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use concord_common::ClientConfig;
use concord_core::{DispatchContext, EventHandler, EventRecord};
use concord_gateway::{EventDispatcher, GatewaySession, SessionState, ShardSupervisor};
use concord_rest::SessionStartLimit;

/// Counter for unique test ports
static PORT_COUNTER: AtomicU16 = AtomicU16::new(21000);

/// How long scripted exchanges wait before giving up
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Get a unique port for testing
pub fn get_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Scripted gateway server the client under test connects to
pub struct FakeGateway {
    pub url: String,
    connections: mpsc::Receiver<GatewayConnection>,
    _accept: JoinHandle<()>,
}

impl FakeGateway {
    /// Bind a listener and start accepting websocket connections
    pub async fn start() -> Result<Self> {
        let port = get_test_port();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(8);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if tx.send(GatewayConnection { ws }).await.is_err() {
                    return;
                }
            }
        });

        Ok(Self {
            url: format!("ws://{actual_addr}"),
            connections: rx,
            _accept: accept,
        })
    }

    /// Wait for the client to open its next connection
    pub async fn next_connection(&mut self) -> Result<GatewayConnection> {
        match timeout(RECV_TIMEOUT, self.connections.recv()).await {
            Ok(Some(connection)) => Ok(connection),
            _ => anyhow::bail!("no gateway connection arrived in time"),
        }
    }

    /// Assert that the client does not connect within the wait
    pub async fn expect_no_connection(&mut self, wait: Duration) -> Result<()> {
        match timeout(wait, self.connections.recv()).await {
            Err(_) => Ok(()),
            Ok(_) => anyhow::bail!("client opened a connection it should not have"),
        }
    }
}

/// One accepted websocket connection, driven frame by frame from the test
pub struct GatewayConnection {
    ws: WebSocketStream<TcpStream>,
}

impl GatewayConnection {
    /// Send one frame as JSON text
    pub async fn send(&mut self, frame: Value) -> Result<()> {
        self.ws.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Receive the next text frame as JSON
    pub async fn recv(&mut self) -> Result<Value> {
        loop {
            let message = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow::anyhow!("no frame arrived in time"))?
                .ok_or_else(|| anyhow::anyhow!("connection ended"))??;
            match message {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => anyhow::bail!("connection closed by client"),
                _ => {}
            }
        }
    }

    /// Receive the next payload frame and require its opcode.
    ///
    /// Heartbeats arriving in between are acknowledged and skipped, since
    /// their timing is jittered. Any other unexpected opcode fails the
    /// test.
    pub async fn recv_op(&mut self, op: u64) -> Result<Value> {
        loop {
            let frame = self.recv().await?;
            let got = frame.get("op").and_then(Value::as_u64);
            if got == Some(op) {
                return Ok(frame);
            }
            if got == Some(1) {
                self.send(crate::fixtures::heartbeat_ack()).await?;
                continue;
            }
            anyhow::bail!("expected op {op}, got frame {frame}");
        }
    }

    /// Receive the next heartbeat without acknowledging it
    pub async fn expect_heartbeat(&mut self) -> Result<Value> {
        let frame = self.recv().await?;
        let got = frame.get("op").and_then(Value::as_u64);
        if got == Some(1) {
            Ok(frame)
        } else {
            anyhow::bail!("expected a heartbeat, got frame {frame}");
        }
    }

    /// Wait for the client to close, returning the close code if present
    pub async fn expect_close(&mut self) -> Result<Option<u16>> {
        loop {
            match timeout(RECV_TIMEOUT, self.ws.next()).await {
                Err(_) => anyhow::bail!("client never closed the connection"),
                Ok(None) => return Ok(None),
                Ok(Some(Err(_))) => return Ok(None),
                Ok(Some(Ok(Message::Close(frame)))) => {
                    return Ok(frame.map(|frame| u16::from(frame.code)));
                }
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    /// Close the connection from the server side with a code
    pub async fn close(&mut self, code: u16) -> Result<()> {
        self.ws
            .send(Message::Close(Some(CloseFrame {
                code: code.into(),
                reason: "".into(),
            })))
            .await?;
        Ok(())
    }
}

/// Session start budget for tests that never exhaust it
pub fn session_limit(remaining: u32, max_concurrency: u32) -> SessionStartLimit {
    SessionStartLimit {
        total: 1000,
        remaining,
        reset_after: 86_400_000,
        max_concurrency,
    }
}

/// Start a shard fleet pointed at the fake gateway
pub fn start_fleet(
    config: ClientConfig,
    url: &str,
    shard_count: u32,
    dispatcher: EventDispatcher,
) -> Arc<ShardSupervisor> {
    Arc::new(ShardSupervisor::start(
        Arc::new(config),
        url.to_string(),
        shard_count,
        &session_limit(1000, 1),
        dispatcher,
    ))
}

/// Wait until the session reaches the wanted state
pub async fn wait_for_state(
    session: &GatewaySession,
    wanted: SessionState,
    within: Duration,
) -> Result<()> {
    let mut states = session.state_changes();
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if *states.borrow_and_update() == wanted {
            return Ok(());
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, states.changed()).await {
            Ok(Ok(())) => {}
            _ => anyhow::bail!(
                "session never reached {wanted}, still {}",
                session.state()
            ),
        }
    }
}

/// Listener that records every delivered event
pub struct CollectingHandler {
    delay: Option<Duration>,
    events: Mutex<Vec<(DispatchContext, u64)>>,
}

impl CollectingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delay: None,
            events: Mutex::new(Vec::new()),
        })
    }

    /// A handler that sleeps before recording, to expose ordering bugs
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Sequence numbers seen for one context, in delivery order
    pub fn sequences(&self, context: DispatchContext) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter(|(seen, _)| *seen == context)
            .map(|(_, sequence)| *sequence)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventHandler for CollectingHandler {
    async fn on_event(&self, event: &EventRecord) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().push((event.context, event.sequence));
    }
}
