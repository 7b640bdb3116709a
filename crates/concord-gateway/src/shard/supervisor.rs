//! Shard fleet lifecycle
//!
//! The supervisor owns one `GatewaySession` per shard, runs each in its
//! own task, and folds their fates together: a clean shutdown ends all of
//! them, and a fatal error on any one shard takes the whole client down.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use concord_common::{ClientConfig, ClientError, ClientResult};
use concord_rest::SessionStartLimit;

use crate::dispatch::EventDispatcher;
use crate::session::GatewaySession;
use crate::shard::IdentifyGate;

/// Why the fleet stopped, or that it has not
#[derive(Debug, Clone, Default)]
enum Terminal {
    #[default]
    Running,
    Closed(Option<ClientError>),
}

/// Runs and watches all shard sessions of one client
pub struct ShardSupervisor {
    sessions: Vec<Arc<GatewaySession>>,
    shutdown_tx: watch::Sender<bool>,
    terminal_tx: watch::Sender<Terminal>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShardSupervisor {
    /// Spawn one session task per shard
    #[must_use]
    pub fn start(
        config: Arc<ClientConfig>,
        gateway_url: String,
        shard_count: u32,
        start_limit: &SessionStartLimit,
        dispatcher: EventDispatcher,
    ) -> Self {
        let gate = Arc::new(IdentifyGate::new(start_limit));
        let (shutdown_tx, _) = watch::channel(false);
        let (terminal_tx, _) = watch::channel(Terminal::Running);

        info!(shards = shard_count, "starting shard fleet");
        let mut sessions = Vec::with_capacity(shard_count as usize);
        let mut tasks = Vec::with_capacity(shard_count as usize);
        for shard_id in 0..shard_count {
            let session = Arc::new(GatewaySession::new(
                shard_id,
                shard_count,
                Arc::clone(&config),
                gateway_url.clone(),
                Arc::clone(&gate),
                dispatcher.clone(),
            ));
            sessions.push(Arc::clone(&session));

            let shutdown_rx = shutdown_tx.subscribe();
            let shutdown = shutdown_tx.clone();
            let terminal = terminal_tx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = session.run(shutdown_rx).await {
                    error!(shard = session.shard_id(), error = %err, "shard closed fatally");
                    terminal.send_if_modified(|t| {
                        if matches!(t, Terminal::Running) {
                            *t = Terminal::Closed(Some(err));
                            true
                        } else {
                            false
                        }
                    });
                    // One dead shard means the fleet cannot stay up.
                    let _ = shutdown.send(true);
                }
            }));
        }

        Self {
            sessions,
            shutdown_tx,
            terminal_tx,
            tasks: Mutex::new(tasks),
        }
    }

    /// All sessions, indexed by shard id
    #[must_use]
    pub fn sessions(&self) -> &[Arc<GatewaySession>] {
        &self.sessions
    }

    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.sessions.len() as u32
    }

    /// Wait until the fleet has stopped.
    ///
    /// # Errors
    /// Returns the fatal error of the shard that brought the fleet down.
    pub async fn closed(&self) -> ClientResult<()> {
        let mut rx = self.terminal_tx.subscribe();
        loop {
            match &*rx.borrow_and_update() {
                Terminal::Running => {}
                Terminal::Closed(None) => return Ok(()),
                Terminal::Closed(Some(err)) => return Err(err.clone()),
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    /// Stop every session and wait for the tasks to finish
    pub async fn shutdown(&self) {
        info!("shutting down shard fleet");
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        self.terminal_tx.send_if_modified(|t| {
            if matches!(t, Terminal::Running) {
                *t = Terminal::Closed(None);
                true
            } else {
                false
            }
        });
    }
}
