//! Top level client facade
//!
//! Ties the REST side and the shard fleet together behind one handle:
//! register listeners, connect, and wait for the client to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use concord_common::{ClientConfig, ClientError, ClientResult};
use concord_core::{EventHandler, EventKind};
use concord_rest::RestClient;

use crate::dispatch::EventDispatcher;
use crate::session::GatewaySession;
use crate::shard::ShardSupervisor;

/// A connected chat client: REST access plus the gateway shard fleet
pub struct Client {
    config: Arc<ClientConfig>,
    rest: RestClient,
    dispatcher: EventDispatcher,
    supervisor: Mutex<Option<Arc<ShardSupervisor>>>,
    connecting: AtomicBool,
}

impl Client {
    /// Build a client without connecting it yet.
    ///
    /// # Errors
    /// Fails when the token cannot be put into an authorization header.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let config = Arc::new(config);
        let rest = RestClient::new(&config)?;
        let dispatcher = EventDispatcher::new(config.dispatch.worker_count);
        Ok(Self {
            config,
            rest,
            dispatcher,
            supervisor: Mutex::new(None),
            connecting: AtomicBool::new(false),
        })
    }

    /// The REST half of the client
    #[must_use]
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Register a handler for one event kind
    pub fn on(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.dispatcher.on(kind, handler);
    }

    /// Register a handler that sees every event
    pub fn on_any(&self, handler: Arc<dyn EventHandler>) {
        self.dispatcher.on_any(handler);
    }

    /// Bootstrap from the API and bring the shard fleet up.
    ///
    /// # Errors
    /// Fails when the bootstrap call fails or the shard configuration is
    /// unusable.
    pub async fn connect(&self) -> ClientResult<()> {
        if self.connecting.swap(true, Ordering::SeqCst) {
            debug!("connect called more than once");
            return Ok(());
        }
        match self.try_connect().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.connecting.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn try_connect(&self) -> ClientResult<()> {
        let info = self.rest.get_gateway_bot().await?;
        let shard_count = self.config.gateway.shard_count.unwrap_or(info.shards);
        if shard_count == 0 {
            return Err(ClientError::shard_config("shard count resolved to zero"));
        }
        let gateway_url = self
            .config
            .gateway
            .url_override
            .clone()
            .unwrap_or_else(|| info.url.clone());

        info!(shards = shard_count, url = %gateway_url, "connecting to gateway");
        let supervisor = Arc::new(ShardSupervisor::start(
            Arc::clone(&self.config),
            gateway_url,
            shard_count,
            &info.session_start_limit,
            self.dispatcher.clone(),
        ));
        *self.supervisor.lock() = Some(Arc::clone(&supervisor));

        // A fatal shard error stops the REST side from taking calls too.
        let rest = self.rest.clone();
        tokio::spawn(async move {
            if let Err(err) = supervisor.closed().await {
                error!(error = %err, "client closed fatally");
                rest.shutdown();
            }
        });
        Ok(())
    }

    /// Wait until the client has stopped.
    ///
    /// # Errors
    /// Returns the fatal error that brought the client down.
    pub async fn closed(&self) -> ClientResult<()> {
        let supervisor = self.supervisor.lock().clone();
        match supervisor {
            Some(supervisor) => supervisor.closed().await,
            None => Ok(()),
        }
    }

    /// Stop the shard fleet, then refuse further REST calls
    pub async fn shutdown(&self) {
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            supervisor.shutdown().await;
        }
        self.rest.shutdown();
        info!("client shut down");
    }

    /// Shard sessions, empty until connected
    #[must_use]
    pub fn shards(&self) -> Vec<Arc<GatewaySession>> {
        self.supervisor
            .lock()
            .as_ref()
            .map_or_else(Vec::new, |supervisor| supervisor.sessions().to_vec())
    }
}
