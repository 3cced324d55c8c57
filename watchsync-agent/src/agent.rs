//! Agent lifecycle: wiring, startup and shutdown of the workers.

use crate::backoff::Backoff;
use crate::bootstrap::{self, BootstrapClient, DeviceCredentials};
use crate::catalog::{JsonRpcCatalog, MediaCatalog};
use crate::config::AgentConfig;
use crate::error::SyncResult;
use crate::events::{EventLogger, EventPublisher, SETUP_COMPLETE_EVENT};
use crate::notifications::NotificationCapture;
use crate::queue::PriorityQueue;
use crate::reconciler::Reconciler;
use crate::remote::{RemoteQueue, RemoteSyncConsumer, SqsRemoteQueue};
use crate::signal::Signal;
use crate::state::{ConnectionStatus, RuntimeState};
use crate::worker::{WorkerHandle, WorkerLoop};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use watchsync_auth::{CredentialBroker, StsFederation, TokenManager, TokenSource};

/// Collaborators the agent runs against.
pub struct AgentParts {
    pub config: AgentConfig,
    pub state: Arc<RuntimeState>,
    pub catalog: Arc<dyn MediaCatalog>,
    pub remote_queue: Arc<dyn RemoteQueue>,
    pub tokens: Arc<dyn TokenSource>,
}

/// The running agent.
pub struct Agent {
    state: Arc<RuntimeState>,
    capture: Arc<NotificationCapture>,
    events: EventLogger,
    reconciler: WorkerHandle,
    consumer: WorkerHandle,
    registered: Option<DeviceCredentials>,
}

impl Agent {
    /// [`connect`](Self::connect) against the JSON-RPC catalog named in
    /// `config.catalog`.
    pub async fn start(config: AgentConfig, stop: &Signal) -> SyncResult<Self> {
        let catalog = Arc::new(JsonRpcCatalog::from_config(&config.catalog)?);
        Self::connect(config, catalog, stop).await
    }

    /// Registers if needed, fetches device settings, and starts the
    /// workers against the real token, federation and queue services.
    ///
    /// Setting `stop` while setup is retrying abandons it.
    pub async fn connect(
        mut config: AgentConfig,
        catalog: Arc<dyn MediaCatalog>,
        stop: &Signal,
    ) -> SyncResult<Self> {
        let state = Arc::new(RuntimeState::from_config(&config.remote));
        let bootstrap = BootstrapClient::new(&config.bootstrap, &config.auth.user_agent)?;
        let registered = bootstrap::ensure_registered(&bootstrap, &mut config, &state).await?;
        config.validate()?;

        let tokens = Arc::new(TokenManager::new(config.auth.clone())?);
        let backoff = Backoff::new(
            config.delivery.max_backoff(),
            config.delivery.max_backoff_exponent,
        );
        bootstrap::run_setup(&bootstrap, tokens.as_ref(), &state, stop, backoff).await?;

        let broker = Arc::new(CredentialBroker::new(
            tokens.clone(),
            Arc::new(StsFederation::new(&config.federation)),
            config.federation.refresh_margin_secs,
        ));
        let remote_queue = Arc::new(SqsRemoteQueue::new(broker, state.clone(), &config.remote));

        let mut agent = Self::spawn(AgentParts {
            config,
            state,
            catalog,
            remote_queue,
            tokens,
        })?;
        agent.registered = registered;
        Ok(agent)
    }

    /// Starts the workers. Must be called inside a tokio runtime.
    pub fn spawn(parts: AgentParts) -> SyncResult<Self> {
        let AgentParts {
            config,
            state,
            catalog,
            remote_queue,
            tokens,
        } = parts;
        config.validate()?;

        let events = EventLogger::spawn(&config.delivery, tokens)?;
        let wakeup = Signal::new();

        let consumer = RemoteSyncConsumer::new(
            state.clone(),
            catalog.clone(),
            remote_queue,
            config.device_id(),
            wakeup.clone(),
            &config.remote,
        )
        .spawn();

        let local_queue = PriorityQueue::new();
        let capture = Arc::new(NotificationCapture::new(local_queue.clone()));
        let reconciler = WorkerLoop::new(
            "notification reconciler",
            local_queue,
            Signal::new(),
            Reconciler::new(state.clone(), catalog, events.publisher(), wakeup),
        )
        .spawn();

        info!("agent started for device {}", config.device_id());
        events.new_event(
            SETUP_COMPLETE_EVENT,
            Some(json!({
                "application": config.application,
                "system_info": config.system_info,
            })),
        );

        Ok(Self {
            state,
            capture,
            events,
            reconciler,
            consumer,
            registered: None,
        })
    }

    /// Where the host delivers its notifications.
    pub fn capture(&self) -> Arc<NotificationCapture> {
        self.capture.clone()
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.state
    }

    pub fn events(&self) -> EventPublisher {
        self.events.publisher()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.state.subscribe_status()
    }

    /// Credentials obtained by registering during [`connect`](Self::connect).
    pub fn registered_credentials(&self) -> Option<&DeviceCredentials> {
        self.registered.as_ref()
    }

    /// Stops all workers. The event logger goes last so events raised
    /// during shutdown are still queued. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        info!("agent shutting down");
        tokio::join!(self.consumer.stop(), self.reconciler.stop());
        self.state.set_status(ConnectionStatus::Offline);
        self.events.stop().await;
        info!("agent stopped");
    }
}
