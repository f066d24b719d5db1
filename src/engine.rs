//! Top-level wiring: topic resolution, broker connection, reconciler task.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::broker::{
    BrokerEndpoint, ConnectionManager, ConnectionState, DefaultTransportFactory, SessionHandle,
    TransportFactory,
};
use crate::config::ConveyorConfig;
use crate::error::EngineError;
use crate::reconcile::{Persister, Reconciler, Renderer};
use crate::state::{OperationalState, StateStore};
use crate::topic::{self, AssetId, Topic};

/// Inbound messages buffered between the broker and the reconciler.
const MESSAGE_BUFFER: usize = 256;

/// One running reconciliation engine for a single asset.
pub struct TelemetryEngine {
    asset_id: AssetId,
    connection: ConnectionManager,
    reconciler: JoinHandle<StateStore>,
}

impl TelemetryEngine {
    /// Validate configuration, seed the store and start the reconciler task.
    ///
    /// Uses the built-in MQTT and NATS transports. Must be called inside a
    /// tokio runtime. Does not connect; call [`connect`](Self::connect).
    pub fn start(
        config: &ConveyorConfig,
        persister: Arc<dyn Persister>,
        renderer: Arc<dyn Renderer>,
        initial: Option<OperationalState>,
    ) -> Result<Self, EngineError> {
        Self::with_factory(
            config,
            Arc::new(DefaultTransportFactory),
            persister,
            renderer,
            initial,
        )
    }

    /// Like [`start`](Self::start) with a caller-supplied transport factory.
    pub fn with_factory(
        config: &ConveyorConfig,
        factory: Arc<dyn TransportFactory>,
        persister: Arc<dyn Persister>,
        renderer: Arc<dyn Renderer>,
        initial: Option<OperationalState>,
    ) -> Result<Self, EngineError> {
        let asset_id = AssetId::new(&config.asset.id)?;
        let topic = topic::resolve(
            asset_id.as_str(),
            config.broker.topic_override.as_deref(),
            &config.broker.namespace,
        )?;
        let endpoint = BrokerEndpoint::parse(&config.broker.url)?;
        let policy = config.reconnect_policy()?;

        let store = match initial {
            Some(seed) if !seed.is_empty() => {
                renderer.render(seed.clone());
                StateStore::seeded(seed)
            }
            _ => StateStore::new(),
        };

        let connection = ConnectionManager::new(
            endpoint,
            topic,
            config.connect_options(),
            policy,
            factory,
        );

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        connection.on_message(tx);

        let reconciler = Reconciler::new(asset_id.clone(), store, persister, renderer);
        let task = tokio::spawn(reconciler.run(rx));

        info!(
            asset_id = %asset_id,
            topic = %connection.topic(),
            broker = %connection.endpoint(),
            "Telemetry engine started"
        );

        Ok(Self {
            asset_id,
            connection,
            reconciler: task,
        })
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn topic(&self) -> &Topic {
        self.connection.topic()
    }

    /// Only `Configuration` and `TransportUnavailable` come back from here.
    pub async fn connect(&self) -> Result<SessionHandle, EngineError> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Disconnect, drain queued messages and stop the reconciler.
    ///
    /// Returns the final store, or `None` if the reconciler task died.
    pub async fn shutdown(self) -> Option<StateStore> {
        self.connection.disconnect().await;
        self.connection.clear_message_handler();

        match self.reconciler.await {
            Ok(store) => {
                info!(asset_id = %self.asset_id, "Telemetry engine stopped");
                Some(store)
            }
            Err(e) => {
                error!(asset_id = %self.asset_id, error = %e, "Reconciler task failed");
                None
            }
        }
    }
}
