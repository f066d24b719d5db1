use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::broker::{random_client_id, ConnectOptions, ReconnectPolicy};
use crate::error::EngineError;
use crate::persist::SaveMethod;
use crate::topic::DEFAULT_NAMESPACE;

/// Complete Conveyor configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConveyorConfig {
    #[serde(default)]
    pub asset: AssetConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Which asset this engine instance follows
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetConfig {
    #[serde(default)]
    pub id: String,
}

/// Broker connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Pins the topic verbatim instead of `<namespace>/<asset>/status`
    #[serde(default)]
    pub topic_override: Option<String>,
    /// Random `conveyor-passport-<hex>` when unset
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_broker_url() -> String {
    "mqtt://test.mosquitto.org:1883".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            namespace: default_namespace(),
            topic_override: None,
            client_id: None,
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Reconnection backoff bounds (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_cap_ms")]
    pub cap_ms: u64,
}

fn default_base_ms() -> u64 {
    1500
}

fn default_cap_ms() -> u64 {
    15_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            cap_ms: default_cap_ms(),
        }
    }
}

/// Product API used for saving deltas and loading the initial snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub method: SaveMethod,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_load_initial_snapshot")]
    pub load_initial_snapshot: bool,
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_load_initial_snapshot() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            method: SaveMethod::default(),
            csrf_token: None,
            timeout_secs: default_timeout_secs(),
            load_initial_snapshot: default_load_initial_snapshot(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// How long the "updated" indicator stays visible
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: u64,
}

fn default_notification_ttl_ms() -> u64 {
    3000
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            notification_ttl_ms: default_notification_ttl_ms(),
        }
    }
}

impl ConveyorConfig {
    /// Overlay `CONVEYOR_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Unparsable numbers are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CONVEYOR_ASSET_ID") {
            self.asset.id = v;
        }
        if let Some(v) = lookup("CONVEYOR_BROKER_URL") {
            self.broker.url = v;
        }
        if let Some(v) = lookup("CONVEYOR_TOPIC_OVERRIDE") {
            self.broker.topic_override = Some(v);
        }
        if let Some(v) = lookup("CONVEYOR_NAMESPACE") {
            self.broker.namespace = v;
        }
        if let Some(v) = lookup("CONVEYOR_API_BASE") {
            self.persistence.api_base = v;
        }
        if let Some(v) = lookup("CONVEYOR_CSRF_TOKEN") {
            self.persistence.csrf_token = Some(v);
        }
        if let Some(v) = lookup("CONVEYOR_RECONNECT_BASE_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.reconnect.base_ms = n;
            }
        }
        if let Some(v) = lookup("CONVEYOR_RECONNECT_CAP_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.reconnect.cap_ms = n;
            }
        }
    }

    /// Backoff bounds; `cap_ms < base_ms` is a configuration error.
    pub fn reconnect_policy(&self) -> Result<ReconnectPolicy, EngineError> {
        ReconnectPolicy::from_millis(self.reconnect.base_ms, self.reconnect.cap_ms)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let client_id = self
            .broker
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| random_client_id("conveyor-passport"));

        ConnectOptions {
            client_id,
            keep_alive: Duration::from_secs(self.broker.keep_alive_secs),
            connect_timeout: Duration::from_secs(self.broker.connect_timeout_secs),
        }
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence.timeout_secs)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.display.notification_ttl_ms)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<ConveyorConfig, EngineError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        EngineError::config(format!("cannot read config {}: {}", path.display(), e))
    })?;
    toml::from_str(&contents)
        .map_err(|e| EngineError::config(format!("invalid config {}: {}", path.display(), e)))
}
