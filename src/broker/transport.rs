use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::broker::{mqtt::MqttTransport, nats::NatsTransport};
use crate::error::EngineError;
use crate::topic::Topic;

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_NATS_PORT: u16 = 4222;

/// Wire protocol selected from the broker URL scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    Mqtt,
    Nats,
    /// Parsed fine, but no transport is compiled in for it.
    Unsupported(String),
}

/// Parsed broker URL.
#[derive(Clone, Debug)]
pub struct BrokerEndpoint {
    url: Url,
    protocol: Protocol,
    host: String,
    port: u16,
}

impl BrokerEndpoint {
    /// Parse a broker URL such as `mqtt://test.mosquitto.org:1883` or
    /// `nats://localhost:4222`.
    ///
    /// Malformed URLs are configuration errors. An unknown scheme is accepted
    /// here and reported as `TransportUnavailable` when connecting.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| EngineError::config(format!("invalid broker URL '{}': {}", raw, e)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| EngineError::config(format!("broker URL '{}' has no host", raw)))?
            .to_string();

        let (protocol, default_port) = match url.scheme() {
            "mqtt" | "tcp" => (Protocol::Mqtt, Some(DEFAULT_MQTT_PORT)),
            "nats" => (Protocol::Nats, Some(DEFAULT_NATS_PORT)),
            other => (Protocol::Unsupported(other.to_string()), url.port_or_known_default()),
        };

        let port = url
            .port()
            .or(default_port)
            .ok_or_else(|| EngineError::config(format!("broker URL '{}' has no port", raw)))?;

        Ok(Self {
            url,
            protocol,
            host,
            port,
        })
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.url.scheme(), self.host, self.port)
    }
}

/// Per-session client options.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            client_id: random_client_id("conveyor-passport"),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// `<prefix>-<8 hex chars>`, unique enough to avoid broker-side session takeover.
pub fn random_client_id(prefix: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{:08x}", prefix, suffix)
}

/// One message received from the broker.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// What a transport yields while connected.
#[derive(Debug)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// The connection is gone; the transport must be `connect`ed again.
    Dropped(String),
}

/// Transport-level failures, mapped into [`EngineError`] by the connection manager.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("transport is not connected")]
    NotConnected,
}

/// A single broker connection.
///
/// `connect` may be called again after `next_event` reported a drop; the
/// implementation re-establishes the connection from scratch.
#[async_trait]
pub trait BrokerTransport: Send {
    /// Establish the connection and wait for the broker's acknowledgement.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Subscribe with at-most-once delivery.
    async fn subscribe(&mut self, topic: &Topic) -> Result<(), TransportError>;

    /// Wait for the next inbound message or for the connection to drop.
    async fn next_event(&mut self) -> TransportEvent;

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn close(&mut self);
}

/// Builds transports for an endpoint.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        endpoint: &BrokerEndpoint,
        options: &ConnectOptions,
    ) -> Result<Box<dyn BrokerTransport>, EngineError>;
}

/// MQTT via `rumqttc`, NATS via `async-nats`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(
        &self,
        endpoint: &BrokerEndpoint,
        options: &ConnectOptions,
    ) -> Result<Box<dyn BrokerTransport>, EngineError> {
        match endpoint.protocol() {
            Protocol::Mqtt => Ok(Box::new(MqttTransport::new(
                endpoint.host(),
                endpoint.port(),
                options.clone(),
            ))),
            Protocol::Nats => Ok(Box::new(NatsTransport::new(endpoint, options.clone()))),
            Protocol::Unsupported(scheme) => Err(EngineError::TransportUnavailable(format!(
                "no transport for scheme '{}'",
                scheme
            ))),
        }
    }
}
