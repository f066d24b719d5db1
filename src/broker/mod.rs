// Broker transports and connection management

mod backoff;
mod connection;
mod mqtt;
mod nats;
mod transport;

pub use backoff::{ReconnectPolicy, BACKOFF_FACTOR};
pub use connection::{ConnectionManager, ConnectionState, SessionHandle};
pub use mqtt::MqttTransport;
pub use nats::NatsTransport;
pub use transport::{
    random_client_id, BrokerEndpoint, BrokerTransport, ConnectOptions, DefaultTransportFactory,
    InboundMessage, Protocol, TransportError, TransportEvent, TransportFactory,
};
