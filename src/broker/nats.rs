use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::broker::transport::{
    BrokerEndpoint, BrokerTransport, ConnectOptions, InboundMessage, TransportError,
    TransportEvent,
};
use crate::topic::Topic;

/// NATS core transport backed by `async-nats`.
///
/// async-nats reconnects on its own; its `Disconnected` event is surfaced as
/// a drop so the connection manager stays the single owner of reconnection.
pub struct NatsTransport {
    url: String,
    options: ConnectOptions,
    client: Option<async_nats::Client>,
    subscriber: Option<async_nats::Subscriber>,
    disconnects: Option<mpsc::UnboundedReceiver<String>>,
}

impl NatsTransport {
    pub fn new(endpoint: &BrokerEndpoint, options: ConnectOptions) -> Self {
        Self {
            url: format!("nats://{}:{}", endpoint.host(), endpoint.port()),
            options,
            client: None,
            subscriber: None,
            disconnects: None,
        }
    }

    fn reset(&mut self) {
        self.subscriber = None;
        self.disconnects = None;
        self.client = None;
    }
}

/// Client events that mean the session is gone.
///
/// A closed subscription is reported separately by `Subscriber::next`
/// returning `None`.
fn drop_reason(event: &async_nats::Event) -> Option<String> {
    match event {
        async_nats::Event::Disconnected => Some("NATS server disconnected".to_string()),
        _ => None,
    }
}

#[async_trait]
impl BrokerTransport for NatsTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.reset();

        info!(url = %self.url, client_id = %self.options.client_id, "Connecting to NATS");

        let (tx, rx) = mpsc::unbounded_channel();
        let nats_options = async_nats::ConnectOptions::new()
            .name(&self.options.client_id)
            .ping_interval(self.options.keep_alive)
            .event_callback(move |event| {
                let tx = tx.clone();
                async move {
                    match drop_reason(&event) {
                        Some(reason) => {
                            let _ = tx.send(reason);
                        }
                        None => debug!(event = ?event, "NATS event"),
                    }
                }
            });

        let timeout = self.options.connect_timeout;
        let client = tokio::time::timeout(timeout, nats_options.connect(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        self.client = Some(client);
        self.disconnects = Some(rx);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &Topic) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        let subscriber = client
            .subscribe(topic.as_str().to_string())
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        self.subscriber = Some(subscriber);
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        let (Some(subscriber), Some(disconnects)) =
            (self.subscriber.as_mut(), self.disconnects.as_mut())
        else {
            return TransportEvent::Dropped("not subscribed".to_string());
        };

        let event = tokio::select! {
            message = subscriber.next() => match message {
                Some(message) => TransportEvent::Message(InboundMessage::new(
                    message.subject.to_string(),
                    message.payload.to_vec(),
                )),
                None => TransportEvent::Dropped("NATS subscription ended".to_string()),
            },
            reason = disconnects.recv() => TransportEvent::Dropped(
                reason.unwrap_or_else(|| "NATS event channel closed".to_string()),
            ),
        };

        if matches!(event, TransportEvent::Dropped(_)) {
            self.reset();
        }
        event
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        client
            .flush()
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut subscriber) = self.subscriber.take() {
            if let Err(e) = subscriber.unsubscribe().await {
                debug!(error = %e, "NATS unsubscribe failed");
            }
        }
        self.reset();
    }
}
