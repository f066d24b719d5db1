use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubAck,
    SubscribeReasonCode,
};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

use crate::broker::transport::{
    BrokerTransport, ConnectOptions, InboundMessage, TransportError, TransportEvent,
};
use crate::topic::Topic;

/// Capacity of the rumqttc request queue.
const REQUEST_CAPACITY: usize = 10;

/// rumqttc rejects keep-alives below five seconds.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// MQTT 3.1.1 transport backed by `rumqttc`.
///
/// Each `connect` builds a fresh client/event-loop pair, so a dropped
/// session never leaks state into the next one.
pub struct MqttTransport {
    host: String,
    port: u16,
    options: ConnectOptions,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    /// Publishes that arrived while waiting for a SUBACK.
    pending: VecDeque<InboundMessage>,
}

impl MqttTransport {
    pub fn new(host: &str, port: u16, options: ConnectOptions) -> Self {
        Self {
            host: host.to_string(),
            port,
            options,
            client: None,
            eventloop: None,
            pending: VecDeque::new(),
        }
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(&self.options.client_id, &self.host, self.port);
        mqtt_options.set_keep_alive(self.options.keep_alive.max(MIN_KEEP_ALIVE));
        mqtt_options.set_clean_session(true);
        mqtt_options
    }

    fn reset(&mut self) {
        self.client = None;
        self.eventloop = None;
        self.pending.clear();
    }
}

/// Drive the event loop until the broker acknowledges the connection.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(TransportError::Connect(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }
}

/// Drive the event loop until the SUBACK for our SUBSCRIBE comes back.
///
/// Publishes seen along the way are buffered for `next_event`.
async fn wait_for_suback(
    eventloop: &mut EventLoop,
    pending: &mut VecDeque<InboundMessage>,
) -> Result<(), TransportError> {
    let mut pkid = None;
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Subscribe(id))) => pkid = Some(id),
            Ok(Event::Incoming(Packet::SubAck(ack)))
                if pkid.is_none() || pkid == Some(ack.pkid) =>
            {
                return check_suback(&ack);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                pending.push_back(InboundMessage::new(publish.topic, publish.payload.to_vec()));
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                return Err(TransportError::Subscribe(
                    "broker sent DISCONNECT".to_string(),
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(TransportError::Subscribe(e.to_string())),
        }
    }
}

fn check_suback(ack: &SubAck) -> Result<(), TransportError> {
    if ack
        .return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        return Err(TransportError::Subscribe(format!(
            "broker rejected subscription (pkid {})",
            ack.pkid
        )));
    }
    debug!(pkid = ack.pkid, codes = ?ack.return_codes, "Subscription acknowledged");
    Ok(())
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.reset();

        info!(
            host = %self.host,
            port = self.port,
            client_id = %self.options.client_id,
            "Connecting to MQTT broker"
        );

        let (client, mut eventloop) = AsyncClient::new(self.mqtt_options(), REQUEST_CAPACITY);

        let timeout = self.options.connect_timeout;
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        self.client = Some(client);
        self.eventloop = Some(eventloop);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &Topic) -> Result<(), TransportError> {
        let (Some(client), Some(eventloop)) = (self.client.as_ref(), self.eventloop.as_mut())
        else {
            return Err(TransportError::NotConnected);
        };

        client
            .subscribe(topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let timeout = self.options.connect_timeout;
        let result = tokio::time::timeout(timeout, wait_for_suback(eventloop, &mut self.pending))
            .await
            .map_err(|_| TransportError::Timeout(timeout))
            .and_then(|acked| acked);

        if result.is_err() {
            self.reset();
        }
        result
    }

    async fn next_event(&mut self) -> TransportEvent {
        if let Some(message) = self.pending.pop_front() {
            return TransportEvent::Message(message);
        }

        let Some(eventloop) = self.eventloop.as_mut() else {
            return TransportEvent::Dropped("not connected".to_string());
        };

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return TransportEvent::Message(InboundMessage::new(
                        publish.topic,
                        publish.payload.to_vec(),
                    ));
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(pkid = ack.pkid, "Late subscription acknowledgement");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.reset();
                    return TransportEvent::Dropped("broker sent DISCONNECT".to_string());
                }
                Ok(_) => {}
                Err(e) => {
                    self.reset();
                    return TransportEvent::Dropped(e.to_string());
                }
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let (Some(client), Some(eventloop)) = (self.client.as_ref(), self.eventloop.as_mut())
        else {
            return Err(TransportError::NotConnected);
        };

        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        // The request only leaves the queue when the event loop is polled
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Publish(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    self.reset();
                    return Err(TransportError::Publish(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "MQTT disconnect request failed");
            }
        }
        self.eventloop = None;
    }
}
