//! Broker connection state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --ack--> Connected
//!      ^                        ^                   |
//!      |                        |             transport drop
//!  disconnect             backoff elapsed           v
//!      |                        +------------- Reconnecting
//! ```
//!
//! The session runs in one background task: read messages until the
//! transport drops, back off, reconnect, re-subscribe, repeat. Cancelling
//! the session token tears everything down, including a pending retry.

use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::backoff::ReconnectPolicy;
use crate::broker::transport::{
    BrokerEndpoint, BrokerTransport, ConnectOptions, InboundMessage, TransportError,
    TransportEvent, TransportFactory,
};
use crate::error::EngineError;
use crate::topic::Topic;

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Handle to an established broker session.
///
/// Cheap to clone; returned again by `connect()` while the session is alive.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// `false` once the session has been disconnected.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.state() != ConnectionState::Disconnected
    }
}

type MessageSink = Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>;

struct Session {
    handle: SessionHandle,
    retry_now: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Owns the single broker connection for one asset topic.
pub struct ConnectionManager {
    endpoint: BrokerEndpoint,
    topic: Topic,
    options: ConnectOptions,
    policy: ReconnectPolicy,
    factory: Arc<dyn TransportFactory>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    sink: MessageSink,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl ConnectionManager {
    pub fn new(
        endpoint: BrokerEndpoint,
        topic: Topic,
        options: ConnectOptions,
        policy: ReconnectPolicy,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint,
            topic,
            options,
            policy,
            factory,
            state_tx: Arc::new(state_tx),
            sink: Arc::new(Mutex::new(None)),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Register the single consumer of inbound payloads, replacing any previous one.
    ///
    /// Only messages received while Connected and published on the resolved
    /// topic are forwarded.
    pub fn on_message(&self, handler: mpsc::Sender<InboundMessage>) {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        *sink = Some(handler);
    }

    /// Drop the registered handler so its channel can close.
    pub fn clear_message_handler(&self) {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        *sink = None;
    }

    /// Connect and subscribe, or return the live session.
    ///
    /// While Connecting or Connected this is a no-op. While Reconnecting it
    /// cancels the pending backoff timer and retries immediately.
    ///
    /// A refused first connection is `TransportUnavailable` and does not
    /// start the retry loop.
    pub async fn connect(&self) -> Result<SessionHandle, EngineError> {
        let mut session = self.session.lock().await;

        if let Some(active) = session.as_ref() {
            if !active.task.is_finished() {
                match self.state() {
                    ConnectionState::Connecting | ConnectionState::Connected => {
                        debug!(session_id = %active.handle.id, "Already connected");
                        return Ok(active.handle.clone());
                    }
                    ConnectionState::Reconnecting => {
                        info!(session_id = %active.handle.id, "Reconnect requested, skipping backoff");
                        active.retry_now.notify_one();
                        return Ok(active.handle.clone());
                    }
                    ConnectionState::Disconnected => {}
                }
            }
        }
        *session = None;

        let mut transport = self.factory.create(&self.endpoint, &self.options)?;

        self.set_state(ConnectionState::Connecting);
        info!(broker = %self.endpoint, topic = %self.topic, "Connecting to broker");

        if let Err(e) = establish(transport.as_mut(), &self.topic).await {
            error!(broker = %self.endpoint, error = %e, "Broker connection failed");
            transport.close().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(EngineError::TransportUnavailable(format!(
                "{}: {}",
                self.endpoint, e
            )));
        }

        self.set_state(ConnectionState::Connected);

        let cancel = CancellationToken::new();
        let retry_now = Arc::new(Notify::new());
        let handle = SessionHandle {
            id: Uuid::now_v7(),
            cancel: cancel.clone(),
            state_rx: self.state_tx.subscribe(),
        };

        info!(
            session_id = %handle.id,
            broker = %self.endpoint,
            topic = %self.topic,
            "Connected and subscribed"
        );

        let task = tokio::spawn(session_loop(SessionContext {
            transport,
            topic: self.topic.clone(),
            policy: self.policy,
            state_tx: Arc::clone(&self.state_tx),
            sink: Arc::clone(&self.sink),
            cancel,
            retry_now: Arc::clone(&retry_now),
        }));

        *session = Some(Session {
            handle: handle.clone(),
            retry_now,
            task,
        });

        Ok(handle)
    }

    /// Close the session. Cancels any pending reconnection timer.
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();

        if let Some(session) = session {
            info!(session_id = %session.handle.id, "Disconnecting from broker");
            session.handle.cancel.cancel();
            if let Err(e) = session.task.await {
                error!(error = %e, "Broker session task failed");
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

async fn establish(
    transport: &mut dyn BrokerTransport,
    topic: &Topic,
) -> Result<(), TransportError> {
    transport.connect().await?;
    transport.subscribe(topic).await
}

struct SessionContext {
    transport: Box<dyn BrokerTransport>,
    topic: Topic,
    policy: ReconnectPolicy,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    sink: MessageSink,
    cancel: CancellationToken,
    retry_now: Arc<Notify>,
}

/// Main loop: read -> on drop, back off -> reconnect -> re-subscribe.
async fn session_loop(ctx: SessionContext) {
    let SessionContext {
        mut transport,
        topic,
        policy,
        state_tx,
        sink,
        cancel,
        retry_now,
    } = ctx;

    // Consecutive failed reconnection attempts; reset on every Connected
    let mut attempt: u32 = 0;

    'session: loop {
        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'session,
            reason = read_until_dropped(transport.as_mut(), &topic, &sink) => reason,
        };

        warn!(
            error = %EngineError::TransportDropped(reason),
            topic = %topic,
            "Broker connection lost"
        );
        enter_reconnecting(&state_tx, &retry_now);

        loop {
            let delay = policy.delay_for(attempt);
            info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "Waiting before reconnect"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'session,
                _ = retry_now.notified() => debug!("Backoff timer cancelled, retrying now"),
                _ = tokio::time::sleep(delay) => {}
            }

            state_tx.send_replace(ConnectionState::Connecting);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'session,
                result = establish(transport.as_mut(), &topic) => result,
            };

            match result {
                Ok(()) => {
                    attempt = 0;
                    state_tx.send_replace(ConnectionState::Connected);
                    info!(topic = %topic, "Reconnected and re-subscribed");
                    break;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    warn!(error = %e, attempt, "Reconnect attempt failed");
                    enter_reconnecting(&state_tx, &retry_now);
                }
            }
        }
    }

    transport.close().await;
    state_tx.send_replace(ConnectionState::Disconnected);
    debug!(topic = %topic, "Broker session ended");
}

/// Only a `connect()` made after this point may cut the next backoff short;
/// a wake-up left over from an earlier Reconnecting phase is discarded.
fn enter_reconnecting(state_tx: &watch::Sender<ConnectionState>, retry_now: &Notify) {
    let _ = retry_now.notified().now_or_never();
    state_tx.send_replace(ConnectionState::Reconnecting);
}

/// Forward messages for `topic` to the registered handler until the transport drops.
async fn read_until_dropped(
    transport: &mut dyn BrokerTransport,
    topic: &Topic,
    sink: &MessageSink,
) -> String {
    loop {
        match transport.next_event().await {
            TransportEvent::Message(message) => {
                if !topic.matches(&message.topic) {
                    debug!(topic = %message.topic, "Ignoring message for another topic");
                    continue;
                }
                forward(sink, message).await;
            }
            TransportEvent::Dropped(reason) => return reason,
        }
    }
}

async fn forward(sink: &MessageSink, message: InboundMessage) {
    let handler = sink.lock().unwrap_or_else(|e| e.into_inner()).clone();

    match handler {
        Some(handler) => {
            if handler.send(message).await.is_err() {
                debug!("Message handler closed, dropping message");
            }
        }
        None => debug!("No message handler registered, dropping message"),
    }
}
