#![allow(dead_code)]

use async_trait::async_trait;
use conveyor::broker::{
    BrokerEndpoint, BrokerTransport, ConnectOptions, InboundMessage, TransportError,
    TransportEvent, TransportFactory,
};
use conveyor::persist::PersistenceError;
use conveyor::reconcile::{Persister, Renderer};
use conveyor::state::{Diff, OperationalState};
use conveyor::topic::{AssetId, Topic};
use conveyor::EngineError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Shared script driving every transport the factory hands out.
pub struct Script {
    connect_results: Mutex<VecDeque<Result<(), TransportError>>>,
    subscribe_results: Mutex<VecDeque<Result<(), TransportError>>>,
    pub connect_times: Mutex<Vec<Instant>>,
    pub subscriptions: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl Script {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let script = Arc::new(Self {
            connect_results: Mutex::new(VecDeque::new()),
            subscribe_results: Mutex::new(VecDeque::new()),
            connect_times: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            events: tokio::sync::Mutex::new(rx),
        });
        (script, tx)
    }

    /// Queue the outcomes of the next `connect` calls; unscripted calls succeed.
    pub fn push_connect(&self, result: Result<(), TransportError>) {
        self.connect_results.lock().unwrap().push_back(result);
    }

    /// Queue the outcomes of the next `subscribe` calls; unscripted calls succeed.
    pub fn push_subscribe(&self, result: Result<(), TransportError>) {
        self.subscribe_results.lock().unwrap().push_back(result);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_times.lock().unwrap().len()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedTransport {
    script: Arc<Script>,
}

#[async_trait]
impl BrokerTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.script
            .connect_times
            .lock()
            .unwrap()
            .push(Instant::now());
        self.script
            .connect_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn subscribe(&mut self, topic: &Topic) -> Result<(), TransportError> {
        self.script
            .subscriptions
            .lock()
            .unwrap()
            .push(topic.as_str().to_string());
        self.script
            .subscribe_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn next_event(&mut self) -> TransportEvent {
        let mut events = self.script.events.lock().await;
        match events.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn publish(&mut self, _topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedFactory(pub Arc<Script>);

impl TransportFactory for ScriptedFactory {
    fn create(
        &self,
        _endpoint: &BrokerEndpoint,
        _options: &ConnectOptions,
    ) -> Result<Box<dyn BrokerTransport>, EngineError> {
        Ok(Box::new(ScriptedTransport {
            script: Arc::clone(&self.0),
        }))
    }
}

pub fn message(topic: &str, payload: &str) -> TransportEvent {
    TransportEvent::Message(InboundMessage::new(topic, payload.as_bytes().to_vec()))
}

/// Records every collaborator call.
#[derive(Default)]
pub struct Recorder {
    pub saves: Mutex<Vec<(String, Diff)>>,
    pub renders: Mutex<Vec<OperationalState>>,
    pub notifies: AtomicUsize,
    pub fail_saves: bool,
}

impl Recorder {
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn saves(&self) -> Vec<(String, Diff)> {
        self.saves.lock().unwrap().clone()
    }

    pub fn renders(&self) -> Vec<OperationalState> {
        self.renders.lock().unwrap().clone()
    }

    pub fn notify_count(&self) -> usize {
        self.notifies.load(Ordering::SeqCst)
    }
}

pub struct RecordingPersister(pub Arc<Recorder>);

#[async_trait]
impl Persister for RecordingPersister {
    async fn save(&self, asset_id: &AssetId, diff: &Diff) -> Result<(), PersistenceError> {
        self.0
            .saves
            .lock()
            .unwrap()
            .push((asset_id.to_string(), diff.clone()));
        if self.0.fail_saves {
            return Err(PersistenceError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub struct RecordingRenderer(pub Arc<Recorder>);

impl Renderer for RecordingRenderer {
    fn render(&self, state: OperationalState) {
        self.0.renders.lock().unwrap().push(state);
    }

    fn notify(&self) {
        self.0.notifies.fetch_add(1, Ordering::SeqCst);
    }
}
