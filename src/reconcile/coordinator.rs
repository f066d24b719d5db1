use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::broker::InboundMessage;
use crate::error::EngineError;
use crate::reconcile::{Persister, Renderer};
use crate::state::{Diff, OperationalState, StateStore};
use crate::telemetry::{parse_payload, FieldNormalizer};
use crate::topic::AssetId;

/// Result of reconciling one inbound payload.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// Canonical state after the merge.
    pub merged: OperationalState,
    /// Fields that differed from the persisted baseline.
    pub diff: Diff,
    /// The fire-and-forget persistence task, present only for a non-empty diff.
    pub persist: Option<JoinHandle<()>>,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        !self.diff.is_empty()
    }
}

/// Applies inbound payloads to the [`StateStore`] one at a time.
///
/// Owns the store outright, so merge/diff/commit can never interleave
/// between two messages. Saves run concurrently with message handling but
/// are tracked, and [`run`](Self::run) waits for them before returning.
pub struct Reconciler {
    asset_id: AssetId,
    store: StateStore,
    normalizer: FieldNormalizer,
    persister: Arc<dyn Persister>,
    renderer: Arc<dyn Renderer>,
    in_flight: TaskTracker,
}

impl Reconciler {
    pub fn new(
        asset_id: AssetId,
        store: StateStore,
        persister: Arc<dyn Persister>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            asset_id,
            store,
            normalizer: FieldNormalizer::default(),
            persister,
            renderer,
            in_flight: TaskTracker::new(),
        }
    }

    /// Replace the field-name normalizer used at the parse boundary.
    pub fn with_normalizer(mut self, normalizer: FieldNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Parse, merge, diff, render; on change also commit, persist and notify.
    ///
    /// A parse failure returns `MessageParse` and leaves the store untouched.
    /// Persistence runs on a tracked task that is never awaited here.
    pub fn handle_payload(&mut self, payload: &[u8]) -> Result<ReconcileOutcome, EngineError> {
        let partial = parse_payload(payload, &self.normalizer)?;

        let merged = self.store.merge(partial);
        let diff = self.store.diff(&merged);

        self.renderer.render(merged.clone());

        if diff.is_empty() {
            debug!(asset_id = %self.asset_id, "No changes to persist");
            return Ok(ReconcileOutcome {
                merged,
                diff,
                persist: None,
            });
        }

        info!(
            asset_id = %self.asset_id,
            fields = ?diff.field_names().collect::<Vec<_>>(),
            "Operational data changed"
        );

        // Optimistic: the baseline advances before the write is confirmed
        self.store.commit(merged.clone());
        let persist = self.spawn_persist(diff.clone());
        self.renderer.notify();

        Ok(ReconcileOutcome {
            merged,
            diff,
            persist: Some(persist),
        })
    }

    fn spawn_persist(&self, diff: Diff) -> JoinHandle<()> {
        let persister = Arc::clone(&self.persister);
        let asset_id = self.asset_id.clone();

        self.in_flight.spawn(async move {
            match persister.save(&asset_id, &diff).await {
                Ok(()) => debug!(
                    asset_id = %asset_id,
                    field_count = diff.len(),
                    "Operational delta saved"
                ),
                Err(e) => error!(
                    asset_id = %asset_id,
                    error = %EngineError::from(e),
                    "Failed to save operational delta"
                ),
            }
        })
    }

    /// Process messages in arrival order until the channel closes, then wait
    /// for outstanding saves.
    pub async fn run(mut self, mut messages: mpsc::Receiver<InboundMessage>) -> StateStore {
        info!(asset_id = %self.asset_id, "Reconciler started");

        while let Some(message) = messages.recv().await {
            debug!(
                topic = %message.topic,
                bytes = message.payload.len(),
                "Received telemetry"
            );

            if let Err(e) = self.handle_payload(&message.payload) {
                warn!(asset_id = %self.asset_id, error = %e, "Discarding message");
            }
        }

        self.in_flight.close();
        if !self.in_flight.is_empty() {
            info!(
                asset_id = %self.asset_id,
                pending = self.in_flight.len(),
                "Waiting for in-flight saves"
            );
        }
        self.in_flight.wait().await;

        info!(
            asset_id = %self.asset_id,
            merges = self.store.merge_count(),
            "Reconciler stopped"
        );
        self.store
    }
}
