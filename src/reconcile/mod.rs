//! Reconciliation of inbound telemetry against the persisted baseline.
//!
//! The coordinator talks to two external collaborators: a [`Persister`]
//! that writes diffs to the backing store, and a [`Renderer`] that updates
//! whatever display is attached.

mod coordinator;

pub use coordinator::{ReconcileOutcome, Reconciler};

use async_trait::async_trait;

use crate::persist::PersistenceError;
use crate::state::{Diff, OperationalState};
use crate::topic::AssetId;

/// Writes changed fields to the backing store.
///
/// Called fire-and-forget: the coordinator logs the result and never retries.
/// Retry, if wanted, belongs in the implementation.
#[async_trait]
pub trait Persister: Send + Sync {
    async fn save(&self, asset_id: &AssetId, diff: &Diff) -> Result<(), PersistenceError>;
}

/// Updates a display with the canonical state.
///
/// Receives snapshots by value; nothing flows back into the store.
pub trait Renderer: Send + Sync {
    /// Called for every accepted message, changed or not.
    fn render(&self, state: OperationalState);

    /// Transient "updated" indicator. Called only when something changed.
    fn notify(&self);
}
