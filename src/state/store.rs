use crate::state::value::{values_equal, Diff, OperationalState, PartialState};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Single owner of the canonical state and the last persisted snapshot.
///
/// Both maps are only ever mutated through [`merge`](Self::merge) and
/// [`commit`](Self::commit). Callers get copies, never references they could
/// write back through.
#[derive(Debug, Default)]
pub struct StateStore {
    canonical: OperationalState,
    persisted: OperationalState,
    last_seen: Option<DateTime<Utc>>,
    merge_count: u64,
}

impl StateStore {
    /// Empty store: nothing known, nothing persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from a server-provided snapshot.
    ///
    /// The seed is treated as already persisted, so re-receiving the same
    /// values does not produce a write.
    pub fn seeded(initial: OperationalState) -> Self {
        Self {
            persisted: initial.clone(),
            canonical: initial,
            last_seen: None,
            merge_count: 0,
        }
    }

    /// Apply `partial` onto the canonical state, last writer wins per field.
    ///
    /// Fields missing from `partial` keep their previous value; nothing is
    /// ever removed. Returns a copy of the new canonical state.
    pub fn merge(&mut self, partial: PartialState) -> OperationalState {
        for (field, value) in partial {
            self.canonical.insert(field, value);
        }
        self.last_seen = Some(Utc::now());
        self.merge_count += 1;

        debug!(
            fields = self.canonical.len(),
            merges = self.merge_count,
            "Merged partial update"
        );

        self.canonical.clone()
    }

    /// Fields of `merged` that are new or differ from the persisted snapshot.
    pub fn diff(&self, merged: &OperationalState) -> Diff {
        merged
            .iter()
            .filter(|(field, value)| match self.persisted.get(field) {
                Some(previous) => !values_equal(previous, value),
                None => true,
            })
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// Advance the persistence baseline to `merged`.
    ///
    /// Optimistic: called when the save is dispatched, not when it succeeds.
    pub fn commit(&mut self, merged: OperationalState) {
        self.persisted = merged;
    }

    pub fn canonical(&self) -> OperationalState {
        self.canonical.clone()
    }

    pub fn persisted(&self) -> OperationalState {
        self.persisted.clone()
    }

    /// When the last message was merged, whether or not it changed anything.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub fn merge_count(&self) -> u64 {
        self.merge_count
    }
}
