// Canonical state, persisted baseline, merge and diff

mod store;
mod value;

pub use store::StateStore;
pub use value::{values_equal, Diff, OperationalState, PartialState};
