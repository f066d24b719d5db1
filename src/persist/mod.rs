// HTTP adapters for the product API: delta persistence and initial snapshot

mod http;
mod snapshot;

pub use http::{HttpPersister, SaveMethod};
pub use snapshot::SnapshotLoader;

use thiserror::Error;

/// Outbound save failures. Logged by the coordinator, never retried.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Trim trailing slashes so `{base}/api/...` never doubles up.
fn normalize_base(api_base: &str) -> String {
    api_base.trim().trim_end_matches('/').to_string()
}
