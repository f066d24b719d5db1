use thiserror::Error;

use crate::persist::PersistenceError;

/// Engine error taxonomy.
///
/// Only `Configuration` and `TransportUnavailable` ever reach the caller of
/// `connect()`. Everything else is logged where it happens and the engine
/// keeps running.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or missing asset id, malformed broker URL, bad backoff bounds.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No transport for the broker scheme, or the first connection was refused.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Inbound payload was not a JSON object.
    #[error("malformed telemetry payload: {0}")]
    MessageParse(String),

    /// The outbound save call failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// Broker connection lost after it had been established.
    #[error("transport dropped: {0}")]
    TransportDropped(String),
}

impl EngineError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_errors_convert() {
        let err: EngineError = PersistenceError::Status {
            status: 500,
            body: "boom".into(),
        }
        .into();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(err.to_string().starts_with("persistence failed: "));
    }

    #[test]
    fn display_includes_detail() {
        let err = EngineError::TransportUnavailable("no transport for scheme 'wss'".into());
        assert_eq!(
            err.to_string(),
            "transport unavailable: no transport for scheme 'wss'"
        );
    }
}
