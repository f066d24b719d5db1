use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace used when the configuration does not name one.
pub const DEFAULT_NAMESPACE: &str = "conveyor";

/// Identifier of the telemetry source (a product / conveyor unit).
///
/// Fixed for the lifetime of an engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Trims the input and rejects an empty id.
    pub fn new(id: impl AsRef<str>) -> Result<Self, EngineError> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(EngineError::config("asset id is required"));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pub/sub channel an asset's telemetry is published under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact-match check used to filter a shared transport.
    pub fn matches(&self, topic: &str) -> bool {
        self.0 == topic
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the subscription topic for an asset.
///
/// A non-empty `topic_override` is returned verbatim. Otherwise the topic is
/// `<namespace>/<asset_id>/status`. The result depends only on the inputs, so
/// re-deriving it on reconnect yields the same topic.
pub fn resolve(
    asset_id: &str,
    topic_override: Option<&str>,
    namespace: &str,
) -> Result<Topic, EngineError> {
    let asset = AssetId::new(asset_id)?;

    if let Some(pinned) = topic_override.filter(|t| !t.trim().is_empty()) {
        return Ok(Topic(pinned.to_string()));
    }

    let namespace = namespace.trim().trim_end_matches('/');
    if namespace.is_empty() {
        return Err(EngineError::config(
            "topic namespace is required when no topic override is set",
        ));
    }

    Ok(Topic(format!("{}/{}/status", namespace, asset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_canonical_topic() {
        let topic = resolve("68d65911e6179110444b78bb", None, "conveyor").unwrap();
        assert_eq!(topic.as_str(), "conveyor/68d65911e6179110444b78bb/status");
    }

    #[test]
    fn override_is_returned_verbatim() {
        let topic = resolve(
            "eco001",
            Some("conveyor/operational_data/eco001"),
            "conveyor",
        )
        .unwrap();
        assert_eq!(topic.as_str(), "conveyor/operational_data/eco001");
    }

    #[test]
    fn blank_override_falls_back_to_composed_topic() {
        let topic = resolve("eco001", Some("   "), "plant-a").unwrap();
        assert_eq!(topic.as_str(), "plant-a/eco001/status");
    }

    #[test]
    fn empty_asset_id_is_rejected_even_with_override() {
        let err = resolve("  ", Some("pinned/topic"), "conveyor").unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn empty_namespace_is_rejected() {
        let err = resolve("eco001", None, "").unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn trailing_slash_in_namespace_is_ignored() {
        let topic = resolve("eco001", None, "conveyor/").unwrap();
        assert_eq!(topic.as_str(), "conveyor/eco001/status");
    }

    #[test]
    fn resolution_is_idempotent() {
        let a = resolve("eco001", None, "conveyor").unwrap();
        let b = resolve("eco001", None, "conveyor").unwrap();
        assert_eq!(a, b);
        assert!(a.matches("conveyor/eco001/status"));
        assert!(!a.matches("conveyor/eco002/status"));
    }

    #[test]
    fn asset_id_is_trimmed() {
        let id = AssetId::new("  eco001 ").unwrap();
        assert_eq!(id.as_str(), "eco001");
        assert_eq!(id.to_string(), "eco001");
    }
}
