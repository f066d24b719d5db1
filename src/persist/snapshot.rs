use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::persist::{normalize_base, PersistenceError};
use crate::state::OperationalState;
use crate::telemetry::FieldNormalizer;
use crate::topic::AssetId;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches the last known operational data for an asset from the product API.
///
/// The product record carries it under `usageData.operationalData`. It seeds
/// both the canonical state and the persisted baseline, so the first message
/// after startup only persists what actually changed.
pub struct SnapshotLoader {
    http_client: reqwest::Client,
    api_base: String,
    normalizer: FieldNormalizer,
    timeout: Duration,
}

impl SnapshotLoader {
    pub fn new(api_base: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_base: normalize_base(api_base),
            normalizer: FieldNormalizer::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_normalizer(mut self, normalizer: FieldNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Load the seed state. Any failure is logged and yields an empty state.
    pub async fn fetch(&self, asset_id: &AssetId) -> OperationalState {
        match self.try_fetch(asset_id).await {
            Ok(Some(state)) => {
                info!(
                    asset_id = %asset_id,
                    field_count = state.len(),
                    "Loaded initial operational snapshot"
                );
                state
            }
            Ok(None) => {
                info!(asset_id = %asset_id, "Product has no operational data yet");
                OperationalState::new()
            }
            Err(e) => {
                warn!(
                    asset_id = %asset_id,
                    error = %e,
                    "Failed to load initial snapshot, starting empty"
                );
                OperationalState::new()
            }
        }
    }

    /// `Ok(None)` when the record exists but has no operational data.
    pub async fn try_fetch(
        &self,
        asset_id: &AssetId,
    ) -> Result<Option<OperationalState>, PersistenceError> {
        let url = format!("{}/api/products/{}/", self.api_base, asset_id);

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(PersistenceError::Status { status, body });
        }

        let product: Value = response.json().await?;

        let operational = product
            .get("usageData")
            .and_then(|usage| usage.get("operationalData"))
            .and_then(Value::as_object)
            .cloned();

        Ok(operational.map(|object| self.normalizer.normalize(object).into_iter().collect()))
    }
}
