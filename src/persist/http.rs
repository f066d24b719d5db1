use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::persist::{normalize_base, PersistenceError};
use crate::reconcile::Persister;
use crate::state::Diff;
use crate::topic::AssetId;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP verb used for the update call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMethod {
    #[default]
    #[serde(alias = "POST")]
    Post,
    #[serde(alias = "PUT")]
    Put,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    data: &'a Diff,
}

/// Saves operational deltas via
/// `{api_base}/api/products/{asset}/operational/update/`.
pub struct HttpPersister {
    http_client: reqwest::Client,
    api_base: String,
    method: SaveMethod,
    csrf_token: Option<String>,
    timeout: Duration,
}

impl HttpPersister {
    pub fn new(api_base: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_base: normalize_base(api_base),
            method: SaveMethod::default(),
            csrf_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_method(mut self, method: SaveMethod) -> Self {
        self.method = method;
        self
    }

    /// Sent as `X-CSRFToken`. Blank tokens are ignored.
    pub fn with_csrf_token(mut self, token: Option<String>) -> Self {
        self.csrf_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn update_url(&self, asset_id: &AssetId) -> String {
        format!(
            "{}/api/products/{}/operational/update/",
            self.api_base, asset_id
        )
    }
}

#[async_trait]
impl Persister for HttpPersister {
    async fn save(&self, asset_id: &AssetId, diff: &Diff) -> Result<(), PersistenceError> {
        let url = self.update_url(asset_id);

        let request = match self.method {
            SaveMethod::Post => self.http_client.post(&url),
            SaveMethod::Put => self.http_client.put(&url),
        };

        let mut request = request
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&UpdateRequest { data: diff });

        if let Some(token) = &self.csrf_token {
            request = request.header("X-CSRFToken", token);
        }

        debug!(url = %url, method = ?self.method, "Sending operational delta");

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(PersistenceError::Status { status, body });
        }

        info!(
            asset_id = %asset_id,
            field_count = diff.len(),
            "Operational data updated successfully"
        );

        Ok(())
    }
}
