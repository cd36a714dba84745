//! Legacy single-endpoint remote service.
//!
//! Every operation is a `POST` of a JSON body to the same URL, told apart
//! by its `action` member. List replies come either wrapped as
//! `{ "data": { .. } }` or as a bare dataset object.

use super::{RemoteGateway, dataset_from_payload, read_reply};
use crate::config::LegacyGatewayConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use clinicstack_types::{Dataset, Record};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum LegacyRequest<'a> {
    Save {
        collection: &'a str,
        record: &'a Record,
    },
    List {
        collections: &'a [String],
    },
    Delete {
        collection: &'a str,
        id: &'a str,
    },
}

impl LegacyRequest<'_> {
    fn action(&self) -> &'static str {
        match self {
            Self::Save { .. } => "save",
            Self::List { .. } => "list",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Gateway to the legacy remote service.
pub struct LegacyGateway {
    config: LegacyGatewayConfig,
    client: Client,
}

impl LegacyGateway {
    /// Creates a gateway. An empty endpoint yields an unconfigured gateway.
    pub fn new(config: LegacyGatewayConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn call(&self, request: LegacyRequest<'_>) -> SyncResult<Value> {
        if !self.is_configured() {
            return Err(SyncError::NotConfigured("legacy"));
        }

        let action = request.action();
        debug!(action, "legacy gateway request");
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::from_transport(action, e))?;

        read_reply(response).await
    }
}

#[async_trait]
impl RemoteGateway for LegacyGateway {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn is_configured(&self) -> bool {
        !self.config.endpoint.trim().is_empty()
    }

    async fn save(&self, collection: &str, record: &Record) -> SyncResult<()> {
        self.call(LegacyRequest::Save { collection, record })
            .await
            .map(|_| ())
    }

    async fn list(&self, collections: &[String]) -> SyncResult<Dataset> {
        let payload = self.call(LegacyRequest::List { collections }).await?;
        let payload = match payload {
            Value::Object(mut members) if members.get("data").is_some_and(Value::is_object) => {
                members.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };
        dataset_from_payload(payload)
    }

    async fn delete(&self, collection: &str, id: &str) -> SyncResult<()> {
        self.call(LegacyRequest::Delete { collection, id })
            .await
            .map(|_| ())
    }
}
