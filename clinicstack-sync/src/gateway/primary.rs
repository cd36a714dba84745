//! Primary remote persistence service.
//!
//! Authenticated JSON over HTTPS: one `POST` route per operation under
//! `{base_url}/records/`, bearer token in the `Authorization` header and the
//! tenant id in every body.

use super::{RemoteGateway, dataset_from_payload, read_reply};
use crate::config::PrimaryGatewayConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use clinicstack_types::{Dataset, Record};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct SaveRequest<'a> {
    tenant_id: &'a str,
    collection: &'a str,
    record: &'a Record,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    tenant_id: &'a str,
    collections: &'a [String],
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    tenant_id: &'a str,
    collection: &'a str,
    id: &'a str,
}

/// Gateway to the primary remote service.
pub struct PrimaryGateway {
    config: PrimaryGatewayConfig,
    client: Client,
}

impl PrimaryGateway {
    /// Creates a gateway. An empty base URL yields an unconfigured gateway.
    pub fn new(config: PrimaryGatewayConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, route: &str) -> String {
        format!(
            "{}/records/{route}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn call<B: Serialize + ?Sized>(&self, route: &str, body: &B) -> SyncResult<Value> {
        if !self.is_configured() {
            return Err(SyncError::NotConfigured("primary"));
        }

        debug!(route, "primary gateway request");
        let response = self
            .client
            .post(self.url(route))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::from_transport(route, e))?;

        read_reply(response).await
    }
}

#[async_trait]
impl RemoteGateway for PrimaryGateway {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn is_configured(&self) -> bool {
        !self.config.base_url.trim().is_empty()
    }

    async fn save(&self, collection: &str, record: &Record) -> SyncResult<()> {
        let body = SaveRequest {
            tenant_id: &self.config.tenant_id,
            collection,
            record,
        };
        self.call("save", &body).await.map(|_| ())
    }

    async fn list(&self, collections: &[String]) -> SyncResult<Dataset> {
        let body = ListRequest {
            tenant_id: &self.config.tenant_id,
            collections,
        };
        let payload = self.call("list", &body).await?;
        dataset_from_payload(payload)
    }

    async fn delete(&self, collection: &str, id: &str) -> SyncResult<()> {
        let body = DeleteRequest {
            tenant_id: &self.config.tenant_id,
            collection,
            id,
        };
        self.call("delete", &body).await.map(|_| ())
    }
}
