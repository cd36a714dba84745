//! Remote persistence gateways.
//!
//! Each gateway is a stateless adapter over one remote service. Remote
//! services report logical failures through an `error` member inside an
//! otherwise successful response. Replies are decoded into [`GatewayReply`]
//! right here, so nothing above this module inspects payloads for errors.

mod legacy;
mod primary;

pub use legacy::LegacyGateway;
pub use primary::PrimaryGateway;

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use clinicstack_types::{Dataset, Record};
use serde_json::Value;

/// A remote persistence service.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the gateway has an endpoint to talk to.
    fn is_configured(&self) -> bool;

    /// Upserts a record remotely.
    async fn save(&self, collection: &str, record: &Record) -> SyncResult<()>;

    /// Fetches the named collections.
    async fn list(&self, collections: &[String]) -> SyncResult<Dataset>;

    /// Deletes a record remotely.
    async fn delete(&self, collection: &str, id: &str) -> SyncResult<()>;
}

/// A decoded remote reply.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayReply {
    /// The remote reported a logical failure.
    Failure { error: String },
    /// Anything else.
    Payload(Value),
}

impl GatewayReply {
    /// Classifies a reply body.
    ///
    /// A body is a failure when it is an object whose `error` member is
    /// present and neither `null` nor `false`.
    pub fn from_value(body: Value) -> Self {
        let error = match body.get("error") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => return Self::Payload(body),
            Some(Value::String(message)) => message.clone(),
            Some(Value::Object(detail)) => match detail.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => Value::Object(detail.clone()).to_string(),
            },
            Some(other) => other.to_string(),
        };
        Self::Failure { error }
    }

    /// Whether the reply is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Converts the reply into a plain result.
    pub fn into_result(self) -> SyncResult<Value> {
        match self {
            Self::Failure { error } => Err(SyncError::Remote(error)),
            Self::Payload(value) => Ok(value),
        }
    }
}

/// Reads an HTTP response into a payload.
///
/// An empty body reads as `null`. An `error` reply wins over the HTTP
/// status so the remote's own message is kept.
pub(crate) async fn read_reply(response: reqwest::Response) -> SyncResult<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| SyncError::from_transport("reading response", e))?;

    let body = if text.trim().is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str::<Value>(&text).ok()
    };
    let reply = body.map(GatewayReply::from_value);

    match reply {
        Some(reply) if reply.is_failure() => reply.into_result(),
        _ if !status.is_success() => Err(SyncError::Status {
            status: status.as_u16(),
            body: truncate(&text, 200),
        }),
        Some(reply) => reply.into_result(),
        None => Err(SyncError::Protocol(format!(
            "response is not JSON: {}",
            truncate(&text, 80)
        ))),
    }
}

/// Converts a list payload into a dataset.
pub(crate) fn dataset_from_payload(payload: Value) -> SyncResult<Dataset> {
    Dataset::from_value(payload)
        .map_err(|e| SyncError::Protocol(format!("unusable list payload: {e}")))
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
