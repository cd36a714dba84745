//! Error types for the sync layer.

use clinicstack_crypto::CryptoError;
use clinicstack_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Everything except [`SyncError::Local`] is recoverable by falling back to
/// the next tier; the orchestrator only ever returns `Local` to callers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure (unreachable host, connection reset, ...).
    #[error("network error: {0}")]
    Network(String),

    /// Remote answered with a non-success HTTP status.
    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Remote answered successfully but the payload carried an `error` field.
    #[error("remote error: {0}")]
    Remote(String),

    /// Remote payload did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Remote call exceeded its time budget.
    #[error("operation timed out")]
    Timeout,

    /// The gateway has no endpoint configured.
    #[error("{0} gateway is not configured")]
    NotConfigured(&'static str),

    /// Local persistence failed; the only error surfaced to writers.
    #[error("local storage error: {0}")]
    Local(#[from] StorageError),

    /// Key derivation for the PII codec failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Maps a reqwest failure, keeping timeouts distinguishable.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Network(format!("{context}: {err}"))
        }
    }
}
