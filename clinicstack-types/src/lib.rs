//! Core type definitions for the ClinicStack data layer.
//!
//! The data layer is schema-less: every application record is an open JSON
//! object carrying a string `id`, grouped into named collections.
//! - [`Record`]: one JSON object, unknown fields preserved verbatim
//! - [`Dataset`]: collection name to ordered records, the unit persisted
//!   on-device and returned by a full load
//!
//! Domain schemas (patients, revenue, bookings, ...) live in the UI, not here.

mod dataset;
mod record;

pub use dataset::{Dataset, KNOWN_COLLECTIONS};
pub use record::Record;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("collection `{collection}` is not an array of objects")]
    InvalidCollection { collection: String },
}
