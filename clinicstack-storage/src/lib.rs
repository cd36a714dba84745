//! Device-local storage layer for ClinicStack.
//!
//! Provides the durable, synchronous, on-device copy of every record.
//!
//! # Architecture
//!
//! - [`KeyValueStore`] is the device boundary: a string key/value store with
//!   atomic overwrite. [`SqliteKvStore`] persists to a file,
//!   [`MemoryKvStore`] backs tests and demo installs.
//! - [`LocalStore`] keeps the whole dataset as one JSON document in that
//!   store and offers per-record upsert/delete on top of it.
//! - The same store carries the device's PII passphrase setting.

mod error;
mod kv;
mod local;

pub use error::{StorageError, StorageResult};
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use local::{CORRUPT_DATASET_KEY, DATASET_KEY, LocalStore, PASSPHRASE_SETTING_KEY};
