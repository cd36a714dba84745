//! The on-device copy of the whole dataset.
//!
//! The dataset lives in the key/value store as a single JSON document under
//! [`DATASET_KEY`]. Every mutation is a read-modify-write of that document,
//! serialized by an internal lock so concurrent writers never lose updates.

use crate::error::{StorageError, StorageResult};
use crate::kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
use clinicstack_types::{Dataset, Record};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Key of the dataset document.
pub const DATASET_KEY: &str = "clinicstack.dataset";

/// Where an unreadable dataset document is moved before it gets replaced.
pub const CORRUPT_DATASET_KEY: &str = "clinicstack.dataset.corrupt";

/// Key of the device's PII passphrase setting.
pub const PASSPHRASE_SETTING_KEY: &str = "clinicstack.pii_passphrase";

/// Authoritative on-device copy of the application dataset.
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Creates a local store over any key/value backend.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Opens (or creates) a SQLite-backed store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self::new(Arc::new(SqliteKvStore::open(path)?)))
    }

    /// Creates a volatile in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Loads the whole dataset.
    ///
    /// Never fails: an absent, unreadable or corrupt document reads as an
    /// empty dataset with every known collection present.
    pub fn load_all_local(&self) -> Dataset {
        match self.read_document() {
            Ok(Document::Parsed(dataset)) => dataset.normalized(),
            Ok(Document::Absent) => Dataset::empty(),
            Ok(Document::Corrupt(_)) => {
                warn!("local dataset document is corrupt, reading as empty");
                Dataset::empty()
            }
            Err(e) => {
                warn!("failed to read local dataset, reading as empty: {e}");
                Dataset::empty()
            }
        }
    }

    /// Overwrites the whole dataset.
    pub fn save_all_local(&self, dataset: &Dataset) -> StorageResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.write_document(dataset)
    }

    /// Inserts or replaces a record by id.
    ///
    /// The collection is created if needed. Fails if the record has no
    /// string `id`; the stored document is untouched on any failure.
    pub fn upsert_record(&self, collection: &str, record: Record) -> StorageResult<()> {
        if record.id().is_none() {
            return Err(StorageError::MissingId {
                collection: collection.to_string(),
            });
        }

        self.modify(|dataset| {
            let replaced = dataset.upsert(collection, record);
            debug!(collection, replaced, "local upsert");
            true
        })
    }

    /// Removes a record by id. Missing collection or id is a no-op.
    pub fn delete_record(&self, collection: &str, id: &str) -> StorageResult<()> {
        self.modify(|dataset| {
            let removed = dataset.remove(collection, id).is_some();
            debug!(collection, removed, "local delete");
            removed
        })
    }

    /// Reads the device's PII passphrase setting.
    pub fn passphrase_setting(&self) -> Option<String> {
        match self.kv.get(PASSPHRASE_SETTING_KEY) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!("failed to read passphrase setting: {e}");
                None
            }
        }
    }

    /// Stores or clears the device's PII passphrase setting.
    pub fn set_passphrase_setting(&self, passphrase: Option<&str>) -> StorageResult<()> {
        match passphrase.filter(|p| !p.is_empty()) {
            Some(p) => self.kv.set(PASSPHRASE_SETTING_KEY, p),
            None => self.kv.remove(PASSPHRASE_SETTING_KEY),
        }
    }

    /// Applies `change` to the current document and persists it if it
    /// reports a modification.
    fn modify(&self, change: impl FnOnce(&mut Dataset) -> bool) -> StorageResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let mut dataset = match self.read_document()? {
            Document::Parsed(dataset) => dataset,
            Document::Absent => Dataset::new(),
            Document::Corrupt(raw) => {
                warn!(
                    key = CORRUPT_DATASET_KEY,
                    "replacing corrupt local dataset, previous copy kept"
                );
                self.kv.set(CORRUPT_DATASET_KEY, &raw)?;
                Dataset::new()
            }
        };

        if change(&mut dataset) {
            self.write_document(&dataset)?;
        }
        Ok(())
    }

    fn read_document(&self) -> StorageResult<Document> {
        let Some(raw) = self.kv.get(DATASET_KEY)? else {
            return Ok(Document::Absent);
        };
        match serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|value| Dataset::from_value(value).ok())
        {
            Some(dataset) => Ok(Document::Parsed(dataset)),
            None => Ok(Document::Corrupt(raw)),
        }
    }

    fn write_document(&self, dataset: &Dataset) -> StorageResult<()> {
        let raw = serde_json::to_string(dataset)?;
        self.kv.set(DATASET_KEY, &raw)
    }
}

enum Document {
    Absent,
    Parsed(Dataset),
    Corrupt(String),
}
