use clinicstack_storage::{
    CORRUPT_DATASET_KEY, DATASET_KEY, KeyValueStore, LocalStore, MemoryKvStore,
    PASSPHRASE_SETTING_KEY, StorageError, StorageResult,
};
use clinicstack_types::{Dataset, KNOWN_COLLECTIONS, Record};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

/// Backend whose writes can be switched off to simulate a full/locked disk.
#[derive(Default)]
struct FlakyKvStore {
    inner: MemoryKvStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl KeyValueStore for FlakyKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("read failed".into()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("disk full".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)
    }
}

fn ids(dataset: &Dataset, collection: &str) -> Vec<String> {
    dataset
        .collection(collection)
        .iter()
        .filter_map(|r| r.id().map(str::to_owned))
        .collect()
}

// ── load_all_local ───────────────────────────────────────────────

#[test]
fn load_without_document_is_empty_with_known_collections() {
    let store = LocalStore::in_memory();
    let dataset = store.load_all_local();
    assert_eq!(dataset, Dataset::empty());
    for name in KNOWN_COLLECTIONS {
        assert!(dataset.has_collection(name));
    }
}

#[test]
fn load_corrupt_document_is_empty() {
    let kv = Arc::new(MemoryKvStore::new());
    kv.set(DATASET_KEY, "{not json").unwrap();
    let store = LocalStore::new(kv);
    assert_eq!(store.load_all_local(), Dataset::empty());
}

#[test]
fn load_wrong_shape_document_is_empty() {
    let kv = Arc::new(MemoryKvStore::new());
    kv.set(DATASET_KEY, "[1,2,3]").unwrap();
    let store = LocalStore::new(kv);
    assert_eq!(store.load_all_local(), Dataset::empty());
}

#[test]
fn load_with_failing_backend_is_empty() {
    let kv = Arc::new(FlakyKvStore::default());
    kv.fail_reads.store(true, Ordering::SeqCst);
    let store = LocalStore::new(kv);
    assert_eq!(store.load_all_local(), Dataset::empty());
}

#[test]
fn load_fills_missing_collections() {
    let kv = Arc::new(MemoryKvStore::new());
    kv.set(DATASET_KEY, r#"{"revenue":[{"id":"r1"}]}"#).unwrap();
    let store = LocalStore::new(kv);

    let dataset = store.load_all_local();
    assert_eq!(ids(&dataset, "revenue"), vec!["r1"]);
    assert!(dataset.collection("patients").is_empty());
}

// ── save_all_local ───────────────────────────────────────────────

#[test]
fn save_all_then_load() {
    let store = LocalStore::in_memory();
    let mut dataset = Dataset::new();
    dataset.upsert("inventory", Record::with_id("i1").with("qty", 10));
    store.save_all_local(&dataset).unwrap();

    assert_eq!(store.load_all_local(), dataset.normalized());
}

#[test]
fn failed_save_all_keeps_previous_document() {
    let kv = Arc::new(FlakyKvStore::default());
    let store = LocalStore::new(kv.clone());
    store.upsert_record("queue", Record::with_id("q1")).unwrap();

    kv.fail_writes.store(true, Ordering::SeqCst);
    assert!(store.save_all_local(&Dataset::empty()).is_err());

    assert_eq!(ids(&store.load_all_local(), "queue"), vec!["q1"]);
}

// ── upsert_record ────────────────────────────────────────────────

#[test]
fn upsert_creates_collection() {
    let store = LocalStore::in_memory();
    store.upsert_record("custom_forms", Record::with_id("f1")).unwrap();
    assert_eq!(ids(&store.load_all_local(), "custom_forms"), vec!["f1"]);
}

#[test]
fn upsert_same_id_twice_keeps_one_latest_record() {
    let store = LocalStore::in_memory();
    store
        .upsert_record("patients", Record::with_id("p1").with("name", "Alice"))
        .unwrap();
    store
        .upsert_record("patients", Record::with_id("p1").with("name", "Alicia"))
        .unwrap();

    let dataset = store.load_all_local();
    let patients = dataset.collection("patients");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].get("name"), Some(&json!("Alicia")));
}

#[test]
fn upsert_keeps_insertion_order() {
    let store = LocalStore::in_memory();
    for id in ["b", "a", "c"] {
        store.upsert_record("bookings", Record::with_id(id)).unwrap();
    }
    store.upsert_record("bookings", Record::with_id("a").with("slot", 3)).unwrap();
    assert_eq!(ids(&store.load_all_local(), "bookings"), vec!["b", "a", "c"]);
}

#[test]
fn upsert_without_id_is_rejected() {
    let store = LocalStore::in_memory();
    let err = store
        .upsert_record("patients", Record::new().with("name", "Nobody"))
        .unwrap_err();
    assert!(matches!(err, StorageError::MissingId { ref collection } if collection == "patients"));
    assert!(store.load_all_local().collection("patients").is_empty());
}

#[test]
fn failed_upsert_keeps_previous_document() {
    let kv = Arc::new(FlakyKvStore::default());
    let store = LocalStore::new(kv.clone());
    store.upsert_record("patients", Record::with_id("p1")).unwrap();

    kv.fail_writes.store(true, Ordering::SeqCst);
    assert!(store.upsert_record("patients", Record::with_id("p2")).is_err());

    kv.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(ids(&store.load_all_local(), "patients"), vec!["p1"]);
}

#[test]
fn upsert_with_failing_read_does_not_clobber_document() {
    let kv = Arc::new(FlakyKvStore::default());
    let store = LocalStore::new(kv.clone());
    store.upsert_record("patients", Record::with_id("p1")).unwrap();

    kv.fail_reads.store(true, Ordering::SeqCst);
    assert!(store.upsert_record("patients", Record::with_id("p2")).is_err());

    kv.fail_reads.store(false, Ordering::SeqCst);
    assert_eq!(ids(&store.load_all_local(), "patients"), vec!["p1"]);
}

#[test]
fn upsert_over_corrupt_document_keeps_backup() {
    let kv = Arc::new(MemoryKvStore::new());
    kv.set(DATASET_KEY, "{broken").unwrap();
    let store = LocalStore::new(kv.clone());

    store.upsert_record("patients", Record::with_id("p1")).unwrap();

    assert_eq!(kv.get(CORRUPT_DATASET_KEY).unwrap().as_deref(), Some("{broken"));
    assert_eq!(ids(&store.load_all_local(), "patients"), vec!["p1"]);
}

#[test]
fn concurrent_upserts_lose_nothing() {
    let store = Arc::new(LocalStore::in_memory());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    store
                        .upsert_record("queue", Record::with_id(format!("{t}-{i}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.load_all_local().collection("queue").len(), 200);
}

// ── delete_record ────────────────────────────────────────────────

#[test]
fn delete_existing_record() {
    let store = LocalStore::in_memory();
    store.upsert_record("revenue", Record::with_id("r1")).unwrap();
    store.upsert_record("revenue", Record::with_id("r2")).unwrap();

    store.delete_record("revenue", "r1").unwrap();
    assert_eq!(ids(&store.load_all_local(), "revenue"), vec!["r2"]);
}

#[test]
fn delete_missing_id_or_collection_is_noop() {
    let store = LocalStore::in_memory();
    store.upsert_record("revenue", Record::with_id("r1")).unwrap();
    let before = store.load_all_local();

    store.delete_record("revenue", "nope").unwrap();
    store.delete_record("no_such_collection", "r1").unwrap();

    assert_eq!(store.load_all_local(), before);
}

#[test]
fn delete_on_empty_store_is_noop() {
    let store = LocalStore::in_memory();
    store.delete_record("patients", "p1").unwrap();
    assert_eq!(store.load_all_local(), Dataset::empty());
}

// ── Persistence ──────────────────────────────────────────────────

#[test]
fn sqlite_backed_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clinic.db");

    {
        let store = LocalStore::open(&path).unwrap();
        store
            .upsert_record("patients", Record::with_id("p1").with("name", "Alice"))
            .unwrap();
    }

    let store = LocalStore::open(&path).unwrap();
    let dataset = store.load_all_local();
    assert_eq!(
        dataset.find("patients", "p1").and_then(|r| r.get("name")),
        Some(&json!("Alice"))
    );
}

// ── Passphrase setting ───────────────────────────────────────────

#[test]
fn passphrase_setting_roundtrip() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = LocalStore::new(kv.clone());
    assert_eq!(store.passphrase_setting(), None);

    store.set_passphrase_setting(Some("clinic-secret")).unwrap();
    assert_eq!(store.passphrase_setting().as_deref(), Some("clinic-secret"));
    assert_eq!(
        kv.get(PASSPHRASE_SETTING_KEY).unwrap().as_deref(),
        Some("clinic-secret")
    );

    store.set_passphrase_setting(None).unwrap();
    assert_eq!(store.passphrase_setting(), None);
}

#[test]
fn empty_passphrase_setting_clears_it() {
    let store = LocalStore::in_memory();
    store.set_passphrase_setting(Some("x")).unwrap();
    store.set_passphrase_setting(Some("")).unwrap();
    assert_eq!(store.passphrase_setting(), None);
}
