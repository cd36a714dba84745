//! Write and read precedence across the local store and remote tiers.
//!
//! Writes are two-phase: the local store commits synchronously before the
//! call returns, then a detached task replicates to the first remote tier
//! that accepts the write. The outcome of that task is only visible through
//! the [`SyncStatusHub`]. Reads try each remote tier in order and fall back
//! to the local store.

use crate::config::{DataLayerConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::status::{PendingWrite, Subscription, SyncStatus, SyncStatusHub};
use clinicstack_crypto::{KdfParams, PiiCodec};
use clinicstack_storage::LocalStore;
use clinicstack_types::{Dataset, Record};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Result of a write in the shape UI bridges expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for WriteOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// A remote write waiting to be replicated.
#[derive(Debug, Clone)]
enum RemoteWrite {
    Save { collection: String, record: Record },
    Delete { collection: String, id: String },
}

impl RemoteWrite {
    fn kind(&self) -> &'static str {
        match self {
            Self::Save { .. } => "save",
            Self::Delete { .. } => "delete",
        }
    }

    fn collection(&self) -> &str {
        match self {
            Self::Save { collection, .. } | Self::Delete { collection, .. } => collection,
        }
    }

    async fn apply(&self, gateway: &dyn RemoteGateway) -> SyncResult<()> {
        match self {
            Self::Save { collection, record } => gateway.save(collection, record).await,
            Self::Delete { collection, id } => gateway.delete(collection, id).await,
        }
    }
}

/// The codec in use and the passphrase it was derived from.
struct KeyedCodec {
    passphrase: String,
    codec: Arc<PiiCodec>,
}

impl KeyedCodec {
    fn derive(passphrase: &str, config: &SyncConfig) -> SyncResult<Self> {
        let params = KdfParams {
            iterations: config.kdf_iterations,
        };
        Ok(Self {
            passphrase: passphrase.to_string(),
            codec: Arc::new(PiiCodec::new(passphrase, &params)?),
        })
    }
}

struct Inner {
    local: Arc<LocalStore>,
    gateways: Vec<Arc<dyn RemoteGateway>>,
    codec: RwLock<KeyedCodec>,
    config: SyncConfig,
    status: Arc<SyncStatusHub>,
    runtime: Handle,
}

impl Inner {
    fn configured_gateways(&self) -> impl Iterator<Item = &Arc<dyn RemoteGateway>> {
        self.gateways.iter().filter(|g| g.is_configured())
    }

    fn has_remote(&self) -> bool {
        self.configured_gateways().next().is_some()
    }

    /// Tries each configured tier in order; the first success wins.
    async fn replicate(&self, write: &RemoteWrite) -> SyncResult<&'static str> {
        let mut last_error = SyncError::NotConfigured("remote");
        for gateway in self.configured_gateways() {
            let attempt =
                timeout(self.config.remote_timeout(), write.apply(gateway.as_ref())).await;
            match attempt {
                Ok(Ok(())) => return Ok(gateway.name()),
                Ok(Err(e)) => {
                    warn!(
                        gateway = gateway.name(),
                        kind = write.kind(),
                        "remote write failed: {e}"
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        gateway = gateway.name(),
                        kind = write.kind(),
                        "remote write timed out"
                    );
                    last_error = SyncError::Timeout;
                }
            }
        }
        Err(last_error)
    }

    /// First usable remote listing, if any.
    async fn remote_dataset(&self) -> Option<Dataset> {
        for gateway in self.configured_gateways() {
            let listing = gateway.list(&self.config.collections);
            match timeout(self.config.remote_timeout(), listing).await {
                Ok(Ok(dataset)) => {
                    debug!(
                        gateway = gateway.name(),
                        records = dataset.total_records(),
                        "loaded remote dataset"
                    );
                    return Some(dataset);
                }
                Ok(Err(e)) => warn!(
                    gateway = gateway.name(),
                    "remote list failed, trying next source: {e}"
                ),
                Err(_) => warn!(
                    gateway = gateway.name(),
                    "remote list timed out, trying next source"
                ),
            }
        }
        None
    }

    /// The codec for the passphrase currently in effect.
    ///
    /// The device setting is re-read on every call; the key is derived again
    /// only when the resolved passphrase has changed. If that derivation
    /// fails the previous codec stays in use.
    fn codec(&self) -> Arc<PiiCodec> {
        let setting = self.local.passphrase_setting();
        let passphrase = PiiCodec::resolve(self.config.passphrase.as_deref(), setting.as_deref());

        {
            let current = match self.codec.read() {
                Ok(current) => current,
                Err(poisoned) => poisoned.into_inner(),
            };
            if current.passphrase == passphrase {
                return Arc::clone(&current.codec);
            }
        }

        let mut current = match self.codec.write() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current.passphrase != passphrase {
            match KeyedCodec::derive(passphrase, &self.config) {
                Ok(next) => {
                    info!("PII passphrase changed, using new key");
                    *current = next;
                }
                Err(e) => warn!("keeping previous PII key, derivation failed: {e}"),
            }
        }
        Arc::clone(&current.codec)
    }

    fn seal(&self, collection: &str, record: Record) -> Record {
        if self.config.is_pii_collection(collection) {
            self.codec().encrypt_record(&record)
        } else {
            record
        }
    }

    fn open(&self, dataset: Dataset) -> Dataset {
        let pii = self.config.pii_collections.as_slice();
        let mut dataset = self.codec().decrypt_dataset(dataset, pii);
        for name in &self.config.collections {
            dataset.collection_mut(name);
        }
        dataset.normalized()
    }
}

/// Coordinates the local store, remote tiers and sync status.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator.
    ///
    /// Must be called inside a tokio runtime: replication tasks are spawned
    /// onto it. The PII key is derived here and again whenever the device
    /// passphrase setting changes.
    pub fn new(
        local: Arc<LocalStore>,
        gateways: Vec<Arc<dyn RemoteGateway>>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            SyncError::Config("orchestrator must be created inside a tokio runtime".into())
        })?;

        let setting = local.passphrase_setting();
        let passphrase = PiiCodec::resolve(config.passphrase.as_deref(), setting.as_deref());
        let codec = RwLock::new(KeyedCodec::derive(passphrase, &config)?);

        let configured: Vec<&str> = gateways
            .iter()
            .filter(|g| g.is_configured())
            .map(|g| g.name())
            .collect();
        info!(?configured, "sync orchestrator ready");

        Ok(Self {
            inner: Arc::new(Inner {
                local,
                gateways,
                codec,
                config,
                status: Arc::new(SyncStatusHub::new()),
                runtime,
            }),
        })
    }

    /// Assembles the whole data layer from configuration.
    pub fn from_config(config: &DataLayerConfig) -> SyncResult<Self> {
        let local = match &config.database_path {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::in_memory(),
        };
        Self::new(Arc::new(local), config.build_gateways()?, config.sync.clone())
    }

    /// The authoritative on-device store.
    pub fn local_store(&self) -> &Arc<LocalStore> {
        &self.inner.local
    }

    /// The status hub shared by this orchestrator's clones.
    pub fn status_hub(&self) -> &Arc<SyncStatusHub> {
        &self.inner.status
    }

    /// Saves a record: local commit now, remote replication in the background.
    ///
    /// Only a local store failure is returned. Remote failures show up in
    /// [`SyncOrchestrator::sync_status`].
    pub fn save_record(&self, collection: &str, record: Record) -> SyncResult<()> {
        let sealed = self.inner.seal(collection, record);
        self.inner.local.upsert_record(collection, sealed.clone())?;

        self.enqueue(RemoteWrite::Save {
            collection: collection.to_string(),
            record: sealed,
        });
        Ok(())
    }

    /// Deletes a record: local delete now, remote delete in the background.
    pub fn delete_record(&self, collection: &str, id: &str) -> SyncResult<()> {
        self.inner.local.delete_record(collection, id)?;

        self.enqueue(RemoteWrite::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    /// Loads everything: primary, then legacy, then the local store.
    ///
    /// Never fails. Every known collection is present in the result and PII
    /// fields come back decrypted.
    pub async fn load_all_data(&self) -> Dataset {
        let dataset = match self.inner.remote_dataset().await {
            Some(dataset) => dataset,
            None => {
                debug!("no remote source available, reading local store");
                self.inner.local.load_all_local()
            }
        };

        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || inner.open(dataset)).await {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!("decrypting dataset failed, returning empty dataset: {e}");
                Dataset::empty()
            }
        }
    }

    /// One collection from [`SyncOrchestrator::load_all_data`].
    pub async fn load_collection(&self, collection: &str) -> Vec<Record> {
        let mut dataset = self.load_all_data().await.into_inner();
        dataset.remove(collection).unwrap_or_default()
    }

    /// Replicates every local record through the write tiers.
    ///
    /// Returns the number of records enqueued. Nothing is enqueued when no
    /// remote tier is configured.
    pub fn push_local_snapshot(&self) -> usize {
        if !self.inner.has_remote() {
            return 0;
        }

        let snapshot = self.inner.local.load_all_local();
        let mut enqueued = 0;
        for (collection, records) in snapshot.iter() {
            for record in records.iter().filter(|r| r.id().is_some()) {
                self.enqueue(RemoteWrite::Save {
                    collection: collection.to_string(),
                    record: record.clone(),
                });
                enqueued += 1;
            }
        }
        info!(enqueued, "pushing local snapshot");
        enqueued
    }

    /// Current status snapshot.
    pub fn sync_status(&self) -> SyncStatus {
        self.inner.status.snapshot()
    }

    /// Registers a listener for status transitions.
    pub fn on_sync_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        self.inner.status.subscribe(listener)
    }

    /// A receiver for awaiting status transitions.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.watch()
    }

    /// Resolves once every started replication has settled.
    pub async fn settled(&self) -> SyncStatus {
        self.inner.status.settled().await
    }

    fn enqueue(&self, write: RemoteWrite) {
        if !self.inner.has_remote() {
            debug!(kind = write.kind(), "no remote tier configured, local only");
            return;
        }

        let pending: PendingWrite = self.inner.status.track();
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            match inner.replicate(&write).await {
                Ok(gateway) => {
                    debug!(
                        gateway,
                        kind = write.kind(),
                        collection = write.collection(),
                        "replicated"
                    );
                    pending.succeed();
                }
                Err(e) => {
                    warn!(
                        kind = write.kind(),
                        collection = write.collection(),
                        "replication failed on every tier: {e}"
                    );
                    pending.fail();
                }
            }
        });
    }
}
