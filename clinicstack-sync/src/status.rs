//! Replication health as seen by the UI.
//!
//! One [`SyncStatusHub`] belongs to one orchestrator. The current
//! [`SyncStatus`] lives in a `tokio::sync::watch` channel, so reads never
//! block and async callers can await transitions. Plain callback listeners
//! sit next to it for UI bridges.

use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tracing::warn;

/// Replication state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Nothing in flight and the last attempt succeeded (or none was made).
    #[default]
    Idle,
    /// At least one remote write is in flight.
    Syncing,
    /// Nothing in flight and the most recent attempt failed on every tier.
    /// Advisory only: the data is safe in the local store.
    Error,
}

/// Snapshot of replication health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub status: SyncState,
    /// Remote writes started and not yet settled.
    pub pending: u64,
}

impl SyncStatus {
    /// Whether no remote write is outstanding.
    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }
}

type Listener = Arc<dyn Fn(SyncStatus) + Send + Sync>;

/// Owner of the sync status and its observers.
pub struct SyncStatusHub {
    tx: watch::Sender<SyncStatus>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    /// Held from a state change until its listeners have run, so every
    /// listener sees transitions in the order they happened.
    transition_lock: Mutex<()>,
}

impl Default for SyncStatusHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatusHub {
    /// Creates a hub in the idle state with nothing pending.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncStatus::default());
        Self {
            tx,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            transition_lock: Mutex::new(()),
        }
    }

    /// Current status.
    pub fn snapshot(&self) -> SyncStatus {
        *self.tx.borrow()
    }

    /// Records the start of a remote write.
    pub fn begin(&self) -> SyncStatus {
        self.transition(|status| {
            status.pending += 1;
            status.status = SyncState::Syncing;
        })
    }

    /// Records the end of a remote write.
    ///
    /// When this was the last outstanding write the state becomes idle, or
    /// error if this attempt failed. Otherwise it stays syncing.
    pub fn settle(&self, ok: bool) -> SyncStatus {
        self.transition(|status| {
            status.pending = status.pending.saturating_sub(1);
            status.status = match (status.pending, ok) {
                (0, true) => SyncState::Idle,
                (0, false) => SyncState::Error,
                _ => SyncState::Syncing,
            };
        })
    }

    /// Starts a tracked remote write that settles when the guard is dropped.
    ///
    /// The write counts as failed unless [`PendingWrite::succeed`] was
    /// called, so a cancelled or panicking task still settles.
    pub fn track(self: &Arc<Self>) -> PendingWrite {
        self.begin();
        PendingWrite {
            hub: Arc::clone(self),
            ok: false,
        }
    }

    /// Registers a listener called with the new status on every transition.
    ///
    /// Listeners run one transition at a time, in order. A listener may read
    /// the status or subscribe, but must not begin or settle writes itself.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push((id, Arc::new(listener))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(listener))),
        }
        Subscription {
            hub: Arc::downgrade(self),
            id,
        }
    }

    /// A receiver for awaiting transitions.
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Resolves once nothing is pending.
    pub async fn settled(&self) -> SyncStatus {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        match rx.wait_for(SyncStatus::is_settled).await {
            Ok(status) => *status,
            Err(_) => self.snapshot(),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        match self.listeners.lock() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn transition(&self, change: impl FnOnce(&mut SyncStatus)) -> SyncStatus {
        let _ordered = match self.transition_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = SyncStatus::default();
        self.tx.send_modify(|status| {
            change(status);
            next = *status;
        });
        self.notify(next);
        next
    }

    fn notify(&self, status: SyncStatus) {
        let listeners: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, l)| Arc::clone(l)).collect(),
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
                warn!("sync status listener panicked");
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.retain(|(lid, _)| *lid != id),
            Err(poisoned) => poisoned.into_inner().retain(|(lid, _)| *lid != id),
        }
    }
}

/// Handle returned by [`SyncStatusHub::subscribe`].
///
/// Dropping the handle leaves the listener registered.
pub struct Subscription {
    hub: Weak<SyncStatusHub>,
    id: u64,
}

impl Subscription {
    /// Removes this listener and no other.
    pub fn unsubscribe(self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// One in-flight remote write. Settles the hub exactly once, on drop.
pub struct PendingWrite {
    hub: Arc<SyncStatusHub>,
    ok: bool,
}

impl PendingWrite {
    /// Marks the write as replicated.
    pub fn succeed(mut self) {
        self.ok = true;
    }

    /// Marks the write as failed on every tier.
    pub fn fail(self) {}
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        self.hub.settle(self.ok);
    }
}
