//! Local-first sync for the ClinicStack data layer.
//!
//! Every write lands in the on-device [`LocalStore`](clinicstack_storage::LocalStore)
//! first and is then replicated in the background to the first remote tier
//! that accepts it. Reads go the other way: primary remote, legacy remote,
//! then the local store.
//!
//! ## Components
//!
//! - **Gateways**: stateless adapters over the primary and legacy remotes
//! - **Status**: pending count and idle/syncing/error state, with observers
//! - **Orchestrator**: write-through, background replication, read fallback
//!
//! # Example
//!
//! ```no_run
//! use clinicstack_sync::{DataLayerConfig, SyncOrchestrator};
//! use clinicstack_types::Record;
//!
//! # async fn demo() -> clinicstack_sync::SyncResult<()> {
//! let orchestrator = SyncOrchestrator::from_config(&DataLayerConfig::default())?;
//! orchestrator.save_record("patients", Record::with_id("p1").with("name", "Alice"))?;
//! let status = orchestrator.settled().await;
//! assert_eq!(status.pending, 0);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod gateway;
mod orchestrator;
mod status;

pub use config::{DataLayerConfig, LegacyGatewayConfig, PrimaryGatewayConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use gateway::{GatewayReply, LegacyGateway, PrimaryGateway, RemoteGateway};
pub use orchestrator::{SyncOrchestrator, WriteOutcome};
pub use status::{PendingWrite, Subscription, SyncState, SyncStatus, SyncStatusHub};
