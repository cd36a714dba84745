//! Configuration for the sync layer.
//!
//! Every struct has a usable `Default` and deserializes with missing fields
//! filled from it, so a config file only needs the values it changes.

use crate::error::{SyncError, SyncResult};
use crate::gateway::{LegacyGateway, PrimaryGateway, RemoteGateway};
use clinicstack_crypto::DEFAULT_ITERATIONS;
use clinicstack_types::KNOWN_COLLECTIONS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Behaviour of the sync orchestrator.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound for any single remote call (ms).
    pub remote_timeout_ms: u64,
    /// Collections requested from remotes and guaranteed present on load.
    pub collections: Vec<String>,
    /// Collections whose records carry PII fields.
    pub pii_collections: Vec<String>,
    /// Explicit PII passphrase; overrides the device setting.
    pub passphrase: Option<String>,
    /// PBKDF2 iterations for the PII key.
    pub kdf_iterations: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 15_000,
            collections: KNOWN_COLLECTIONS.iter().map(|c| c.to_string()).collect(),
            pii_collections: ["patients", "doctors", "staff", "users"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            passphrase: None,
            kdf_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl SyncConfig {
    /// The remote call time budget.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Whether records of a collection go through the PII codec.
    pub fn is_pii_collection(&self, collection: &str) -> bool {
        self.pii_collections.iter().any(|c| c == collection)
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("remote_timeout_ms", &self.remote_timeout_ms)
            .field("collections", &self.collections)
            .field("pii_collections", &self.pii_collections)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("kdf_iterations", &self.kdf_iterations)
            .finish()
    }
}

/// Primary remote persistence service.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryGatewayConfig {
    /// Service base URL, e.g. `https://api.example.com/v1`. Empty disables
    /// the gateway.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_key: String,
    /// Tenant/session identifier, opaque to this layer.
    pub tenant_id: String,
    /// HTTP client timeout (seconds).
    pub timeout_secs: u64,
}

impl Default for PrimaryGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            tenant_id: "default".to_string(),
            timeout_secs: 15,
        }
    }
}

impl std::fmt::Debug for PrimaryGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryGatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("tenant_id", &self.tenant_id)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Legacy single-endpoint remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyGatewayConfig {
    /// Endpoint URL receiving every action. Empty disables the gateway.
    pub endpoint: String,
    /// HTTP client timeout (seconds).
    pub timeout_secs: u64,
}

impl Default for LegacyGatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: 20,
        }
    }
}

/// Everything needed to assemble the data layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataLayerConfig {
    /// On-device database file. `None` keeps data in memory only.
    pub database_path: Option<PathBuf>,
    pub sync: SyncConfig,
    pub primary: PrimaryGatewayConfig,
    pub legacy: LegacyGatewayConfig,
}

impl DataLayerConfig {
    /// Parses a JSON config document.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(format!("invalid config: {e}")))
    }

    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Builds the remote tiers in precedence order: primary, then legacy.
    pub fn build_gateways(&self) -> SyncResult<Vec<Arc<dyn RemoteGateway>>> {
        Ok(vec![
            Arc::new(PrimaryGateway::new(self.primary.clone())?),
            Arc::new(LegacyGateway::new(self.legacy.clone())?),
        ])
    }
}
