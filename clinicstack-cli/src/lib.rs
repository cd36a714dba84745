//! Command handling for the ClinicStack operator CLI.
//!
//! `main.rs` only parses arguments and sets up logging; everything the
//! commands do lives here so it can be driven from tests.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clinicstack_crypto::{DECRYPT_PLACEHOLDER, KdfParams, PII_FIELDS, PiiCodec};
use clinicstack_storage::LocalStore;
use clinicstack_sync::{DataLayerConfig, SyncOrchestrator, SyncStatus, WriteOutcome};
use clinicstack_types::{Dataset, Record};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::info;

/// Database file used when neither the flag nor the config names one.
pub const DEFAULT_DATABASE: &str = "clinicstack.db";

#[derive(Parser, Debug)]
#[command(name = "clinicstack")]
#[command(about = "Inspect and operate the ClinicStack local-first data layer")]
pub struct Args {
    /// JSON config file (database path, gateways, sync settings)
    #[arg(short, long, env = "CLINICSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// On-device database file, overrides the config
    #[arg(short, long, env = "CLINICSTACK_DB")]
    pub database: Option<PathBuf>,

    /// PII passphrase, overrides the device setting
    #[arg(long, env = "CLINICSTACK_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Save a record (JSON object); an id is generated when missing
    Save { collection: String, record: String },
    /// Delete a record by id
    Delete { collection: String, id: String },
    /// Load data through the remote/local fallback chain
    Load {
        /// Only print this collection
        #[arg(long)]
        collection: Option<String>,
    },
    /// Show sync status, configured gateways and local record counts
    Status,
    /// Replicate every local record to the remote tiers
    Push,
    /// Set or clear the device PII passphrase, re-encrypting local data
    SetPassphrase {
        /// New passphrase
        #[arg(value_name = "PASSPHRASE")]
        new_passphrase: Option<String>,
        /// Remove the device passphrase and fall back to the built-in default
        #[arg(long, conflicts_with = "new_passphrase")]
        clear: bool,
    },
}

impl Args {
    /// Resolves the data layer configuration from the config file and flags.
    pub fn data_layer_config(&self) -> Result<DataLayerConfig> {
        let mut config = match &self.config {
            Some(path) => DataLayerConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => DataLayerConfig::default(),
        };
        if let Some(database) = &self.database {
            config.database_path = Some(database.clone());
        }
        if config.database_path.is_none() {
            config.database_path = Some(PathBuf::from(DEFAULT_DATABASE));
        }
        if self.passphrase.is_some() {
            config.sync.passphrase = self.passphrase.clone();
        }
        Ok(config)
    }
}

/// Runs a command and returns what should be printed.
pub async fn run(args: &Args) -> Result<Value> {
    let config = args.data_layer_config()?;
    let open = || SyncOrchestrator::from_config(&config);

    match &args.command {
        Command::Save { collection, record } => {
            let orchestrator = open()?;
            let record = parse_record(record)?;
            let id = record.id().unwrap_or_default().to_string();
            let outcome = WriteOutcome::from(orchestrator.save_record(collection, record));
            let status = orchestrator.settled().await;
            Ok(json!({ "id": id, "outcome": outcome, "sync": status }))
        }
        Command::Delete { collection, id } => {
            let orchestrator = open()?;
            let outcome = WriteOutcome::from(orchestrator.delete_record(collection, id));
            let status = orchestrator.settled().await;
            Ok(json!({ "outcome": outcome, "sync": status }))
        }
        Command::Load { collection } => {
            let orchestrator = open()?;
            match collection {
                Some(name) => Ok(serde_json::to_value(orchestrator.load_collection(name).await)?),
                None => Ok(serde_json::to_value(orchestrator.load_all_data().await)?),
            }
        }
        Command::Status => {
            let orchestrator = open()?;
            Ok(serde_json::to_value(status_report(&config, &orchestrator)?)?)
        }
        Command::Push => {
            let orchestrator = open()?;
            let enqueued = orchestrator.push_local_snapshot();
            let status = orchestrator.settled().await;
            info!(enqueued, ?status, "push finished");
            Ok(json!({ "enqueued": enqueued, "sync": status }))
        }
        Command::SetPassphrase {
            new_passphrase,
            clear,
        } => {
            if new_passphrase.is_none() && !clear {
                bail!("give a new passphrase or --clear");
            }
            let report = set_passphrase(&config, new_passphrase.as_deref())?;
            Ok(serde_json::to_value(report)?)
        }
    }
}

/// Parses a record argument, minting an id when it has none.
pub fn parse_record(text: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(text).context("record is not valid JSON")?;
    let mut record = Record::from_value(value).context("record must be a JSON object")?;
    match record.get("id") {
        None => {
            record.insert("id", uuid::Uuid::new_v4().to_string());
        }
        Some(Value::String(id)) if !id.is_empty() => {}
        Some(_) => bail!("record id must be a non-empty string"),
    }
    Ok(record)
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub sync: SyncStatus,
    pub database: Option<PathBuf>,
    pub gateways: Vec<GatewayInfo>,
    pub local_records: Vec<(String, usize)>,
}

#[derive(Debug, Serialize)]
pub struct GatewayInfo {
    pub name: &'static str,
    pub configured: bool,
}

fn status_report(
    config: &DataLayerConfig,
    orchestrator: &SyncOrchestrator,
) -> Result<StatusReport> {
    let gateways = config
        .build_gateways()?
        .iter()
        .map(|g| GatewayInfo {
            name: g.name(),
            configured: g.is_configured(),
        })
        .collect();
    let local_records = orchestrator
        .local_store()
        .load_all_local()
        .iter()
        .filter(|(_, records)| !records.is_empty())
        .map(|(name, records)| (name.to_string(), records.len()))
        .collect();

    Ok(StatusReport {
        sync: orchestrator.sync_status(),
        database: config.database_path.clone(),
        gateways,
        local_records,
    })
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct RekeyReport {
    /// Records re-encrypted under the new passphrase.
    pub rewritten: usize,
    /// Records left untouched because they did not decrypt under the old one.
    pub unreadable: usize,
}

/// Changes the device passphrase and re-encrypts the local PII under it.
///
/// Records that do not decrypt under the current passphrase are kept as
/// they are so no ciphertext is replaced by the placeholder.
pub fn set_passphrase(
    config: &DataLayerConfig,
    new_passphrase: Option<&str>,
) -> Result<RekeyReport> {
    let local = match &config.database_path {
        Some(path) => LocalStore::open(path)?,
        None => LocalStore::in_memory(),
    };
    let params = KdfParams {
        iterations: config.sync.kdf_iterations,
    };
    let setting = local.passphrase_setting();
    let old = PiiCodec::new(
        PiiCodec::resolve(config.sync.passphrase.as_deref(), setting.as_deref()),
        &params,
    )?;
    let new = PiiCodec::new(PiiCodec::resolve(new_passphrase, None), &params)?;

    let mut dataset = local.load_all_local();
    let report = rekey(&mut dataset, &config.sync.pii_collections, &old, &new);
    local.save_all_local(&dataset)?;
    local.set_passphrase_setting(new_passphrase)?;

    info!(rewritten = report.rewritten, unreadable = report.unreadable, "passphrase changed");
    Ok(report)
}

fn rekey(
    dataset: &mut Dataset,
    collections: &[String],
    old: &PiiCodec,
    new: &PiiCodec,
) -> RekeyReport {
    let mut report = RekeyReport::default();
    for (name, records) in dataset.iter_mut() {
        if !collections.iter().any(|c| c == name) {
            continue;
        }
        for record in records.iter_mut() {
            let plain = old.decrypt_record(record);
            let broken = PII_FIELDS.iter().any(|&field| {
                plain.get(field).and_then(Value::as_str) == Some(DECRYPT_PLACEHOLDER)
                    && record.get(field) != plain.get(field)
            });
            if broken {
                report.unreadable += 1;
                continue;
            }
            *record = new.encrypt_record(&plain);
            report.rewritten += 1;
        }
    }
    report
}
