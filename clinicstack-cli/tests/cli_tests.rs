use clap::Parser;
use clinicstack_cli::{Args, Command, DEFAULT_DATABASE, parse_record, run};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A workspace with a fast-KDF config and a database path.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = json!({
            "database_path": dir.path().join("clinic.db"),
            "sync": { "kdf_iterations": 1000 }
        });
        std::fs::write(dir.path().join("clinic.json"), config.to_string()).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("clinic.json")
    }

    fn args(&self, extra: &[&str]) -> Args {
        let config = self.config_path();
        let mut argv = vec!["clinicstack", "--config", config.to_str().unwrap()];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    async fn run(&self, extra: &[&str]) -> Value {
        run(&self.args(extra)).await.unwrap()
    }

    fn database(&self) -> PathBuf {
        self.dir.path().join("clinic.db")
    }
}

// ── Argument parsing ────────────────────────────────────────────

#[test]
fn parses_save_command() {
    let args =
        Args::try_parse_from(["clinicstack", "-d", "x.db", "save", "patients", "{}"]).unwrap();
    assert_eq!(args.database, Some(PathBuf::from("x.db")));
    assert_eq!(
        args.command,
        Command::Save {
            collection: "patients".to_string(),
            record: "{}".to_string(),
        }
    );
}

#[test]
fn set_passphrase_rejects_value_with_clear() {
    let result = Args::try_parse_from(["clinicstack", "set-passphrase", "new", "--clear"]);
    assert!(result.is_err());
}

#[test]
fn database_defaults_when_unset() {
    let args = Args::try_parse_from(["clinicstack", "status"]).unwrap();
    let config = args.data_layer_config().unwrap();
    assert_eq!(config.database_path, Some(PathBuf::from(DEFAULT_DATABASE)));
}

#[test]
fn database_flag_overrides_config() {
    let ws = Workspace::new();
    let args = ws.args(&["--database", "/tmp/other.db", "status"]);
    let config = args.data_layer_config().unwrap();
    assert_eq!(config.database_path.as_deref(), Some(Path::new("/tmp/other.db")));
    assert_eq!(config.sync.kdf_iterations, 1000);
}

// ── Record parsing ──────────────────────────────────────────────

#[test]
fn parse_record_mints_missing_id() {
    let record = parse_record(r#"{"name":"Alice"}"#).unwrap();
    let id = record.id().unwrap();
    assert_eq!(id.len(), 36);
    assert_eq!(record.get("name"), Some(&json!("Alice")));
}

#[test]
fn parse_record_keeps_given_id() {
    let record = parse_record(r#"{"id":"p1"}"#).unwrap();
    assert_eq!(record.id(), Some("p1"));
}

#[test]
fn parse_record_rejects_bad_input() {
    assert!(parse_record("not json").is_err());
    assert!(parse_record("[1,2]").is_err());
    assert!(parse_record(r#"{"id":7}"#).is_err());
    assert!(parse_record(r#"{"id":""}"#).is_err());
}

// ── Commands ────────────────────────────────────────────────────

#[tokio::test]
async fn save_then_load_round_trips_pii() {
    let ws = Workspace::new();

    let saved = ws
        .run(&["save", "patients", r#"{"id":"p1","name":"Alice","phone":"12345678"}"#])
        .await;
    assert_eq!(saved["id"], json!("p1"));
    assert_eq!(saved["outcome"], json!({ "ok": true }));
    assert_eq!(saved["sync"], json!({ "status": "idle", "pending": 0 }));

    let raw = std::fs::read(ws.database()).unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains("12345678"));

    let patients = ws.run(&["load", "--collection", "patients"]).await;
    assert_eq!(patients, json!([{ "id": "p1", "name": "Alice", "phone": "12345678" }]));
}

#[tokio::test]
async fn load_without_collection_lists_every_known_collection() {
    let ws = Workspace::new();
    let all = ws.run(&["load"]).await;
    let members = all.as_object().unwrap();
    assert_eq!(members.len(), clinicstack_types::KNOWN_COLLECTIONS.len());
    assert!(members.values().all(|v| v == &json!([])));
}

#[tokio::test]
async fn delete_removes_record() {
    let ws = Workspace::new();
    ws.run(&["save", "visits", r#"{"id":"v1"}"#]).await;

    let deleted = ws.run(&["delete", "visits", "v1"]).await;
    assert_eq!(deleted["outcome"], json!({ "ok": true }));
    assert_eq!(ws.run(&["load", "--collection", "visits"]).await, json!([]));
}

#[tokio::test]
async fn status_reports_gateways_and_counts() {
    let ws = Workspace::new();
    ws.run(&["save", "visits", r#"{"id":"v1"}"#]).await;
    ws.run(&["save", "visits", r#"{"id":"v2"}"#]).await;

    let status = ws.run(&["status"]).await;
    assert_eq!(status["sync"], json!({ "status": "idle", "pending": 0 }));
    assert_eq!(
        status["gateways"],
        json!([
            { "name": "primary", "configured": false },
            { "name": "legacy", "configured": false }
        ])
    );
    assert_eq!(status["local_records"], json!([["visits", 2]]));
}

#[tokio::test]
async fn push_without_remotes_enqueues_nothing() {
    let ws = Workspace::new();
    ws.run(&["save", "visits", r#"{"id":"v1"}"#]).await;

    let pushed = ws.run(&["push"]).await;
    assert_eq!(pushed["enqueued"], json!(0));
}

#[tokio::test]
async fn set_passphrase_reencrypts_local_pii() {
    let ws = Workspace::new();
    ws.run(&[
        "--passphrase",
        "old-secret",
        "save",
        "patients",
        r#"{"id":"p1","phone":"555"}"#,
    ])
    .await;

    let report = ws
        .run(&["--passphrase", "old-secret", "set-passphrase", "new-secret"])
        .await;
    assert_eq!(report, json!({ "rewritten": 1, "unreadable": 0 }));

    // The device setting now carries the new passphrase.
    let patients = ws.run(&["load", "--collection", "patients"]).await;
    assert_eq!(patients, json!([{ "id": "p1", "phone": "555" }]));
}

#[tokio::test]
async fn set_passphrase_keeps_unreadable_records() {
    let ws = Workspace::new();
    ws.run(&["--passphrase", "first", "save", "patients", r#"{"id":"p1","phone":"555"}"#])
        .await;

    let report = ws
        .run(&["--passphrase", "wrong", "set-passphrase", "second"])
        .await;
    assert_eq!(report, json!({ "rewritten": 0, "unreadable": 1 }));

    let patients = ws
        .run(&["--passphrase", "first", "load", "--collection", "patients"])
        .await;
    assert_eq!(patients, json!([{ "id": "p1", "phone": "555" }]));
}

#[tokio::test]
async fn set_passphrase_requires_value_or_clear() {
    let ws = Workspace::new();
    assert!(run(&ws.args(&["set-passphrase"])).await.is_err());
    assert_eq!(
        ws.run(&["set-passphrase", "--clear"]).await,
        json!({ "rewritten": 0, "unreadable": 0 })
    );
}
