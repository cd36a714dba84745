//! ClinicStack operator CLI.
//!
//! Works directly on a device database and the configured remote gateways:
//!
//!   clinicstack --database clinic.db save patients '{"name":"Alice"}'
//!   clinicstack --config clinic.json load --collection patients
//!   clinicstack --config clinic.json push
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::Result;
use clap::Parser;
use clinicstack_cli::{Args, run};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let output = run(&args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
