//! Health command: connect, probe, report

use anyhow::{Context, Result};
use mnemosyne::output::{generate_execution_id, output_json, JsonResponse};
use mnemosyne::{GraphStore, MnemoConfig, SqliteGraphStore};
use std::path::Path;

use crate::cli::StoreArgs;

pub fn run(args: &StoreArgs, config_file: Option<&Path>) -> Result<bool> {
    let config = MnemoConfig::load(None, config_file, Some(&args.overrides()))
        .context("Failed to load configuration")?;

    let mut store = SqliteGraphStore::new(config.store);
    // An unreachable store is reported by the healthcheck itself.
    if let Err(e) = store.connect() {
        log::warn!("Connect failed: {}", e);
    }
    let status = store.healthcheck();
    if let Err(e) = store.disconnect() {
        log::warn!("Failed to disconnect graph store: {}", e);
    }

    if args.json {
        output_json(&JsonResponse::new(&status, &generate_execution_id()))?;
    } else {
        let state = if status.is_healthy() { "healthy" } else { "unhealthy" };
        println!("{}: {}", status.database, state);
        if let Some(ms) = status.response_time_ms {
            println!("  response time: {:.2}ms", ms);
        }
        if let Some(error) = &status.error {
            println!("  error: {}", error);
        }
    }
    Ok(status.is_healthy())
}
