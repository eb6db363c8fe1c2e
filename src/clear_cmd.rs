//! Clear command

use anyhow::{Context, Result};
use mnemosyne::output::{generate_execution_id, output_json, JsonResponse};
use mnemosyne::{Loader, MnemoConfig, SqliteGraphStore};
use std::path::Path;

use crate::cli::StoreArgs;

pub fn run(args: &StoreArgs, prefix: Option<&str>, config_file: Option<&Path>) -> Result<bool> {
    let config = MnemoConfig::load(None, config_file, Some(&args.overrides()))
        .context("Failed to load configuration")?;

    let mut store = SqliteGraphStore::new(config.store);
    let stats = Loader::new(&mut store)
        .clear(prefix)
        .with_context(|| format!("Failed to clear {}", prefix.unwrap_or("graph")))?;

    if args.json {
        output_json(&JsonResponse::new(stats, &generate_execution_id()))?;
    } else {
        println!(
            "Deleted {} nodes and {} edges{}",
            stats.nodes_deleted,
            stats.edges_deleted,
            prefix.map(|p| format!(" under {}", p)).unwrap_or_default()
        );
    }
    Ok(true)
}
