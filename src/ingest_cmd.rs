//! Ingest command: run the pipeline over one project

use anyhow::{Context, Result};
use mnemosyne::output::{generate_execution_id, output_json, JsonResponse};
use mnemosyne::{MnemoConfig, Pipeline, PipelineResult, SqliteGraphStore};
use std::path::Path;

use crate::cli::IngestArgs;

pub fn run(args: &IngestArgs, config_file: Option<&Path>) -> Result<bool> {
    let exec_id = generate_execution_id();
    let config = MnemoConfig::load(Some(args.root.as_path()), config_file, Some(&args.overrides()))
        .context("Failed to load configuration")?;
    log::debug!("Execution {} with config {:?}", exec_id, config);

    let mut store = SqliteGraphStore::new(config.store.clone());
    let options = config.pipeline_options()?;
    let result = {
        let mut pipeline = Pipeline::new(&mut store, options)?;
        pipeline.process_project(&args.root, config.pipeline.clear_existing)?
    };

    if args.store.json {
        output_json(&JsonResponse::new(&result, &exec_id))?;
    } else {
        print_summary(&result);
    }
    Ok(result.success)
}

fn print_summary(result: &PipelineResult) {
    println!("Project: {}", result.project);
    println!(
        "  files:     {} extracted ({} seen, {} unchanged)",
        result.files_extracted, result.files_seen, result.files_skipped
    );
    println!("  packages:  {}", result.packages_found);
    println!(
        "  functions: {} found, {} loaded",
        result.functions_found, result.functions_loaded
    );
    println!(
        "  classes:   {} found, {} loaded",
        result.classes_found, result.classes_loaded
    );
    println!(
        "  calls:     {} found, {} loaded",
        result.calls_found, result.calls_loaded
    );
    if !result.errors.is_empty() {
        println!("Errors ({}):", result.total_errors());
        for error in &result.errors {
            println!("  {}", error);
        }
    }
    println!(
        "{} in {:.0}ms",
        if result.success { "OK" } else { "FAILED" },
        result.duration_ms
    );
}
