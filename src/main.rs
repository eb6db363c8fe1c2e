//! Mnemosyne CLI binary
//!
//! A thin adapter over the library: argument parsing, logging setup and
//! output formatting only.

mod clear_cmd;
mod cli;
mod health_cmd;
mod ingest_cmd;
mod query_cmd;

use anyhow::Result;
use std::process::ExitCode;

use cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = cli::parse_args();
    init_logging(&cli);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

/// Returns whether the command succeeded.
fn run(cli: Cli) -> Result<bool> {
    let config_file = cli.config.as_deref();
    match cli.command {
        Command::Ingest(args) => ingest_cmd::run(&args, config_file),
        Command::Health(store) => health_cmd::run(&store, config_file),
        Command::Clear { store, prefix } => clear_cmd::run(&store, prefix.as_deref(), config_file),
        Command::Query { store, sql, params } => {
            query_cmd::run(&store, &sql, &params, config_file)
        }
    }
}
