//! CLI argument parsing for Mnemosyne
//!
//! Argument definitions only. Commands live in the `*_cmd` modules.

use clap::{Args, Parser, Subcommand};
use mnemosyne::config::CliOverrides;
use std::path::PathBuf;

/// Mnemosyne: build a queryable code graph from a Python source tree.
#[derive(Parser, Debug)]
#[command(name = "mnemosyne")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_required = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: mnemosyne.toml in the project root, if present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract, cognify and load a project into the graph.
    Ingest(IngestArgs),

    /// Check that the graph store answers queries.
    Health(StoreArgs),

    /// Delete the graph, or the part of it under a path prefix.
    Clear {
        #[command(flatten)]
        store: StoreArgs,

        /// Only delete nodes whose path starts with this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Run a SQL statement against the graph store.
    Query {
        #[command(flatten)]
        store: StoreArgs,

        /// Statement text; use $name placeholders for parameters.
        #[arg(long)]
        sql: String,

        /// Named parameter as key=value (value parsed as JSON, else text).
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
}

/// Store selection shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Graph database file (`:memory:` for a throwaway graph).
    #[arg(long, value_name = "FILE")]
    pub db: Option<String>,

    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Project root to ingest.
    pub root: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Clear existing graph data before loading.
    #[arg(long)]
    pub clear: bool,

    /// Restrict --clear to nodes under this path prefix.
    #[arg(long, value_name = "PREFIX")]
    pub clear_prefix: Option<String>,

    /// File extension to extract (repeatable).
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Call resolution policy: first-match or scoped.
    #[arg(long)]
    pub resolver: Option<String>,

    /// Leave files whose content hash is unchanged as stored.
    #[arg(long)]
    pub skip_unchanged: bool,

    /// Do not take the project lease.
    #[arg(long)]
    pub no_lease: bool,
}

impl IngestArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            database: self.store.db.clone(),
            extensions: self.extensions.clone(),
            resolver: self.resolver.clone(),
            clear_existing: self.clear.then_some(true),
            clear_prefix: self.clear_prefix.clone(),
            skip_unchanged: self.skip_unchanged.then_some(true),
            use_lease: self.no_lease.then_some(false),
            ..CliOverrides::default()
        }
    }
}

impl StoreArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            database: self.db.clone(),
            ..CliOverrides::default()
        }
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "mnemosyne",
            "ingest",
            "proj",
            "--db",
            "g.db",
            "--ext",
            "py",
            "--ext",
            "pyi",
            "--no-lease",
            "--clear",
        ])
        .unwrap();
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        let overrides = args.overrides();
        assert_eq!(overrides.database.as_deref(), Some("g.db"));
        assert_eq!(overrides.extensions, vec!["py", "pyi"]);
        assert_eq!(overrides.use_lease, Some(false));
        assert_eq!(overrides.clear_existing, Some(true));
        assert_eq!(overrides.skip_unchanged, None);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["mnemosyne", "-v", "-q", "health"]).is_err());
    }

    #[test]
    fn test_query_params_repeat() {
        let cli = Cli::try_parse_from([
            "mnemosyne",
            "query",
            "--sql",
            "SELECT $a",
            "--param",
            "a=1",
            "--param",
            "b=x",
        ])
        .unwrap();
        match cli.command {
            Command::Query { params, .. } => assert_eq!(params, vec!["a=1", "b=x"]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
