//! Layered configuration.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via [`MnemoConfig::apply_cli_overrides`])
//! 2. Environment variables (`MNEMOSYNE_*`)
//! 3. Project config (`mnemosyne.toml` in the project root, or `--config`)
//! 4. Compiled defaults

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::ecl::{PipelineOptions, ResolverKind, DEFAULT_EXTENSIONS};
use crate::graph::ConnectionConfig;

pub const CONFIG_FILE_NAME: &str = "mnemosyne.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid TOML in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MnemoConfig {
    pub store: ConnectionConfig,
    pub extract: ExtractConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub extensions: Vec<String>,
    /// Added to the fixed noise directories, never replacing them
    pub extra_ignored_dirs: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            extra_ignored_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub clear_existing: bool,
    pub clear_prefix: Option<String>,
    /// `first-match` or `scoped`
    pub resolver: String,
    pub skip_unchanged: bool,
    pub use_lease: bool,
    pub lease_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clear_existing: false,
            clear_prefix: None,
            resolver: ResolverKind::default().as_str().to_string(),
            skip_unchanged: false,
            use_lease: true,
            lease_ttl_secs: 600,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub extensions: Vec<String>,
    pub resolver: Option<String>,
    pub clear_existing: Option<bool>,
    pub clear_prefix: Option<String>,
    pub skip_unchanged: Option<bool>,
    pub use_lease: Option<bool>,
}

impl MnemoConfig {
    /// Resolve all layers and validate the result.
    ///
    /// `config_file` must exist when given; otherwise `mnemosyne.toml` under
    /// `project_root` is read when present.
    pub fn load(
        project_root: Option<&Path>,
        config_file: Option<&Path>,
        cli: Option<&CliOverrides>,
    ) -> Result<Self, ConfigError> {
        let mut config = match (config_file, project_root) {
            (Some(path), _) => Self::from_file(path)?,
            (None, Some(root)) if root.join(CONFIG_FILE_NAME).is_file() => {
                Self::from_file(&root.join(CONFIG_FILE_NAME))?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        if let Some(cli) = cli {
            config.apply_cli_overrides(cli);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        log::debug!("Loaded config from {}", path.display());
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Self::parse(toml_str, "<string>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `MNEMOSYNE_*` variables found through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("MNEMOSYNE_DB") {
            self.store.database = db;
        }
        if let Some(host) = lookup("MNEMOSYNE_HOST") {
            self.store.host = host;
        }
        if let Some(port) = lookup("MNEMOSYNE_PORT") {
            match port.parse() {
                Ok(port) => self.store.port = port,
                Err(_) => log::warn!("Ignoring MNEMOSYNE_PORT={}: not a port number", port),
            }
        }
        if let Some(exts) = lookup("MNEMOSYNE_EXTENSIONS") {
            let exts: Vec<String> = exts
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
            if !exts.is_empty() {
                self.extract.extensions = exts;
            }
        }
        if let Some(resolver) = lookup("MNEMOSYNE_RESOLVER") {
            self.pipeline.resolver = resolver;
        }
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(db) = &cli.database {
            self.store.database = db.clone();
        }
        if let Some(host) = &cli.host {
            self.store.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.store.port = port;
        }
        if !cli.extensions.is_empty() {
            self.extract.extensions = cli.extensions.clone();
        }
        if let Some(resolver) = &cli.resolver {
            self.pipeline.resolver = resolver.clone();
        }
        if let Some(clear) = cli.clear_existing {
            self.pipeline.clear_existing = clear;
        }
        if let Some(prefix) = &cli.clear_prefix {
            self.pipeline.clear_prefix = Some(prefix.clone());
        }
        if let Some(skip) = cli.skip_unchanged {
            self.pipeline.skip_unchanged = skip;
        }
        if let Some(lease) = cli.use_lease {
            self.pipeline.use_lease = lease;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.database.trim().is_empty() {
            return Err(invalid("store.database", "must not be empty"));
        }
        if self.store.connection_timeout_secs == 0 {
            return Err(invalid("store.connection_timeout_secs", "must be greater than 0"));
        }
        if self.store.query_timeout_secs == 0 {
            return Err(invalid("store.query_timeout_secs", "must be greater than 0"));
        }
        if self.extract.extensions.iter().all(|e| e.trim().trim_start_matches('.').is_empty()) {
            return Err(invalid("extract.extensions", "must list at least one extension"));
        }
        if self.pipeline.lease_ttl_secs == 0 {
            return Err(invalid("pipeline.lease_ttl_secs", "must be greater than 0"));
        }
        self.resolver_kind()?;
        Ok(())
    }

    pub fn resolver_kind(&self) -> Result<ResolverKind, ConfigError> {
        self.pipeline
            .resolver
            .parse()
            .map_err(|message: String| invalid("pipeline.resolver", &message))
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions, ConfigError> {
        Ok(PipelineOptions {
            extensions: self.extract.extensions.clone(),
            extra_ignored_dirs: self.extract.extra_ignored_dirs.clone(),
            resolver: self.resolver_kind()?,
            clear_prefix: self.pipeline.clear_prefix.clone(),
            skip_unchanged: self.pipeline.skip_unchanged,
            use_lease: self.pipeline.use_lease,
            lease_ttl: Duration::from_secs(self.pipeline.lease_ttl_secs),
        })
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}
