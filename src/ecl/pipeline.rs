//! Extract -> Cognify -> Load orchestration
//!
//! Stage failures are data: they accumulate in [`PipelineResult::errors`].
//! The only error returned as `Err` is failing to take the project lease
//! on a reachable store.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use super::cognify::Cognifier;
use super::extract::{Extractor, DEFAULT_EXTENSIONS};
use super::load::{LoadBatch, Loader};
use super::resolve::ResolverKind;
use crate::common::path_key;
use crate::entities::FileFact;
use crate::graph::{elapsed_ms, GraphWriter};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot lease project {project}: {reason}")]
    Lease { project: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub extensions: Vec<String>,
    pub extra_ignored_dirs: Vec<String>,
    pub resolver: ResolverKind,
    /// Scope of `clear_existing`; the whole graph when `None`
    pub clear_prefix: Option<String>,
    /// Leave File nodes whose stored hash matches, and their definitions, as
    /// they are
    pub skip_unchanged: bool,
    pub use_lease: bool,
    pub lease_ttl: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            extra_ignored_dirs: Vec::new(),
            resolver: ResolverKind::default(),
            clear_prefix: None,
            skip_unchanged: false,
            use_lease: true,
            lease_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    pub project: String,
    pub files_extracted: usize,
    pub files_seen: usize,
    pub files_skipped: usize,
    pub packages_found: usize,
    pub functions_found: usize,
    pub classes_found: usize,
    pub calls_found: usize,
    pub files_loaded: usize,
    pub packages_loaded: usize,
    pub functions_loaded: usize,
    pub classes_loaded: usize,
    pub calls_loaded: usize,
    pub errors: Vec<String>,
    /// At least one file and one function, and no errors in any stage
    pub success: bool,
    pub duration_ms: f64,
}

impl PipelineResult {
    pub fn total_errors(&self) -> usize {
        self.errors.len()
    }
}

pub struct Pipeline<'s, S: GraphWriter + ?Sized> {
    store: &'s mut S,
    extractor: Extractor,
    cognifier: Cognifier,
    options: PipelineOptions,
}

impl<'s, S: GraphWriter + ?Sized> Pipeline<'s, S> {
    pub fn new(store: &'s mut S, options: PipelineOptions) -> anyhow::Result<Self> {
        let extractor = Extractor::new()
            .with_extensions(&options.extensions)
            .with_ignored_dirs(options.extra_ignored_dirs.iter().cloned());
        let cognifier = Cognifier::with_resolver(options.resolver.build())?;
        Ok(Self {
            store,
            extractor,
            cognifier,
            options,
        })
    }

    pub fn with_defaults(store: &'s mut S) -> anyhow::Result<Self> {
        Self::new(store, PipelineOptions::default())
    }

    /// Run all three stages over the project at `root`.
    ///
    /// # Behavior
    /// 1. Connect and take the project lease (when enabled)
    /// 2. Clear the previous graph when `clear_existing` is set
    /// 3. Extract, cognify and load, collecting every stage's errors
    /// 4. Release the lease on every exit path
    pub fn process_project(
        &mut self,
        root: &Path,
        clear_existing: bool,
    ) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let project = root
            .canonicalize()
            .map(|p| path_key(&p))
            .unwrap_or_else(|_| path_key(root));
        log::info!("Processing project: {}", project);

        // An unreachable store is a load-stage failure, not a lease failure.
        let lease_ready = self.options.use_lease
            && match self.store.connect() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Skipping project lease, graph store unavailable: {}", e);
                    false
                }
            };

        let mut result = if lease_ready {
            let mut lease = ProjectLease::acquire(&mut *self.store, &project, self.options.lease_ttl)?;
            run_stages(
                lease.store_mut(),
                &self.extractor,
                &mut self.cognifier,
                &self.options,
                root,
                clear_existing,
            )
        } else {
            run_stages(
                &mut *self.store,
                &self.extractor,
                &mut self.cognifier,
                &self.options,
                root,
                clear_existing,
            )
        };

        result.project = project;
        result.duration_ms = elapsed_ms(started);
        log::info!(
            "Pipeline finished: success={} files={} functions={} calls={} errors={} ({:.0}ms)",
            result.success,
            result.files_extracted,
            result.functions_found,
            result.calls_found,
            result.total_errors(),
            result.duration_ms
        );
        Ok(result)
    }
}

fn run_stages<S: GraphWriter + ?Sized>(
    store: &mut S,
    extractor: &Extractor,
    cognifier: &mut Cognifier,
    options: &PipelineOptions,
    root: &Path,
    clear_existing: bool,
) -> PipelineResult {
    let mut result = PipelineResult::default();
    let mut loader = Loader::new(store);

    if clear_existing {
        let prefix = options.clear_prefix.as_deref();
        if let Err(e) = loader.clear(prefix) {
            let message = format!("Failed to clear existing graph: {}", e);
            log::error!("{}", message);
            result.errors.push(message);
        }
    }

    log::info!("Running extract stage");
    let extraction = extractor.extract(root);
    result.files_extracted = extraction.files.len();
    result.files_seen = extraction.total_seen;
    result.packages_found = extraction.packages.len();
    let extraction_failed = !extraction.errors.is_empty();
    result.errors.extend(extraction.errors);

    if extraction.files.is_empty() {
        if !extraction_failed {
            let message = format!(
                "No matching files found in {} (extensions: {})",
                root.display(),
                extractor.extensions().join(", ")
            );
            log::warn!("{}", message);
            result.errors.push(message);
        }
        result.success = false;
        return result;
    }

    log::info!("Running cognify stage");
    let cognified = cognifier.cognify(&extraction.files);
    result.functions_found = cognified.functions.len();
    result.classes_found = cognified.classes.len();
    result.calls_found = cognified.calls.len();
    result.errors.extend(cognified.errors);

    let unchanged = if options.skip_unchanged {
        unchanged_files(&mut loader, &extraction.files)
    } else {
        HashSet::new()
    };
    result.files_skipped = unchanged.len();

    log::info!("Running load stage");
    let report = loader.load_batch(&LoadBatch {
        files: &extraction.files,
        packages: &extraction.packages,
        functions: &cognified.functions,
        classes: &cognified.classes,
        calls: &cognified.calls,
        unchanged: Some(&unchanged),
    });
    result.files_loaded = report.files_loaded;
    result.packages_loaded = report.packages_loaded;
    result.functions_loaded = report.functions_loaded;
    result.classes_loaded = report.classes_loaded;
    result.calls_loaded = report.calls_loaded;
    result.errors.extend(report.errors);

    result.success =
        result.files_extracted > 0 && result.functions_found > 0 && result.errors.is_empty();
    result
}

/// Paths whose stored File hash equals the freshly computed one.
fn unchanged_files<S: GraphWriter + ?Sized>(
    loader: &mut Loader<'_, S>,
    files: &[FileFact],
) -> HashSet<String> {
    if let Err(e) = loader.ensure_connected() {
        log::warn!("Change detection disabled: {}", e);
        return HashSet::new();
    }
    let stored = match loader.store().stored_file_hashes() {
        Ok(stored) => stored,
        Err(e) => {
            log::warn!("Change detection disabled: {}", e);
            return HashSet::new();
        }
    };
    let unchanged: HashSet<String> = files
        .iter()
        .filter(|f| stored.get(&f.path) == Some(&f.hash))
        .map(|f| f.path.clone())
        .collect();
    log::info!("{} of {} files unchanged since last load", unchanged.len(), files.len());
    unchanged
}

/// Advisory lease on one project, released when dropped.
///
/// The store must already be connected.
struct ProjectLease<'a, S: GraphWriter + ?Sized> {
    store: &'a mut S,
    project: String,
    owner: String,
}

impl<'a, S: GraphWriter + ?Sized> ProjectLease<'a, S> {
    fn acquire(store: &'a mut S, project: &str, ttl: Duration) -> Result<Self, PipelineError> {
        let lease_error = |reason: String| PipelineError::Lease {
            project: project.to_string(),
            reason,
        };

        let owner = format!("{}:{}", std::process::id(), Uuid::new_v4());
        let acquired = store
            .try_acquire_lease(project, &owner, ttl)
            .map_err(|e| lease_error(e.to_string()))?;
        if !acquired {
            return Err(lease_error("held by another ingestion".to_string()));
        }
        log::debug!("Acquired lease on {} as {}", project, owner);
        Ok(Self {
            store,
            project: project.to_string(),
            owner,
        })
    }

    fn store_mut(&mut self) -> &mut S {
        &mut *self.store
    }
}

impl<S: GraphWriter + ?Sized> Drop for ProjectLease<'_, S> {
    fn drop(&mut self) {
        match self.store.release_lease(&self.project, &self.owner) {
            Ok(()) => log::debug!("Released lease on {}", self.project),
            Err(e) => log::warn!("Failed to release lease on {}: {}", self.project, e),
        }
    }
}
