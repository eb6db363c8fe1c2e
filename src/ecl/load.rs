//! Load stage: idempotent graph upserts
//!
//! Files and packages go first, then functions and classes with their
//! CONTAINS edges, then CALLS edges, because every edge merge needs both
//! endpoints to exist. A failed merge is recorded and the next item is tried.

use serde::Serialize;
use std::collections::HashSet;

use crate::entities::{
    file_key, CallFact, ClassFact, EntityType, FileFact, FunctionFact, PackageFact,
    RelationshipType,
};
use crate::graph::{ClearStats, GraphWriter, Params, StoreResult};

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub files_loaded: usize,
    pub packages_loaded: usize,
    pub functions_loaded: usize,
    pub classes_loaded: usize,
    pub calls_loaded: usize,
    pub errors: Vec<String>,
}

/// Everything one load pass writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadBatch<'a> {
    pub files: &'a [FileFact],
    pub packages: &'a [PackageFact],
    pub functions: &'a [FunctionFact],
    pub classes: &'a [ClassFact],
    pub calls: &'a [CallFact],
    /// Paths whose File, definitions and outgoing calls are left as stored
    pub unchanged: Option<&'a HashSet<String>>,
}

impl LoadBatch<'_> {
    fn is_unchanged(&self, path: &str) -> bool {
        self.unchanged.map_or(false, |paths| paths.contains(path))
    }
}

pub struct Loader<'s, S: GraphWriter + ?Sized> {
    store: &'s mut S,
}

impl<'s, S: GraphWriter + ?Sized> Loader<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &*self.store
    }

    pub fn ensure_connected(&mut self) -> StoreResult<()> {
        if self.store.is_connected() {
            return Ok(());
        }
        self.store.connect()
    }

    /// Load files, functions and calls.
    pub fn load(
        &mut self,
        files: &[FileFact],
        functions: &[FunctionFact],
        calls: &[CallFact],
    ) -> LoadReport {
        self.load_batch(&LoadBatch {
            files,
            functions,
            calls,
            ..LoadBatch::default()
        })
    }

    /// Load every record in `batch`.
    ///
    /// # Guarantees
    /// - Never fails: a connection failure is the single error of the report,
    ///   per-item failures are appended and loading continues
    /// - Re-running the same batch leaves node and edge counts unchanged
    pub fn load_batch(&mut self, batch: &LoadBatch<'_>) -> LoadReport {
        let mut report = LoadReport::default();
        if let Err(e) = self.ensure_connected() {
            let message = format!("Load aborted: {}", e);
            log::error!("{}", message);
            report.errors.push(message);
            return report;
        }

        for file in batch.files {
            if batch.is_unchanged(&file.path) {
                continue;
            }
            match self.load_file(file) {
                Ok(()) => report.files_loaded += 1,
                Err(e) => record(&mut report, format!("Failed to load File {}: {}", file.path, e)),
            }
        }

        for package in batch.packages {
            match self.load_package(package) {
                Ok(()) => report.packages_loaded += 1,
                Err(e) => record(
                    &mut report,
                    format!("Failed to load Package {}: {}", package.path, e),
                ),
            }
        }

        for function in batch.functions {
            if batch.is_unchanged(&function.file_path) {
                continue;
            }
            match self.load_function(function) {
                Ok(()) => report.functions_loaded += 1,
                Err(e) => record(
                    &mut report,
                    format!("Failed to load Function {}: {}", function.unique_key(), e),
                ),
            }
        }

        for class in batch.classes {
            if batch.is_unchanged(&class.file_path) {
                continue;
            }
            match self.load_class(class) {
                Ok(()) => report.classes_loaded += 1,
                Err(e) => record(
                    &mut report,
                    format!("Failed to load Class {}: {}", class.unique_key(), e),
                ),
            }
        }

        for call in batch.calls {
            if batch.is_unchanged(&call.file_path) {
                continue;
            }
            let outcome = self.store.merge_edge(
                RelationshipType::Calls,
                &call.caller_key,
                &call.callee_key,
                &call.graph_properties(),
            );
            match outcome {
                Ok(()) => report.calls_loaded += 1,
                Err(e) => record(
                    &mut report,
                    format!(
                        "Failed to load CALLS {} -> {}: {}",
                        call.caller_key, call.callee_key, e
                    ),
                ),
            }
        }

        log::info!(
            "Load complete: {} files, {} packages, {} functions, {} classes, {} calls, {} errors",
            report.files_loaded,
            report.packages_loaded,
            report.functions_loaded,
            report.classes_loaded,
            report.calls_loaded,
            report.errors.len()
        );
        report
    }

    /// Delete everything, or only what lives under `path_prefix`.
    pub fn clear(&mut self, path_prefix: Option<&str>) -> StoreResult<ClearStats> {
        self.ensure_connected()?;
        self.store.clear(path_prefix)
    }

    fn load_file(&self, file: &FileFact) -> StoreResult<()> {
        log::debug!("Loading File {}", file.path);
        self.store.merge_node(
            EntityType::File.label(),
            &file.unique_key(),
            &file.path,
            &file.graph_properties(),
        )
    }

    fn load_package(&self, package: &PackageFact) -> StoreResult<()> {
        let key = package.unique_key();
        self.store.merge_node(
            EntityType::Package.label(),
            &key,
            &package_scope(&package.path),
            &package.graph_properties(),
        )?;
        for path in &package.file_paths {
            self.store
                .merge_edge(RelationshipType::Contains, &key, &file_key(path), &Params::new())?;
        }
        Ok(())
    }

    fn load_function(&self, function: &FunctionFact) -> StoreResult<()> {
        let key = function.unique_key();
        log::debug!("Loading Function {}", key);
        self.store.merge_node(
            EntityType::Function.label(),
            &key,
            &function.file_path,
            &function.graph_properties(),
        )?;
        self.store.merge_edge(
            RelationshipType::Contains,
            &file_key(&function.file_path),
            &key,
            &Params::new(),
        )
    }

    fn load_class(&self, class: &ClassFact) -> StoreResult<()> {
        let key = class.unique_key();
        self.store.merge_node(
            EntityType::Class.label(),
            &key,
            &class.file_path,
            &class.graph_properties(),
        )?;
        self.store.merge_edge(
            RelationshipType::Contains,
            &file_key(&class.file_path),
            &key,
            &Params::new(),
        )
    }
}

/// Package scope paths end with `/` so a prefix clear of a directory also
/// removes the package rooted there.
fn package_scope(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}/", path)
    }
}

fn record(report: &mut LoadReport, message: String) {
    log::error!("{}", message);
    report.errors.push(message);
}
