//! Extract stage: walk a project tree and read matching source files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::common::{compute_hash, detect_language_from_path, relative_key};
use crate::entities::{FileFact, PackageFact};

/// Extensions extracted when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".py"];

/// Directory names never descended into. Any name starting with `.` is also
/// skipped.
pub const IGNORED_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    "venv",
    "env",
    ".git",
    "build",
    "dist",
    ".pytest_cache",
    "htmlcov",
];

const PACKAGE_MARKER: &str = "__init__.py";

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub files: Vec<FileFact>,
    pub packages: Vec<PackageFact>,
    /// Matching files found, including those that failed to read
    pub total_seen: usize,
    pub errors: Vec<String>,
}

/// Filesystem extractor.
#[derive(Debug, Clone)]
pub struct Extractor {
    extensions: Vec<String>,
    extra_ignored_dirs: Vec<String>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            extra_ignored_dirs: Vec::new(),
        }
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the extension filter. Entries may omit the leading dot.
    /// An empty list keeps the defaults.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions: Vec<String> = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| e.len() > 1)
            .collect();
        if !extensions.is_empty() {
            self.extensions = extensions;
        }
        self
    }

    /// Add directory names to skip on top of [`IGNORED_DIRS`].
    pub fn with_ignored_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_ignored_dirs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        name.starts_with('.')
            || IGNORED_DIRS.contains(&name)
            || self.extra_ignored_dirs.iter().any(|d| d == name)
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .extensions
                .iter()
                .any(|wanted| wanted.strip_prefix('.') == Some(ext)),
            None => false,
        }
    }

    /// Extract every matching file under `root`.
    ///
    /// # Behavior
    /// 1. Reject a missing or non-directory root with a single error
    /// 2. Walk in sorted order, pruning ignored directories before descending
    /// 3. Read each matching file, UTF-8 first then Latin-1
    /// 4. Group files into packages by `__init__.py`
    ///
    /// # Guarantees
    /// - A file that cannot be read is still emitted with empty content, and
    ///   the failure is recorded in `errors`
    /// - Paths are relative to `root`, `/`-separated
    pub fn extract(&self, root: &Path) -> ExtractionResult {
        let root = match validate_root(root) {
            Ok(root) => root,
            Err(message) => {
                log::error!("{}", message);
                return ExtractionResult {
                    errors: vec![message],
                    ..ExtractionResult::default()
                };
            }
        };

        log::info!("Extracting project: {}", root.display());

        let mut result = ExtractionResult::default();
        for path in self.candidate_files(&root, &mut result.errors) {
            result.total_seen += 1;
            let (file, error) = read_file(&path, &root);
            if let Some(error) = error {
                log::error!("{}", error);
                result.errors.push(error);
            } else {
                log::debug!("Extracted {}", file.path);
            }
            result.files.push(file);
        }
        result.packages = group_packages(&result.files);

        log::info!(
            "Extraction complete: {} files, {} packages, {} errors",
            result.files.len(),
            result.packages.len(),
            result.errors.len()
        );
        result
    }

    fn candidate_files(&self, root: &Path, errors: &mut Vec<String>) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_pruned(entry));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if is_source_file(&entry) && self.matches_extension(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    let message = format!("Failed to walk {}: {}", root.display(), e);
                    log::warn!("{}", message);
                    errors.push(message);
                }
            }
        }
        files
    }

    fn is_pruned(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && self.is_ignored_dir(&entry.file_name().to_string_lossy())
    }
}

/// Regular files, and symlinks that resolve to one. Symlinked directories are
/// never entered.
fn is_source_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

fn validate_root(root: &Path) -> Result<PathBuf, String> {
    if !root.exists() {
        return Err(format!("Project path does not exist: {}", root.display()));
    }
    if !root.is_dir() {
        return Err(format!("Project path is not a directory: {}", root.display()));
    }
    Ok(root.canonicalize().unwrap_or_else(|_| root.to_path_buf()))
}

/// Read one file into a record. On failure the record carries empty content
/// and the error message is returned alongside.
fn read_file(path: &Path, root: &Path) -> (FileFact, Option<String>) {
    let rel = relative_key(path, root);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let language = detect_language_from_path(path).to_string();

    match fs::read(path) {
        Ok(bytes) => {
            let (content, encoding) = decode(&bytes);
            let file = FileFact {
                path: rel,
                name,
                extension,
                content,
                size_bytes: bytes.len() as u64,
                encoding: encoding.to_string(),
                hash: compute_hash(&bytes),
                language,
            };
            (file, None)
        }
        Err(e) => {
            let file = FileFact {
                path: rel,
                name,
                extension,
                content: String::new(),
                size_bytes: 0,
                encoding: "unknown".to_string(),
                hash: compute_hash(&[]),
                language,
            };
            let error = format!("Failed to read {}: {}", path.display(), e);
            (file, Some(error))
        }
    }
}

/// UTF-8, falling back to Latin-1 (every byte maps to one code point, so the
/// fallback cannot fail).
fn decode(bytes: &[u8]) -> (String, &'static str) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), "utf-8"),
        Err(_) => (bytes.iter().map(|&b| char::from(b)).collect(), "latin-1"),
    }
}

fn group_packages(files: &[FileFact]) -> Vec<PackageFact> {
    let mut by_dir: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in files {
        by_dir
            .entry(parent_dir(&file.path))
            .or_default()
            .push(file.path.clone());
    }

    by_dir
        .into_iter()
        .filter(|(_, paths)| paths.iter().any(|p| p.rsplit('/').next() == Some(PACKAGE_MARKER)))
        .map(|(dir, file_paths)| PackageFact {
            name: dir.rsplit('/').next().unwrap_or_default().to_string(),
            path: dir,
            file_paths,
        })
        .collect()
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}
