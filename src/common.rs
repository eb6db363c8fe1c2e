//! Common utility functions shared across pipeline stages
//!
//! Byte-safe slicing for tree-sitter offsets, content hashing, and path
//! normalization for the keys stored in the graph.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Detect the language tag for a file from its extension
///
/// # Supported Extensions
/// - `.py`, `.pyi` → "python"
/// - `.rs` → "rust"
/// - `.js` → "javascript"
/// - `.ts`, `.tsx` → "typescript"
/// - `.java` → "java"
///
/// Anything else maps to "unknown".
pub fn detect_language_from_path(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "py" | "pyi" => "python",
        "rs" => "rust",
        "js" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        _ => "unknown",
    }
}

/// Safely extract a byte slice from source with bounds checking
///
/// Returns None if the slice range is invalid or exceeds source length.
///
/// # Example
/// ```rust
/// use mnemosyne::common::safe_slice;
/// let source = b"hello world";
/// assert_eq!(safe_slice(source, 0, 5), Some(&b"hello"[..]));
/// assert_eq!(safe_slice(source, 10, 20), None);
/// ```
pub fn safe_slice(source: &[u8], start: usize, end: usize) -> Option<&[u8]> {
    if start <= end && end <= source.len() {
        Some(&source[start..end])
    } else {
        None
    }
}

/// Extract the UTF-8 text of a tree-sitter node.
pub fn node_text(node: &tree_sitter::Node, source: &[u8]) -> Option<String> {
    let bytes = safe_slice(source, node.start_byte(), node.end_byte())?;
    std::str::from_utf8(bytes).ok().map(|s| s.to_string())
}

/// Compute SHA-256 hash of file contents as lowercase hex
pub fn compute_hash(source: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    hex::encode(hasher.finalize())
}

/// Render a path as a graph key: `/` separators on every platform.
pub fn path_key(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        raw.to_string()
    } else {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Path of `path` relative to `root`, falling back to `path` itself when it is
/// not a descendant of `root`.
pub fn relative_key(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => path_key(rel),
        Err(_) => path_key(path),
    }
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = compute_hash(b"def f(): pass\n");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_hash(b"def f(): pass\n"));
        assert_ne!(hash, compute_hash(b"def g(): pass\n"));
    }

    #[test]
    fn test_relative_key_falls_back_to_absolute() {
        let root = PathBuf::from("/project");
        assert_eq!(
            relative_key(&PathBuf::from("/project/pkg/mod.py"), &root),
            "pkg/mod.py"
        );
        assert_eq!(
            relative_key(&PathBuf::from("/elsewhere/mod.py"), &root),
            "/elsewhere/mod.py"
        );
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language_from_path(Path::new("a/b.py")), "python");
        assert_eq!(detect_language_from_path(Path::new("a/b.txt")), "unknown");
    }
}
