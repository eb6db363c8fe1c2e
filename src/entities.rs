//! Entity and relationship records produced by the ECL stages
//!
//! Every record derives a deterministic unique key that embeds its owning file
//! path. The key is the idempotent-merge key in the graph store, so moving a
//! file creates new entities rather than updating existing ones.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Node labels persisted in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    File,
    Function,
    Class,
    Package,
}

impl EntityType {
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::File => "File",
            EntityType::Function => "Function",
            EntityType::Class => "Class",
            EntityType::Package => "Package",
        }
    }
}

/// Relationship vocabulary.
///
/// Only `Contains` and `Calls` are populated by the pipeline; the rest are
/// reserved names so other producers write into the same vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Calls,
    Contains,
    DependsOn,
    InheritsFrom,
    Implements,
    Imports,
    Defines,
    Uses,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Calls => "CALLS",
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::InheritsFrom => "INHERITS_FROM",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Defines => "DEFINES",
            RelationshipType::Uses => "USES",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source file found by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFact {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub name: String,
    /// Extension including the leading dot (".py")
    pub extension: String,
    pub content: String,
    pub size_bytes: u64,
    /// Encoding that successfully decoded `content`
    pub encoding: String,
    /// SHA-256 of the raw bytes, hex
    pub hash: String,
    pub language: String,
}

impl FileFact {
    pub fn unique_key(&self) -> String {
        file_key(&self.path)
    }

    /// Scalar properties written on merge.
    pub fn graph_properties(&self) -> Map<String, Value> {
        into_map(json!({
            "unique_key": self.unique_key(),
            "entity_type": EntityType::File.label(),
            "path": self.path,
            "name": self.name,
            "extension": self.extension,
            "content": self.content,
            "size_bytes": self.size_bytes,
            "encoding": self.encoding,
            "hash": self.hash,
            "language": self.language,
        }))
    }
}

/// A directory that is a Python package (directly holds `__init__.py`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFact {
    /// Directory path relative to the project root ("" for the root itself)
    pub path: String,
    pub name: String,
    /// Extracted files directly inside this directory
    pub file_paths: Vec<String>,
}

impl PackageFact {
    pub fn unique_key(&self) -> String {
        format!("Package:{}", self.path)
    }

    pub fn graph_properties(&self) -> Map<String, Value> {
        into_map(json!({
            "unique_key": self.unique_key(),
            "entity_type": EntityType::Package.label(),
            "path": self.path,
            "name": self.name,
            "file_count": self.file_paths.len(),
        }))
    }
}

/// A function or method definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFact {
    pub name: String,
    pub file_path: String,
    /// 1-indexed line of the `def` keyword (or `async`)
    pub line_start: usize,
    /// 1-indexed last line of the body, always >= `line_start`
    pub line_end: usize,
    pub parameters: Vec<String>,
    /// `name(a, b=1)`: parameters in order, defaults as source text
    pub signature: String,
    pub is_method: bool,
    pub is_async: bool,
    pub is_static: bool,
    pub is_private: bool,
    /// Innermost enclosing class, if defined inside a class body
    pub class_name: Option<String>,
    pub decorators: Vec<String>,
    pub docstring: Option<String>,
}

impl FunctionFact {
    pub fn unique_key(&self) -> String {
        function_key(&self.file_path, &self.name, self.line_start)
    }

    pub fn lines_of_code(&self) -> usize {
        self.line_end - self.line_start + 1
    }

    pub fn graph_properties(&self) -> Map<String, Value> {
        into_map(json!({
            "unique_key": self.unique_key(),
            "entity_type": EntityType::Function.label(),
            "name": self.name,
            "file_path": self.file_path,
            "line_start": self.line_start,
            "line_end": self.line_end,
            "parameters": self.parameters,
            "signature": self.signature,
            "is_method": self.is_method,
            "is_async": self.is_async,
            "is_static": self.is_static,
            "is_private": self.is_private,
            "class_name": self.class_name,
            "decorators": self.decorators,
            "docstring": self.docstring,
            "lines_of_code": self.lines_of_code(),
        }))
    }
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFact {
    pub name: String,
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    /// Base class expressions as written (`Base`, `abc.ABC`)
    pub base_classes: Vec<String>,
    pub method_count: usize,
    pub is_abstract: bool,
    pub docstring: Option<String>,
}

impl ClassFact {
    pub fn unique_key(&self) -> String {
        format!("Class:{}:{}:{}", self.file_path, self.name, self.line_start)
    }

    pub fn graph_properties(&self) -> Map<String, Value> {
        into_map(json!({
            "unique_key": self.unique_key(),
            "entity_type": EntityType::Class.label(),
            "name": self.name,
            "file_path": self.file_path,
            "line_start": self.line_start,
            "line_end": self.line_end,
            "base_classes": self.base_classes,
            "method_count": self.method_count,
            "is_abstract": self.is_abstract,
            "docstring": self.docstring,
        }))
    }
}

/// How a call edge relates its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Direct,
    Recursive,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Direct => "direct",
            CallType::Recursive => "recursive",
        }
    }
}

/// A statically observed call from one function to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFact {
    pub caller_key: String,
    pub callee_key: String,
    pub caller_name: String,
    pub callee_name: String,
    /// File containing the call site
    pub file_path: String,
    pub call_line: usize,
    /// Source text of the call expression, truncated
    pub context: String,
    /// Reserved: no detector sets this yet
    pub is_conditional: bool,
    pub call_type: CallType,
}

impl CallFact {
    pub fn graph_properties(&self) -> Map<String, Value> {
        into_map(json!({
            "call_line": self.call_line,
            "context": self.context,
            "is_conditional": self.is_conditional,
            "call_type": self.call_type.as_str(),
            "file_path": self.file_path,
        }))
    }
}

/// Unique key of the File node at `path`.
pub fn file_key(path: &str) -> String {
    format!("File:{}", path)
}

/// Unique key of a Function node.
pub fn function_key(file_path: &str, name: &str, line_start: usize) -> String {
    format!("Function:{}:{}:{}", file_path, name, line_start)
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
