//! Mnemosyne: turn a Python source tree into a queryable code graph
//!
//! The ingestion core is an Extract -> Cognify -> Load pipeline:
//!
//! - **Extract** walks the project, skips noise directories and reads every
//!   matching file into a [`FileFact`].
//! - **Cognify** parses each file with tree-sitter twice: once for function
//!   and class definitions, once for call sites, which are resolved against
//!   a project-wide function index.
//! - **Load** upserts File, Package, Function and Class nodes plus CONTAINS
//!   and CALLS edges through a [`GraphWriter`], keyed on deterministic unique
//!   keys so re-running over unchanged code changes nothing.
//!
//! # Position Conventions
//!
//! - **Line positions**: 1-indexed
//! - **Paths**: relative to the project root, `/`-separated
//!
//! # Storage
//!
//! [`GraphStore`] is the backend contract; [`SqliteGraphStore`] is the
//! embedded implementation. Open an in-memory graph with
//! [`SqliteGraphStore::in_memory`].

pub mod common;
pub mod config;
pub mod ecl;
pub mod entities;
pub mod graph;
pub mod output;

pub use config::{ConfigError, MnemoConfig};
pub use ecl::{
    Cognifier, CognifyResult, ExtractionResult, Extractor, LoadReport, Loader, Pipeline,
    PipelineError, PipelineOptions, PipelineResult, ResolverKind,
};
pub use entities::{
    CallFact, ClassFact, EntityType, FileFact, FunctionFact, PackageFact, RelationshipType,
};
pub use graph::{
    with_session, ConnectionConfig, ConnectionState, GraphSession, GraphStore, GraphWriter,
    HealthStatus, QueryResult, SqliteGraphStore, StoreError,
};
