//! Extract, Cognify, Load
//!
//! - [`extract`]: project tree -> File records
//! - [`cognify`]: File records -> Function/Class records and call edges
//! - [`load`]: records -> graph store, idempotently
//! - [`pipeline`]: sequencing and error aggregation

pub mod cognify;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod python;
pub mod resolve;

pub use cognify::{Cognifier, CognifyResult};
pub use extract::{ExtractionResult, Extractor, DEFAULT_EXTENSIONS, IGNORED_DIRS};
pub use load::{LoadBatch, LoadReport, Loader};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, PipelineResult};
pub use python::PythonParser;
pub use resolve::{
    CallResolver, CallSite, FirstMatchResolver, FunctionIndex, ResolverKind, ScopedResolver,
};
