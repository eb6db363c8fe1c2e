//! Cognify stage: definitions and calls from extracted files
//!
//! The definition pass runs over every file before any call pass, so call
//! resolution sees the whole project. A file with a syntax error contributes
//! nothing and does not stop the others.

use anyhow::Result;
use tree_sitter::Tree;

use super::python::{extract_calls, extract_definitions, PythonParser};
use super::resolve::{CallResolver, FirstMatchResolver, FunctionIndex};
use crate::entities::{CallFact, ClassFact, FileFact, FunctionFact};

#[derive(Debug, Clone, Default)]
pub struct CognifyResult {
    /// In registration order: file order, then definition order
    pub functions: Vec<FunctionFact>,
    pub classes: Vec<ClassFact>,
    pub calls: Vec<CallFact>,
    pub errors: Vec<String>,
}

pub struct Cognifier {
    parser: PythonParser,
    resolver: Box<dyn CallResolver>,
}

impl Cognifier {
    /// Cognifier with first-match call resolution.
    pub fn new() -> Result<Self> {
        Self::with_resolver(Box::new(FirstMatchResolver))
    }

    pub fn with_resolver(resolver: Box<dyn CallResolver>) -> Result<Self> {
        Ok(Self {
            parser: PythonParser::new()?,
            resolver,
        })
    }

    pub fn resolver_name(&self) -> &'static str {
        self.resolver.name()
    }

    pub fn cognify(&mut self, files: &[FileFact]) -> CognifyResult {
        let mut result = CognifyResult::default();
        let mut index = FunctionIndex::new();
        let mut parsed: Vec<(&FileFact, Tree)> = Vec::with_capacity(files.len());

        for file in files {
            if file.language != "python" {
                log::debug!("No parser for {} ({}), skipping", file.path, file.language);
                continue;
            }
            if file.content.is_empty() {
                log::warn!("Empty file: {}", file.path);
                continue;
            }

            let source = file.content.as_bytes();
            let tree = match self.parser.parse(&file.path, source) {
                Ok(tree) => tree,
                Err(error) => {
                    log::error!("{}", error);
                    result.errors.push(error);
                    continue;
                }
            };

            let defs = extract_definitions(&tree, source, &file.path);
            log::debug!(
                "{}: {} functions, {} classes",
                file.path,
                defs.functions.len(),
                defs.classes.len()
            );
            for function in defs.functions {
                index.register(function);
            }
            result.classes.extend(defs.classes);
            parsed.push((file, tree));
        }

        log::debug!("Function index holds {} definitions", index.len());
        for (file, tree) in &parsed {
            let calls = extract_calls(
                tree,
                file.content.as_bytes(),
                &file.path,
                &index,
                self.resolver.as_ref(),
            );
            log::debug!("{}: {} calls", file.path, calls.len());
            result.calls.extend(calls);
        }

        result.functions = index.into_functions();
        log::info!(
            "Cognify complete: {} functions, {} classes, {} calls ({} resolver), {} errors",
            result.functions.len(),
            result.classes.len(),
            result.calls.len(),
            self.resolver.name(),
            result.errors.len()
        );
        result
    }
}
