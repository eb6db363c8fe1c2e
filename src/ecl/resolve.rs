//! Call resolution: map a call-site name to one function definition
//!
//! The [`FunctionIndex`] is project-wide and keeps registration order, which
//! is file order then definition order within a file. Resolution policy is
//! pluggable through [`CallResolver`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::entities::FunctionFact;

/// Every function definition seen by the definition pass.
#[derive(Debug, Default)]
pub struct FunctionIndex {
    functions: Vec<FunctionFact>,
    /// name -> positions in `functions`, in registration order
    by_name: HashMap<String, Vec<usize>>,
    /// (file, name, line_start) -> position in `functions`
    by_site: HashMap<(String, String, usize), usize>,
}

impl FunctionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: FunctionFact) {
        let position = self.functions.len();
        self.by_name
            .entry(function.name.clone())
            .or_default()
            .push(position);
        self.by_site.insert(
            (
                function.file_path.clone(),
                function.name.clone(),
                function.line_start,
            ),
            position,
        );
        self.functions.push(function);
    }

    /// All functions named `name`, first registered first.
    pub fn candidates(&self, name: &str) -> Vec<&FunctionFact> {
        self.by_name
            .get(name)
            .map(|positions| positions.iter().map(|&p| &self.functions[p]).collect())
            .unwrap_or_default()
    }

    /// The function defined in `file_path` named `name` starting at `line_start`.
    pub fn at(&self, file_path: &str, name: &str, line_start: usize) -> Option<&FunctionFact> {
        self.by_site
            .get(&(file_path.to_string(), name.to_string(), line_start))
            .map(|&p| &self.functions[p])
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn into_functions(self) -> Vec<FunctionFact> {
        self.functions
    }
}

/// One observed call inside a known function.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub caller: &'a FunctionFact,
    /// Bare name, or the trailing attribute of `obj.method`
    pub callee_name: &'a str,
    pub line: usize,
}

/// Picks the definition a call site refers to.
pub trait CallResolver {
    fn name(&self) -> &'static str;

    fn resolve<'i>(&self, site: &CallSite<'_>, index: &'i FunctionIndex) -> Option<&'i FunctionFact>;
}

/// First registered same-named function wins, regardless of scope.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstMatchResolver;

impl CallResolver for FirstMatchResolver {
    fn name(&self) -> &'static str {
        "first-match"
    }

    fn resolve<'i>(&self, site: &CallSite<'_>, index: &'i FunctionIndex) -> Option<&'i FunctionFact> {
        index.candidates(site.callee_name).into_iter().next()
    }
}

/// Same file and class first, then same file, then the first global
/// candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScopedResolver;

impl CallResolver for ScopedResolver {
    fn name(&self) -> &'static str {
        "scoped"
    }

    fn resolve<'i>(&self, site: &CallSite<'_>, index: &'i FunctionIndex) -> Option<&'i FunctionFact> {
        let candidates = index.candidates(site.callee_name);
        let in_file = |f: &FunctionFact| f.file_path == site.caller.file_path;

        if site.caller.class_name.is_some() {
            let same_class = candidates
                .iter()
                .copied()
                .find(|f| in_file(f) && f.class_name == site.caller.class_name);
            if same_class.is_some() {
                return same_class;
            }
        }

        candidates
            .iter()
            .copied()
            .find(|f| in_file(f))
            .or_else(|| candidates.first().copied())
    }
}

/// Configurable resolver selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverKind {
    #[default]
    FirstMatch,
    Scoped,
}

impl ResolverKind {
    pub fn build(self) -> Box<dyn CallResolver> {
        match self {
            ResolverKind::FirstMatch => Box::new(FirstMatchResolver),
            ResolverKind::Scoped => Box::new(ScopedResolver),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverKind::FirstMatch => "first-match",
            ResolverKind::Scoped => "scoped",
        }
    }
}

impl FromStr for ResolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-match" | "first_match" | "first" => Ok(ResolverKind::FirstMatch),
            "scoped" => Ok(ResolverKind::Scoped),
            other => Err(format!(
                "unknown resolver '{}' (expected first-match or scoped)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, file: &str, line: usize, class: Option<&str>) -> FunctionFact {
        FunctionFact {
            name: name.to_string(),
            file_path: file.to_string(),
            line_start: line,
            line_end: line + 2,
            parameters: vec![],
            signature: format!("{}()", name),
            is_method: class.is_some(),
            is_async: false,
            is_static: false,
            is_private: false,
            class_name: class.map(str::to_string),
            decorators: vec![],
            docstring: None,
        }
    }

    #[test]
    fn test_index_keeps_duplicate_names() {
        let index = index();
        assert!(!index.is_empty());
        assert_eq!(index.len(), 5);
        assert_eq!(index.candidates("helper").len(), 3);
        assert!(index.candidates("missing").is_empty());
        assert!(FunctionIndex::new().is_empty());
    }

    fn index() -> FunctionIndex {
        let mut index = FunctionIndex::new();
        index.register(function("helper", "a.py", 1, None));
        index.register(function("helper", "b.py", 1, None));
        index.register(function("helper", "b.py", 10, Some("Worker")));
        index.register(function("run", "b.py", 14, Some("Worker")));
        index.register(function("main", "b.py", 20, None));
        index
    }

    #[test]
    fn test_first_match_ignores_scope() {
        let index = index();
        let caller = index.at("b.py", "run", 14).unwrap();
        let site = CallSite {
            caller,
            callee_name: "helper",
            line: 15,
        };
        let callee = FirstMatchResolver.resolve(&site, &index).unwrap();
        assert_eq!(callee.unique_key(), "Function:a.py:helper:1");
    }

    #[test]
    fn test_scoped_prefers_class_then_file() {
        let index = index();

        let method = index.at("b.py", "run", 14).unwrap();
        let site = CallSite {
            caller: method,
            callee_name: "helper",
            line: 15,
        };
        let callee = ScopedResolver.resolve(&site, &index).unwrap();
        assert_eq!(callee.unique_key(), "Function:b.py:helper:10");

        let main = index.at("b.py", "main", 20).unwrap();
        let site = CallSite {
            caller: main,
            callee_name: "helper",
            line: 21,
        };
        let callee = ScopedResolver.resolve(&site, &index).unwrap();
        assert_eq!(callee.unique_key(), "Function:b.py:helper:1");
    }

    #[test]
    fn test_scoped_falls_back_to_global() {
        let index = index();
        let caller = function("other", "c.py", 1, None);
        let site = CallSite {
            caller: &caller,
            callee_name: "main",
            line: 2,
        };
        let callee = ScopedResolver.resolve(&site, &index).unwrap();
        assert_eq!(callee.file_path, "b.py");
        assert!(ScopedResolver
            .resolve(
                &CallSite {
                    caller: &caller,
                    callee_name: "missing",
                    line: 2
                },
                &index
            )
            .is_none());
    }

    #[test]
    fn test_resolver_kind_parsing() {
        assert_eq!("scoped".parse::<ResolverKind>().unwrap(), ResolverKind::Scoped);
        assert_eq!(
            "First-Match".parse::<ResolverKind>().unwrap(),
            ResolverKind::FirstMatch
        );
        assert!("nearest".parse::<ResolverKind>().is_err());
        assert_eq!(ResolverKind::Scoped.build().name(), "scoped");
    }
}
