//! Python syntax-tree passes using tree-sitter-python.
//!
//! Pass one collects function and class definitions. Pass two walks the same
//! tree again and turns call expressions inside known functions into call
//! facts through a [`CallResolver`].

use anyhow::Result;
use tree_sitter::{Node, Tree};

use super::resolve::{CallResolver, CallSite, FunctionIndex};
use crate::common::{node_text, truncate_chars};
use crate::entities::{CallFact, CallType, ClassFact, FunctionFact};

/// Call-site snippets are cut to this many characters.
pub const CONTEXT_MAX_CHARS: usize = 200;

/// Definitions found in one file, in source order.
#[derive(Debug, Default)]
pub struct Definitions {
    pub functions: Vec<FunctionFact>,
    pub classes: Vec<ClassFact>,
}

/// Parser for Python source.
pub struct PythonParser {
    parser: tree_sitter::Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_python::language())?;
        Ok(Self { parser })
    }

    /// Parse `source`, rejecting trees that contain syntax errors.
    ///
    /// The error message names the file and the 1-indexed line of the first
    /// error node.
    pub fn parse(&mut self, file_path: &str, source: &[u8]) -> std::result::Result<Tree, String> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| format!("Parse error {}: parser produced no tree", file_path))?;

        let root = tree.root_node();
        if root.has_error() {
            let (line, detail) = match first_error(root) {
                Some(node) if node.is_missing() => {
                    (node.start_position().row + 1, format!("missing {}", node.kind()))
                }
                Some(node) => (node.start_position().row + 1, "invalid syntax".to_string()),
                None => (1, "invalid syntax".to_string()),
            };
            return Err(format!("Syntax error {}:{}: {}", file_path, line, detail));
        }
        Ok(tree)
    }
}

/// Definition pass.
///
/// # Guarantees
/// - `line_end >= line_start` for every record
/// - Functions nested anywhere under a class body carry that class as
///   `class_name` and are flagged as methods
pub fn extract_definitions(tree: &Tree, source: &[u8], file_path: &str) -> Definitions {
    let mut walk = DefinitionWalk {
        source,
        file_path,
        scopes: Vec::new(),
        defs: Definitions::default(),
    };
    walk.visit(tree.root_node());
    walk.defs
}

/// Call pass.
///
/// The enclosing function is matched against `index` by (file, name, start
/// line). Calls outside any known function are ignored.
pub fn extract_calls(
    tree: &Tree,
    source: &[u8],
    file_path: &str,
    index: &FunctionIndex,
    resolver: &dyn CallResolver,
) -> Vec<CallFact> {
    let mut walk = CallWalk {
        source,
        file_path,
        index,
        resolver,
        current: None,
        calls: Vec::new(),
    };
    walk.visit(tree.root_node());
    walk.calls
}

enum Scope {
    Class(usize),
    Function,
}

struct DefinitionWalk<'a> {
    source: &'a [u8],
    file_path: &'a str,
    scopes: Vec<Scope>,
    defs: Definitions,
}

impl DefinitionWalk<'_> {
    fn visit(&mut self, node: Node) {
        match node.kind() {
            "class_definition" => {
                if let Some(idx) = self.record_class(node) {
                    self.scopes.push(Scope::Class(idx));
                    self.visit_children(node);
                    self.scopes.pop();
                    return;
                }
            }
            "function_definition" => {
                self.record_function(node);
                self.scopes.push(Scope::Function);
                self.visit_children(node);
                self.scopes.pop();
                return;
            }
            _ => {}
        }
        self.visit_children(node);
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child);
        }
    }

    /// Innermost enclosing class, looking through nested functions.
    fn enclosing_class(&self) -> Option<usize> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Class(idx) => Some(*idx),
            Scope::Function => None,
        })
    }

    fn directly_in_class(&self) -> Option<usize> {
        match self.scopes.last() {
            Some(Scope::Class(idx)) => Some(*idx),
            _ => None,
        }
    }

    fn record_class(&mut self, node: Node) -> Option<usize> {
        let name = field_text(node, "name", self.source)?;
        let (line_start, line_end) = line_span(node);

        let mut base_classes = Vec::new();
        let mut is_abstract = false;
        if let Some(args) = node.child_by_field_name("superclasses") {
            let mut cursor = args.walk();
            for arg in args.named_children(&mut cursor) {
                match arg.kind() {
                    "comment" => {}
                    "keyword_argument" => {
                        let value = field_text(arg, "value", self.source).unwrap_or_default();
                        if last_segment(&value) == "ABCMeta" {
                            is_abstract = true;
                        }
                    }
                    _ => {
                        if let Some(base) = node_text(&arg, self.source) {
                            if last_segment(&base) == "ABC" {
                                is_abstract = true;
                            }
                            base_classes.push(base);
                        }
                    }
                }
            }
        }

        self.defs.classes.push(ClassFact {
            name,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            base_classes,
            method_count: 0,
            is_abstract,
            docstring: node
                .child_by_field_name("body")
                .and_then(|body| docstring(body, self.source)),
        });
        Some(self.defs.classes.len() - 1)
    }

    fn record_function(&mut self, node: Node) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let (line_start, line_end) = line_span(node);
        let (parameters, parts) = node
            .child_by_field_name("parameters")
            .map(|params| positional_parameters(params, self.source))
            .unwrap_or_default();
        let decorators = decorators(node, self.source);
        let is_abstract_method = decorators
            .iter()
            .any(|d| last_segment(d) == "abstractmethod");

        let class_idx = self.enclosing_class();
        if let Some(idx) = self.directly_in_class() {
            let class = &mut self.defs.classes[idx];
            class.method_count += 1;
            class.is_abstract |= is_abstract_method;
        }

        self.defs.functions.push(FunctionFact {
            signature: format!("{}({})", name, parts.join(", ")),
            is_private: name.starts_with('_'),
            is_async: is_async(node),
            is_static: decorators.iter().any(|d| d == "staticmethod"),
            is_method: class_idx.is_some(),
            class_name: class_idx.map(|idx| self.defs.classes[idx].name.clone()),
            docstring: node
                .child_by_field_name("body")
                .and_then(|body| docstring(body, self.source)),
            name,
            file_path: self.file_path.to_string(),
            line_start,
            line_end,
            parameters,
            decorators,
        });
    }
}

struct CallWalk<'a> {
    source: &'a [u8],
    file_path: &'a str,
    index: &'a FunctionIndex,
    resolver: &'a dyn CallResolver,
    current: Option<&'a FunctionFact>,
    calls: Vec<CallFact>,
}

impl<'a> CallWalk<'a> {
    fn visit(&mut self, node: Node) {
        match node.kind() {
            "function_definition" => {
                let previous = self.current;
                self.current = self.function_at(node);
                self.visit_children(node);
                self.current = previous;
                return;
            }
            // Decorator calls belong to the function they decorate.
            "decorated_definition" => {
                let definition = node.child_by_field_name("definition");
                let previous = self.current;
                if let Some(def) = definition.filter(|d| d.kind() == "function_definition") {
                    self.current = self.function_at(def);
                }
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "decorator" {
                        self.visit(child);
                    }
                }
                self.current = previous;
                if let Some(def) = definition {
                    self.visit(def);
                }
                return;
            }
            "call" => self.record_call(node),
            _ => {}
        }
        self.visit_children(node);
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child);
        }
    }

    /// Indexed record for a `function_definition` node in this file.
    fn function_at(&self, def: Node) -> Option<&'a FunctionFact> {
        let index = self.index;
        let line_start = def.start_position().row + 1;
        field_text(def, "name", self.source)
            .and_then(|name| index.at(self.file_path, &name, line_start))
    }

    fn record_call(&mut self, node: Node) {
        let Some(caller) = self.current else {
            return;
        };
        let Some(callee_name) = callee_name(node, self.source) else {
            return;
        };
        let line = node.start_position().row + 1;
        let site = CallSite {
            caller,
            callee_name: &callee_name,
            line,
        };
        let Some(callee) = self.resolver.resolve(&site, self.index) else {
            return;
        };

        let caller_key = caller.unique_key();
        let callee_key = callee.unique_key();
        let call_type = if caller_key == callee_key {
            CallType::Recursive
        } else {
            CallType::Direct
        };
        self.calls.push(CallFact {
            caller_key,
            callee_key,
            caller_name: caller.name.clone(),
            callee_name: callee.name.clone(),
            file_path: self.file_path.to_string(),
            call_line: line,
            context: node_text(&node, self.source)
                .map(|text| truncate_chars(&text, CONTEXT_MAX_CHARS))
                .unwrap_or_default(),
            is_conditional: false,
            call_type,
        });
    }
}

/// Bare name of the called function, or the trailing attribute of
/// `obj.method(...)`. Other callee shapes (subscripts, calls) have no name.
fn callee_name(call: Node, source: &[u8]) -> Option<String> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => node_text(&function, source),
        "attribute" => field_text(function, "attribute", source),
        _ => None,
    }
}

/// Positional parameters up to the first `*`, `*args` or `**kwargs`.
///
/// Returns (names, signature parts); a part carries `=default` when the
/// parameter has one.
fn positional_parameters(params: Node, source: &[u8]) -> (Vec<String>, Vec<String>) {
    let mut names = Vec::new();
    let mut parts = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        match param.kind() {
            "identifier" => {
                if let Some(name) = node_text(&param, source) {
                    parts.push(name.clone());
                    names.push(name);
                }
            }
            "typed_parameter" => {
                let first = param.named_child(0);
                match first.filter(|n| n.kind() == "identifier") {
                    Some(ident) => {
                        if let Some(name) = node_text(&ident, source) {
                            parts.push(name.clone());
                            names.push(name);
                        }
                    }
                    // `*args: T` / `**kwargs: T`
                    None => break,
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                let name = field_text(param, "name", source);
                let value = field_text(param, "value", source);
                if let Some(name) = name {
                    match value {
                        Some(value) => parts.push(format!("{}={}", name, value)),
                        None => parts.push(name.clone()),
                    }
                    names.push(name);
                }
            }
            "list_splat_pattern" | "dictionary_splat_pattern" | "keyword_separator" => break,
            _ => {}
        }
    }
    (names, parts)
}

/// Decorator names for a definition wrapped in `decorated_definition`.
///
/// `@app.route("/")` yields `app.route`.
fn decorators(definition: Node, source: &[u8]) -> Vec<String> {
    let Some(parent) = definition.parent().filter(|p| p.kind() == "decorated_definition") else {
        return Vec::new();
    };
    let mut names = Vec::new();
    let mut cursor = parent.walk();
    for child in parent.named_children(&mut cursor) {
        if child.kind() != "decorator" {
            continue;
        }
        let Some(expr) = child.named_child(0) else {
            continue;
        };
        let target = if expr.kind() == "call" {
            expr.child_by_field_name("function").unwrap_or(expr)
        } else {
            expr
        };
        if let Some(text) = node_text(&target, source) {
            names.push(text.split_whitespace().collect::<String>());
        }
    }
    names
}

fn is_async(function: Node) -> bool {
    function
        .child(0)
        .map(|first| first.kind() == "async")
        .unwrap_or(false)
}

/// First statement of a body when it is a bare string literal.
fn docstring(body: Node, source: &[u8]) -> Option<String> {
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0).filter(|n| n.kind() == "string")?;
    let raw = node_text(&literal, source)?;
    string_literal_value(&raw).map(|value| clean_docstring(&value))
}

fn string_literal_value(raw: &str) -> Option<String> {
    let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return Some(body[quote.len()..body.len() - quote.len()].to_string());
        }
    }
    None
}

/// Strip the common indentation of continuation lines and surrounding blank
/// lines.
fn clean_docstring(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };
    let margin = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = vec![first.trim().to_string()];
    for line in rest {
        let stripped = if line.trim().is_empty() {
            ""
        } else {
            line.get(margin..).unwrap_or_else(|| line.trim_start())
        };
        cleaned.push(stripped.trim_end().to_string());
    }

    while cleaned.last().map_or(false, |l| l.is_empty()) {
        cleaned.pop();
    }
    let leading = cleaned.iter().take_while(|l| l.is_empty()).count();
    cleaned[leading..].join("\n")
}

/// 1-indexed (start, end) lines. A node that ends at column 0 of a later row
/// ends on the previous line.
fn line_span(node: Node) -> (usize, usize) {
    let start = node.start_position();
    let end = node.end_position();
    let line_start = start.row + 1;
    let line_end = if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    };
    (line_start, line_end.max(line_start))
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|child| node_text(&child, source))
}

fn last_segment(dotted: &str) -> &str {
    dotted.rsplit('.').next().unwrap_or(dotted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecl::resolve::FirstMatchResolver;

    fn definitions(source: &str) -> Definitions {
        let mut parser = PythonParser::new().unwrap();
        let tree = parser.parse("mod.py", source.as_bytes()).unwrap();
        extract_definitions(&tree, source.as_bytes(), "mod.py")
    }

    #[test]
    fn test_signature_with_defaults() {
        let defs = definitions("def f(a, b=1, *args, c=2, **kw):\n    pass\n");
        let f = &defs.functions[0];
        assert_eq!(f.parameters, vec!["a", "b"]);
        assert_eq!(f.signature, "f(a, b=1)");
    }

    #[test]
    fn test_typed_parameters_use_names_only() {
        let defs = definitions("def g(x: int, y: str = 'z', *, k=3):\n    return x\n");
        let g = &defs.functions[0];
        assert_eq!(g.parameters, vec!["x", "y"]);
        assert_eq!(g.signature, "g(x, y='z')");
    }

    #[test]
    fn test_methods_flags_and_docstrings() {
        let source = r#"
import abc

class Shape(abc.ABC):
    """A shape.

        Indented detail.
    """

    @staticmethod
    def unit():
        return 1

    @abc.abstractmethod
    def area(self):
        ...

    async def _load(self, path):
        def inner():
            pass
        return inner
"#;
        let defs = definitions(source);
        assert_eq!(defs.classes.len(), 1);
        let shape = &defs.classes[0];
        assert_eq!(shape.base_classes, vec!["abc.ABC"]);
        assert!(shape.is_abstract);
        assert_eq!(shape.method_count, 3);
        assert_eq!(shape.docstring.as_deref(), Some("A shape.\n\nIndented detail."));

        let names: Vec<&str> = defs.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["unit", "area", "_load", "inner"]);

        let unit = &defs.functions[0];
        assert!(unit.is_static && unit.is_method);
        assert_eq!(unit.decorators, vec!["staticmethod"]);
        assert_eq!(unit.line_start, 11);

        let load = &defs.functions[2];
        assert!(load.is_async && load.is_private);
        assert_eq!(load.parameters, vec!["self", "path"]);

        let inner = &defs.functions[3];
        assert_eq!(inner.class_name.as_deref(), Some("Shape"));
        for f in &defs.functions {
            assert!(f.line_end >= f.line_start, "{} has inverted span", f.name);
        }
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let mut parser = PythonParser::new().unwrap();
        let err = parser
            .parse("broken.py", b"def ok():\n    pass\n\ndef bad(:\n    pass\n")
            .unwrap_err();
        assert!(err.starts_with("Syntax error broken.py:"), "{}", err);
    }

    #[test]
    fn test_calls_only_inside_functions() {
        let source = "def helper():\n    pass\n\ndef main():\n    obj.helper()\n    helper()\n\nhelper()\n";
        let mut parser = PythonParser::new().unwrap();
        let tree = parser.parse("m.py", source.as_bytes()).unwrap();
        let defs = extract_definitions(&tree, source.as_bytes(), "m.py");
        let mut index = FunctionIndex::new();
        for f in defs.functions {
            index.register(f);
        }
        let calls = extract_calls(&tree, source.as_bytes(), "m.py", &index, &FirstMatchResolver);
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.caller_name == "main"));
        assert_eq!(calls[0].call_line, 5);
        assert_eq!(calls[0].context, "obj.helper()");
        assert_eq!(calls[1].callee_key, "Function:m.py:helper:1");
    }

    #[test]
    fn test_decorator_calls_belong_to_decorated_function() {
        let source = "def deco(*args):\n    return lambda f: f\n\nclass A:\n    @deco()\n    def m(self):\n        pass\n\ndef outer():\n    @deco()\n    def inner():\n        pass\n    return inner\n\ndef g(x=deco()):\n    return x\n";
        let mut parser = PythonParser::new().unwrap();
        let tree = parser.parse("d.py", source.as_bytes()).unwrap();
        let defs = extract_definitions(&tree, source.as_bytes(), "d.py");
        let mut index = FunctionIndex::new();
        for f in defs.functions {
            index.register(f);
        }
        let calls = extract_calls(&tree, source.as_bytes(), "d.py", &index, &FirstMatchResolver);

        let edges: Vec<(&str, usize)> = calls
            .iter()
            .map(|c| (c.caller_name.as_str(), c.call_line))
            .collect();
        assert_eq!(edges, vec![("m", 5), ("inner", 10), ("g", 15)]);
        assert!(calls.iter().all(|c| c.callee_key == "Function:d.py:deco:1"));
    }

    #[test]
    fn test_recursive_call_type() {
        let source = "def fact(n):\n    return n * fact(n - 1)\n";
        let mut parser = PythonParser::new().unwrap();
        let tree = parser.parse("r.py", source.as_bytes()).unwrap();
        let defs = extract_definitions(&tree, source.as_bytes(), "r.py");
        let mut index = FunctionIndex::new();
        for f in defs.functions {
            index.register(f);
        }
        let calls = extract_calls(&tree, source.as_bytes(), "r.py", &index, &FirstMatchResolver);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_type, CallType::Recursive);
    }

    #[test]
    fn test_clean_docstring() {
        assert_eq!(clean_docstring("\n    Summary.\n\n    Body\n    "), "Summary.\n\nBody");
        assert_eq!(string_literal_value("r'''x'''").as_deref(), Some("x"));
        assert_eq!(string_literal_value("\"y\"").as_deref(), Some("y"));
    }
}
