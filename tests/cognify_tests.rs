//! Cognify stage: definitions and call resolution across files.

use mnemosyne::common::compute_hash;
use mnemosyne::ecl::{Cognifier, ResolverKind};
use mnemosyne::entities::{function_key, CallType};
use mnemosyne::FileFact;

fn python_file(path: &str, content: &str) -> FileFact {
    FileFact {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap().to_string(),
        extension: ".py".to_string(),
        content: content.to_string(),
        size_bytes: content.len() as u64,
        encoding: "utf-8".to_string(),
        hash: compute_hash(content.as_bytes()),
        language: "python".to_string(),
    }
}

fn two_helpers() -> Vec<FileFact> {
    vec![
        python_file(
            "file_a.py",
            "\ndef helper():\n    return 1\n\ndef run_a():\n    return helper()\n",
        ),
        python_file(
            "file_b.py",
            "\ndef helper():\n    return 2\n\ndef run_b():\n    return helper()\n",
        ),
    ]
}

#[test]
fn test_definitions_have_sane_spans() {
    let files = vec![python_file(
        "shapes.py",
        "class Shape:\n    def area(self):\n        return 0\n\n    def describe(self):\n        return self.area()\n\n\nasync def fetch(url, timeout=3):\n    pass\n",
    )];

    let result = Cognifier::new().unwrap().cognify(&files);

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.functions.len(), 3);
    assert_eq!(result.classes.len(), 1);
    assert_eq!(result.classes[0].method_count, 2);
    for function in &result.functions {
        assert!(function.line_end >= function.line_start, "{:?}", function);
    }

    let fetch = result.functions.iter().find(|f| f.name == "fetch").unwrap();
    assert!(fetch.is_async);
    assert!(!fetch.is_method);
    assert_eq!(fetch.parameters, vec!["url", "timeout"]);

    let describe = result.functions.iter().find(|f| f.name == "describe").unwrap();
    assert!(describe.is_method);
    assert_eq!(describe.class_name.as_deref(), Some("Shape"));
}

#[test]
fn test_first_match_is_deterministic_across_files() {
    let result = Cognifier::new().unwrap().cognify(&two_helpers());

    assert_eq!(result.calls.len(), 2);
    let first_helper = function_key("file_a.py", "helper", 2);
    for call in &result.calls {
        assert_eq!(call.callee_key, first_helper, "call from {}", call.caller_name);
        assert_eq!(call.call_type, CallType::Direct);
    }

    let again = Cognifier::new().unwrap().cognify(&two_helpers());
    let keys = |calls: &[mnemosyne::CallFact]| {
        calls
            .iter()
            .map(|c| (c.caller_key.clone(), c.callee_key.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(&result.calls), keys(&again.calls));
}

#[test]
fn test_scoped_resolver_prefers_same_file() {
    let mut cognifier = Cognifier::with_resolver(ResolverKind::Scoped.build()).unwrap();
    assert_eq!(cognifier.resolver_name(), "scoped");

    let result = cognifier.cognify(&two_helpers());

    let from_b = result
        .calls
        .iter()
        .find(|c| c.caller_name == "run_b")
        .unwrap();
    assert_eq!(from_b.callee_key, function_key("file_b.py", "helper", 2));
    let from_a = result
        .calls
        .iter()
        .find(|c| c.caller_name == "run_a")
        .unwrap();
    assert_eq!(from_a.callee_key, function_key("file_a.py", "helper", 2));
}

#[test]
fn test_unresolved_and_module_level_calls_are_dropped() {
    let files = vec![python_file(
        "app.py",
        "import os\n\ndef main():\n    print(os.getcwd())\n    return go()\n\ndef go():\n    return 1\n\nmain()\n",
    )];

    let result = Cognifier::new().unwrap().cognify(&files);

    assert_eq!(result.calls.len(), 1);
    assert_eq!(result.calls[0].caller_name, "main");
    assert_eq!(result.calls[0].callee_name, "go");
    assert_eq!(result.calls[0].call_line, 5);
}

#[test]
fn test_recursive_call_is_tagged() {
    let files = vec![python_file(
        "fact.py",
        "def fact(n):\n    return 1 if n < 2 else n * fact(n - 1)\n",
    )];

    let result = Cognifier::new().unwrap().cognify(&files);

    assert_eq!(result.calls.len(), 1);
    assert_eq!(result.calls[0].call_type, CallType::Recursive);
    assert_eq!(result.calls[0].caller_key, result.calls[0].callee_key);
}

#[test]
fn test_syntax_error_does_not_stop_other_files() {
    let files = vec![
        python_file("broken.py", "def broken(:\n    pass\n"),
        python_file("fine.py", "def fine():\n    return 1\n"),
    ];

    let result = Cognifier::new().unwrap().cognify(&files);

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("broken.py"), "{}", result.errors[0]);
    assert_eq!(result.functions.len(), 1);
    assert_eq!(result.functions[0].name, "fine");
}

#[test]
fn test_non_python_and_empty_files_are_skipped() {
    let mut notes = python_file("notes.txt", "def not_code():\n    pass\n");
    notes.language = "unknown".to_string();
    let files = vec![notes, python_file("empty.py", "")];

    let result = Cognifier::new().unwrap().cognify(&files);

    assert!(result.functions.is_empty());
    assert!(result.errors.is_empty());
}
