mod common;

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use scratchpad::{
    config::SandboxConfig, ErrorKind, ExecutionError, ExecutionOutcome, Orchestrator,
};
use serde_json::json;

use common::{orchestrator, short_timeout_config};

fn kind(outcome: &ExecutionOutcome) -> Option<ErrorKind> {
    outcome.error().map(ExecutionError::kind)
}

#[test]
fn test_function_definition_then_call() {
    let mut orchestrator = orchestrator();
    let define = orchestrator.execute(
        "def fibonacci(n):\n    a, b = 0, 1\n    for _ in range(n):\n        a, b = b, a + b\n    return a",
    );
    assert!(define.is_success(), "{:?}", define);
    let outcome = orchestrator.execute("fibonacci(10) == 55");
    assert_eq!(outcome.output(), "True");
}

#[test]
fn test_multiline_loop_prints_each_value() {
    let mut orchestrator = orchestrator();
    let outcome = orchestrator.execute("for word in ['alpha', 'beta']:\n    print(word.upper())");
    assert_eq!(outcome.output(), "ALPHA\nBETA");
}

#[test]
fn test_console_echo_skips_none() {
    let mut orchestrator = orchestrator();
    let outcome = orchestrator.execute("items = [3, 1, 2]\nitems.sort()\nitems\nNone");
    assert_eq!(outcome.output(), "[1, 2, 3]");
}

#[test]
fn test_mixed_blocks_and_statements() {
    let mut orchestrator = orchestrator();
    let source = "\
totals = {}
for name, score in [('a', 1), ('b', 2), ('a', 3)]:
    if name in totals:
        totals[name] += score
    else:
        totals[name] = score

best = max(totals, key=lambda k: totals[k])
print(best, totals[best])";
    let outcome = orchestrator.execute(source);
    assert_eq!(outcome.output(), "a 4");
}

#[test]
fn test_lists_and_dicts_are_shared_by_reference() {
    let mut orchestrator = orchestrator();
    let source = "\
def add(l):
    l.append(1)

xs = []
add(xs)
d = {}
def put(k):
    d[k] = 1

put('a')
alias = xs
alias.append(2)";
    let outcome = orchestrator.execute(source);
    assert!(outcome.is_success(), "{:?}", outcome);
    let snapshot = orchestrator.session().state().snapshot();
    assert_eq!(snapshot["xs"], json!([1, 2]));
    assert_eq!(snapshot["alias"], json!([1, 2]));
    assert_eq!(snapshot["d"], json!({"a": 1}));

    assert!(orchestrator.execute("xs.append(3)").is_success());
    assert_eq!(orchestrator.session().state().snapshot()["alias"], json!([1, 2, 3]));
}

#[test]
fn test_infinite_loop_times_out() {
    let mut orchestrator = Orchestrator::new(short_timeout_config(200)).unwrap();
    let started = Instant::now();
    let outcome = orchestrator.execute("n = 0\nwhile True:\n    n += 1");
    assert_eq!(kind(&outcome), Some(ErrorKind::ResourceExceeded));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(orchestrator.execute("print('still alive')").is_success());
}

#[test]
fn test_huge_allocation_exceeds_memory() {
    let mut orchestrator = orchestrator();
    let outcome = orchestrator.execute("big = [0] * (10 ** 9)");
    assert_eq!(kind(&outcome), Some(ErrorKind::ResourceExceeded));
    assert!(outcome.error().unwrap().to_string().contains("memory"));
    assert!(orchestrator.session().state().get("big").is_err());
}

#[test]
fn test_deep_recursion_is_a_runtime_fault() {
    let mut orchestrator = orchestrator();
    let outcome = orchestrator.execute("def down(n):\n    return down(n + 1)\n\ndown(0)");
    assert_eq!(kind(&outcome), Some(ErrorKind::RuntimeFault));
    assert!(outcome.output().contains("RecursionError"));
}

#[test]
fn test_structural_limits_follow_config() {
    let mut config = SandboxConfig::default();
    config.limits.max_code_length = 40;
    config.limits.max_nesting_depth = 2;
    config.limits.max_variables = 2;
    let mut orchestrator = Orchestrator::new(config).unwrap();

    let outcome = orchestrator.execute(&"x = 1\n".repeat(10));
    assert_eq!(
        outcome.error(),
        Some(&ExecutionError::LengthExceeded { length: 60, max: 40 })
    );
    let outcome = orchestrator.execute("x = [[[1]]]");
    assert_eq!(kind(&outcome), Some(ErrorKind::NestingExceeded));
    let outcome = orchestrator.execute("a = 1; b = 2; c = 3");
    assert_eq!(kind(&outcome), Some(ErrorKind::TooManyVariables));
    assert!(orchestrator.execute("a = 1; b = 2").is_success());
    assert_eq!(orchestrator.session().history().len(), 4);
}

#[test]
fn test_only_allowed_builtins_exist() {
    let mut config = SandboxConfig::default();
    config.security.allowed_builtins = vec!["print".to_string()];
    let mut orchestrator = Orchestrator::new(config).unwrap();
    assert!(orchestrator.execute("print(1)").is_success());
    let outcome = orchestrator.execute("len([1])");
    assert_eq!(
        outcome.error().map(ToString::to_string).as_deref(),
        Some("NameError: name 'len' is not defined")
    );
}

#[test]
fn test_unsupported_syntax_is_rejected() {
    let mut orchestrator = orchestrator();
    let outcome = orchestrator.execute("class Thing:\n    pass");
    assert_eq!(kind(&outcome), Some(ErrorKind::SyntaxError));
}

#[test]
fn test_invalid_pattern_is_a_config_error() {
    let mut config = SandboxConfig::default();
    config.security.restricted_operations = vec!["(unclosed".to_string()];
    assert!(Orchestrator::new(config).is_err());
}
