// gravlax-vm - Function and closure tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

mod common;
use common::*;

#[test]
fn call_and_return() {
    let source = "\
fun add(a, b) { return a + b; }
print add(1, 2);
";
    assert_eq!(run(source), "3\n");
}

#[test]
fn implicit_return_is_nil() {
    assert_eq!(run("fun noop() {} print noop();"), "nil\n");
    assert_eq!(run("fun early() { return; print 1; } print early();"), "nil\n");
}

#[test]
fn function_printing() {
    assert_eq!(run("fun f() {} print f;"), "<fn f>\n");
    assert_eq!(run("print clock;"), "<native fn>\n");
}

#[test]
fn recursion() {
    let source = "\
fun fib(n) {
  if (n < 2) return n;
  return fib(n - 2) + fib(n - 1);
}
print fib(10);
";
    assert_eq!(run(source), "55\n");
}

#[test]
fn functions_are_values() {
    let source = "\
fun twice(f, x) { return f(f(x)); }
fun inc(n) { return n + 1; }
print twice(inc, 5);
";
    assert_eq!(run(source), "7\n");
}

#[test]
fn closure_captures_variable() {
    let source = "\
fun make(x) {
  fun inner() { return x; }
  return inner;
}
var f = make(42);
print f();
";
    assert_eq!(run(source), "42\n");
}

#[test]
fn closure_counter_has_private_state() {
    let source = "\
fun makeCounter() {
  var count = 0;
  fun tick() {
    count = count + 1;
    return count;
  }
  return tick;
}
var a = makeCounter();
var b = makeCounter();
print a();
print a();
print b();
";
    assert_eq!(run(source), "1\n2\n1\n");
}

#[test]
fn closures_share_a_captured_variable() {
    // Both closures alias the same slot, open or closed.
    let source = "\
var getter;
var setter;
{
  var shared = \"initial\";
  fun get() { return shared; }
  fun set(v) { shared = v; }
  getter = get;
  setter = set;
}
print getter();
setter(\"updated\");
print getter();
";
    assert_eq!(run(source), "initial\nupdated\n");
}

#[test]
fn upvalue_closes_over_loop_variable() {
    // The loop variable is one slot for the whole loop, so the closure
    // sees its final value (1 after the exit test), not a per-iteration
    // snapshot.
    let source = "\
var fns;
for (var i = 0; i < 1; i = i + 1) {
  fun f() { return i; }
  fns = f;
}
print fns();
";
    assert_eq!(run(source), "1\n");
}

#[test]
fn transitive_capture_through_nested_functions() {
    let source = "\
fun outer() {
  var x = \"x\";
  fun middle() {
    fun inner() { return x; }
    return inner;
  }
  return middle();
}
print outer()();
";
    assert_eq!(run(source), "x\n");
}

#[test]
fn clock_native_returns_numbers() {
    let source = "\
var before = clock();
var after = clock();
print after >= before;
print before >= 0;
";
    assert_eq!(run(source), "true\ntrue\n");
}

#[test]
fn arity_is_checked() {
    expect_runtime_error(
        "fun f(a, b) {} f(1);",
        "Expected 2 arguments but got 1.",
    );
    expect_runtime_error(
        "fun f() {} f(1, 2, 3);",
        "Expected 0 arguments but got 3.",
    );
}

#[test]
fn only_functions_and_classes_are_callable() {
    expect_runtime_error("var x = 1; x();", "Can only call functions and classes.");
    expect_runtime_error("\"text\"();", "Can only call functions and classes.");
    expect_runtime_error("nil();", "Can only call functions and classes.");
}

#[test]
fn deep_recursion_overflows() {
    expect_runtime_error("fun loop() { loop(); } loop();", "Stack overflow.");
}

#[test]
fn stack_trace_reports_call_chain() {
    let source = "\
fun a() { b(); }
fun b() { c(); }
fun c() { c(\"too many\"); }
a();
";
    match run_err(source) {
        InterpretError::Runtime(report) => {
            assert_eq!(report.error.to_string(), "Expected 0 arguments but got 1.");
            // Innermost frame first, script last.
            assert_eq!(report.trace.len(), 4);
            assert!(report.trace[0].contains("in c()"));
            assert!(report.trace[1].contains("in b()"));
            assert!(report.trace[2].contains("in a()"));
            assert!(report.trace[3].contains("in script"));
            assert!(report.trace[0].contains("[line 3]"));
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
}

#[test]
fn return_outside_function_is_rejected() {
    expect_compile_error("return 1;", "Can't return from top-level code.");
}
