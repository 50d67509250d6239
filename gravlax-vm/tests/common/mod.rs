// gravlax-vm - Common test utilities
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared test helpers for gravlax-vm integration tests.
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#[allow(unused_imports)]
pub use gravlax_vm::{InterpretError, RuntimeError, VM};

/// Run a program in a fresh VM and return everything it printed.
///
/// # Panics
///
/// Panics if the program fails to compile or hits a runtime error.
#[allow(dead_code)]
pub fn run(source: &str) -> String {
    let mut vm = VM::new();
    run_with_vm(&mut vm, source)
}

/// Run a program in an existing VM (globals persist between calls) and
/// return everything it printed.
#[allow(dead_code)]
pub fn run_with_vm(vm: &mut VM, source: &str) -> String {
    let mut out = Vec::new();
    if let Err(error) = vm.interpret(source, &mut out) {
        panic!("program failed: {}\nsource: {}", error, source);
    }
    String::from_utf8(out).expect("program output is UTF-8")
}

/// Run a program that must fail and return the error.
#[allow(dead_code)]
pub fn run_err(source: &str) -> InterpretError {
    let mut vm = VM::new();
    let mut out = Vec::new();
    match vm.interpret(source, &mut out) {
        Ok(()) => panic!("expected failure, program ran\nsource: {}", source),
        Err(error) => error,
    }
}

/// Assert that a program fails at runtime with a message containing
/// `expected`.
#[allow(dead_code)]
pub fn expect_runtime_error(source: &str, expected: &str) {
    match run_err(source) {
        InterpretError::Runtime(report) => {
            let message = report.error.to_string();
            assert!(
                message.contains(expected),
                "runtime error '{}' should contain '{}'\nsource: {}",
                message,
                expected,
                source
            );
        }
        InterpretError::Compile(errors) => panic!(
            "expected runtime error containing '{}', got compile errors {:?}\nsource: {}",
            expected, errors, source
        ),
    }
}

/// Assert that a program fails to compile with a diagnostic containing
/// `expected`.
#[allow(dead_code)]
pub fn expect_compile_error(source: &str, expected: &str) {
    match run_err(source) {
        InterpretError::Compile(errors) => {
            assert!(
                errors.iter().any(|e| e.to_string().contains(expected)),
                "no compile error contains '{}', got {:?}\nsource: {}",
                expected,
                errors,
                source
            );
        }
        InterpretError::Runtime(report) => panic!(
            "expected compile error containing '{}', got runtime error '{}'\nsource: {}",
            expected, report, source
        ),
    }
}
