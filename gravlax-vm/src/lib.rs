// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # gravlax-vm
//!
//! Bytecode compiler and stack-based virtual machine for the Gravlax
//! programming language. Source is compiled in a single pass to byte-coded
//! chunks, executed by a call-frame VM with closures, classes, and single
//! inheritance, over a heap managed by a precise mark-sweep collector.
//!
//! The embedding surface is [`VM`]: create one, optionally register host
//! functions with [`VM::define_native`], and feed it source with
//! [`VM::interpret`]. A VM keeps its globals and interned strings across
//! calls, which is what makes a REPL work.

pub mod chunk;
pub mod compiler;
pub mod debug;
pub mod heap;
pub mod native;
pub mod object;
pub mod opcode;
pub mod table;
pub mod value;
pub mod vm;

use std::fmt;

pub use compiler::{CompileError, ErrorLocation};
pub use heap::{Handle, Heap};
pub use native::NativeFn;
pub use opcode::OpCode;
pub use value::Value;
pub use vm::{RuntimeError, RuntimeErrorReport, VM};

/// Why a call to [`VM::interpret`] failed.
#[derive(Debug)]
pub enum InterpretError {
    /// The source did not compile; every diagnostic is included.
    Compile(Vec<CompileError>),
    /// Execution hit a runtime error; the report carries the stack trace.
    Runtime(RuntimeErrorReport),
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretError::Compile(errors) => {
                let mut first = true;
                for error in errors {
                    if !first {
                        writeln!(f)?;
                    }
                    write!(f, "{}", error)?;
                    first = false;
                }
                Ok(())
            }
            InterpretError::Runtime(report) => write!(f, "{}", report),
        }
    }
}

impl std::error::Error for InterpretError {}
