// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime error types.

use std::fmt;

/// Result type for VM execution.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// An error raised while executing bytecode. Any of these unwinds the
/// whole frame stack; the VM wraps the error in a [`RuntimeErrorReport`]
/// carrying the stack trace before handing it to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Arithmetic or comparison on non-numbers.
    NumberOperands,
    /// Negation of a non-number.
    NumberOperand,
    /// `+` on anything other than two numbers or two strings.
    AddOperands,
    /// Read or write of a global that was never defined.
    UndefinedVariable(String),
    /// Property access that matched neither a field nor a method.
    UndefinedProperty(String),
    /// Property read on a non-instance.
    PropertyTarget,
    /// Field write on a non-instance.
    FieldTarget,
    /// Method invocation on a non-instance.
    MethodTarget,
    /// Calling a value that is not a function or class.
    NotCallable,
    /// Call with the wrong number of arguments.
    Arity { expected: u8, got: u8 },
    /// `class A < x` where `x` is not a class.
    SuperclassNotClass,
    /// Too many nested calls.
    StackOverflow,
    /// Operand-stack underflow; a bytecode invariant was broken.
    StackUnderflow,
    /// Writing program output failed.
    Io(String),
    /// A bytecode invariant was broken.
    Internal(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::NumberOperands => write!(f, "Operands must be numbers."),
            RuntimeError::NumberOperand => write!(f, "Operand must be a number."),
            RuntimeError::AddOperands => {
                write!(f, "Operands must be two numbers or two strings.")
            }
            RuntimeError::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{}'.", name)
            }
            RuntimeError::UndefinedProperty(name) => {
                write!(f, "Undefined property '{}'.", name)
            }
            RuntimeError::PropertyTarget => write!(f, "Only instances have properties."),
            RuntimeError::FieldTarget => write!(f, "Only instances have fields."),
            RuntimeError::MethodTarget => write!(f, "Only instances have methods."),
            RuntimeError::NotCallable => write!(f, "Can only call functions and classes."),
            RuntimeError::Arity { expected, got } => {
                write!(f, "Expected {} arguments but got {}.", expected, got)
            }
            RuntimeError::SuperclassNotClass => write!(f, "Superclass must be a class."),
            RuntimeError::StackOverflow => write!(f, "Stack overflow."),
            RuntimeError::StackUnderflow => write!(f, "Stack underflow."),
            RuntimeError::Io(message) => write!(f, "Could not write output: {}", message),
            RuntimeError::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// A runtime error paired with the stack trace captured as the frame
/// stack unwound, one line per frame, innermost first.
#[derive(Debug, Clone)]
pub struct RuntimeErrorReport {
    pub error: RuntimeError,
    /// Preformatted `[line N] in name()` lines.
    pub trace: Vec<String>,
}

impl fmt::Display for RuntimeErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for line in &self.trace {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeErrorReport {}
