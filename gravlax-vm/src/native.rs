// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Native function ABI and the built-in natives.
//!
//! A native receives its arguments as a borrowed slice and returns a single
//! value. The slice is only valid for the duration of the call; natives must
//! not stash it anywhere.

use std::sync::OnceLock;
use std::time::Instant;

use crate::value::Value;

/// The host function ABI.
pub type NativeFn = fn(args: &[Value]) -> Value;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Anchor the `clock()` epoch. Called once when a VM is created so the
/// reported time starts near zero.
pub(crate) fn anchor_clock() {
    PROCESS_START.get_or_init(Instant::now);
}

/// `clock()` — seconds since process start, as a number.
pub fn clock(_args: &[Value]) -> Value {
    let start = PROCESS_START.get_or_init(Instant::now);
    Value::Number(start.elapsed().as_secs_f64())
}
