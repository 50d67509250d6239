// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode disassembler.
//!
//! Observational only: used by the `vm-trace` feature and handy from tests.
//! Output goes to stderr so it interleaves with diagnostics rather than
//! program output.

use crate::chunk::Chunk;
use crate::heap::Heap;
use crate::opcode::OpCode;

/// Disassemble a whole chunk under a header.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) {
    eprintln!("== {} ==", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(heap, chunk, offset);
    }
}

/// Disassemble the instruction at `offset`; returns the next offset.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> usize {
    eprint!("{:04} ", offset);
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        eprint!("   | ");
    } else {
        eprint!("{:4} ", chunk.line_at(offset));
    }

    let byte = chunk.code[offset];
    let Ok(op) = OpCode::try_from(byte) else {
        eprintln!("unknown opcode {}", byte);
        return offset + 1;
    };

    match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => constant_instruction(heap, chunk, op, offset),
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call => byte_instruction(chunk, op, offset),
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(chunk, op, 1, offset),
        OpCode::Loop => jump_instruction(chunk, op, -1, offset),
        OpCode::Invoke | OpCode::SuperInvoke => invoke_instruction(heap, chunk, op, offset),
        OpCode::Closure => closure_instruction(heap, chunk, offset),
        _ => {
            eprintln!("{:?}", op);
            offset + 1
        }
    }
}

fn constant_instruction(heap: &Heap, chunk: &Chunk, op: OpCode, offset: usize) -> usize {
    let constant = chunk.code[offset + 1];
    let value = chunk.constants[constant as usize];
    eprintln!("{:<16} {:4} '{}'", format!("{:?}", op), constant, value.show(heap));
    offset + 2
}

fn byte_instruction(chunk: &Chunk, op: OpCode, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    eprintln!("{:<16} {:4}", format!("{:?}", op), slot);
    offset + 2
}

fn jump_instruction(chunk: &Chunk, op: OpCode, sign: i64, offset: usize) -> usize {
    let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]) as i64;
    let target = offset as i64 + 3 + sign * jump;
    eprintln!("{:<16} {:4} -> {}", format!("{:?}", op), offset, target);
    offset + 3
}

fn invoke_instruction(heap: &Heap, chunk: &Chunk, op: OpCode, offset: usize) -> usize {
    let constant = chunk.code[offset + 1];
    let arg_count = chunk.code[offset + 2];
    let name = chunk.constants[constant as usize];
    eprintln!(
        "{:<16} ({} args) {:4} '{}'",
        format!("{:?}", op),
        arg_count,
        constant,
        name.show(heap)
    );
    offset + 3
}

fn closure_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> usize {
    let mut offset = offset + 1;
    let constant = chunk.code[offset];
    offset += 1;
    let value = chunk.constants[constant as usize];
    eprintln!("{:<16} {:4} {}", "Closure", constant, value.show(heap));

    let function = value
        .as_obj()
        .map(|h| heap.function(h))
        .expect("closure operand is a function constant");
    for _ in 0..function.upvalue_count {
        let is_local = chunk.code[offset] == 1;
        let index = chunk.code[offset + 1];
        eprintln!(
            "{:04}      |                     {} {}",
            offset,
            if is_local { "local" } else { "upvalue" },
            index
        );
        offset += 2;
    }
    offset
}
