// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine.
//!
//! The VM owns the heap, the operand stack, the call-frame stack, the
//! globals table, and the open-upvalue list. One `VM` can run any number
//! of sources in sequence (the REPL does exactly that); globals and
//! interned strings persist across runs, and a runtime error resets the
//! stacks but leaves both intact.
//!
//! Allocation is the collector's only trigger: every object the VM creates
//! while running goes through [`VM::alloc`] or [`VM::intern`], which
//! collect first when the heap has outgrown its threshold. At those points
//! every heap reference the program can still use is reachable from the
//! roots marked in [`VM::collect_garbage`], so anything else is garbage.

pub mod error;
pub mod frame;
pub mod stack;

use std::io::Write;

use crate::compiler;
use crate::heap::{Handle, Heap};
use crate::native::{self, NativeFn};
use crate::object::{BoundMethod, Class, Closure, Instance, NativeObj, Obj, Upvalue};
use crate::opcode::OpCode;
use crate::table::Table;
use crate::value::Value;
use crate::InterpretError;

pub use error::{Result, RuntimeError, RuntimeErrorReport};
pub use frame::CallFrame;
pub use stack::ValueStack;

/// Maximum call depth. Exceeding it is a "Stack overflow." runtime error.
pub const FRAMES_MAX: usize = 64;

/// Operand-stack slot budget: 256 slots per frame.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// The Gravlax virtual machine.
pub struct VM {
    heap: Heap,
    stack: ValueStack,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Open upvalues, sorted by ascending stack slot. At most one per slot.
    open_upvalues: Vec<Handle>,
    /// The interned `"init"` string, kept hot for constructor dispatch.
    init_string: Handle,
}

impl VM {
    /// Create a VM with the built-in natives registered.
    pub fn new() -> Self {
        native::anchor_clock();
        let mut heap = Heap::new();
        let init_string = heap.intern("init");
        let mut vm = VM {
            heap,
            stack: ValueStack::new(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
        };
        vm.define_native("clock", native::clock);
        vm
    }

    /// Register a host function under a global name.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let name_handle = self.heap.intern(name);
        let native = self.heap.alloc(Obj::Native(NativeObj {
            name: name_handle,
            function,
        }));
        let hash = self.heap.string(name_handle).hash;
        self.globals.set(name_handle, hash, Value::Obj(native));
    }

    /// Compile and execute a source string. `print` output goes to `out`;
    /// diagnostics are returned, not printed.
    pub fn interpret(&mut self, source: &str, out: &mut dyn Write) -> std::result::Result<(), InterpretError> {
        let function =
            compiler::compile(source, &mut self.heap).map_err(InterpretError::Compile)?;

        // Wrapping the script in a closure allocates directly: a collection
        // here would not see the new function as a root.
        let closure = self.heap.alloc(Obj::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.stack.push(Value::Obj(closure));

        let outcome = self.call(closure, 0).and_then(|()| self.run(out));
        match outcome {
            Ok(()) => Ok(()),
            Err(error) => {
                let report = RuntimeErrorReport {
                    trace: self.stack_trace(),
                    error,
                };
                self.reset();
                Err(InterpretError::Runtime(report))
            }
        }
    }

    /// One `[line N] in name()` entry per active frame, innermost first.
    fn stack_trace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.heap.function(frame.function);
                let line = function.chunk.line_at(frame.ip.saturating_sub(1));
                match function.name {
                    Some(name) => {
                        format!("[line {}] in {}()", line, self.heap.string_content(name))
                    }
                    None => format!("[line {}] in script", line),
                }
            })
            .collect()
    }

    /// Discard all execution state after a runtime error. Globals and
    /// interned strings survive so a REPL session can continue.
    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // ── Allocation funnel ────────────────────────────────────────────────

    /// Allocate through the collector: runs a collection first when the
    /// heap asks for one. Anything the program can still observe must be
    /// reachable from the stack, frames, globals, or open upvalues when
    /// this is called.
    fn alloc(&mut self, obj: Obj) -> Handle {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    /// Intern through the collector, same contract as [`VM::alloc`].
    fn intern(&mut self, text: &str) -> Handle {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(text)
    }

    fn collect_garbage(&mut self) {
        #[cfg(feature = "gc-trace")]
        let before = self.heap.bytes_allocated();
        #[cfg(feature = "gc-trace")]
        eprintln!("-- gc begin");

        for value in self.stack.iter() {
            self.heap.mark_value(*value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        for &upvalue in &self.open_upvalues {
            self.heap.mark_object(upvalue);
        }
        for (name, value) in self.globals.iter() {
            self.heap.mark_object(name);
            self.heap.mark_value(value);
        }
        self.heap.mark_object(self.init_string);

        self.heap.trace_references();
        let reclaimed = self.heap.sweep();
        let _ = reclaimed;

        #[cfg(feature = "gc-trace")]
        eprintln!(
            "-- gc end: reclaimed {} bytes ({} -> {})",
            reclaimed,
            before,
            self.heap.bytes_allocated()
        );
    }

    // ── Bytecode fetch ───────────────────────────────────────────────────

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let byte = self.heap.function(frame.function).chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frames.last().expect("no active frame");
        self.heap.function(frame.function).chunk.constants[index]
    }

    fn read_string(&mut self) -> Result<Handle> {
        match self.read_constant() {
            Value::Obj(handle) if matches!(self.heap.obj(handle), Obj::String(_)) => Ok(handle),
            _ => Err(RuntimeError::Internal(
                "name constant is not a string".to_string(),
            )),
        }
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active frame")
    }

    // ── Dispatch loop ────────────────────────────────────────────────────

    fn run(&mut self, out: &mut dyn Write) -> Result<()> {
        loop {
            #[cfg(feature = "vm-trace")]
            {
                eprint!("          ");
                for value in self.stack.iter() {
                    eprint!("[ {} ]", value.show(&self.heap));
                }
                eprintln!();
                let frame = self.frames.last().expect("no active frame");
                let chunk = &self.heap.function(frame.function).chunk;
                crate::debug::disassemble_instruction(&self.heap, chunk, frame.ip);
            }

            let byte = self.read_byte();
            let op = OpCode::try_from(byte)
                .map_err(|_| RuntimeError::Internal(format!("invalid opcode {}", byte)))?;

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.stack.push(value);
                }
                OpCode::Nil => self.stack.push(Value::Nil),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.stack.pop()?;
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().base;
                    let value = self.stack.get(base + slot)?;
                    self.stack.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().base;
                    let value = self.stack.peek(0)?;
                    self.stack.set(base + slot, value)?;
                }

                OpCode::GetGlobal => {
                    let name = self.read_string()?;
                    let hash = self.heap.string(name).hash;
                    match self.globals.get(name, hash) {
                        Some(value) => self.stack.push(value),
                        None => {
                            return Err(RuntimeError::UndefinedVariable(
                                self.heap.string_content(name).to_string(),
                            ));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string()?;
                    let hash = self.heap.string(name).hash;
                    let value = self.stack.peek(0)?;
                    self.globals.set(name, hash, value);
                    self.stack.pop()?;
                }
                OpCode::SetGlobal => {
                    let name = self.read_string()?;
                    let hash = self.heap.string(name).hash;
                    let value = self.stack.peek(0)?;
                    // Assignment never creates a global; declaration is
                    // explicit.
                    if self.globals.set(name, hash, value) {
                        self.globals.delete(name, hash);
                        return Err(RuntimeError::UndefinedVariable(
                            self.heap.string_content(name).to_string(),
                        ));
                    }
                }

                OpCode::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => self.stack.get(slot)?,
                        Upvalue::Closed(value) => value,
                    };
                    self.stack.push(value);
                }
                OpCode::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let value = self.stack.peek(0)?;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => self.stack.set(slot, value)?,
                        Upvalue::Closed(_) => *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value),
                    }
                }

                OpCode::Equal => {
                    let b = self.stack.pop()?;
                    let a = self.stack.pop()?;
                    self.stack.push(Value::Bool(a == b));
                }
                OpCode::Greater => {
                    let (a, b) = self.number_operands()?;
                    self.stack.push(Value::Bool(a > b));
                }
                OpCode::Less => {
                    let (a, b) = self.number_operands()?;
                    self.stack.push(Value::Bool(a < b));
                }
                OpCode::Add => self.add()?,
                OpCode::Subtract => {
                    let (a, b) = self.number_operands()?;
                    self.stack.push(Value::Number(a - b));
                }
                OpCode::Multiply => {
                    let (a, b) = self.number_operands()?;
                    self.stack.push(Value::Number(a * b));
                }
                OpCode::Divide => {
                    let (a, b) = self.number_operands()?;
                    self.stack.push(Value::Number(a / b));
                }
                OpCode::Not => {
                    let value = self.stack.pop()?;
                    self.stack.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    let Some(n) = self.stack.peek(0)?.as_number() else {
                        return Err(RuntimeError::NumberOperand);
                    };
                    self.stack.pop()?;
                    self.stack.push(Value::Number(-n));
                }

                OpCode::Print => {
                    let value = self.stack.pop()?;
                    writeln!(out, "{}", value.show(&self.heap))
                        .map_err(|e| RuntimeError::Io(e.to_string()))?;
                }

                OpCode::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.stack.peek(0)?.is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.stack.peek(arg_count as usize)?;
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string()?;
                    let arg_count = self.read_byte();
                    self.invoke(name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string()?;
                    let arg_count = self.read_byte();
                    let superclass = self.pop_class()?;
                    let hash = self.heap.string(name).hash;
                    self.invoke_from_class(superclass, name, hash, arg_count)?;
                }

                OpCode::GetProperty => {
                    let name = self.read_string()?;
                    let hash = self.heap.string(name).hash;
                    let receiver = self.stack.peek(0)?;
                    let Some(handle) = receiver.as_obj() else {
                        return Err(RuntimeError::PropertyTarget);
                    };
                    let (class, field) = match self.heap.obj(handle) {
                        Obj::Instance(instance) => {
                            (instance.class, instance.fields.get(name, hash))
                        }
                        _ => return Err(RuntimeError::PropertyTarget),
                    };
                    match field {
                        Some(value) => {
                            self.stack.pop()?;
                            self.stack.push(value);
                        }
                        None => self.bind_method(class, name, hash)?,
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string()?;
                    let hash = self.heap.string(name).hash;
                    let target = self.stack.peek(1)?;
                    let value = self.stack.peek(0)?;
                    let Some(handle) = target.as_obj() else {
                        return Err(RuntimeError::FieldTarget);
                    };
                    match self.heap.obj_mut(handle) {
                        Obj::Instance(instance) => {
                            instance.fields.set(name, hash, value);
                        }
                        _ => return Err(RuntimeError::FieldTarget),
                    }
                    // Pop value and instance, leave the value.
                    let value = self.stack.pop()?;
                    self.stack.pop()?;
                    self.stack.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string()?;
                    let hash = self.heap.string(name).hash;
                    let superclass = self.pop_class()?;
                    self.bind_method(superclass, name, hash)?;
                }

                OpCode::Closure => {
                    let Value::Obj(function) = self.read_constant() else {
                        return Err(RuntimeError::Internal(
                            "closure constant is not a function".to_string(),
                        ));
                    };
                    let upvalue_count = self.heap.function(function).upvalue_count;
                    let closure = self.alloc(Obj::Closure(Closure {
                        function,
                        upvalues: Vec::with_capacity(upvalue_count),
                    }));
                    // On the stack immediately: capture below may collect.
                    self.stack.push(Value::Obj(closure));

                    let base = self.frame().base;
                    let enclosing = self.frame().closure;
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            self.capture_upvalue(base + index)
                        } else {
                            self.heap.closure(enclosing).upvalues[index]
                        };
                        self.heap.closure_mut(closure).upvalues.push(upvalue);
                    }
                }
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top)?;
                    self.stack.pop()?;
                }

                OpCode::Return => {
                    let mut result = self.stack.pop()?;
                    let frame = self.frames.pop().expect("no active frame");
                    if self.heap.function(frame.function).is_initializer {
                        result = self.stack.get(frame.base)?;
                    }
                    self.close_upvalues(frame.base)?;
                    if self.frames.is_empty() {
                        // Pop the script closure; execution is complete.
                        self.stack.pop()?;
                        return Ok(());
                    }
                    self.stack.truncate(frame.base);
                    self.stack.push(result);
                }

                OpCode::Class => {
                    let name = self.read_string()?;
                    let class = self.alloc(Obj::Class(Class::new(name)));
                    self.stack.push(Value::Obj(class));
                }
                OpCode::Inherit => {
                    let superclass = self.stack.peek(1)?;
                    let methods = match superclass.as_obj().map(|h| self.heap.obj(h)) {
                        Some(Obj::Class(class)) => class.methods.clone(),
                        _ => return Err(RuntimeError::SuperclassNotClass),
                    };
                    let subclass = self.peek_class(0)?;
                    // Methods declared after Inherit overwrite the copies.
                    self.heap.class_mut(subclass).methods = methods;
                    self.stack.pop()?;
                }
                OpCode::Method => {
                    let name = self.read_string()?;
                    let hash = self.heap.string(name).hash;
                    let method = self.stack.peek(0)?;
                    let class = self.peek_class(1)?;
                    self.heap.class_mut(class).methods.set(name, hash, method);
                    self.stack.pop()?;
                }
            }
        }
    }

    // ── Arithmetic helpers ───────────────────────────────────────────────

    /// Pop two number operands, or fail leaving the stack untouched.
    fn number_operands(&mut self) -> Result<(f64, f64)> {
        let b = self.stack.peek(0)?.as_number();
        let a = self.stack.peek(1)?.as_number();
        match (a, b) {
            (Some(a), Some(b)) => {
                self.stack.pop()?;
                self.stack.pop()?;
                Ok((a, b))
            }
            _ => Err(RuntimeError::NumberOperands),
        }
    }

    /// `+`: numeric addition or string concatenation.
    fn add(&mut self) -> Result<()> {
        let b = self.stack.peek(0)?;
        let a = self.stack.peek(1)?;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.stack.pop()?;
                self.stack.pop()?;
                self.stack.push(Value::Number(x + y));
                Ok(())
            }
            (Value::Obj(x), Value::Obj(y)) => {
                let (Obj::String(sx), Obj::String(sy)) = (self.heap.obj(x), self.heap.obj(y))
                else {
                    return Err(RuntimeError::AddOperands);
                };
                let mut text = String::with_capacity(sx.chars.len() + sy.chars.len());
                text.push_str(&sx.chars);
                text.push_str(&sy.chars);
                // Interning may collect; both operands are still rooted on
                // the stack, so they survive it.
                let result = self.intern(&text);
                self.stack.pop()?;
                self.stack.pop()?;
                self.stack.push(Value::Obj(result));
                Ok(())
            }
            _ => Err(RuntimeError::AddOperands),
        }
    }

    // ── Calls ────────────────────────────────────────────────────────────

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<()> {
        enum Kind {
            Closure,
            Class,
            Bound(Value, Handle),
            Native(NativeFn),
        }

        let Some(handle) = callee.as_obj() else {
            return Err(RuntimeError::NotCallable);
        };
        let kind = match self.heap.obj(handle) {
            Obj::Closure(_) => Kind::Closure,
            Obj::Class(_) => Kind::Class,
            Obj::BoundMethod(bound) => Kind::Bound(bound.receiver, bound.method),
            Obj::Native(native) => Kind::Native(native.function),
            _ => return Err(RuntimeError::NotCallable),
        };

        match kind {
            Kind::Closure => self.call(handle, arg_count),
            Kind::Class => {
                // The callee slot becomes the fresh instance: it is the
                // receiver for `init` and the call's result otherwise.
                let instance = self.alloc(Obj::Instance(Instance::new(handle)));
                let slot = self.stack.len() - arg_count as usize - 1;
                self.stack.set(slot, Value::Obj(instance))?;

                let init_hash = self.heap.string(self.init_string).hash;
                let initializer = self
                    .heap
                    .class(handle)
                    .methods
                    .get(self.init_string, init_hash);
                match initializer {
                    Some(Value::Obj(init)) => self.call(init, arg_count),
                    Some(_) => Err(RuntimeError::Internal(
                        "initializer is not a closure".to_string(),
                    )),
                    None if arg_count != 0 => Err(RuntimeError::Arity {
                        expected: 0,
                        got: arg_count,
                    }),
                    None => Ok(()),
                }
            }
            Kind::Bound(receiver, method) => {
                let slot = self.stack.len() - arg_count as usize - 1;
                self.stack.set(slot, receiver)?;
                self.call(method, arg_count)
            }
            Kind::Native(function) => {
                let args = self.stack.top_slice(arg_count as usize)?;
                let result = function(args);
                self.stack.truncate(self.stack.len() - arg_count as usize - 1);
                self.stack.push(result);
                Ok(())
            }
        }
    }

    /// Push a frame for a closure call after checking arity and depth.
    fn call(&mut self, closure: Handle, arg_count: u8) -> Result<()> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity;
        if arg_count != arity {
            return Err(RuntimeError::Arity {
                expected: arity,
                got: arg_count,
            });
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        let base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame::new(closure, function, base));
        Ok(())
    }

    /// `receiver.name(args)` without materializing a bound method: fields
    /// that shadow methods still win, everything else dispatches straight
    /// into the class's method table.
    fn invoke(&mut self, name: Handle, arg_count: u8) -> Result<()> {
        let receiver = self.stack.peek(arg_count as usize)?;
        let Some(handle) = receiver.as_obj() else {
            return Err(RuntimeError::MethodTarget);
        };
        let hash = self.heap.string(name).hash;
        let (class, field) = match self.heap.obj(handle) {
            Obj::Instance(instance) => (instance.class, instance.fields.get(name, hash)),
            _ => return Err(RuntimeError::MethodTarget),
        };
        if let Some(field) = field {
            let slot = self.stack.len() - arg_count as usize - 1;
            self.stack.set(slot, field)?;
            return self.call_value(field, arg_count);
        }
        self.invoke_from_class(class, name, hash, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: Handle,
        name: Handle,
        hash: u32,
        arg_count: u8,
    ) -> Result<()> {
        let method = self.heap.class(class).methods.get(name, hash);
        let Some(Value::Obj(closure)) = method else {
            return Err(RuntimeError::UndefinedProperty(
                self.heap.string_content(name).to_string(),
            ));
        };
        self.call(closure, arg_count)
    }

    /// Read a method of `class` and leave it bound to the receiver on top
    /// of the stack.
    fn bind_method(&mut self, class: Handle, name: Handle, hash: u32) -> Result<()> {
        let method = self.heap.class(class).methods.get(name, hash);
        let Some(Value::Obj(closure)) = method else {
            return Err(RuntimeError::UndefinedProperty(
                self.heap.string_content(name).to_string(),
            ));
        };
        let receiver = self.stack.peek(0)?;
        let bound = self.alloc(Obj::BoundMethod(BoundMethod {
            receiver,
            method: closure,
        }));
        self.stack.pop()?;
        self.stack.push(Value::Obj(bound));
        Ok(())
    }

    fn peek_class(&self, distance: usize) -> Result<Handle> {
        match self.stack.peek(distance)?.as_obj() {
            Some(handle) if matches!(self.heap.obj(handle), Obj::Class(_)) => Ok(handle),
            _ => Err(RuntimeError::Internal("expected a class".to_string())),
        }
    }

    fn pop_class(&mut self) -> Result<Handle> {
        let class = self.peek_class(0)?;
        self.stack.pop()?;
        Ok(class)
    }

    // ── Upvalues ─────────────────────────────────────────────────────────

    /// Find or create the open upvalue for an operand-stack slot. The open
    /// list is kept sorted by slot so a slot is never captured twice.
    fn capture_upvalue(&mut self, slot: usize) -> Handle {
        let position = self.open_upvalues.binary_search_by_key(&slot, |&handle| {
            match *self.heap.upvalue(handle) {
                Upvalue::Open(open_slot) => open_slot,
                Upvalue::Closed(_) => usize::MAX,
            }
        });
        match position {
            Ok(existing) => self.open_upvalues[existing],
            Err(insert_at) => {
                let created = self.alloc(Obj::Upvalue(Upvalue::Open(slot)));
                self.open_upvalues.insert(insert_at, created);
                created
            }
        }
    }

    /// Close every open upvalue at or above `from`: copy the slot's value
    /// inline and drop the upvalue from the open list.
    fn close_upvalues(&mut self, from: usize) -> Result<()> {
        while let Some(&handle) = self.open_upvalues.last() {
            let slot = match *self.heap.upvalue(handle) {
                Upvalue::Open(slot) => slot,
                Upvalue::Closed(_) => {
                    return Err(RuntimeError::Internal(
                        "closed upvalue on the open list".to_string(),
                    ));
                }
            };
            if slot < from {
                break;
            }
            let value = self.stack.get(slot)?;
            *self.heap.upvalue_mut(handle) = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
        Ok(())
    }

    // ── Introspection for tests and embedders ────────────────────────────

    /// Number of live heap objects.
    pub fn heap_objects(&self) -> usize {
        self.heap.object_count()
    }

    /// Bytes currently attributed to the heap.
    pub fn heap_bytes(&self) -> usize {
        self.heap.bytes_allocated()
    }

    /// Force a full collection. The stacks are empty between `interpret`
    /// calls, so from the outside this reclaims everything globals don't
    /// reach.
    pub fn collect_now(&mut self) {
        self.collect_garbage();
    }
}

impl Default for VM {
    fn default() -> Self {
        VM::new()
    }
}
