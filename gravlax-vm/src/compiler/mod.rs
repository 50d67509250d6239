// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Single-pass compiler: parsing and code emission are fused.
//!
//! Declarations and statements live here; expression parsing is the Pratt
//! machinery in [`expr`]. A stack of [`FunctionState`]s mirrors the nesting
//! of function bodies, so resolving an identifier can walk outward through
//! enclosing functions to build upvalue chains.
//!
//! Errors do not abort parsing. The first error in a statement puts the
//! parser into panic mode, which suppresses further diagnostics until the
//! next statement boundary; every surfaced error is collected and the whole
//! batch is returned once the source has been consumed. No bytecode from a
//! failed compile is ever executed.

mod expr;
mod scope;

use std::fmt;

use gravlax_syntax::{Scanner, Token, TokenKind};

use crate::chunk::Chunk;
use crate::heap::{Handle, Heap};
use crate::object::{Function, Obj};
use crate::opcode::OpCode;
use crate::value::Value;

use scope::{ClassState, FunctionKind, FunctionState, Local, UpvalueInfo, MAX_LOCALS, MAX_UPVALUES};

/// A diagnostic produced during compilation.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub line: u32,
    pub location: ErrorLocation,
    pub message: String,
}

/// Where in the token stream an error was reported.
#[derive(Debug, Clone)]
pub enum ErrorLocation {
    /// At a normal token; carries its lexeme.
    At(String),
    /// At the end of the source.
    AtEnd,
    /// At a scanner error token (the message already says what was wrong).
    Bare,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            ErrorLocation::At(lexeme) => {
                write!(f, "[line {}] Error at '{}': {}", self.line, lexeme, self.message)
            }
            ErrorLocation::AtEnd => {
                write!(f, "[line {}] Error at end: {}", self.line, self.message)
            }
            ErrorLocation::Bare => write!(f, "[line {}] Error: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Compile a source string into the top-level script function.
///
/// On success the returned handle refers to a [`Function`] with no name and
/// no upvalues, ready to be wrapped in a closure and called by the VM. On
/// failure every diagnostic found before the end of input is returned.
pub fn compile(source: &str, heap: &mut Heap) -> Result<Handle, Vec<CompileError>> {
    let mut parser = Parser::new(source, heap);
    parser.advance();
    while !parser.match_token(TokenKind::Eof) {
        parser.declaration();
    }
    let (function, _) = parser.end_function();
    if parser.errors.is_empty() {
        Ok(function)
    } else {
        Err(parser.errors)
    }
}

pub(crate) struct Parser<'src, 'h> {
    scanner: Scanner<'src>,
    pub(crate) current: Token<'src>,
    pub(crate) previous: Token<'src>,
    pub(crate) heap: &'h mut Heap,
    /// One entry per enclosing function being compiled; last is innermost.
    pub(crate) states: Vec<FunctionState>,
    /// One entry per enclosing `class` declaration.
    pub(crate) class_states: Vec<ClassState>,
    errors: Vec<CompileError>,
    panic_mode: bool,
}

impl<'src, 'h> Parser<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        };
        Parser {
            scanner: Scanner::new(source),
            current: placeholder,
            previous: placeholder,
            heap,
            states: vec![FunctionState::new(FunctionKind::Script, None)],
            class_states: Vec::new(),
            errors: Vec::new(),
            panic_mode: false,
        }
    }

    // ── Token plumbing ───────────────────────────────────────────────────

    pub(crate) fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            // An error token's lexeme is the scanner's message.
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ── Error reporting ──────────────────────────────────────────────────

    pub(crate) fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::AtEnd,
            TokenKind::Error => ErrorLocation::Bare,
            _ => ErrorLocation::At(token.lexeme.to_string()),
        };
        self.errors.push(CompileError {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    /// Skip tokens until a statement boundary so one mistake does not
    /// cascade into a pile of follow-on diagnostics.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ── Emission ─────────────────────────────────────────────────────────

    pub(crate) fn state(&mut self) -> &mut FunctionState {
        self.states.last_mut().expect("function state stack empty")
    }

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.state().chunk
    }

    pub(crate) fn emit(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.current_chunk().write_op(op, line);
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write(byte, line);
    }

    pub(crate) fn emit_pair(&mut self, op: OpCode, operand: u8) {
        self.emit(op);
        self.emit_byte(operand);
    }

    /// Emit a forward jump with a placeholder offset; returns the offset
    /// of the operand for later patching.
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().code.len() - 2
    }

    /// Point the jump at `operand_offset` to the current end of code.
    pub(crate) fn patch_jump(&mut self, operand_offset: usize) {
        let jump = self.current_chunk().code.len() - operand_offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        let bytes = (jump as u16).to_be_bytes();
        let code = &mut self.current_chunk().code;
        code[operand_offset] = bytes[0];
        code[operand_offset + 1] = bytes[1];
    }

    /// Emit a backward jump to `loop_start`.
    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        self.emit(OpCode::Loop);
        // +2 accounts for the operand bytes of this very instruction.
        let distance = self.current_chunk().code.len() - loop_start + 2;
        if distance > u16::MAX as usize {
            self.error("Loop body too large.");
            self.emit_byte(0xff);
            self.emit_byte(0xff);
            return;
        }
        let bytes = (distance as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    fn emit_return(&mut self) {
        if self.state().kind == FunctionKind::Initializer {
            self.emit_pair(OpCode::GetLocal, 0);
        } else {
            self.emit(OpCode::Nil);
        }
        self.emit(OpCode::Return);
    }

    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_chunk().add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_pair(OpCode::Constant, index);
    }

    /// Intern an identifier and put it in the constant pool.
    pub(crate) fn identifier_constant(&mut self, name: &str) -> u8 {
        let handle = self.heap.intern(name);
        self.make_constant(Value::Obj(handle))
    }

    // ── Declarations & statements ────────────────────────────────────────

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    pub(crate) fn expression(&mut self) {
        expr::parse_precedence(self, expr::Precedence::Assignment);
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(OpCode::Pop);
    }

    /// C-style `for`. The increment clause runs after the body, so it is
    /// compiled first with a jump over it and the loop target is rewired to
    /// land on it.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // No initializer.
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().code.len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().code.len();
            self.expression();
            self.emit(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.state().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.state().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit(OpCode::Return);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    // ── Variables & scopes ───────────────────────────────────────────────

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(OpCode::Nil);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    /// Consume an identifier and declare it. For globals, returns its
    /// constant-pool index; for locals the return value is unused.
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    /// Record a local declaration. Globals are late-bound and are not
    /// declared at compile time.
    fn declare_variable(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let state = self.states.last().expect("function state stack empty");
        let mut duplicate = false;
        for local in state.locals.iter().rev() {
            if let Some(depth) = local.depth
                && depth < state.scope_depth
            {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    pub(crate) fn add_local(&mut self, name: &str) {
        if self.state().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.state().locals.push(Local {
            name: name.to_string(),
            depth: None,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let state = self.state();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    pub(crate) fn define_variable(&mut self, global: u8) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_pair(OpCode::DefineGlobal, global);
    }

    fn begin_scope(&mut self) {
        self.state().scope_depth += 1;
    }

    /// Close a scope: locals leaving the stack are popped, and any that a
    /// closure captured are hoisted into their upvalues instead.
    fn end_scope(&mut self) {
        self.state().scope_depth -= 1;
        loop {
            let state = self.states.last().expect("function state stack empty");
            let Some(local) = state.locals.last() else { break };
            if local.depth.unwrap_or(0) <= state.scope_depth {
                break;
            }
            let captured = local.is_captured;
            if captured {
                self.emit(OpCode::CloseUpvalue);
            } else {
                self.emit(OpCode::Pop);
            }
            self.state().locals.pop();
        }
    }

    // ── Identifier resolution ────────────────────────────────────────────

    /// Find `name` among the locals of the function at `state_index`,
    /// innermost declaration first.
    pub(crate) fn resolve_local(&mut self, state_index: usize, name: &str) -> Option<u8> {
        let locals = &self.states[state_index].locals;
        let found = locals.iter().rposition(|local| local.name == name);
        if let Some(slot) = found {
            if self.states[state_index].locals[slot].depth.is_none() {
                self.error("Can't read local variable in its own initializer.");
            }
            return Some(slot as u8);
        }
        None
    }

    /// Find `name` in an enclosing function, threading an upvalue chain
    /// down to the function at `state_index`. Marks the captured local so
    /// its slot is closed over rather than popped.
    pub(crate) fn resolve_upvalue(&mut self, state_index: usize, name: &str) -> Option<u8> {
        if state_index == 0 {
            return None;
        }
        let enclosing = state_index - 1;

        if let Some(local) = self.resolve_local(enclosing, name) {
            self.states[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(state_index, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(state_index, upvalue, false));
        }
        None
    }

    fn add_upvalue(&mut self, state_index: usize, index: u8, is_local: bool) -> u8 {
        let upvalues = &self.states[state_index].upvalues;
        if let Some(existing) = upvalues
            .iter()
            .position(|up| up.index == index && up.is_local == is_local)
        {
            return existing as u8;
        }
        if upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.states[state_index]
            .upvalues
            .push(UpvalueInfo { index, is_local });
        (self.states[state_index].upvalues.len() - 1) as u8
    }

    // ── Functions & classes ──────────────────────────────────────────────

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // A function may refer to itself recursively, so it is initialized
        // before its body is compiled.
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    /// Compile a function body (the name token is `previous`) and emit the
    /// closure that wraps it.
    fn function(&mut self, kind: FunctionKind) {
        let name = self.heap.intern(self.previous.lexeme);
        self.states.push(FunctionState::new(kind, Some(name)));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.state().arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.state().arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function, upvalues) = self.end_function();
        let constant = self.make_constant(Value::Obj(function));
        self.emit_pair(OpCode::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }
    }

    /// Seal the innermost function: implicit return, then allocate the
    /// finished [`Function`] object.
    fn end_function(&mut self) -> (Handle, Vec<UpvalueInfo>) {
        self.emit_return();
        let state = self.states.pop().expect("function state stack empty");
        let function = Function {
            arity: state.arity,
            upvalue_count: state.upvalues.len(),
            chunk: state.chunk,
            name: state.name,
            is_initializer: state.kind == FunctionKind::Initializer,
        };
        (self.heap.alloc(Obj::Function(function)), state.upvalues)
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous;
        let name_constant = self.identifier_constant(class_name.lexeme);
        self.declare_variable();

        self.emit_pair(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.class_states.push(ClassState {
            has_superclass: false,
        });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            expr::variable(self, false);
            if class_name.lexeme == self.previous.lexeme {
                self.error("A class can't inherit from itself.");
            }

            // The superclass lives in a synthetic `super` local wrapped in
            // its own scope so each class gets a fresh binding.
            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);

            expr::named_variable(self, class_name, false);
            self.emit(OpCode::Inherit);
            self.class_states
                .last_mut()
                .expect("class state stack empty")
                .has_superclass = true;
        }

        expr::named_variable(self, class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit(OpCode::Pop);

        if self
            .class_states
            .last()
            .expect("class state stack empty")
            .has_superclass
        {
            self.end_scope();
        }
        self.class_states.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let constant = self.identifier_constant(self.previous.lexeme);
        let kind = if self.previous.lexeme == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind);
        self.emit_pair(OpCode::Method, constant);
    }
}
