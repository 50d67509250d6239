// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Pratt expression parsing.
//!
//! Each token kind maps to an optional prefix parselet, an optional infix
//! parselet, and an infix precedence. [`parse_precedence`] drives the
//! climb; parselets emit bytecode as they reduce. Assignment is handled by
//! threading a `can_assign` flag into the parselets so `a.b = c` compiles a
//! store while `a.b + c = d` reports an invalid target.

use gravlax_syntax::{Token, TokenKind};

use crate::opcode::OpCode;
use crate::value::Value;

use super::Parser;

/// Binding strength, weakest first. An infix operator binds its right
/// operand at one level above its own precedence (left associativity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src, 'h> = fn(&mut Parser<'src, 'h>, bool);

struct ParseRule<'src, 'h> {
    prefix: Option<ParseFn<'src, 'h>>,
    infix: Option<ParseFn<'src, 'h>>,
    precedence: Precedence,
}

fn rule<'src, 'h>(kind: TokenKind) -> ParseRule<'src, 'h> {
    use Precedence as P;
    use TokenKind as T;

    let (prefix, infix, precedence): (
        Option<ParseFn<'src, 'h>>,
        Option<ParseFn<'src, 'h>>,
        Precedence,
    ) = match kind {
        T::LeftParen => (Some(grouping), Some(call), P::Call),
        T::Dot => (None, Some(dot), P::Call),
        T::Minus => (Some(unary), Some(binary), P::Term),
        T::Plus => (None, Some(binary), P::Term),
        T::Slash | T::Star => (None, Some(binary), P::Factor),
        T::Bang => (Some(unary), None, P::None),
        T::BangEqual | T::EqualEqual => (None, Some(binary), P::Equality),
        T::Greater | T::GreaterEqual | T::Less | T::LessEqual => {
            (None, Some(binary), P::Comparison)
        }
        T::Identifier => (Some(variable), None, P::None),
        T::String => (Some(string), None, P::None),
        T::Number => (Some(number), None, P::None),
        T::And => (None, Some(and_op), P::And),
        T::Or => (None, Some(or_op), P::Or),
        T::False | T::True | T::Nil => (Some(literal), None, P::None),
        T::Super => (Some(super_expr), None, P::None),
        T::This => (Some(this_expr), None, P::None),
        _ => (None, None, P::None),
    };
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

/// Parse an expression no weaker than `precedence`.
pub(crate) fn parse_precedence(parser: &mut Parser<'_, '_>, precedence: Precedence) {
    parser.advance();
    let Some(prefix) = rule(parser.previous.kind).prefix else {
        parser.error("Expect expression.");
        return;
    };

    // Only the loosest context may treat a trailing `=` as assignment.
    let can_assign = precedence <= Precedence::Assignment;
    prefix(parser, can_assign);

    while precedence <= rule(parser.current.kind).precedence {
        parser.advance();
        let infix = rule(parser.previous.kind)
            .infix
            .expect("token with infix precedence has an infix rule");
        infix(parser, can_assign);
    }

    if can_assign && parser.match_token(TokenKind::Equal) {
        parser.error("Invalid assignment target.");
    }
}

fn number(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    let value: f64 = parser
        .previous
        .lexeme
        .parse()
        .expect("scanner produced a malformed number literal");
    parser.emit_constant(Value::Number(value));
}

fn string(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    let lexeme = parser.previous.lexeme;
    // Trim the surrounding quotes.
    let text = &lexeme[1..lexeme.len() - 1];
    let handle = parser.heap.intern(text);
    parser.emit_constant(Value::Obj(handle));
}

fn literal(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    match parser.previous.kind {
        TokenKind::False => parser.emit(OpCode::False),
        TokenKind::True => parser.emit(OpCode::True),
        TokenKind::Nil => parser.emit(OpCode::Nil),
        _ => unreachable!("literal parselet on non-literal token"),
    }
}

fn grouping(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    parser.expression();
    parser.consume(TokenKind::RightParen, "Expect ')' after expression.");
}

fn unary(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    let operator = parser.previous.kind;
    parse_precedence(parser, Precedence::Unary);
    match operator {
        TokenKind::Minus => parser.emit(OpCode::Negate),
        TokenKind::Bang => parser.emit(OpCode::Not),
        _ => unreachable!("unary parselet on non-unary token"),
    }
}

fn binary(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    let operator = parser.previous.kind;
    let next = rule(operator).precedence.next();
    parse_precedence(parser, next);

    match operator {
        TokenKind::BangEqual => {
            parser.emit(OpCode::Equal);
            parser.emit(OpCode::Not);
        }
        TokenKind::EqualEqual => parser.emit(OpCode::Equal),
        TokenKind::Greater => parser.emit(OpCode::Greater),
        TokenKind::GreaterEqual => {
            parser.emit(OpCode::Less);
            parser.emit(OpCode::Not);
        }
        TokenKind::Less => parser.emit(OpCode::Less),
        TokenKind::LessEqual => {
            parser.emit(OpCode::Greater);
            parser.emit(OpCode::Not);
        }
        TokenKind::Plus => parser.emit(OpCode::Add),
        TokenKind::Minus => parser.emit(OpCode::Subtract),
        TokenKind::Star => parser.emit(OpCode::Multiply),
        TokenKind::Slash => parser.emit(OpCode::Divide),
        _ => unreachable!("binary parselet on non-binary token"),
    }
}

/// `and` short-circuits: if the left side is falsey it is the result.
fn and_op(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    let end_jump = parser.emit_jump(OpCode::JumpIfFalse);
    parser.emit(OpCode::Pop);
    parse_precedence(parser, Precedence::And);
    parser.patch_jump(end_jump);
}

/// `or` short-circuits: if the left side is truthy it is the result.
fn or_op(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    let else_jump = parser.emit_jump(OpCode::JumpIfFalse);
    let end_jump = parser.emit_jump(OpCode::Jump);

    parser.patch_jump(else_jump);
    parser.emit(OpCode::Pop);
    parse_precedence(parser, Precedence::Or);
    parser.patch_jump(end_jump);
}

pub(crate) fn variable(parser: &mut Parser<'_, '_>, can_assign: bool) {
    let name = parser.previous;
    named_variable(parser, name, can_assign);
}

/// Compile a read of (or assignment to) `name`, resolving it as a local,
/// an upvalue, or finally a late-bound global.
pub(crate) fn named_variable(parser: &mut Parser<'_, '_>, name: Token<'_>, can_assign: bool) {
    let state_index = parser.states.len() - 1;
    let (get_op, set_op, arg) = if let Some(slot) = parser.resolve_local(state_index, name.lexeme)
    {
        (OpCode::GetLocal, OpCode::SetLocal, slot)
    } else if let Some(index) = parser.resolve_upvalue(state_index, name.lexeme) {
        (OpCode::GetUpvalue, OpCode::SetUpvalue, index)
    } else {
        let index = parser.identifier_constant(name.lexeme);
        (OpCode::GetGlobal, OpCode::SetGlobal, index)
    };

    if can_assign && parser.match_token(TokenKind::Equal) {
        parser.expression();
        parser.emit_pair(set_op, arg);
    } else {
        parser.emit_pair(get_op, arg);
    }
}

fn call(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    let arg_count = argument_list(parser);
    parser.emit_pair(OpCode::Call, arg_count);
}

/// Property access, assignment, or a fused method invocation.
fn dot(parser: &mut Parser<'_, '_>, can_assign: bool) {
    parser.consume(TokenKind::Identifier, "Expect property name after '.'.");
    let name = parser.identifier_constant(parser.previous.lexeme);

    if can_assign && parser.match_token(TokenKind::Equal) {
        parser.expression();
        parser.emit_pair(OpCode::SetProperty, name);
    } else if parser.match_token(TokenKind::LeftParen) {
        let arg_count = argument_list(parser);
        parser.emit_pair(OpCode::Invoke, name);
        parser.emit_byte(arg_count);
    } else {
        parser.emit_pair(OpCode::GetProperty, name);
    }
}

fn this_expr(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    if parser.class_states.is_empty() {
        parser.error("Can't use 'this' outside of a class.");
        return;
    }
    variable(parser, false);
}

/// `super.name` or `super.name(args)`: the superclass comes from the
/// synthetic `super` local and the receiver from `this`.
fn super_expr(parser: &mut Parser<'_, '_>, _can_assign: bool) {
    match parser.class_states.last() {
        None => parser.error("Can't use 'super' outside of a class."),
        Some(class) if !class.has_superclass => {
            parser.error("Can't use 'super' in a class with no superclass.");
        }
        Some(_) => {}
    }

    parser.consume(TokenKind::Dot, "Expect '.' after 'super'.");
    parser.consume(TokenKind::Identifier, "Expect superclass method name.");
    let name = parser.identifier_constant(parser.previous.lexeme);

    named_variable(parser, Token::synthetic("this"), false);
    if parser.match_token(TokenKind::LeftParen) {
        let arg_count = argument_list(parser);
        named_variable(parser, Token::synthetic("super"), false);
        parser.emit_pair(OpCode::SuperInvoke, name);
        parser.emit_byte(arg_count);
    } else {
        named_variable(parser, Token::synthetic("super"), false);
        parser.emit_pair(OpCode::GetSuper, name);
    }
}

fn argument_list(parser: &mut Parser<'_, '_>) -> u8 {
    let mut arg_count: u8 = 0;
    if !parser.check(TokenKind::RightParen) {
        loop {
            parser.expression();
            if arg_count == u8::MAX {
                parser.error("Can't have more than 255 arguments.");
            } else {
                arg_count += 1;
            }
            if !parser.match_token(TokenKind::Comma) {
                break;
            }
        }
    }
    parser.consume(TokenKind::RightParen, "Expect ')' after arguments.");
    arg_count
}
