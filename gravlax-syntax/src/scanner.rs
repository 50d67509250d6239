// gravlax-syntax - Scanner for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Scanner for Gravlax source code.
//!
//! The scanner produces tokens on demand with a single token of lookahead
//! held by the caller. It never fails: unrecognized input becomes an
//! [`TokenKind::Error`] token whose lexeme is the diagnostic message, and
//! the compiler reports it at its convenience.

use crate::token::{Token, TokenKind};

/// The scanner walks a source string and hands out tokens one at a time.
pub struct Scanner<'src> {
    source: &'src str,
    /// Byte offset of the start of the token being scanned.
    start: usize,
    /// Byte offset of the next byte to consume.
    current: usize,
    line: u32,
}

impl<'src> Scanner<'src> {
    /// Create a new scanner over the given source.
    pub fn new(source: &'src str) -> Self {
        Scanner {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// Scan and return the next token. Returns an [`TokenKind::Eof`] token
    /// forever once the source is exhausted.
    pub fn next_token(&mut self) -> Token<'src> {
        if let Some(message) = self.skip_whitespace() {
            return self.error_token(message);
        }
        self.start = self.current;

        let c = match self.advance() {
            Some(c) => c,
            None => return self.make_token(TokenKind::Eof),
        };

        if c.is_ascii_digit() {
            return self.number();
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.identifier();
        }

        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b';' => self.make_token(TokenKind::Semicolon),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'!' => {
                let kind = if self.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.matches(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.matches(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make_token(kind)
            }
            b'>' => {
                let kind = if self.matches(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make_token(kind)
            }
            b'"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }

    /// Skip whitespace and comments. Returns an error message if a block
    /// comment runs off the end of the source.
    fn skip_whitespace(&mut self) -> Option<&'static str> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\r') | Some(b'\t') => {
                    self.advance();
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.advance();
                }
                Some(b'/') => match self.peek_next() {
                    Some(b'/') => {
                        while self.peek().is_some_and(|c| c != b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'*') => {
                        self.advance();
                        self.advance();
                        if !self.skip_block_comment() {
                            self.start = self.current;
                            return Some("Unterminated block comment.");
                        }
                    }
                    _ => return None,
                },
                _ => return None,
            }
        }
    }

    /// Consume a (non-nested) block comment body after the opening `/*`.
    /// Returns false if the closing `*/` is never found.
    fn skip_block_comment(&mut self) -> bool {
        while let Some(c) = self.advance() {
            match c {
                b'\n' => self.line += 1,
                b'*' if self.peek() == Some(b'/') => {
                    self.advance();
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    fn string(&mut self) -> Token<'src> {
        while let Some(c) = self.peek() {
            if c == b'"' {
                break;
            }
            if c == b'\n' {
                self.line += 1;
            }
            self.advance();
        }
        if self.peek().is_none() {
            return self.error_token("Unterminated string.");
        }
        // Consume the closing quote.
        self.advance();
        self.make_token(TokenKind::String)
    }

    fn number(&mut self) -> Token<'src> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        // A fractional part needs at least one digit after the dot.
        if self.peek() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'src> {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.advance();
        }
        let kind = keyword_kind(&self.source[self.start..self.current])
            .unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token {
            kind,
            lexeme: &self.source[self.start..self.current],
            line: self.line,
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token {
            kind: TokenKind::Error,
            lexeme: message,
            line: self.line,
        }
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.current += 1;
        Some(c)
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current + 1).copied()
    }
}

/// Keyword disambiguation: identifiers that are reserved words.
fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    let kind = match lexeme {
        "and" => TokenKind::And,
        "class" => TokenKind::Class,
        "else" => TokenKind::Else,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "fun" => TokenKind::Fun,
        "if" => TokenKind::If,
        "nil" => TokenKind::Nil,
        "or" => TokenKind::Or,
        "print" => TokenKind::Print,
        "return" => TokenKind::Return,
        "super" => TokenKind::Super,
        "this" => TokenKind::This,
        "true" => TokenKind::True,
        "var" => TokenKind::Var,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut kinds = Vec::new();
        loop {
            let token = scanner.next_token();
            let kind = token.kind;
            kinds.push(kind);
            if kind == TokenKind::Eof {
                return kinds;
            }
        }
    }

    #[test]
    fn punctuation_and_operators() {
        assert_eq!(
            scan_kinds("(){};,.-+/*"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Semicolon,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Minus,
                TokenKind::Plus,
                TokenKind::Slash,
                TokenKind::Star,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            scan_kinds("! != = == > >= < <="),
            vec![
                TokenKind::Bang,
                TokenKind::BangEqual,
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            scan_kinds("class fun var classy fungus _var"),
            vec![
                TokenKind::Class,
                TokenKind::Fun,
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_lexemes() {
        let mut scanner = Scanner::new("12 3.75 4.");
        assert_eq!(scanner.next_token().lexeme, "12");
        assert_eq!(scanner.next_token().lexeme, "3.75");
        // A trailing dot is not part of the number.
        assert_eq!(scanner.next_token().lexeme, "4");
        assert_eq!(scanner.next_token().kind, TokenKind::Dot);
    }

    #[test]
    fn string_spans_lines() {
        let mut scanner = Scanner::new("\"one\ntwo\" x");
        let string = scanner.next_token();
        assert_eq!(string.kind, TokenKind::String);
        assert_eq!(string.lexeme, "\"one\ntwo\"");
        let ident = scanner.next_token();
        assert_eq!(ident.line, 2);
    }

    #[test]
    fn unterminated_string() {
        let mut scanner = Scanner::new("\"oops");
        let token = scanner.next_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unterminated string.");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            scan_kinds("1 // line comment\n/* block\ncomment */ 2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        let mut scanner = Scanner::new("/* never closed");
        let token = scanner.next_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unterminated block comment.");
    }

    #[test]
    fn line_numbers_advance() {
        let mut scanner = Scanner::new("a\nb\n\nc");
        assert_eq!(scanner.next_token().line, 1);
        assert_eq!(scanner.next_token().line, 2);
        assert_eq!(scanner.next_token().line, 4);
    }

    #[test]
    fn unknown_character() {
        let mut scanner = Scanner::new("@");
        let token = scanner.next_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unexpected character.");
    }
}
