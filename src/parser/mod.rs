//! Parser for T81Lang.
//!
//! A hand-written recursive descent parser producing the AST in [`crate::ast`].
//!
//! # Parser architecture
//!
//! - `item` - declarations (functions, records, enums, modules) and attributes
//! - `expr` - expression parsing, match expressions, literals
//! - `pattern` - match-pattern parsing
//! - `types` - type expressions and `[...]` generics
//!
//! # Error recovery
//!
//! Errors are accumulated as [`Diagnostic`]s. A failed `consume` records an
//! error and keeps going; only an unparseable expression head aborts the
//! current declaration, at which point the parser synchronizes by skipping
//! tokens to a likely statement boundary.
//!
//! # Example
//!
//! ```rust
//! use t81c::Parser;
//!
//! let mut parser = Parser::new("fn main() -> i32 { return 0; }", "demo.t81");
//! let program = parser.parse();
//! assert!(!parser.had_error());
//! assert_eq!(program.statements.len(), 1);
//! ```

mod expr;
mod item;
mod pattern;
mod types;

#[cfg(test)]
mod tests;

use crate::ast::{Expr, ExprKind, Ident, NodeId, Program, Stmt, StmtKind, Symbol, TypeName};
use crate::diagnostics::Diagnostic;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::span::Span;
use string_interner::DefaultStringInterner;

/// Marker for an aborted production; the diagnostic is already recorded.
pub(crate) struct Aborted;

pub(crate) type ParseResult<T> = Result<T, Aborted>;

/// The T81Lang parser.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    source: &'src str,
    source_name: String,
    interner: DefaultStringInterner,
    current: Token,
    next: Token,
    previous: Token,
    errors: Vec<Diagnostic>,
    next_node_id: u32,
}

impl<'src> Parser<'src> {
    /// Create a new parser for the given source.
    pub fn new(source: &'src str, source_name: impl Into<String>) -> Self {
        let lexer = Lexer::new(source);
        let mut parser = Self {
            lexer,
            source,
            source_name: source_name.into(),
            interner: DefaultStringInterner::new(),
            current: Token::dummy(TokenKind::Eof),
            next: Token::dummy(TokenKind::Eof),
            previous: Token::dummy(TokenKind::Eof),
            errors: Vec::new(),
            next_node_id: 0,
        };
        parser.current = parser.fetch_token();
        parser.next = parser.fetch_token();
        parser
    }

    /// Parse the entire token stream into a program.
    pub fn parse(&mut self) -> Program {
        let _span = tracing::debug_span!("parse", file = %self.source_name).entered();
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        Program { statements }
    }

    /// Whether any syntax or lexical error was recorded.
    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The accumulated diagnostics, in source order.
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Take ownership of the accumulated diagnostics.
    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    /// Take ownership of the string interner (handed to the analyzer).
    pub fn take_interner(&mut self) -> DefaultStringInterner {
        std::mem::take(&mut self.interner)
    }

    // ============================================================
    // Token handling
    // ============================================================

    /// Fetch the next token from the lexer, reporting and skipping lexical
    /// error tokens so the grammar only ever sees well-formed tokens.
    fn fetch_token(&mut self) -> Token {
        loop {
            let token = self.lexer.next_token();
            match token.kind {
                TokenKind::Illegal => self.error_at_span(token.span, "Unexpected character."),
                TokenKind::UnterminatedString => {
                    self.error_at_span(token.span, "Unterminated string.")
                }
                TokenKind::UnterminatedBlockComment => {
                    self.error_at_span(token.span, "Unterminated block comment.")
                }
                _ => return token,
            }
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    /// Advance to the next token, returning the one just consumed.
    fn advance(&mut self) -> Token {
        self.previous = self.current;
        if self.current.kind != TokenKind::Eof {
            self.current = self.next;
            self.next = self.fetch_token();
        }
        self.previous
    }

    /// Consume the current token if it matches, returning true.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume the current token if it matches any of the given kinds.
    fn eat_any(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    /// Consume a token of the expected kind, or record an error. On a
    /// mismatch the offending token is consumed anyway so parsing keeps
    /// moving.
    fn consume(&mut self, kind: TokenKind, message: &str) -> Token {
        if self.check(kind) {
            return self.advance();
        }
        self.error_at_current(message);
        if !self.is_at_end() {
            return self.advance();
        }
        Token::new(TokenKind::Illegal, self.current.span)
    }

    /// Discard tokens until a likely statement boundary. Panic-mode
    /// recovery so more than one error can be reported per file.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Fn
                | TokenKind::Let
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ============================================================
    // Errors
    // ============================================================

    fn error_at_span(&mut self, span: Span, message: impl Into<String>) {
        self.errors
            .push(Diagnostic::error(self.source_name.clone(), span, message));
    }

    fn error_at(&mut self, token: Token, message: impl Into<String>) {
        self.error_at_span(token.span, message);
    }

    fn error_at_current(&mut self, message: impl Into<String>) {
        self.error_at_span(self.current.span, message);
    }

    // ============================================================
    // Text and node construction
    // ============================================================

    /// The source text of a span.
    fn text(&self, span: &Span) -> &'src str {
        &self.source[span.start..span.end]
    }

    fn intern(&mut self, s: &str) -> Symbol {
        self.interner.get_or_intern(s)
    }

    /// Build an identifier from an already-consumed identifier token.
    fn ident_from(&mut self, token: Token) -> Ident {
        let sym = self.intern(self.text(&token.span));
        Ident {
            sym,
            span: token.span,
        }
    }

    fn type_name_from(&mut self, token: Token) -> TypeName {
        let sym = self.intern(self.text(&token.span));
        TypeName {
            token: token.kind,
            sym,
            span: token.span,
        }
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn mk_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.fresh_id(),
            kind,
            span,
        }
    }

    fn mk_stmt(&mut self, kind: StmtKind, span: Span) -> Stmt {
        Stmt {
            id: self.fresh_id(),
            kind,
            span,
        }
    }

    // ============================================================
    // Declarations entry point
    // ============================================================

    /// Parse one declaration, synchronizing on an abort.
    fn declaration(&mut self) -> Option<Stmt> {
        match self.parse_declaration() {
            Ok(stmt) => Some(stmt),
            Err(Aborted) => {
                self.synchronize();
                None
            }
        }
    }

    /// A block of statements between `{` and `}` (the `{` is already
    /// consumed). Errors inside recover per declaration.
    fn block(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after block.");
        statements
    }
}
