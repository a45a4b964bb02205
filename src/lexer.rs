//! Lexical analysis for T81Lang.
//!
//! This module tokenizes T81Lang source code into a stream of tokens:
//!
//! - Keywords, type keywords, and identifiers (including dotted identifiers
//!   such as `Color.Red` or `weights.load`, which later stages may split)
//! - Integer and float literals, with the `t81` base-81 suffix
//! - String literals with escape sequences
//! - Operators, punctuation, and the `@` attribute introducer
//! - Comments (line and block)
//!
//! # Example
//!
//! ```rust
//! use t81c::{Lexer, TokenKind};
//!
//! let mut lexer = Lexer::new("let x: i32 = 42;");
//! let tokens = lexer.all_tokens();
//!
//! assert_eq!(tokens[0].kind, TokenKind::Let);
//! assert_eq!(tokens[1].kind, TokenKind::Identifier);
//! assert_eq!(tokens[3].kind, TokenKind::I32);
//! assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
//! ```

use crate::span::{LineIndex, Span};
use logos::Logos;

/// Token kinds for the T81Lang lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    // ============================================================
    // Keywords
    // ============================================================
    #[token("module")]
    Module,
    #[token("import")]
    Import,
    #[token("type")]
    Type,
    #[token("const")]
    Const,
    #[token("export")]
    Export,
    #[token("fn")]
    Fn,
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("record")]
    Record,
    #[token("enum")]
    Enum,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("loop")]
    Loop,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,
    #[token("match")]
    Match,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ============================================================
    // Type keywords
    // ============================================================
    #[token("void")]
    Void,
    #[token("bool")]
    Bool,
    #[token("i32")]
    I32,
    #[token("i16")]
    I16,
    #[token("i8")]
    I8,
    #[token("i2")]
    I2,
    #[token("T81BigInt")]
    T81BigInt,
    #[token("T81Float")]
    T81Float,
    #[token("T81Fraction")]
    T81Fraction,
    #[token("vector")]
    Vector,
    #[token("matrix")]
    Matrix,
    #[token("tensor")]
    Tensor,
    #[token("graph")]
    Graph,

    // ============================================================
    // Literals
    // ============================================================
    /// Decimal integer literal.
    #[regex(r"[0-9]+")]
    Integer,

    /// Float literal (`1.5`).
    #[regex(r"[0-9]+\.[0-9]+")]
    Float,

    /// Integer literal carrying the base-81 storage suffix (`42t81`).
    #[regex(r"[0-9]+t81")]
    Base81Integer,

    /// Float literal carrying the base-81 storage suffix (`1.5t81`).
    #[regex(r"[0-9]+\.[0-9]+t81")]
    Base81Float,

    /// String literal with escapes.
    #[regex(r#""([^"\\]|\\.)*""#, priority = 3)]
    String,

    /// A string literal that reached end of input before its closing quote.
    #[regex(r#""([^"\\]|\\.)*"#, priority = 2)]
    UnterminatedString,

    // ============================================================
    // Identifiers
    // ============================================================
    /// Identifier, optionally with a dotted tail (`point`, `Color.Red`,
    /// `weights.load`). A dot is only absorbed when the character after it is
    /// alphanumeric, so `0..n` ranges never merge.
    #[regex(r"[A-Za-z_][A-Za-z_0-9]*(\.[A-Za-z_0-9]+)*")]
    Identifier,

    // ============================================================
    // Operators
    // ============================================================
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("&")]
    Amp,
    #[token("&&")]
    AmpAmp,
    #[token("|")]
    Pipe,
    #[token("||")]
    PipePipe,
    #[token("?")]
    Question,

    // ============================================================
    // Punctuation
    // ============================================================
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("@")]
    At,

    // ============================================================
    // Comments
    // ============================================================
    /// Line comment (skipped).
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    /// Block comment, skipped via callback. Emitted only when the comment
    /// reaches end of input without `*/`.
    #[token("/*", lex_block_comment)]
    UnterminatedBlockComment,

    // ============================================================
    // Control
    // ============================================================
    /// End of file marker (added by the `Lexer` wrapper, not by logos).
    Eof,

    /// An illegal or unexpected character.
    Illegal,
}

/// Callback for block comment skipping.
///
/// Block comments do not nest; scanning stops at the first `*/`.
fn lex_block_comment(lexer: &mut logos::Lexer<TokenKind>) -> logos::Filter<()> {
    let remainder = lexer.remainder();
    match remainder.find("*/") {
        Some(pos) => {
            lexer.bump(pos + 2);
            logos::Filter::Skip
        }
        None => {
            lexer.bump(remainder.len());
            logos::Filter::Emit(())
        }
    }
}

impl TokenKind {
    /// Returns true for the keywords that may start a type expression.
    pub fn starts_type(&self) -> bool {
        matches!(
            self,
            TokenKind::Identifier
                | TokenKind::I32
                | TokenKind::I16
                | TokenKind::I8
                | TokenKind::I2
                | TokenKind::Bool
                | TokenKind::Void
                | TokenKind::T81BigInt
                | TokenKind::T81Float
                | TokenKind::T81Fraction
                | TokenKind::Vector
                | TokenKind::Matrix
                | TokenKind::Tensor
                | TokenKind::Graph
        )
    }

    /// Returns a human-readable description of the token kind.
    pub fn description(&self) -> &'static str {
        match self {
            TokenKind::Module => "keyword `module`",
            TokenKind::Import => "keyword `import`",
            TokenKind::Type => "keyword `type`",
            TokenKind::Const => "keyword `const`",
            TokenKind::Export => "keyword `export`",
            TokenKind::Fn => "keyword `fn`",
            TokenKind::Let => "keyword `let`",
            TokenKind::Var => "keyword `var`",
            TokenKind::Record => "keyword `record`",
            TokenKind::Enum => "keyword `enum`",
            TokenKind::If => "keyword `if`",
            TokenKind::Else => "keyword `else`",
            TokenKind::For => "keyword `for`",
            TokenKind::In => "keyword `in`",
            TokenKind::While => "keyword `while`",
            TokenKind::Loop => "keyword `loop`",
            TokenKind::Break => "keyword `break`",
            TokenKind::Continue => "keyword `continue`",
            TokenKind::Return => "keyword `return`",
            TokenKind::Match => "keyword `match`",
            TokenKind::True => "keyword `true`",
            TokenKind::False => "keyword `false`",
            TokenKind::Void => "type `void`",
            TokenKind::Bool => "type `bool`",
            TokenKind::I32 => "type `i32`",
            TokenKind::I16 => "type `i16`",
            TokenKind::I8 => "type `i8`",
            TokenKind::I2 => "type `i2`",
            TokenKind::T81BigInt => "type `T81BigInt`",
            TokenKind::T81Float => "type `T81Float`",
            TokenKind::T81Fraction => "type `T81Fraction`",
            TokenKind::Vector => "type `vector`",
            TokenKind::Matrix => "type `matrix`",
            TokenKind::Tensor => "type `tensor`",
            TokenKind::Graph => "type `graph`",
            TokenKind::Integer => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::Base81Integer => "base-81 integer literal",
            TokenKind::Base81Float => "base-81 float literal",
            TokenKind::String => "string literal",
            TokenKind::UnterminatedString => "unterminated string literal",
            TokenKind::Identifier => "identifier",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Caret => "`^`",
            TokenKind::Equal => "`=`",
            TokenKind::EqualEqual => "`==`",
            TokenKind::Bang => "`!`",
            TokenKind::BangEqual => "`!=`",
            TokenKind::Less => "`<`",
            TokenKind::LessEqual => "`<=`",
            TokenKind::Greater => "`>`",
            TokenKind::GreaterEqual => "`>=`",
            TokenKind::Amp => "`&`",
            TokenKind::AmpAmp => "`&&`",
            TokenKind::Pipe => "`|`",
            TokenKind::PipePipe => "`||`",
            TokenKind::Question => "`?`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Semicolon => "`;`",
            TokenKind::Arrow => "`->`",
            TokenKind::FatArrow => "`=>`",
            TokenKind::DotDot => "`..`",
            TokenKind::Dot => "`.`",
            TokenKind::At => "`@`",
            TokenKind::LineComment => "line comment",
            TokenKind::UnterminatedBlockComment => "unterminated block comment",
            TokenKind::Eof => "end of file",
            TokenKind::Illegal => "illegal character",
        }
    }
}

/// A token with its kind and source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn dummy(kind: TokenKind) -> Self {
        Self {
            kind,
            span: Span::dummy(),
        }
    }
}

/// The lexer for T81Lang source code.
#[derive(Clone)]
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, TokenKind>,
    source: &'src str,
    line_index: LineIndex,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            source,
            line_index: LineIndex::new(source),
            finished: false,
        }
    }

    /// Get the source text for a span.
    pub fn slice(&self, span: &Span) -> &'src str {
        &self.source[span.start..span.end]
    }

    /// Scan and return the next token. After the end of input this keeps
    /// returning EOF tokens.
    pub fn next_token(&mut self) -> Token {
        self.next().unwrap_or_else(|| self.eof_token())
    }

    /// Peek the next token without advancing the lexer state.
    pub fn peek_next_token(&self) -> Token {
        self.clone().next_token()
    }

    /// Scan the entire remaining source, including the final EOF token.
    pub fn all_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn eof_token(&self) -> Token {
        let (line, col) = self.line_index.line_col(self.source.len());
        Token::new(
            TokenKind::Eof,
            Span::new(self.source.len(), self.source.len(), line, col),
        )
    }

    fn span_at(&self, range: std::ops::Range<usize>) -> Span {
        let (line, col) = self.line_index.line_col(range.start);
        Span::new(range.start, range.end, line, col)
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.inner.next() {
            Some(Ok(kind)) => {
                let span = self.span_at(self.inner.span());
                Some(Token::new(kind, span))
            }
            Some(Err(())) => {
                let span = self.span_at(self.inner.span());
                Some(Token::new(TokenKind::Illegal, span))
            }
            None => {
                self.finished = true;
                Some(self.eof_token())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Eof)
            .collect()
    }

    #[test]
    fn keywords() {
        assert_eq!(
            lex("fn let var if else match loop"),
            vec![
                TokenKind::Fn,
                TokenKind::Let,
                TokenKind::Var,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::Match,
                TokenKind::Loop,
            ]
        );
    }

    #[test]
    fn type_keywords() {
        assert_eq!(
            lex("i32 i16 i8 i2 bool void T81BigInt T81Float T81Fraction"),
            vec![
                TokenKind::I32,
                TokenKind::I16,
                TokenKind::I8,
                TokenKind::I2,
                TokenKind::Bool,
                TokenKind::Void,
                TokenKind::T81BigInt,
                TokenKind::T81Float,
                TokenKind::T81Fraction,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            lex("42 3.14 20t81 1.5t81"),
            vec![
                TokenKind::Integer,
                TokenKind::Float,
                TokenKind::Base81Integer,
                TokenKind::Base81Float,
            ]
        );
    }

    #[test]
    fn base81_suffix_requires_exact_tail() {
        // `t8` is not a suffix, it lexes as a trailing identifier.
        assert_eq!(lex("20t8"), vec![TokenKind::Integer, TokenKind::Identifier]);
    }

    #[test]
    fn dotted_identifiers_merge() {
        let mut lexer = Lexer::new("Color.Red weights.load inner.x");
        let tokens = lexer.all_tokens();
        assert_eq!(tokens.len(), 4);
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Identifier));
        assert_eq!(lexer.slice(&tokens[0].span), "Color.Red");
        assert_eq!(lexer.slice(&tokens[1].span), "weights.load");
    }

    #[test]
    fn dot_dot_does_not_merge() {
        assert_eq!(
            lex("a..b"),
            vec![TokenKind::Identifier, TokenKind::DotDot, TokenKind::Identifier]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            lex(r#""hello" "a\"b\n""#),
            vec![TokenKind::String, TokenKind::String]
        );
        assert_eq!(lex(r#""oops"#), vec![TokenKind::UnterminatedString]);
    }

    #[test]
    fn operators_and_punctuation() {
        assert_eq!(
            lex("-> => == != <= >= && || .. . @"),
            vec![
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
                TokenKind::DotDot,
                TokenKind::Dot,
                TokenKind::At,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(lex("fn // trailing\nlet"), vec![TokenKind::Fn, TokenKind::Let]);
        assert_eq!(lex("fn /* a\nb */ let"), vec![TokenKind::Fn, TokenKind::Let]);
        assert_eq!(lex("fn /* never closed"), vec![
            TokenKind::Fn,
            TokenKind::UnterminatedBlockComment,
        ]);
    }

    #[test]
    fn line_and_column_tracking() {
        let mut lexer = Lexer::new("fn main\n  x");
        let tokens = lexer.all_tokens();
        assert_eq!((tokens[0].span.line, tokens[0].span.column), (1, 1));
        assert_eq!((tokens[1].span.line, tokens[1].span.column), (1, 4));
        assert_eq!((tokens[2].span.line, tokens[2].span.column), (2, 3));
    }

    #[test]
    fn newline_inside_block_comment_advances_line() {
        let mut lexer = Lexer::new("/* a\nb */ x");
        let tokens = lexer.all_tokens();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].span.line, 2);
    }

    #[test]
    fn illegal_character() {
        assert_eq!(lex("let # x"), vec![
            TokenKind::Let,
            TokenKind::Illegal,
            TokenKind::Identifier,
        ]);
    }

    #[test]
    fn peek_is_nondestructive() {
        let mut lexer = Lexer::new("let x");
        let peeked = lexer.peek_next_token();
        let actual = lexer.next_token();
        assert_eq!(peeked, actual);
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = Lexer::new("");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }
}
