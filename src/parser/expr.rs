//! Expression parsing.
//!
//! Precedence, lowest to highest: assignment, `||`, `&&`, equality,
//! comparison, additive, multiplicative, unary, primary.
//!
//! The lexer merges dotted identifiers into single tokens, so `primary`
//! takes them apart: `Color.Red` becomes an enum literal, a dotted callee
//! like `weights.load(...)` stays whole, and anything else (`inner.x`)
//! splits into a variable followed by field accesses.

use super::{Aborted, ParseResult, Parser};
use crate::ast::{
    BinaryOp, Expr, ExprKind, Ident, Lit, LitKind, MatchArm, RecordLiteralField, UnaryOp,
};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

/// Decode a string literal lexeme (quotes included) into its value.
pub(crate) fn decode_string_literal(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('x') => {
                let hi = chars.next().and_then(|c| c.to_digit(16));
                let lo = chars.next().and_then(|c| c.to_digit(16));
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push(((hi << 4) | lo) as u8 as char);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

impl<'src> Parser<'src> {
    pub(super) fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.logical_or()?;
        if self.eat(TokenKind::Equal) {
            let equals = self.previous;
            let value = self.assignment()?;
            if let ExprKind::Variable { name } = expr.kind {
                let span = name.span.merge(value.span);
                return Ok(self.mk_expr(
                    ExprKind::Assign {
                        name,
                        value: Box::new(value),
                    },
                    span,
                ));
            }
            self.error_at(equals, "Invalid assignment target");
            return Ok(expr);
        }
        Ok(expr)
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.logical_and()?;
        while self.eat(TokenKind::PipePipe) {
            let op_span = self.previous.span;
            let right = self.logical_and()?;
            expr = self.binary(BinaryOp::Or, op_span, expr, right);
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.eat(TokenKind::AmpAmp) {
            let op_span = self.previous.span;
            let right = self.equality()?;
            expr = self.binary(BinaryOp::And, op_span, expr, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        while self.eat_any(&[TokenKind::BangEqual, TokenKind::EqualEqual]) {
            let op = match self.previous.kind {
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => BinaryOp::Equal,
            };
            let op_span = self.previous.span;
            let right = self.comparison()?;
            expr = self.binary(op, op_span, expr, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;
        while self.eat_any(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let op = match self.previous.kind {
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::Less => BinaryOp::Less,
                _ => BinaryOp::LessEqual,
            };
            let op_span = self.previous.span;
            let right = self.term()?;
            expr = self.binary(op, op_span, expr, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        while self.eat_any(&[TokenKind::Minus, TokenKind::Plus]) {
            let op = match self.previous.kind {
                TokenKind::Minus => BinaryOp::Sub,
                _ => BinaryOp::Add,
            };
            let op_span = self.previous.span;
            let right = self.factor()?;
            expr = self.binary(op, op_span, expr, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        while self.eat_any(&[TokenKind::Slash, TokenKind::Star, TokenKind::Percent]) {
            let op = match self.previous.kind {
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Star => BinaryOp::Mul,
                _ => BinaryOp::Rem,
            };
            let op_span = self.previous.span;
            let right = self.unary()?;
            expr = self.binary(op, op_span, expr, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.eat_any(&[TokenKind::Bang, TokenKind::Minus]) {
            let op = match self.previous.kind {
                TokenKind::Bang => UnaryOp::Not,
                _ => UnaryOp::Neg,
            };
            let op_span = self.previous.span;
            let operand = self.unary()?;
            let span = op_span.merge(operand.span);
            return Ok(self.mk_expr(
                ExprKind::Unary {
                    op,
                    op_span,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.primary()
    }

    fn binary(&mut self, op: BinaryOp, op_span: Span, left: Expr, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        self.mk_expr(
            ExprKind::Binary {
                op,
                op_span,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    // ============================================================
    // Primary expressions
    // ============================================================

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.eat(TokenKind::Match) {
            return self.match_expression(self.previous.span);
        }

        if self.eat_any(&[
            TokenKind::False,
            TokenKind::True,
            TokenKind::Integer,
            TokenKind::Float,
            TokenKind::Base81Integer,
            TokenKind::Base81Float,
            TokenKind::String,
        ]) {
            let token = self.previous;
            let lit = self.literal_from(token);
            return Ok(self.mk_expr(ExprKind::Literal(lit), token.span));
        }

        if self.eat(TokenKind::LBracket) {
            let open = self.previous.span;
            let mut elements = Vec::new();
            if !self.check(TokenKind::RBracket) {
                loop {
                    elements.push(self.expression()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RBracket, "Expect ']' after vector literal.");
            let span = open.merge(self.previous.span);
            return Ok(self.mk_expr(ExprKind::VectorLiteral { elements }, span));
        }

        if self.eat(TokenKind::LParen) {
            let open = self.previous.span;
            let inner = self.expression()?;
            self.consume(TokenKind::RParen, "Expect ')' after expression.");
            let span = open.merge(self.previous.span);
            return Ok(self.mk_expr(ExprKind::Grouping(Box::new(inner)), span));
        }

        if self.eat(TokenKind::Identifier) {
            let name_token = self.previous;
            return self.identifier_expression(name_token);
        }

        self.error_at_current("Expect expression.");
        Err(Aborted)
    }

    fn identifier_expression(&mut self, name_token: Token) -> ParseResult<Expr> {
        // Qualified enum literal: `Color.Red`, optionally with a payload.
        if let Some((enum_name, variant)) = self.try_split_enum_literal(name_token) {
            let payload = if self.eat(TokenKind::LParen) {
                let value = self.expression()?;
                self.consume(TokenKind::RParen, "Expect ')' after enum variant payload.");
                Some(Box::new(value))
            } else {
                None
            };
            let span = name_token.span.merge(self.previous.span);
            return Ok(self.mk_expr(
                ExprKind::EnumLiteral {
                    enum_name,
                    variant,
                    payload,
                },
                span,
            ));
        }

        // Generic type in expression position: `Vector[i32]`.
        if self.check(TokenKind::LBracket) {
            let ty = self.generic_type_from(name_token)?;
            let span = name_token.span.merge(self.previous.span);
            return Ok(self.mk_expr(ExprKind::TypeRef(ty), span));
        }

        // Record literal: `Point { x: 1; y: 2 }`.
        if self.eat(TokenKind::LBrace) {
            return self.record_literal(name_token);
        }

        let mut expr = if self.check(TokenKind::LParen) {
            // Call; a dotted callee stays whole (`weights.load(...)`).
            self.advance();
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    args.push(self.expression()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RParen, "Expect ')' after arguments.");
            let name = self.ident_from(name_token);
            let callee_span = name.span;
            let callee = self.mk_expr(ExprKind::Variable { name }, callee_span);
            let span = name_token.span.merge(self.previous.span);
            self.mk_expr(
                ExprKind::Call {
                    callee: Box::new(callee),
                    args,
                },
                span,
            )
        } else {
            self.split_dotted_variable(name_token)
        };

        // Explicit `.field` chains after calls or groupings.
        while self.eat(TokenKind::Dot) {
            let field_token = self.consume(TokenKind::Identifier, "Expect field name after '.'.");
            expr = self.append_field_chain(expr, field_token);
        }
        Ok(expr)
    }

    /// Split a dotted identifier token into `EnumName` / `Variant` when it is
    /// a qualified enum literal: exactly one dot, both sides starting with an
    /// uppercase letter.
    fn try_split_enum_literal(&mut self, token: Token) -> Option<(Ident, Ident)> {
        let text = self.text(&token.span);
        let dot = text.find('.')?;
        if dot == 0 || dot + 1 >= text.len() {
            return None;
        }
        if text[dot + 1..].contains('.') {
            return None;
        }
        let (enum_part, variant_part) = (&text[..dot], &text[dot + 1..]);
        let upper =
            |s: &str| s.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
        if !upper(enum_part) || !upper(variant_part) {
            return None;
        }
        let enum_sym = self.intern(enum_part);
        let variant_sym = self.intern(variant_part);
        let enum_name = Ident {
            sym: enum_sym,
            span: self.subspan(token.span, 0, dot),
        };
        let variant = Ident {
            sym: variant_sym,
            span: self.subspan(token.span, dot + 1, text.len()),
        };
        Some((enum_name, variant))
    }

    /// Turn a (possibly dotted) identifier token into a variable reference
    /// followed by field accesses: `inner.x` => `(field x inner)`.
    fn split_dotted_variable(&mut self, token: Token) -> Expr {
        let text = self.text(&token.span);
        if !text.contains('.') {
            let name = self.ident_from(token);
            return self.mk_expr(ExprKind::Variable { name }, token.span);
        }

        let segments: Vec<(usize, usize)> = {
            let mut out = Vec::new();
            let mut start = 0;
            for (i, c) in text.char_indices() {
                if c == '.' {
                    out.push((start, i));
                    start = i + 1;
                }
            }
            out.push((start, text.len()));
            out
        };

        let (head_start, head_end) = segments[0];
        let head_sym = self.intern(&text[head_start..head_end]);
        let head_span = self.subspan(token.span, head_start, head_end);
        let mut expr = self.mk_expr(
            ExprKind::Variable {
                name: Ident {
                    sym: head_sym,
                    span: head_span,
                },
            },
            head_span,
        );

        for &(seg_start, seg_end) in &segments[1..] {
            let sym = self.intern(&text[seg_start..seg_end]);
            let field = Ident {
                sym,
                span: self.subspan(token.span, seg_start, seg_end),
            };
            let span = token.span.merge(field.span);
            expr = self.mk_expr(
                ExprKind::FieldAccess {
                    object: Box::new(expr),
                    field,
                },
                span,
            );
        }
        expr
    }

    /// Append `.field` accesses for an explicit field token, which the lexer
    /// may itself have merged into a dotted run.
    fn append_field_chain(&mut self, mut expr: Expr, field_token: Token) -> Expr {
        let text = self.text(&field_token.span).to_string();
        let mut offset = 0;
        for segment in text.split('.') {
            let sym = self.intern(segment);
            let field = Ident {
                sym,
                span: self.subspan(field_token.span, offset, offset + segment.len()),
            };
            let span = expr.span.merge(field.span);
            expr = self.mk_expr(
                ExprKind::FieldAccess {
                    object: Box::new(expr),
                    field,
                },
                span,
            );
            offset += segment.len() + 1;
        }
        expr
    }

    /// A sub-span of a single-line token span, by byte offsets into its text.
    fn subspan(&self, span: Span, start: usize, end: usize) -> Span {
        Span::new(
            span.start + start,
            span.start + end,
            span.line,
            span.column + start as u32,
        )
    }

    // ============================================================
    // Literals
    // ============================================================

    fn literal_from(&mut self, token: Token) -> Lit {
        let raw = self.text(&token.span).to_string();
        let kind = match token.kind {
            TokenKind::True => LitKind::Bool(true),
            TokenKind::False => LitKind::Bool(false),
            TokenKind::Integer | TokenKind::Base81Integer => {
                let base81 = token.kind == TokenKind::Base81Integer;
                let digits = raw.strip_suffix("t81").unwrap_or(&raw);
                let value = match digits.parse::<i64>() {
                    Ok(value) => value,
                    Err(_) => {
                        self.error_at(token, "Integer literal is out of range.");
                        0
                    }
                };
                LitKind::Int { value, base81 }
            }
            TokenKind::Float | TokenKind::Base81Float => {
                let base81 = token.kind == TokenKind::Base81Float;
                let digits = raw.strip_suffix("t81").unwrap_or(&raw);
                LitKind::Float {
                    value: digits.parse::<f64>().unwrap_or(0.0),
                    base81,
                }
            }
            _ => LitKind::Str {
                value: decode_string_literal(&raw),
            },
        };
        let text = self.intern(&raw);
        Lit {
            kind,
            text,
            span: token.span,
        }
    }

    // ============================================================
    // Record literals and match expressions
    // ============================================================

    fn record_literal(&mut self, name_token: Token) -> ParseResult<Expr> {
        let type_name = self.ident_from(name_token);
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let field_token =
                self.consume(TokenKind::Identifier, "Expect field name in record literal.");
            let name = self.ident_from(field_token);
            self.consume(TokenKind::Colon, "Expect ':' after field name.");
            let value = self.expression()?;
            fields.push(RecordLiteralField { name, value });
            if !self.eat_any(&[TokenKind::Comma, TokenKind::Semicolon]) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after record literal.");
        let span = name_token.span.merge(self.previous.span);
        Ok(self.mk_expr(ExprKind::RecordLiteral { type_name, fields }, span))
    }

    fn match_expression(&mut self, keyword: Span) -> ParseResult<Expr> {
        self.consume(TokenKind::LParen, "Expect '(' after 'match'.");
        let scrutinee = self.expression()?;
        self.consume(TokenKind::RParen, "Expect ')' after match scrutinee.");
        self.consume(TokenKind::LBrace, "Expect '{' before match arms.");

        let mut arms = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            arms.push(self.match_arm()?);
            if self.eat_any(&[TokenKind::Semicolon, TokenKind::Comma]) {
                continue;
            }
            break;
        }

        self.consume(TokenKind::RBrace, "Expect '}' after match arms.");
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_expr(
            ExprKind::Match {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            span,
        ))
    }

    fn match_arm(&mut self) -> ParseResult<MatchArm> {
        let keyword = self.consume(TokenKind::Identifier, "Expect match arm variant.");
        let variant = self.ident_from(keyword);

        let pattern = if self.eat(TokenKind::LParen) {
            let pattern = if !self.check(TokenKind::RParen) {
                self.parse_match_pattern()?
            } else {
                crate::ast::MatchPattern::None
            };
            self.consume(TokenKind::RParen, "Expect ')' after match binding.");
            pattern
        } else {
            crate::ast::MatchPattern::None
        };

        let guard = if self.eat(TokenKind::If) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenKind::FatArrow, "Expect '=>' after match arm pattern.");
        let body = self.expression()?;
        Ok(MatchArm {
            variant,
            pattern,
            guard,
            body,
        })
    }
}
