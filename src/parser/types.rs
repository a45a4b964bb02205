//! Type expression parsing.
//!
//! Generic syntax is `Name[Param, ...]`; the legacy `Name<...>` form is
//! rejected with a pointed diagnostic. The first generic parameter must be
//! a type. Later parameters are types when they start with a type keyword
//! (or an identifier that itself opens a generic), and constant expressions
//! otherwise — so `Tensor[T81Float, N]` carries the constant `N`.

use super::{ParseResult, Parser};
use crate::ast::{GenericArg, TypeExpr};
use crate::lexer::{Token, TokenKind};

impl<'src> Parser<'src> {
    /// Parse a type expression, or record an error and yield `None`.
    pub(super) fn type_expr(&mut self) -> ParseResult<Option<TypeExpr>> {
        if !self.current.kind.starts_type() {
            self.error_at_current("Expect type name");
            return Ok(None);
        }
        let name = self.advance();

        if self.check(TokenKind::Less) {
            self.error_at_current(
                "Legacy '<...>' syntax for generics is not supported. Use '[...]' instead.",
            );
            return Ok(None);
        }

        if self.check(TokenKind::LBracket) {
            return Ok(Some(self.generic_type_from(name)?));
        }

        let name = self.type_name_from(name);
        Ok(Some(TypeExpr::Simple { name }))
    }

    /// Parse `[...]` generic parameters for an already-consumed head token.
    pub(super) fn generic_type_from(&mut self, name: Token) -> ParseResult<TypeExpr> {
        self.consume(TokenKind::LBracket, "Expect '[' after generic type name.");
        let is_result = self.text(&name.span) == "Result";

        let mut args = Vec::new();

        // First parameter must be a type.
        if let Some(ty) = self.type_expr()? {
            args.push(GenericArg::Type(ty));
        }

        while self.eat(TokenKind::Comma) {
            if args.len() >= 8 {
                self.error_at_current("Too many generic parameters (max 8)");
                break;
            }
            // Result's error slot is always a type.
            if is_result && args.len() == 1 {
                if let Some(ty) = self.type_expr()? {
                    args.push(GenericArg::Type(ty));
                }
                continue;
            }
            if self.is_type_argument_start() {
                if let Some(ty) = self.type_expr()? {
                    args.push(GenericArg::Type(ty));
                }
            } else {
                args.push(GenericArg::Const(self.expression()?));
            }
        }

        self.consume(TokenKind::RBracket, "Expect ']' after type parameters.");
        let name = self.type_name_from(name);
        Ok(TypeExpr::Generic { name, args })
    }

    /// Whether the current token starts a type in a non-first generic slot.
    /// A bare identifier is a constant parameter unless it opens its own
    /// generic instantiation.
    fn is_type_argument_start(&self) -> bool {
        if self.check(TokenKind::Identifier) {
            return self.next.kind == TokenKind::LBracket;
        }
        self.current.kind.starts_type()
    }
}
