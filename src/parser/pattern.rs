//! Match-pattern parsing.
//!
//! Patterns appear inside the parentheses of a match arm:
//! identifier (`Some(v)`, `_` as wildcard), tuple (`a, b, c`), record
//! (`{ field, other: binding }`), and nested variant (`Some(inner)`).

use super::{ParseResult, Parser};
use crate::ast::{MatchPattern, RecordFieldPattern};
use crate::lexer::TokenKind;

impl<'src> Parser<'src> {
    pub(super) fn parse_match_pattern(&mut self) -> ParseResult<MatchPattern> {
        if self.eat(TokenKind::LBrace) {
            let mut bindings = Vec::new();
            while !self.check(TokenKind::RBrace) && !self.is_at_end() {
                let field_token =
                    self.consume(TokenKind::Identifier, "Expect field name in record pattern.");
                let field = self.ident_from(field_token);
                let binding = if self.eat(TokenKind::Colon) {
                    let binding_token = self.consume(
                        TokenKind::Identifier,
                        "Expect binding name after ':' in record pattern.",
                    );
                    self.ident_from(binding_token)
                } else {
                    field
                };
                bindings.push(RecordFieldPattern { field, binding });
                if !self.eat_any(&[TokenKind::Comma, TokenKind::Semicolon]) {
                    break;
                }
            }
            self.consume(TokenKind::RBrace, "Expect '}' after record pattern.");
            return Ok(MatchPattern::Record { bindings });
        }

        if self.eat(TokenKind::Identifier) {
            let first_token = self.previous;
            let first = self.ident_from(first_token);

            if self.eat(TokenKind::LParen) {
                let nested = if !self.check(TokenKind::RParen) {
                    Some(self.parse_match_pattern()?)
                } else {
                    None
                };
                self.consume(TokenKind::RParen, "Expect ')' after nested match binding.");
                let payload = nested
                    .filter(|p| !matches!(p, MatchPattern::None))
                    .map(Box::new);
                return Ok(MatchPattern::Variant {
                    name: first,
                    payload,
                });
            }

            if self.eat(TokenKind::Comma) {
                let mut bindings = vec![first];
                loop {
                    let binding_token = self.consume(
                        TokenKind::Identifier,
                        "Expect binding identifier in tuple pattern.",
                    );
                    bindings.push(self.ident_from(binding_token));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                return Ok(MatchPattern::Tuple { bindings });
            }

            let is_wildcard = self.text(&first_token.span) == "_";
            return Ok(MatchPattern::Identifier {
                name: first,
                is_wildcard,
            });
        }

        self.error_at_current("Expect pattern binding.");
        Ok(MatchPattern::None)
    }
}
