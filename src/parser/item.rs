//! Declaration and statement parsing: functions, records, enums, type
//! aliases, module/import declarations, bindings, control flow, and the
//! attribute grammar (`@schema`, `@module`, `@effect`, `@tier`, `@bounded`).

use super::{ParseResult, Parser};
use crate::ast::{
    BoundKind, EnumDecl, EnumVariant, Expr, FnDecl, FunctionAttributes, LoopStmt, Param,
    RecordDecl, RecordField, Stmt, StmtKind, TypeAliasDecl,
};
use crate::lexer::TokenKind;
use crate::span::Span;

/// `@schema(N)` / `@module(a.b.c)` collected ahead of a record or enum.
struct StructuralAttributes {
    schema_version: Option<i64>,
    module_path: Option<String>,
    anchor: Span,
}

/// `@effect` / `@tier(N)` collected ahead of a function.
struct FunctionAttributesParse {
    attributes: FunctionAttributes,
    anchor: Span,
}

impl<'src> Parser<'src> {
    pub(super) fn parse_declaration(&mut self) -> ParseResult<Stmt> {
        let struct_attrs = self.parse_structural_attributes();
        let fn_attrs = self.parse_function_attributes();

        if self.eat(TokenKind::Module) {
            let keyword = self.previous;
            self.reject_structural_attrs(&struct_attrs);
            self.reject_function_attrs(&fn_attrs);
            return self.module_declaration(keyword.span);
        }
        if self.eat(TokenKind::Import) {
            let keyword = self.previous;
            self.reject_structural_attrs(&struct_attrs);
            self.reject_function_attrs(&fn_attrs);
            return self.import_declaration(keyword.span);
        }
        if self.eat(TokenKind::Type) {
            let keyword = self.previous;
            self.reject_structural_attrs(&struct_attrs);
            self.reject_function_attrs(&fn_attrs);
            return self.type_declaration(keyword.span);
        }
        if self.eat(TokenKind::Record) {
            let keyword = self.previous;
            self.reject_function_attrs(&fn_attrs);
            return self.record_declaration(keyword.span, struct_attrs);
        }
        if self.eat(TokenKind::Enum) {
            let keyword = self.previous;
            self.reject_function_attrs(&fn_attrs);
            return self.enum_declaration(keyword.span, struct_attrs);
        }
        if self.eat(TokenKind::Fn) {
            let keyword = self.previous;
            self.reject_structural_attrs(&struct_attrs);
            let attributes = fn_attrs
                .map(|parsed| parsed.attributes)
                .unwrap_or_default();
            return self.function(keyword.span, attributes);
        }

        self.reject_structural_attrs(&struct_attrs);
        self.reject_function_attrs(&fn_attrs);

        if self.eat(TokenKind::Var) {
            let keyword = self.previous;
            return self.var_declaration(keyword.span);
        }
        if self.eat(TokenKind::Let) {
            let keyword = self.previous;
            return self.let_declaration(keyword.span);
        }
        self.statement()
    }

    fn reject_structural_attrs(&mut self, attrs: &Option<StructuralAttributes>) {
        if let Some(attrs) = attrs {
            self.error_at_span(
                attrs.anchor,
                "Structural attributes may only decorate records or enums.",
            );
        }
    }

    fn reject_function_attrs(&mut self, attrs: &Option<FunctionAttributesParse>) {
        if let Some(attrs) = attrs {
            self.error_at_span(
                attrs.anchor,
                "Function attributes may only decorate functions.",
            );
        }
    }

    // ============================================================
    // Attributes
    // ============================================================

    fn parse_structural_attributes(&mut self) -> Option<StructuralAttributes> {
        let mut attrs = StructuralAttributes {
            schema_version: None,
            module_path: None,
            anchor: Span::dummy(),
        };
        let mut seen = false;

        while self.check(TokenKind::At) {
            let lookahead = self.next;
            if lookahead.kind != TokenKind::Identifier {
                break;
            }
            let attr_name = self.text(&lookahead.span);
            if attr_name != "schema" && attr_name != "module" {
                break;
            }
            let is_schema = attr_name == "schema";

            self.advance(); // '@'
            let name = self.consume(TokenKind::Identifier, "Expect attribute name after '@'.");
            if !seen {
                attrs.anchor = name.span;
            }
            seen = true;
            self.consume(TokenKind::LParen, "Expect '(' after attribute name.");

            if is_schema {
                if attrs.schema_version.is_some() {
                    self.error_at(name, "Duplicate '@schema' attribute.");
                }
                let value = self.consume(TokenKind::Integer, "Expect integer schema version.");
                match self.text(&value.span).parse::<i64>() {
                    Ok(version) if version > 0 => attrs.schema_version = Some(version),
                    Ok(_) => self.error_at(value, "Schema version must be positive."),
                    Err(_) => self.error_at(value, "Invalid integer for schema version."),
                }
            } else {
                if attrs.module_path.is_some() {
                    self.error_at(name, "Duplicate '@module' attribute.");
                }
                let mut path = String::new();
                let segment = self.consume(TokenKind::Identifier, "Expect module name.");
                path.push_str(self.text(&segment.span));
                while self.eat(TokenKind::Dot) {
                    let next =
                        self.consume(TokenKind::Identifier, "Expect module segment after '.'.");
                    path.push('.');
                    path.push_str(self.text(&next.span));
                }
                attrs.module_path = Some(path);
            }

            self.consume(TokenKind::RParen, "Expect ')' after attribute.");
        }

        seen.then_some(attrs)
    }

    fn parse_function_attributes(&mut self) -> Option<FunctionAttributesParse> {
        let mut attrs = FunctionAttributesParse {
            attributes: FunctionAttributes::default(),
            anchor: Span::dummy(),
        };
        let mut seen = false;

        while self.check(TokenKind::At) {
            let lookahead = self.next;
            if lookahead.kind != TokenKind::Identifier {
                break;
            }
            let attr_name = self.text(&lookahead.span);
            if attr_name != "effect" && attr_name != "tier" {
                break;
            }
            let is_effect = attr_name == "effect";

            self.advance(); // '@'
            let name = self.consume(TokenKind::Identifier, "Expect attribute name after '@'.");
            if !seen {
                attrs.anchor = name.span;
            }
            seen = true;

            if is_effect {
                attrs.attributes.is_effectful = true;
                continue;
            }

            self.consume(TokenKind::LParen, "Expect '(' after '@tier'.");
            let value = self.consume(TokenKind::Integer, "Expect integer tier value.");
            self.consume(TokenKind::RParen, "Expect ')' after tier value.");
            match self.text(&value.span).parse::<i64>() {
                Ok(tier) if tier > 0 => attrs.attributes.tier = Some(tier),
                Ok(_) => self.error_at(value, "Tier value must be positive."),
                Err(_) => self.error_at(value, "Invalid integer for tier value."),
            }
        }

        seen.then_some(attrs)
    }

    // ============================================================
    // Declarations
    // ============================================================

    fn module_declaration(&mut self, keyword: Span) -> ParseResult<Stmt> {
        let path = self.dotted_path("Expect module path after 'module'.", "Expect module segment after '.'.");
        self.consume(TokenKind::Semicolon, "Expect ';' after module declaration.");
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(StmtKind::Module { path }, span))
    }

    fn import_declaration(&mut self, keyword: Span) -> ParseResult<Stmt> {
        let path = self.dotted_path("Expect import path after 'import'.", "Expect import segment after '.'.");
        self.consume(TokenKind::Semicolon, "Expect ';' after import declaration.");
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(StmtKind::Import { path }, span))
    }

    /// A dotted path. The lexer usually hands the whole path over as one
    /// dotted identifier; the explicit `.` loop covers spaced segments.
    fn dotted_path(&mut self, head_message: &str, segment_message: &str) -> String {
        let segment = self.consume(TokenKind::Identifier, head_message);
        let mut path = self.text(&segment.span).to_string();
        while self.eat(TokenKind::Dot) {
            let next = self.consume(TokenKind::Identifier, segment_message);
            path.push('.');
            path.push_str(self.text(&next.span));
        }
        path
    }

    fn function(&mut self, keyword: Span, attributes: FunctionAttributes) -> ParseResult<Stmt> {
        let name_token = self.consume(TokenKind::Identifier, "Expect function name.");
        let name = self.ident_from(name_token);
        self.consume(TokenKind::LParen, "Expect '(' after function name.");

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                if params.len() >= 255 {
                    self.error_at_current("Cannot have more than 255 parameters.");
                }
                let param_token = self.consume(TokenKind::Identifier, "Expect parameter name.");
                let param_name = self.ident_from(param_token);
                self.consume(TokenKind::Colon, "Expect ':' after parameter name.");
                let ty = self.type_expr()?;
                params.push(Param {
                    name: param_name,
                    ty,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after parameters.");

        let return_type = if self.eat(TokenKind::Arrow) {
            self.type_expr()?
        } else {
            None
        };

        self.consume(TokenKind::LBrace, "Expect '{' before function body.");
        let body = self.block();
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(
            StmtKind::Function(FnDecl {
                name,
                params,
                return_type,
                body,
                attributes,
            }),
            span,
        ))
    }

    fn type_declaration(&mut self, keyword: Span) -> ParseResult<Stmt> {
        let name_token = self.consume(TokenKind::Identifier, "Expect type name.");
        let name = self.ident_from(name_token);

        let mut params = Vec::new();
        if self.eat(TokenKind::LBracket) {
            loop {
                if params.len() >= 8 {
                    self.error_at_current("Too many generic parameters (max 8)");
                    break;
                }
                let param = self.consume(TokenKind::Identifier, "Expect generic parameter name.");
                params.push(self.ident_from(param));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RBracket, "Expect ']' after generic parameters.");
        }

        self.consume(TokenKind::Equal, "Expect '=' after type declaration.");
        let alias = self.type_expr()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after type declaration.");
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(
            StmtKind::TypeAlias(TypeAliasDecl {
                name,
                params,
                alias,
            }),
            span,
        ))
    }

    fn record_declaration(
        &mut self,
        keyword: Span,
        attributes: Option<StructuralAttributes>,
    ) -> ParseResult<Stmt> {
        let name_token = self.consume(TokenKind::Identifier, "Expect record name.");
        let name = self.ident_from(name_token);
        self.consume(TokenKind::LBrace, "Expect '{' after record name.");

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let field_token = self.consume(TokenKind::Identifier, "Expect field name.");
            let field_name = self.ident_from(field_token);
            self.consume(TokenKind::Colon, "Expect ':' after field name.");
            let ty = self.type_expr()?;
            self.consume(TokenKind::Semicolon, "Expect ';' after field declaration.");
            fields.push(RecordField {
                name: field_name,
                ty,
            });
        }
        self.consume(TokenKind::RBrace, "Expect '}' after record declaration.");
        self.consume(TokenKind::Semicolon, "Expect ';' after record declaration.");

        let (schema_version, module_path) = match attributes {
            Some(attrs) => (attrs.schema_version, attrs.module_path),
            None => (None, None),
        };
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(
            StmtKind::Record(RecordDecl {
                name,
                fields,
                schema_version,
                module_path,
            }),
            span,
        ))
    }

    fn enum_declaration(
        &mut self,
        keyword: Span,
        attributes: Option<StructuralAttributes>,
    ) -> ParseResult<Stmt> {
        let name_token = self.consume(TokenKind::Identifier, "Expect enum name.");
        let name = self.ident_from(name_token);
        self.consume(TokenKind::LBrace, "Expect '{' after enum name.");

        let mut variants = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let variant_token = self.consume(TokenKind::Identifier, "Expect variant name.");
            let variant_name = self.ident_from(variant_token);
            let payload = if self.eat(TokenKind::LParen) {
                let ty = self.type_expr()?;
                self.consume(TokenKind::RParen, "Expect ')' after variant payload type.");
                ty
            } else {
                None
            };
            self.consume(TokenKind::Semicolon, "Expect ';' after variant declaration.");
            variants.push(EnumVariant {
                name: variant_name,
                payload,
            });
        }
        self.consume(TokenKind::RBrace, "Expect '}' after enum declaration.");
        self.consume(TokenKind::Semicolon, "Expect ';' after enum declaration.");

        let (schema_version, module_path) = match attributes {
            Some(attrs) => (attrs.schema_version, attrs.module_path),
            None => (None, None),
        };
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(
            StmtKind::Enum(EnumDecl {
                name,
                variants,
                schema_version,
                module_path,
            }),
            span,
        ))
    }

    fn var_declaration(&mut self, keyword: Span) -> ParseResult<Stmt> {
        let name_token = self.consume(TokenKind::Identifier, "Expect variable name.");
        let name = self.ident_from(name_token);
        let ty = if self.eat(TokenKind::Colon) {
            self.type_expr()?
        } else {
            None
        };
        let init = if self.eat(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(StmtKind::Var { name, ty, init }, span))
    }

    fn let_declaration(&mut self, keyword: Span) -> ParseResult<Stmt> {
        let name_token = self.consume(TokenKind::Identifier, "Expect constant name.");
        let name = self.ident_from(name_token);
        let ty = if self.eat(TokenKind::Colon) {
            self.type_expr()?
        } else {
            None
        };
        self.consume(TokenKind::Equal, "Expect '=' after constant name.");
        let init = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after constant declaration.");
        let span = keyword.merge(self.previous.span);
        Ok(self.mk_stmt(StmtKind::Let { name, ty, init }, span))
    }

    // ============================================================
    // Statements
    // ============================================================

    pub(super) fn statement(&mut self) -> ParseResult<Stmt> {
        if self.eat(TokenKind::If) {
            let keyword = self.previous.span;
            self.consume(TokenKind::LParen, "Expect '(' after 'if'.");
            let condition = self.expression()?;
            self.consume(TokenKind::RParen, "Expect ')' after if condition.");
            let then_branch = Box::new(self.statement()?);
            let else_branch = if self.eat(TokenKind::Else) {
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            let span = keyword.merge(self.previous.span);
            return Ok(self.mk_stmt(
                StmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                },
                span,
            ));
        }

        if self.eat(TokenKind::While) {
            let keyword = self.previous.span;
            self.consume(TokenKind::LParen, "Expect '(' after 'while'.");
            let condition = self.expression()?;
            self.consume(TokenKind::RParen, "Expect ')' after while condition.");
            let body = Box::new(self.statement()?);
            let span = keyword.merge(self.previous.span);
            return Ok(self.mk_stmt(StmtKind::While { condition, body }, span));
        }

        if self.check(TokenKind::At) || self.check(TokenKind::Loop) {
            return self.loop_statement();
        }

        if self.eat(TokenKind::Break) {
            let keyword = self.previous;
            self.consume(TokenKind::Semicolon, "Expect ';' after 'break'.");
            let span = keyword.span.merge(self.previous.span);
            return Ok(self.mk_stmt(
                StmtKind::Break {
                    keyword_span: keyword.span,
                },
                span,
            ));
        }

        if self.eat(TokenKind::Continue) {
            let keyword = self.previous;
            self.consume(TokenKind::Semicolon, "Expect ';' after 'continue'.");
            let span = keyword.span.merge(self.previous.span);
            return Ok(self.mk_stmt(
                StmtKind::Continue {
                    keyword_span: keyword.span,
                },
                span,
            ));
        }

        if self.eat(TokenKind::Return) {
            let keyword = self.previous;
            let value = if self.check(TokenKind::Semicolon) {
                None
            } else {
                Some(self.expression()?)
            };
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            let span = keyword.span.merge(self.previous.span);
            return Ok(self.mk_stmt(
                StmtKind::Return {
                    keyword_span: keyword.span,
                    value,
                },
                span,
            ));
        }

        if self.eat(TokenKind::LBrace) {
            let open = self.previous.span;
            let statements = self.block();
            let span = open.merge(self.previous.span);
            return Ok(self.mk_stmt(StmtKind::Block { statements }, span));
        }

        self.expression_statement()
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        let span = expr.span.merge(self.previous.span);
        Ok(self.mk_stmt(StmtKind::Expression { expr }, span))
    }

    // ============================================================
    // Bounded loops
    // ============================================================

    fn loop_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current.span;
        let (bound, bound_value, guard) = self.parse_loop_annotation()?;

        let loop_token = self.consume(TokenKind::Loop, "Expect 'loop' keyword.");
        self.consume(TokenKind::LBrace, "Expect '{' after 'loop'.");
        let body = self.block();
        let span = start.merge(self.previous.span);
        Ok(self.mk_stmt(
            StmtKind::Loop(LoopStmt {
                keyword_span: loop_token.span,
                bound,
                bound_value,
                guard,
                body,
            }),
            span,
        ))
    }

    /// Parse an optional `@bounded(...)` annotation ahead of a `loop`.
    fn parse_loop_annotation(&mut self) -> ParseResult<(BoundKind, Option<i64>, Option<Expr>)> {
        if !self.eat(TokenKind::At) {
            return Ok((BoundKind::None, None, None));
        }

        let name = self.consume(TokenKind::Identifier, "Expect attribute name after '@'.");
        let name_text = self.text(&name.span);
        if name_text != "bounded" {
            let message = format!("Unsupported annotation '{}'", name_text);
            self.error_at(name, message);
        }

        self.consume(TokenKind::LParen, "Expect '(' after annotation name.");

        let mut bound = BoundKind::None;
        let mut bound_value = None;
        let mut guard = None;

        if self.eat_any(&[TokenKind::Identifier, TokenKind::Loop]) {
            let arg = self.previous;
            match self.text(&arg.span) {
                "infinite" => bound = BoundKind::Infinite,
                "loop" => {
                    bound = BoundKind::Guarded;
                    self.consume(TokenKind::LParen, "Expect '(' after 'loop'.");
                    guard = Some(self.expression()?);
                    self.consume(TokenKind::RParen, "Expect ')' after guard expression.");
                }
                _ => self.error_at(
                    arg,
                    "'@bounded' only accepts 'infinite', an integer, or 'loop(...)'",
                ),
            }
        } else if self.eat(TokenKind::Integer) {
            let arg = self.previous;
            bound = BoundKind::Static;
            match self.text(&arg.span).parse::<i64>() {
                Ok(value) => bound_value = Some(value),
                Err(_) => {
                    let message = format!("Invalid loop bound '{}'", self.text(&arg.span));
                    self.error_at(arg, message);
                }
            }
        } else {
            self.error_at_current("'@bounded' requires an argument");
        }

        self.consume(TokenKind::RParen, "Expect ')' after annotation argument.");
        Ok((bound, bound_value, guard))
    }
}
