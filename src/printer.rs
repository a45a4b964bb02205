//! Canonical AST rendering.
//!
//! Deterministic S-expression-style text used by the `parse` command and the
//! golden tests: two parses of equivalently-formatted source must render
//! byte-identically.

use crate::ast::{
    Expr, ExprKind, GenericArg, Ident, MatchPattern, Stmt, StmtKind, BoundKind, TypeExpr,
};
use string_interner::DefaultStringInterner;

/// Renders statements and expressions in canonical form.
pub struct CanonicalAstPrinter<'i> {
    interner: &'i DefaultStringInterner,
}

impl<'i> CanonicalAstPrinter<'i> {
    pub fn new(interner: &'i DefaultStringInterner) -> Self {
        Self { interner }
    }

    fn name(&self, ident: &Ident) -> &str {
        self.interner.resolve(ident.sym).unwrap_or("<sym>")
    }

    fn sym(&self, sym: crate::ast::Symbol) -> &str {
        self.interner.resolve(sym).unwrap_or("<sym>")
    }

    pub fn print_stmt(&self, stmt: &Stmt) -> String {
        match &stmt.kind {
            StmtKind::Expression { expr } => format!("(; {})", self.print_expr(expr)),
            StmtKind::Var { name, ty, init } => {
                let mut head = format!("var {}", self.name(name));
                if let Some(ty) = ty {
                    head.push_str(": ");
                    head.push_str(&self.print_type(ty));
                }
                match init {
                    Some(init) => format!("({} {})", head, self.print_expr(init)),
                    None => format!("({})", head),
                }
            }
            StmtKind::Let { name, ty, init } => {
                let mut head = format!("let {}", self.name(name));
                if let Some(ty) = ty {
                    head.push_str(": ");
                    head.push_str(&self.print_type(ty));
                }
                format!("({} = {})", head, self.print_expr(init))
            }
            StmtKind::Block { statements } => self.print_block(statements),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(else_branch) => format!(
                    "(if-else {} {} {})",
                    self.print_expr(condition),
                    self.print_stmt(then_branch),
                    self.print_stmt(else_branch)
                ),
                None => format!(
                    "(if {} {})",
                    self.print_expr(condition),
                    self.print_stmt(then_branch)
                ),
            },
            StmtKind::While { condition, body } => format!(
                "(while {} {})",
                self.print_expr(condition),
                self.print_stmt(body)
            ),
            StmtKind::Loop(decl) => {
                let mut out = String::from("(loop");
                match decl.bound {
                    BoundKind::Infinite => out.push_str(" @bounded(infinite)"),
                    BoundKind::Static => {
                        out.push_str(&format!(" @bounded({})", decl.bound_value.unwrap_or(0)));
                    }
                    _ => {}
                }
                out.push(' ');
                out.push_str(&self.print_block(&decl.body));
                out.push(')');
                out
            }
            StmtKind::Return { value, .. } => match value {
                Some(value) => format!("(return {})", self.print_expr(value)),
                None => "(return)".to_string(),
            },
            StmtKind::Break { .. } => "(break)".to_string(),
            StmtKind::Continue { .. } => "(continue)".to_string(),
            StmtKind::Function(decl) => {
                let mut out = String::from("(fn");
                if decl.attributes.is_effectful {
                    out.push_str(" @effect");
                }
                if let Some(tier) = decl.attributes.tier {
                    out.push_str(&format!(" @tier({})", tier));
                }
                out.push(' ');
                out.push_str(self.name(&decl.name));
                out.push_str(" (");
                for (i, param) in decl.params.iter().enumerate() {
                    out.push_str(self.name(&param.name));
                    out.push_str(": ");
                    match &param.ty {
                        Some(ty) => out.push_str(&self.print_type(ty)),
                        None => out.push_str("<unknown>"),
                    }
                    if i + 1 < decl.params.len() {
                        out.push(' ');
                    }
                }
                out.push_str(" )");
                if let Some(return_type) = &decl.return_type {
                    out.push_str(" -> ");
                    out.push_str(&self.print_type(return_type));
                }
                out.push(' ');
                out.push_str(&self.print_block(&decl.body));
                out.push(')');
                out
            }
            StmtKind::Module { path } => format!("(module {})", path),
            StmtKind::Import { path } => format!("(import {})", path),
            StmtKind::TypeAlias(decl) => {
                let params = decl
                    .params
                    .iter()
                    .map(|p| self.name(p).to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let alias = match &decl.alias {
                    Some(alias) => self.print_type(alias),
                    None => "<unknown>".to_string(),
                };
                format!("(type {} [{}] = {})", self.name(&decl.name), params, alias)
            }
            StmtKind::Record(decl) => {
                let mut out = format!("(record {}", self.name(&decl.name));
                for field in &decl.fields {
                    out.push(' ');
                    out.push_str(self.name(&field.name));
                    out.push_str(": ");
                    match &field.ty {
                        Some(ty) => out.push_str(&self.print_type(ty)),
                        None => out.push_str("<unknown>"),
                    }
                }
                out.push(')');
                out
            }
            StmtKind::Enum(decl) => {
                let mut out = format!("(enum {}", self.name(&decl.name));
                for variant in &decl.variants {
                    out.push(' ');
                    out.push_str(self.name(&variant.name));
                    if let Some(payload) = &variant.payload {
                        out.push('(');
                        out.push_str(&self.print_type(payload));
                        out.push(')');
                    }
                }
                out.push(')');
                out
            }
        }
    }

    fn print_block(&self, statements: &[Stmt]) -> String {
        let mut out = String::from("(block");
        for stmt in statements {
            out.push(' ');
            out.push_str(&self.print_stmt(stmt));
        }
        out.push(')');
        out
    }

    pub fn print_expr(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Binary {
                op, left, right, ..
            } => format!(
                "({} {} {})",
                op.symbol(),
                self.print_expr(left),
                self.print_expr(right)
            ),
            ExprKind::Unary { op, operand, .. } => {
                format!("({} {})", op.symbol(), self.print_expr(operand))
            }
            ExprKind::Literal(lit) => self.sym(lit.text).to_string(),
            ExprKind::Grouping(inner) => format!("(group {})", self.print_expr(inner)),
            ExprKind::Variable { name } => self.name(name).to_string(),
            ExprKind::Call { callee, args } => {
                let mut out = format!("(call {}", self.print_expr(callee));
                for arg in args {
                    out.push(' ');
                    out.push_str(&self.print_expr(arg));
                }
                out.push(')');
                out
            }
            ExprKind::Assign { name, value } => {
                format!("(= {} {})", self.name(name), self.print_expr(value))
            }
            ExprKind::Match { scrutinee, arms } => {
                let mut out = format!("(match {}", self.print_expr(scrutinee));
                for arm in arms {
                    out.push_str(" (");
                    out.push_str(self.name(&arm.variant));
                    out.push_str(&self.print_pattern(&arm.pattern));
                    if let Some(guard) = &arm.guard {
                        out.push_str(" if ");
                        out.push_str(&self.print_expr(guard));
                    }
                    out.push_str(" => ");
                    out.push_str(&self.print_expr(&arm.body));
                    out.push(')');
                }
                out.push(')');
                out
            }
            ExprKind::VectorLiteral { elements } => {
                let rendered = elements
                    .iter()
                    .map(|e| self.print_expr(e))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{}]", rendered)
            }
            ExprKind::FieldAccess { object, field } => {
                format!("(field {} {})", self.name(field), self.print_expr(object))
            }
            ExprKind::RecordLiteral { type_name, fields } => {
                let mut out = format!("(recordlit {}", self.name(type_name));
                for field in fields {
                    out.push(' ');
                    out.push_str(self.name(&field.name));
                    out.push_str(": ");
                    out.push_str(&self.print_expr(&field.value));
                }
                out.push(')');
                out
            }
            ExprKind::EnumLiteral {
                enum_name,
                variant,
                payload,
            } => {
                let mut out = format!("(enumlit {}.{}", self.name(enum_name), self.name(variant));
                if let Some(payload) = payload {
                    out.push(' ');
                    out.push_str(&self.print_expr(payload));
                }
                out.push(')');
                out
            }
            ExprKind::TypeRef(ty) => self.print_type(ty),
        }
    }

    fn print_pattern(&self, pattern: &MatchPattern) -> String {
        match pattern {
            MatchPattern::None => String::new(),
            MatchPattern::Identifier { name, is_wildcard } => {
                if *is_wildcard {
                    String::new()
                } else {
                    format!(" {}", self.name(name))
                }
            }
            MatchPattern::Tuple { bindings } => {
                let mut out = String::new();
                for binding in bindings {
                    out.push(' ');
                    out.push_str(self.name(binding));
                }
                out
            }
            MatchPattern::Record { bindings } => {
                let mut out = String::from(" {");
                for binding in bindings {
                    out.push_str(self.name(&binding.field));
                    if binding.binding.sym != binding.field.sym {
                        out.push(':');
                        out.push_str(self.name(&binding.binding));
                    }
                    out.push(',');
                }
                out.push_str(" }");
                out
            }
            MatchPattern::Variant { name, payload } => {
                let mut out = format!(" {}(", self.name(name));
                if let Some(payload) = payload {
                    out.push_str(self.print_pattern(payload).trim_start());
                }
                out.push(')');
                out
            }
        }
    }

    pub fn print_type(&self, ty: &TypeExpr) -> String {
        match ty {
            TypeExpr::Simple { name } => self.sym(name.sym).to_string(),
            TypeExpr::Generic { name, args } => {
                let mut out = format!("(generic {}", self.sym(name.sym));
                for arg in args {
                    out.push(' ');
                    match arg {
                        GenericArg::Type(ty) => out.push_str(&self.print_type(ty)),
                        GenericArg::Const(expr) => out.push_str(&self.print_expr(expr)),
                    }
                }
                out.push(')');
                out
            }
        }
    }
}
