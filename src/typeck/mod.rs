//! Semantic analysis for T81Lang.
//!
//! The [`SemanticAnalyzer`] runs three passes over the top-level statements:
//!
//! 1. Declare every function name in the global scope.
//! 2. Record every function signature, so forward references type-check.
//! 3. Analyze all statements in source order.
//!
//! Expression analysis threads an optional *expected type* used to resolve
//! context-dependent constructors (`None()`, `Ok(x)`, empty `[]`) and to
//! refine under-specified declared types.
//!
//! Besides the expression type cache, analysis fills the side tables later
//! stages consume: record and enum registries (with schema versions and
//! monotonic enum ids), loop metadata, match metadata, and the numeric data
//! of vector literals. All side tables are keyed by [`NodeId`].

pub mod scope;
pub mod types;

mod expr;
mod patterns;

#[cfg(test)]
mod tests;

pub use scope::{ScopeStack, SemanticSymbol, SymbolKind};
pub use types::{
    display, is_assignable, merge_expected_params, refine_generic_type, Type, TypeKind,
};

use crate::ast::{
    BoundKind, EnumDecl, Expr, ExprKind, FnDecl, GenericArg, NodeId, PatternKind, Program,
    RecordDecl, Stmt, StmtKind, Symbol, TypeAliasDecl, TypeExpr, TypeName,
};
use crate::diagnostics::Diagnostic;
use crate::lexer::TokenKind;
use crate::span::Span;
use std::collections::{HashMap, HashSet};
use string_interner::DefaultStringInterner;

/// One record field: name, type, declaration site.
#[derive(Debug, Clone)]
pub struct RecordFieldInfo {
    pub name: Symbol,
    pub ty: Type,
    pub span: Span,
}

/// Registry entry for a record declaration.
#[derive(Debug, Clone, Default)]
pub struct RecordInfo {
    /// Fields in declaration order.
    pub fields: Vec<RecordFieldInfo>,
    pub field_map: HashMap<Symbol, Type>,
    pub schema_version: u32,
    pub module_path: String,
}

#[derive(Debug, Clone)]
pub struct EnumVariantInfo {
    pub payload: Option<Type>,
    /// Index of the variant within its enum, in declaration order.
    pub id: i32,
}

/// Registry entry for an enum declaration.
#[derive(Debug, Clone, Default)]
pub struct EnumInfo {
    pub variants: HashMap<Symbol, EnumVariantInfo>,
    /// Variant names in declaration order.
    pub variant_order: Vec<Symbol>,
    pub schema_version: u32,
    pub module_path: String,
    /// Monotonic enum id within the compilation unit.
    pub id: i32,
}

/// A generic type alias: parameter names plus the aliased type expression.
#[derive(Clone)]
pub struct AliasInfo<'a> {
    pub params: Vec<Symbol>,
    pub alias: Option<&'a TypeExpr>,
}

/// Metadata recorded for every analyzed `loop` statement.
#[derive(Debug, Clone)]
pub struct LoopMetadata {
    pub stmt: NodeId,
    pub keyword_span: Span,
    pub bound: BoundKind,
    pub bound_value: Option<i64>,
    /// Loop-frame stack depth when the loop starts.
    pub depth: i32,
    /// Monotonic id across the compilation unit.
    pub id: i32,
    pub source_file: String,
    pub guard_present: bool,
}

impl LoopMetadata {
    pub fn annotated(&self) -> bool {
        self.bound != BoundKind::None
    }

    pub fn bound_infinite(&self) -> bool {
        self.bound == BoundKind::Infinite
    }
}

/// What a match scrutinee turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Unknown,
    Option,
    Result,
    Enum,
}

/// Per-arm match metadata, aligned with the arm order in the AST.
#[derive(Debug, Clone)]
pub struct MatchArmInfo {
    pub variant: Symbol,
    pub pattern_kind: PatternKind,
    pub has_guard: bool,
    pub payload_type: Type,
    pub arm_type: Type,
    /// Within-enum variant index. Option/Result arms use 0 (`Some`/`Ok`)
    /// and 1 (`None`/`Err`).
    pub variant_id: i32,
    /// Enum registry id, or -1 for Option/Result scrutinees.
    pub enum_id: i32,
    pub enum_name: String,
    /// Source rendering of the guard expression, empty when absent.
    pub guard_expression: String,
}

/// Metadata recorded for every analyzed match expression.
#[derive(Debug, Clone)]
pub struct MatchMetadata {
    pub expr: NodeId,
    pub result_type: Type,
    pub kind: MatchKind,
    pub has_some: bool,
    pub has_none: bool,
    pub has_ok: bool,
    pub has_err: bool,
    pub arms: Vec<MatchArmInfo>,
    pub guard_present: bool,
}

/// The semantic analyzer for one compilation unit.
pub struct SemanticAnalyzer<'a> {
    source_name: String,
    interner: DefaultStringInterner,
    diagnostics: Vec<Diagnostic>,
    had_error: bool,

    scopes: ScopeStack,
    function_return_stack: Vec<Type>,
    expected_type_stack: Vec<Option<Type>>,
    expr_types: HashMap<NodeId, Type>,

    generic_arities: HashMap<Symbol, usize>,
    defined_generics: HashSet<Symbol>,
    type_aliases: HashMap<Symbol, AliasInfo<'a>>,
    alias_depth: u32,

    vector_literal_data: HashMap<NodeId, Vec<f32>>,
    record_definitions: HashMap<Symbol, RecordInfo>,
    enum_definitions: HashMap<Symbol, EnumInfo>,
    next_enum_id: i32,

    loop_metadata: Vec<LoopMetadata>,
    loop_index: HashMap<NodeId, usize>,
    loop_stack: Vec<Option<NodeId>>,
    next_loop_id: i32,

    match_metadata: Vec<MatchMetadata>,
    match_index: HashMap<NodeId, usize>,
}

impl<'a> SemanticAnalyzer<'a> {
    /// Create an analyzer. The interner comes from the parser that produced
    /// the program being analyzed.
    pub fn new(source_name: impl Into<String>, interner: DefaultStringInterner) -> Self {
        Self {
            source_name: source_name.into(),
            interner,
            diagnostics: Vec::new(),
            had_error: false,
            scopes: ScopeStack::new(),
            function_return_stack: Vec::new(),
            expected_type_stack: Vec::new(),
            expr_types: HashMap::new(),
            generic_arities: HashMap::new(),
            defined_generics: HashSet::new(),
            type_aliases: HashMap::new(),
            alias_depth: 0,
            vector_literal_data: HashMap::new(),
            record_definitions: HashMap::new(),
            enum_definitions: HashMap::new(),
            next_enum_id: 0,
            loop_metadata: Vec::new(),
            loop_index: HashMap::new(),
            loop_stack: Vec::new(),
            next_loop_id: 0,
            match_metadata: Vec::new(),
            match_index: HashMap::new(),
        }
    }

    /// Run all three analysis passes over the program.
    pub fn analyze(&mut self, program: &'a Program) {
        let _span = tracing::debug_span!("analyze", file = %self.source_name).entered();

        // Pass 1: declare all functions at global scope.
        for stmt in &program.statements {
            if let StmtKind::Function(decl) = &stmt.kind {
                if self.scopes.is_defined_in_current(decl.name.sym) {
                    let name = self.symbol_name(decl.name.sym);
                    self.error(
                        decl.name.span,
                        format!("Function '{}' is already defined.", name),
                    );
                } else {
                    self.scopes
                        .define(decl.name.sym, SymbolKind::Function, decl.name.span);
                }
            }
        }

        // Pass 2: record signatures so calls check against later definitions.
        self.register_function_signatures(program);

        // Pass 3: analyze all statements and bodies.
        for stmt in &program.statements {
            self.analyze_stmt(stmt);
        }
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn interner(&self) -> &DefaultStringInterner {
        &self.interner
    }

    /// The analyzed type of an expression, if it was visited.
    pub fn type_of(&self, id: NodeId) -> Option<&Type> {
        self.expr_types.get(&id)
    }

    pub fn loop_metadata(&self) -> &[LoopMetadata] {
        &self.loop_metadata
    }

    pub fn loop_metadata_for(&self, stmt: NodeId) -> Option<&LoopMetadata> {
        self.loop_index.get(&stmt).map(|&i| &self.loop_metadata[i])
    }

    pub fn match_metadata(&self) -> &[MatchMetadata] {
        &self.match_metadata
    }

    pub fn match_metadata_for(&self, expr: NodeId) -> Option<&MatchMetadata> {
        self.match_index.get(&expr).map(|&i| &self.match_metadata[i])
    }

    /// Numeric element values cached for a vector literal.
    pub fn vector_literal_data(&self, expr: NodeId) -> Option<&[f32]> {
        self.vector_literal_data.get(&expr).map(|v| v.as_slice())
    }

    pub fn record_definitions(&self) -> &HashMap<Symbol, RecordInfo> {
        &self.record_definitions
    }

    pub fn enum_definitions(&self) -> &HashMap<Symbol, EnumInfo> {
        &self.enum_definitions
    }

    pub(crate) fn type_alias_info(&self, name: Symbol) -> Option<&AliasInfo<'a>> {
        self.type_aliases.get(&name)
    }

    /// Resolve a symbol to its text, owned.
    pub fn symbol_name(&self, sym: Symbol) -> String {
        self.interner.resolve(sym).unwrap_or("<sym>").to_string()
    }

    /// Render a type for diagnostics and metadata.
    pub fn type_to_string(&self, ty: &Type) -> String {
        types::display(ty, &self.interner)
    }

    // ============================================================
    // Diagnostics
    // ============================================================

    pub(crate) fn error(&mut self, span: Span, message: impl Into<String>) {
        self.had_error = true;
        self.diagnostics
            .push(Diagnostic::error(self.source_name.clone(), span, message));
    }

    // ============================================================
    // Statements
    // ============================================================

    fn analyze_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Expression { expr } => {
                self.evaluate_expression(expr, None);
            }
            StmtKind::Var { name, ty, init } => {
                self.analyze_binding(name, ty.as_ref(), init.as_ref(), "Variable", "variable");
            }
            StmtKind::Let { name, ty, init } => {
                self.analyze_binding(name, ty.as_ref(), Some(init), "Constant", "constant");
            }
            StmtKind::Block { statements } => {
                self.scopes.enter();
                for statement in statements {
                    self.analyze_stmt(statement);
                }
                self.scopes.exit();
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let anchor = Self::anchor_span(condition);
                self.expect_condition_bool(condition, anchor);
                self.analyze_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.analyze_stmt(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                let anchor = Self::anchor_span(condition);
                self.expect_condition_bool(condition, anchor);
                // While loops join the frame stack but carry no metadata.
                self.loop_stack.push(None);
                self.analyze_stmt(body);
                self.loop_stack.pop();
            }
            StmtKind::Loop(decl) => self.analyze_loop(stmt.id, decl),
            StmtKind::Break { keyword_span } => {
                if self.loop_stack.is_empty() {
                    self.error(*keyword_span, "Break statement outside of a loop.");
                }
            }
            StmtKind::Continue { keyword_span } => {
                if self.loop_stack.is_empty() {
                    self.error(*keyword_span, "Continue statement outside of a loop.");
                }
            }
            StmtKind::Return {
                keyword_span,
                value,
            } => self.analyze_return(*keyword_span, value.as_ref()),
            StmtKind::Function(decl) => self.analyze_function(decl),
            StmtKind::Module { .. } | StmtKind::Import { .. } => {}
            StmtKind::TypeAlias(decl) => self.analyze_type_alias(decl),
            StmtKind::Record(decl) => self.analyze_record(decl),
            StmtKind::Enum(decl) => self.analyze_enum(decl),
        }
    }

    fn analyze_binding(
        &mut self,
        name: &crate::ast::Ident,
        ty: Option<&'a TypeExpr>,
        init: Option<&'a Expr>,
        noun: &str,
        target_noun: &str,
    ) {
        if self.scopes.is_defined_in_current(name.sym) {
            let text = self.symbol_name(name.sym);
            self.error(
                name.span,
                format!("Variable '{}' is already defined in this scope.", text),
            );
            return;
        }

        let declared_type = match ty {
            Some(ty) => self.analyze_type_expr(ty, None),
            None => Type::unknown(),
        };
        let init_type = match init {
            Some(init) => self.evaluate_expression(init, Some(&declared_type)),
            None => Type::unknown(),
        };

        if declared_type.is_unknown() && init_type.is_unknown() {
            let text = self.symbol_name(name.sym);
            self.error(
                name.span,
                format!("{} '{}' requires a type annotation or initializer.", noun, text),
            );
        }

        let mut checked_declared = declared_type.clone();
        if !declared_type.is_unknown() && !init_type.is_unknown() {
            checked_declared = types::refine_generic_type(&declared_type, &init_type);
            if !types::is_assignable(&checked_declared, &init_type) {
                let init_text = self.type_to_string(&init_type);
                let declared_text = self.type_to_string(&declared_type);
                self.error(
                    name.span,
                    format!(
                        "Cannot assign initializer of type '{}' to {} of type '{}'.",
                        init_text, target_noun, declared_text
                    ),
                );
            }
        }

        let final_type = if declared_type.is_unknown() {
            init_type
        } else {
            checked_declared
        };
        self.scopes.define(name.sym, SymbolKind::Variable, name.span);
        if let Some(symbol) = self.scopes.resolve_mut(name.sym) {
            symbol.ty = final_type;
        }
    }

    fn analyze_loop(&mut self, id: NodeId, decl: &'a crate::ast::LoopStmt) {
        if decl.bound == BoundKind::None {
            self.error(
                decl.keyword_span,
                "Loops must be annotated with '@bounded(...)'.",
            );
        }
        if decl.bound == BoundKind::Static {
            let positive = decl.bound_value.map(|v| v > 0).unwrap_or(false);
            if !positive {
                self.error(
                    decl.keyword_span,
                    "Static loop bounds must be a positive integer.",
                );
            }
        }
        if decl.bound == BoundKind::Guarded {
            match &decl.guard {
                Some(guard) => {
                    self.expect_condition_bool(guard, decl.keyword_span);
                }
                None => {
                    self.error(
                        decl.keyword_span,
                        "Guarded loops must provide a guard expression.",
                    );
                }
            }
        }

        let depth = self.loop_stack.len() as i32;
        let meta = LoopMetadata {
            stmt: id,
            keyword_span: decl.keyword_span,
            bound: decl.bound,
            bound_value: decl.bound_value,
            depth,
            id: self.next_loop_id,
            source_file: self.source_name.clone(),
            guard_present: decl.bound == BoundKind::Guarded,
        };
        self.next_loop_id += 1;
        self.loop_index.insert(id, self.loop_metadata.len());
        self.loop_metadata.push(meta);

        self.loop_stack.push(Some(id));
        for statement in &decl.body {
            self.analyze_stmt(statement);
        }
        self.loop_stack.pop();
    }

    fn analyze_return(&mut self, keyword_span: Span, value: Option<&'a Expr>) {
        let Some(expected) = self.function_return_stack.last().cloned() else {
            self.error(keyword_span, "Return statement outside of a function.");
            return;
        };

        let Some(value) = value else {
            if expected.kind != TypeKind::Void {
                let expected_text = self.type_to_string(&expected);
                self.error(
                    keyword_span,
                    format!(
                        "Return type mismatch: expected '{}' but got 'void'.",
                        expected_text
                    ),
                );
            }
            return;
        };

        let value_type = self.evaluate_expression(value, Some(&expected));
        if !types::is_assignable(&expected, &value_type) {
            let expected_text = self.type_to_string(&expected);
            let value_text = self.type_to_string(&value_type);
            self.error(
                keyword_span,
                format!(
                    "Return type mismatch: expected '{}' but got '{}'.",
                    expected_text, value_text
                ),
            );
        }
    }

    fn analyze_function(&mut self, decl: &'a FnDecl) {
        if self.scopes.resolve(decl.name.sym).is_none() {
            self.scopes
                .define(decl.name.sym, SymbolKind::Function, decl.name.span);
        }
        let (return_type, param_types) = match self.scopes.resolve(decl.name.sym) {
            Some(symbol) => (symbol.ty.clone(), symbol.param_types.clone()),
            None => (Type::unknown(), Vec::new()),
        };

        self.scopes.enter();
        self.function_return_stack.push(return_type);

        if param_types.len() != decl.params.len() {
            self.error(
                decl.name.span,
                "Function parameter count mismatch between declaration and definition.",
            );
        }

        for (i, param) in decl.params.iter().enumerate() {
            let mut param_type = param_types.get(i).cloned().unwrap_or_else(Type::unknown);
            if param_type.is_unknown() {
                if let Some(ty) = &param.ty {
                    param_type = self.analyze_type_expr(ty, None);
                }
            }

            if self.scopes.is_defined_in_current(param.name.sym) {
                let text = self.symbol_name(param.name.sym);
                self.error(
                    param.name.span,
                    format!("Parameter '{}' is already defined.", text),
                );
            } else {
                self.scopes
                    .define(param.name.sym, SymbolKind::Variable, param.name.span);
                if let Some(symbol) = self.scopes.resolve_mut(param.name.sym) {
                    symbol.ty = param_type;
                }
            }
        }

        for statement in &decl.body {
            self.analyze_stmt(statement);
        }

        self.function_return_stack.pop();
        self.scopes.exit();
    }

    fn register_function_signatures(&mut self, program: &'a Program) {
        for stmt in &program.statements {
            let StmtKind::Function(decl) = &stmt.kind else {
                continue;
            };
            if self.scopes.resolve(decl.name.sym).is_none() {
                continue;
            }

            let mut param_types = Vec::with_capacity(decl.params.len());
            let mut param_error = false;
            for param in &decl.params {
                match &param.ty {
                    Some(ty) => param_types.push(self.analyze_type_expr(ty, None)),
                    None => {
                        param_error = true;
                        let text = self.symbol_name(param.name.sym);
                        self.error(
                            param.name.span,
                            format!("Parameter '{}' is missing a type annotation.", text),
                        );
                        param_types.push(Type::error());
                    }
                }
            }

            let return_type = match &decl.return_type {
                Some(ty) => self.analyze_type_expr(ty, None),
                None => Type::new(TypeKind::Void),
            };

            if let Some(symbol) = self.scopes.resolve_mut(decl.name.sym) {
                symbol.param_types = param_types;
                symbol.ty = return_type;
                symbol.is_defined = !param_error;
            }
        }
    }

    fn analyze_type_alias(&mut self, decl: &'a TypeAliasDecl) {
        let arity = decl.params.len();
        match self.generic_arities.get(&decl.name.sym) {
            None => {
                self.generic_arities.insert(decl.name.sym, arity);
            }
            Some(&expected) if expected != arity => {
                let name = self.symbol_name(decl.name.sym);
                self.error(
                    decl.name.span,
                    format!(
                        "Generic type '{}' expects {} parameters but got {}.",
                        name, expected, arity
                    ),
                );
            }
            _ => {}
        }

        if !self.defined_generics.insert(decl.name.sym) {
            let name = self.symbol_name(decl.name.sym);
            self.error(
                decl.name.span,
                format!("Generic type '{}' is already defined.", name),
            );
        }

        if let Some(alias) = &decl.alias {
            let info = AliasInfo {
                params: decl.params.iter().map(|p| p.sym).collect(),
                alias: Some(alias),
            };
            self.type_aliases.insert(decl.name.sym, info);
            self.analyze_type_expr(alias, None);
        }
    }

    fn analyze_record(&mut self, decl: &'a RecordDecl) {
        if self.record_definitions.contains_key(&decl.name.sym) {
            let name = self.symbol_name(decl.name.sym);
            self.error(
                decl.name.span,
                format!("Record '{}' is already defined.", name),
            );
            return;
        }

        let mut info = RecordInfo {
            schema_version: 1,
            ..Default::default()
        };
        let mut had_error = false;

        for field in &decl.fields {
            let Some(field_ty) = &field.ty else {
                let field_name = self.symbol_name(field.name.sym);
                self.error(
                    field.name.span,
                    format!("Field '{}' requires a type.", field_name),
                );
                had_error = true;
                continue;
            };
            if info.field_map.contains_key(&field.name.sym) {
                let field_name = self.symbol_name(field.name.sym);
                let record_name = self.symbol_name(decl.name.sym);
                self.error(
                    field.name.span,
                    format!(
                        "Field '{}' is already declared in record '{}'.",
                        field_name, record_name
                    ),
                );
                had_error = true;
                continue;
            }

            let field_type = self.analyze_type_expr(field_ty, None);
            info.fields.push(RecordFieldInfo {
                name: field.name.sym,
                ty: field_type.clone(),
                span: field.name.span,
            });
            info.field_map.insert(field.name.sym, field_type);
        }

        if !had_error {
            if let Some(version) = decl.schema_version.filter(|&v| v > 0) {
                info.schema_version = version as u32;
            }
            info.module_path = decl
                .module_path
                .clone()
                .unwrap_or_else(|| self.source_name.clone());
            self.record_definitions.insert(decl.name.sym, info);
        }
    }

    fn analyze_enum(&mut self, decl: &'a EnumDecl) {
        if self.enum_definitions.contains_key(&decl.name.sym) {
            let name = self.symbol_name(decl.name.sym);
            self.error(decl.name.span, format!("Enum '{}' is already defined.", name));
            return;
        }

        let mut info = EnumInfo {
            id: self.next_enum_id,
            schema_version: 1,
            ..Default::default()
        };
        self.next_enum_id += 1;
        let mut had_error = false;

        for variant in &decl.variants {
            if info.variants.contains_key(&variant.name.sym) {
                let variant_name = self.symbol_name(variant.name.sym);
                let enum_name = self.symbol_name(decl.name.sym);
                self.error(
                    variant.name.span,
                    format!(
                        "Variant '{}' already exists in enum '{}'.",
                        variant_name, enum_name
                    ),
                );
                had_error = true;
                continue;
            }

            let payload = variant
                .payload
                .as_ref()
                .map(|ty| self.analyze_type_expr(ty, None));
            info.variants.insert(
                variant.name.sym,
                EnumVariantInfo {
                    payload,
                    id: info.variant_order.len() as i32,
                },
            );
            info.variant_order.push(variant.name.sym);
        }

        if !had_error {
            if let Some(version) = decl.schema_version.filter(|&v| v > 0) {
                info.schema_version = version as u32;
            }
            info.module_path = decl
                .module_path
                .clone()
                .unwrap_or_else(|| self.source_name.clone());
            self.enum_definitions.insert(decl.name.sym, info);
        }
    }

    // ============================================================
    // Type expressions
    // ============================================================

    pub(crate) fn analyze_type_expr(
        &mut self,
        expr: &'a TypeExpr,
        env: Option<&HashMap<Symbol, Type>>,
    ) -> Type {
        match expr {
            TypeExpr::Simple { name } => self.type_from_name(name, env),
            TypeExpr::Generic { name, args } => self.analyze_generic_type(name, args, env),
        }
    }

    fn type_from_name(&mut self, name: &TypeName, env: Option<&HashMap<Symbol, Type>>) -> Type {
        match name.token {
            TokenKind::Void => return Type::new(TypeKind::Void),
            TokenKind::Bool => return Type::new(TypeKind::Bool),
            TokenKind::I2 => return Type::new(TypeKind::I2),
            TokenKind::I8 => return Type::new(TypeKind::I8),
            TokenKind::I16 => return Type::new(TypeKind::I16),
            TokenKind::I32 => return Type::new(TypeKind::I32),
            TokenKind::T81BigInt => return Type::new(TypeKind::BigInt),
            TokenKind::T81Float => return Type::new(TypeKind::Float),
            TokenKind::T81Fraction => return Type::new(TypeKind::Fraction),
            TokenKind::Vector => return Type::new(TypeKind::Vector),
            TokenKind::Matrix => return Type::new(TypeKind::Matrix),
            TokenKind::Tensor => return Type::new(TypeKind::Tensor),
            TokenKind::Graph => return Type::new(TypeKind::Graph),
            _ => {}
        }

        if let Some(env) = env {
            if let Some(bound) = env.get(&name.sym) {
                return bound.clone();
            }
        }

        let text = self.symbol_name(name.sym);
        match text.as_str() {
            "Option" => Type::new(TypeKind::Option),
            "Result" => Type::new(TypeKind::Result),
            "T81String" => Type::new(TypeKind::String),
            // The surface spelling of the canonical integer type.
            "T81Int" => Type::new(TypeKind::I32),
            _ => {
                // A zero-parameter alias resolves through its body.
                if let Some(info) = self.type_aliases.get(&name.sym) {
                    if info.params.is_empty() {
                        let alias_info = info.clone();
                        return self.instantiate_alias(&alias_info, Vec::new(), name);
                    }
                }
                Type::custom(name.sym)
            }
        }
    }

    fn analyze_generic_type(
        &mut self,
        name: &TypeName,
        args: &'a [GenericArg],
        env: Option<&HashMap<Symbol, Type>>,
    ) -> Type {
        let mut params = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            match arg {
                GenericArg::Type(ty) => params.push(self.analyze_type_expr(ty, env)),
                GenericArg::Const(expr) => {
                    if i == 0 {
                        self.error(name.span, "The first generic parameter must be a type.");
                        params.push(Type::error());
                        continue;
                    }
                    if let ExprKind::Variable { name: var } = &expr.kind {
                        if let Some(env) = env {
                            if let Some(bound) = env.get(&var.sym) {
                                params.push(bound.clone());
                                continue;
                            }
                        }
                    }
                    match self.constant_type_from_expr(expr) {
                        Some(constant) => params.push(constant),
                        None => {
                            self.error(
                                name.span,
                                "Generic constant parameters must be integer literals or identifiers.",
                            );
                            params.push(Type::error());
                        }
                    }
                }
            }
        }

        let expected = self.current_expected_type().cloned();

        if params.is_empty() {
            self.error(name.span, "Generic type requires at least one parameter.");
            return Type::error();
        }
        if params[0].kind == TypeKind::Constant {
            self.error(name.span, "The first generic parameter must be a type.");
            return Type::error();
        }

        let text = self.symbol_name(name.sym);
        if text == "Option" {
            if params.len() != 1 {
                self.error(
                    name.span,
                    format!(
                        "The 'Option' type expects exactly one type parameter, but got {}.",
                        params.len()
                    ),
                );
            }
            let mut result = Type::with_params(TypeKind::Option, vec![params[0].clone()]);
            types::merge_expected_params(&mut result, expected.as_ref());
            return result;
        }
        if text == "Result" {
            if params.len() != 2 {
                self.error(
                    name.span,
                    format!(
                        "The 'Result' type expects exactly two type parameters, but got {}.",
                        params.len()
                    ),
                );
            }
            let success = params.first().cloned().unwrap_or_else(Type::unknown);
            let err = params.get(1).cloned().unwrap_or_else(Type::unknown);
            let mut result = Type::with_params(TypeKind::Result, vec![success, err]);
            types::merge_expected_params(&mut result, expected.as_ref());
            return result;
        }

        if let Some(alias) = self.type_aliases.get(&name.sym) {
            let alias_info = alias.clone();
            let mut alias_type = self.instantiate_alias(&alias_info, params, name);
            types::merge_expected_params(&mut alias_type, expected.as_ref());
            self.enforce_generic_arity(&alias_type, name.span);
            return alias_type;
        }

        let mut base = self.type_from_name(name, env);
        base.params = params;
        types::merge_expected_params(&mut base, expected.as_ref());
        self.enforce_generic_arity(&base, name.span);
        base
    }

    fn instantiate_alias(
        &mut self,
        alias: &AliasInfo<'a>,
        params: Vec<Type>,
        name: &TypeName,
    ) -> Type {
        if alias.params.len() != params.len() {
            let text = self.symbol_name(name.sym);
            self.error(
                name.span,
                format!(
                    "Generic type '{}' expects {} parameters but got {}.",
                    text,
                    alias.params.len(),
                    params.len()
                ),
            );
            return Type::error();
        }
        let Some(alias_expr) = alias.alias else {
            return Type::error();
        };
        if self.alias_depth > 32 {
            return Type::error();
        }

        let env: HashMap<Symbol, Type> = alias
            .params
            .iter()
            .copied()
            .zip(params.into_iter())
            .collect();

        self.alias_depth += 1;
        let result = self.analyze_type_expr(alias_expr, Some(&env));
        self.alias_depth -= 1;
        result
    }

    fn enforce_generic_arity(&mut self, ty: &Type, span: Span) {
        if ty.kind != TypeKind::Custom {
            return;
        }
        let Some(name) = ty.name else {
            return;
        };
        let arity = ty.params.len();
        match self.generic_arities.get(&name) {
            None => {
                self.generic_arities.insert(name, arity);
            }
            Some(&expected) if expected != arity => {
                let text = self.symbol_name(name);
                self.error(
                    span,
                    format!(
                        "Generic type '{}' expects {} parameters but got {}.",
                        text, expected, arity
                    ),
                );
            }
            _ => {}
        }
    }

    fn constant_type_from_expr(&mut self, expr: &Expr) -> Option<Type> {
        match &expr.kind {
            ExprKind::Literal(lit) => match lit.kind {
                crate::ast::LitKind::Int { .. } => Some(Type::constant(lit.text)),
                _ => None,
            },
            ExprKind::Variable { name } => Some(Type::constant(name.sym)),
            _ => None,
        }
    }

    // ============================================================
    // Shared expression helpers
    // ============================================================

    /// The diagnostic anchor for an expression, mirroring how operator and
    /// name tokens anchor messages.
    pub(crate) fn anchor_span(expr: &Expr) -> Span {
        match &expr.kind {
            ExprKind::Binary { op_span, .. } => *op_span,
            ExprKind::Unary { op_span, .. } => *op_span,
            ExprKind::Literal(lit) => lit.span,
            ExprKind::Variable { name } => name.span,
            ExprKind::Assign { name, .. } => name.span,
            ExprKind::Call { callee, .. } => Self::anchor_span(callee),
            ExprKind::Grouping(inner) => Self::anchor_span(inner),
            _ => expr.span,
        }
    }

    /// Source-like rendering of an expression, used for guard breadcrumbs.
    pub(crate) fn expr_to_string(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Literal(lit) => self.symbol_name(lit.text),
            ExprKind::Variable { name } => self.symbol_name(name.sym),
            ExprKind::Binary {
                op, left, right, ..
            } => format!(
                "{} {} {}",
                self.expr_to_string(left),
                op.symbol(),
                self.expr_to_string(right)
            ),
            ExprKind::Grouping(inner) => format!("({})", self.expr_to_string(inner)),
            ExprKind::FieldAccess { object, field } => format!(
                "{}.{}",
                self.expr_to_string(object),
                self.symbol_name(field.sym)
            ),
            ExprKind::Call { callee, args } => {
                let rendered: Vec<String> = args.iter().map(|a| self.expr_to_string(a)).collect();
                format!("{}({})", self.expr_to_string(callee), rendered.join(", "))
            }
            _ => "<expr>".to_string(),
        }
    }

    /// Source-like rendering of a type expression, used for alias metadata.
    pub(crate) fn type_expr_to_string(&self, expr: &TypeExpr) -> String {
        match expr {
            TypeExpr::Simple { name } => self.symbol_name(name.sym),
            TypeExpr::Generic { name, args } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        GenericArg::Type(ty) => self.type_expr_to_string(ty),
                        GenericArg::Const(expr) => self.expr_to_string(expr),
                    })
                    .collect();
                format!("{}[{}]", self.symbol_name(name.sym), rendered.join(", "))
            }
        }
    }
}
