//! Scoped symbol table for semantic analysis.

use super::types::Type;
use crate::ast::Symbol;
use crate::span::Span;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
}

/// A resolved name: its kind, declaration site, and type information.
/// For functions `ty` is the return type and `param_types` the signature.
#[derive(Debug, Clone)]
pub struct SemanticSymbol {
    pub kind: SymbolKind,
    pub declaration: Span,
    pub ty: Type,
    pub param_types: Vec<Type>,
    pub is_defined: bool,
}

/// A stack of name → symbol maps; resolution walks innermost-out.
pub struct ScopeStack {
    scopes: Vec<HashMap<Symbol, SemanticSymbol>>,
}

impl ScopeStack {
    /// A fresh stack holding only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit(&mut self) {
        if !self.scopes.is_empty() {
            self.scopes.pop();
        }
    }

    /// Define (or overwrite) `name` in the innermost scope.
    pub fn define(&mut self, name: Symbol, kind: SymbolKind, declaration: Span) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name,
                SemanticSymbol {
                    kind,
                    declaration,
                    ty: Type::unknown(),
                    param_types: Vec::new(),
                    is_defined: false,
                },
            );
        }
    }

    pub fn resolve(&self, name: Symbol) -> Option<&SemanticSymbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&name))
    }

    pub fn resolve_mut(&mut self, name: Symbol) -> Option<&mut SemanticSymbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(&name))
    }

    pub fn is_defined_in_current(&self, name: Symbol) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains_key(&name))
            .unwrap_or(false)
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}
