//! Match-expression checking: arm structure against the scrutinee's variant
//! set, payload pattern binding, guard typing, and arm type agreement.

use super::types::{self, Type, TypeKind};
use super::{MatchArmInfo, MatchKind, MatchMetadata, SemanticAnalyzer, SymbolKind};
use crate::ast::{Expr, Ident, MatchArm, MatchPattern, PatternKind, Symbol};
use std::collections::{HashMap, HashSet};

struct VariantMeta {
    payload: Option<Type>,
    id: i32,
    enum_id: i32,
}

impl<'a> SemanticAnalyzer<'a> {
    pub(super) fn analyze_match(
        &mut self,
        expr: &'a Expr,
        scrutinee: &'a Expr,
        arms: &'a [MatchArm],
    ) -> Type {
        let scrutinee_type = self.evaluate_expression(scrutinee, None);
        let scrutinee_anchor = Self::anchor_span(scrutinee);

        let is_option = scrutinee_type.kind == TypeKind::Option;
        let is_result = scrutinee_type.kind == TypeKind::Result;
        let is_enum = scrutinee_type.kind == TypeKind::Custom;

        let mut allowed_variants: HashMap<Symbol, VariantMeta> = HashMap::new();
        let mut required_variants: Vec<Symbol> = Vec::new();
        let match_label;

        let sym_some = self.intern_name("Some");
        let sym_none = self.intern_name("None");
        let sym_ok = self.intern_name("Ok");
        let sym_err = self.intern_name("Err");

        if is_option {
            match_label = "Option";
            let payload = scrutinee_type.param(0);
            allowed_variants.insert(
                sym_some,
                VariantMeta {
                    payload: Some(payload),
                    id: 0,
                    enum_id: -1,
                },
            );
            allowed_variants.insert(
                sym_none,
                VariantMeta {
                    payload: None,
                    id: 1,
                    enum_id: -1,
                },
            );
            required_variants = vec![sym_some, sym_none];
        } else if is_result {
            match_label = "Result";
            allowed_variants.insert(
                sym_ok,
                VariantMeta {
                    payload: Some(scrutinee_type.param(0)),
                    id: 0,
                    enum_id: -1,
                },
            );
            allowed_variants.insert(
                sym_err,
                VariantMeta {
                    payload: Some(scrutinee_type.param(1)),
                    id: 1,
                    enum_id: -1,
                },
            );
            required_variants = vec![sym_ok, sym_err];
        } else if is_enum {
            match_label = "Enum";
            let Some(enum_sym) = scrutinee_type.name else {
                self.error(scrutinee_anchor, "Match expressions require Option[T], Result[T, E], or enum values.");
                return Type::error();
            };
            let Some(info) = self.enum_definitions.get(&enum_sym) else {
                let text = self.symbol_name(enum_sym);
                self.error(
                    scrutinee_anchor,
                    format!("Type '{}' is not a known enum.", text),
                );
                return Type::error();
            };
            for (idx, &variant_sym) in info.variant_order.iter().enumerate() {
                let payload = info
                    .variants
                    .get(&variant_sym)
                    .and_then(|v| v.payload.clone());
                allowed_variants.insert(
                    variant_sym,
                    VariantMeta {
                        payload,
                        id: idx as i32,
                        enum_id: info.id,
                    },
                );
                required_variants.push(variant_sym);
            }
        } else {
            self.error(
                scrutinee_anchor,
                "Match expressions require Option[T], Result[T, E], or enum values.",
            );
            return Type::error();
        }

        let contextual_expected = self.current_expected_type().cloned();
        let mut result_type = contextual_expected.clone().unwrap_or_else(Type::unknown);
        let mut result_type_locked = contextual_expected
            .map(|t| !t.is_unknown())
            .unwrap_or(false);

        let mut structural_error = false;
        let mut saw_some = false;
        let mut saw_none = false;
        let mut saw_ok = false;
        let mut saw_err = false;
        let mut seen_variants: HashSet<Symbol> = HashSet::new();
        let mut variants_with_no_guard: HashSet<Symbol> = HashSet::new();
        let mut arm_infos: Vec<MatchArmInfo> = Vec::new();
        let scrutinee_text = self.type_to_string(&scrutinee_type);

        for arm in arms {
            let name_sym = arm.variant.sym;
            let Some(variant_meta) = allowed_variants.get(&name_sym) else {
                let variant_text = self.symbol_name(name_sym);
                self.error(
                    arm.variant.span,
                    format!(
                        "Variant '{}' is not part of '{}'.",
                        variant_text, scrutinee_text
                    ),
                );
                structural_error = true;
                continue;
            };
            let variant_payload = variant_meta.payload.clone();
            let variant_id = variant_meta.id;
            let enum_id = variant_meta.enum_id;

            saw_some |= name_sym == sym_some;
            saw_none |= name_sym == sym_none;
            saw_ok |= name_sym == sym_ok;
            saw_err |= name_sym == sym_err;

            let has_guard = arm.guard.is_some();
            if !has_guard && !variants_with_no_guard.insert(name_sym) {
                let variant_text = self.symbol_name(name_sym);
                self.error(
                    arm.variant.span,
                    format!("Duplicate match arm for '{}' without a guard.", variant_text),
                );
                structural_error = true;
            }
            seen_variants.insert(name_sym);

            let pattern_kind = arm.pattern.kind();
            let payload_type = variant_payload.clone().unwrap_or_else(Type::unknown);

            if variant_payload.is_some() && pattern_kind == PatternKind::None {
                let variant_text = self.symbol_name(name_sym);
                self.error(
                    arm.variant.span,
                    format!("Variant '{}' requires a binding.", variant_text),
                );
                structural_error = true;
                continue;
            }
            if variant_payload.is_none() && pattern_kind != PatternKind::None {
                let variant_text = self.symbol_name(name_sym);
                self.error(
                    arm.variant.span,
                    format!("Variant '{}' does not accept a binding.", variant_text),
                );
                structural_error = true;
                continue;
            }

            self.scopes.enter();
            let pattern_valid = if variant_payload.is_some() {
                match pattern_kind {
                    PatternKind::Variant => self.analyze_nested_variant(&arm.pattern, &payload_type),
                    PatternKind::None => true,
                    _ => self.bind_pattern_payload(&arm.pattern, &payload_type, &arm.variant),
                }
            } else {
                true
            };

            if !pattern_valid {
                self.scopes.exit();
                structural_error = true;
                continue;
            }

            let mut arm_info = MatchArmInfo {
                variant: name_sym,
                pattern_kind,
                has_guard,
                payload_type: if variant_payload.is_some() {
                    payload_type.clone()
                } else {
                    Type::unknown()
                },
                arm_type: Type::unknown(),
                variant_id,
                enum_id,
                enum_name: scrutinee_text.clone(),
                guard_expression: String::new(),
            };

            if let Some(guard) = &arm.guard {
                let anchor = Self::anchor_span(guard);
                self.expect_condition_bool(guard, anchor);
                arm_info.guard_expression = self.expr_to_string(guard);
            }

            let arm_expected = result_type_locked.then(|| result_type.clone());
            let arm_type = self.evaluate_expression(&arm.body, arm_expected.as_ref());
            self.scopes.exit();

            if !result_type_locked && !arm_type.is_unknown() {
                result_type = arm_type.clone();
                result_type_locked = true;
            }

            if result_type_locked
                && !arm_type.is_unknown()
                && !types::is_assignable(&result_type, &arm_type)
            {
                self.error(
                    arm.variant.span,
                    "All match arms must produce the same type.",
                );
                structural_error = true;
            }

            arm_info.arm_type = arm_type;
            arm_infos.push(arm_info);
        }

        let kind = if is_option {
            MatchKind::Option
        } else if is_result {
            MatchKind::Result
        } else {
            MatchKind::Enum
        };
        let meta = MatchMetadata {
            expr: expr.id,
            result_type: result_type.clone(),
            kind,
            has_some: saw_some,
            has_none: saw_none,
            has_ok: saw_ok,
            has_err: saw_err,
            guard_present: arm_infos.iter().any(|info| info.has_guard),
            arms: arm_infos,
        };
        self.match_index.insert(expr.id, self.match_metadata.len());
        self.match_metadata.push(meta);

        for &required in &required_variants {
            if !seen_variants.contains(&required) {
                let variant_text = self.symbol_name(required);
                self.error(
                    scrutinee_anchor,
                    format!(
                        "{} match on '{}' requires '{}' arm.",
                        match_label, scrutinee_text, variant_text
                    ),
                );
                structural_error = true;
            }
        }

        if structural_error {
            return Type::error();
        }
        result_type
    }

    // ============================================================
    // Pattern payload binding
    // ============================================================

    fn bind_pattern_payload(
        &mut self,
        pattern: &MatchPattern,
        payload_type: &Type,
        keyword: &Ident,
    ) -> bool {
        match pattern {
            MatchPattern::Identifier { name, is_wildcard } => {
                if !is_wildcard {
                    self.bind_pattern_symbol(name, payload_type.clone());
                }
                true
            }
            MatchPattern::Tuple { bindings } => {
                let variant_text = self.symbol_name(keyword.sym);
                if payload_type.params.is_empty() {
                    self.error(
                        keyword.span,
                        format!(
                            "Tuple pattern for variant '{}' lacks payload type information.",
                            variant_text
                        ),
                    );
                    return false;
                }
                if payload_type.params.len() != bindings.len() {
                    self.error(
                        keyword.span,
                        format!(
                            "Tuple pattern for variant '{}' expects {} fields but payload has {}.",
                            variant_text,
                            bindings.len(),
                            payload_type.params.len()
                        ),
                    );
                    return false;
                }
                for (binding, param) in bindings.iter().zip(payload_type.params.iter()) {
                    self.bind_pattern_symbol(binding, param.clone());
                }
                true
            }
            MatchPattern::Record { bindings } => {
                let variant_text = self.symbol_name(keyword.sym);
                let (TypeKind::Custom, Some(record_sym)) = (payload_type.kind, payload_type.name)
                else {
                    self.error(
                        keyword.span,
                        format!(
                            "Record pattern for variant '{}' requires a record payload.",
                            variant_text
                        ),
                    );
                    return false;
                };
                let Some(info) = self.record_definitions.get(&record_sym).cloned() else {
                    let record_text = self.symbol_name(record_sym);
                    self.error(
                        keyword.span,
                        format!(
                            "Variant '{}' payload '{}' is not a known record.",
                            variant_text, record_text
                        ),
                    );
                    return false;
                };
                let mut ok = true;
                for binding in bindings {
                    let Some(field_type) = info.field_map.get(&binding.field.sym) else {
                        let record_text = self.symbol_name(record_sym);
                        let field_text = self.symbol_name(binding.field.sym);
                        self.error(
                            binding.field.span,
                            format!("Record '{}' has no field '{}'.", record_text, field_text),
                        );
                        ok = false;
                        continue;
                    };
                    let field_type = field_type.clone();
                    self.bind_pattern_symbol(&binding.binding, field_type);
                }
                ok
            }
            _ => {
                self.error(keyword.span, "Unsupported pattern kind for variant payload.");
                false
            }
        }
    }

    fn analyze_nested_variant(&mut self, pattern: &MatchPattern, payload_type: &Type) -> bool {
        let MatchPattern::Variant { name, payload } = pattern else {
            return false;
        };
        let variant_text = self.symbol_name(name.sym);

        let (TypeKind::Custom, Some(enum_sym)) = (payload_type.kind, payload_type.name) else {
            self.error(
                name.span,
                format!("Variant '{}' requires an enum payload.", variant_text),
            );
            return false;
        };
        let Some(info) = self.enum_definitions.get(&enum_sym) else {
            let enum_text = self.symbol_name(enum_sym);
            self.error(name.span, format!("Enum '{}' is not defined.", enum_text));
            return false;
        };
        let Some(variant_info) = info.variants.get(&name.sym) else {
            let enum_text = self.symbol_name(enum_sym);
            self.error(
                name.span,
                format!("Variant '{}' is not part of '{}'.", variant_text, enum_text),
            );
            return false;
        };
        let variant_payload = variant_info.payload.clone();

        let Some(nested) = payload else {
            if variant_payload.is_some() {
                self.error(
                    name.span,
                    format!("Variant '{}' requires a binding.", variant_text),
                );
                return false;
            }
            return true;
        };
        let Some(variant_payload) = variant_payload else {
            self.error(
                name.span,
                format!("Variant '{}' does not accept a binding.", variant_text),
            );
            return false;
        };
        self.bind_pattern_payload(nested, &variant_payload, name)
    }

    fn bind_pattern_symbol(&mut self, name: &Ident, ty: Type) {
        if self.symbol_name(name.sym) == "_" {
            return;
        }
        self.scopes.define(name.sym, SymbolKind::Variable, name.span);
        if let Some(symbol) = self.scopes.resolve_mut(name.sym) {
            symbol.ty = ty;
        }
    }

    fn intern_name(&mut self, name: &str) -> Symbol {
        self.interner.get_or_intern(name)
    }
}
