//! Expression typing: the numeric lattice joins, expected-type propagation,
//! contextual constructors (`Some`/`None`/`Ok`/`Err`), the `weights.load`
//! builtin, calls, field access, and record/enum/vector literals.

use super::types::{self, Type, TypeKind};
use super::{SemanticAnalyzer, SymbolKind};
use crate::ast::{BinaryOp, Expr, ExprKind, Ident, LitKind, RecordLiteralField, UnaryOp};
use crate::span::Span;

impl<'a> SemanticAnalyzer<'a> {
    /// Analyze an expression under an optional expected type, caching the
    /// resulting type by node id.
    pub(crate) fn evaluate_expression(&mut self, expr: &'a Expr, expected: Option<&Type>) -> Type {
        self.expected_type_stack.push(expected.cloned());
        let ty = self.analyze_expr(expr);
        self.expected_type_stack.pop();
        self.expr_types.insert(expr.id, ty.clone());
        ty
    }

    pub(crate) fn current_expected_type(&self) -> Option<&Type> {
        self.expected_type_stack.last().and_then(|slot| slot.as_ref())
    }

    fn analyze_expr(&mut self, expr: &'a Expr) -> Type {
        match &expr.kind {
            ExprKind::Binary {
                op,
                op_span,
                left,
                right,
            } => self.analyze_binary(*op, *op_span, left, right),
            ExprKind::Unary {
                op,
                op_span,
                operand,
            } => self.analyze_unary(*op, *op_span, operand),
            ExprKind::Literal(lit) => match lit.kind {
                LitKind::Bool(_) => Type::bool(),
                LitKind::Int { .. } => Type::new(TypeKind::I32),
                LitKind::Float { .. } => Type::new(TypeKind::Float),
                LitKind::Str { .. } => Type::new(TypeKind::String),
            },
            ExprKind::Grouping(inner) => self.evaluate_expression(inner, None),
            ExprKind::Variable { name } => self.analyze_variable(name),
            ExprKind::Call { callee, args } => self.analyze_call(callee, args),
            ExprKind::Assign { name, value } => self.analyze_assign(name, value),
            ExprKind::Match { scrutinee, arms } => self.analyze_match(expr, scrutinee, arms),
            ExprKind::VectorLiteral { elements } => self.analyze_vector_literal(expr, elements),
            ExprKind::FieldAccess { object, field } => self.analyze_field_access(object, field),
            ExprKind::RecordLiteral { type_name, fields } => {
                self.analyze_record_literal(type_name, fields)
            }
            ExprKind::EnumLiteral {
                enum_name,
                variant,
                payload,
            } => self.analyze_enum_literal(enum_name, variant, payload.as_deref()),
            ExprKind::TypeRef(ty) => self.analyze_type_expr(ty, None),
        }
    }

    // ============================================================
    // Operators
    // ============================================================

    fn analyze_binary(
        &mut self,
        op: BinaryOp,
        op_span: Span,
        left: &'a Expr,
        right: &'a Expr,
    ) -> Type {
        let left_type = self.evaluate_expression(left, None);
        let right_type = self.evaluate_expression(right, None);

        if op.is_arithmetic() {
            return self.widen_numeric(&left_type, &right_type, op, op_span);
        }
        if op.is_ordering() {
            if self
                .deduce_numeric_type(&left_type, &right_type, op_span, true)
                .is_none()
            {
                return Type::error();
            }
            return Type::bool();
        }
        if op.is_equality() {
            if left_type == right_type {
                return Type::bool();
            }
            if self
                .deduce_numeric_type(&left_type, &right_type, op_span, false)
                .is_some()
            {
                return Type::bool();
            }
            let left_text = self.type_to_string(&left_type);
            let right_text = self.type_to_string(&right_type);
            self.error(
                op_span,
                format!(
                    "Invalid operands for equality check. Cannot compare '{}' with '{}'.",
                    left_text, right_text
                ),
            );
            return Type::error();
        }
        // Logical operators.
        if !types::is_assignable(&Type::bool(), &left_type)
            || !types::is_assignable(&Type::bool(), &right_type)
        {
            self.error(op_span, "Logical operators require boolean operands.");
            return Type::error();
        }
        Type::bool()
    }

    fn analyze_unary(&mut self, op: UnaryOp, op_span: Span, operand: &'a Expr) -> Type {
        let operand_type = self.evaluate_expression(operand, None);
        match op {
            UnaryOp::Not => {
                if !types::is_assignable(&Type::bool(), &operand_type) {
                    self.error(op_span, "Logical not requires a boolean operand.");
                    return Type::error();
                }
                Type::bool()
            }
            UnaryOp::Neg => {
                if !operand_type.is_numeric() {
                    self.error(op_span, "Unary minus requires a numeric operand.");
                    return Type::error();
                }
                operand_type
            }
        }
    }

    /// The numeric join for arithmetic, with the integer-only rule for `%`.
    fn widen_numeric(&mut self, left: &Type, right: &Type, op: BinaryOp, op_span: Span) -> Type {
        if left.is_error() || right.is_error() {
            return Type::error();
        }
        if left.is_unknown() || right.is_unknown() {
            return Type::unknown();
        }
        if op == BinaryOp::Rem && (!left.is_integer() || !right.is_integer()) {
            let left_text = self.type_to_string(left);
            let right_text = self.type_to_string(right);
            self.error(
                op_span,
                format!(
                    "Modulo requires integer operands, got '{}' and '{}'.",
                    left_text, right_text
                ),
            );
            return Type::error();
        }

        let Some(deduced) = self.deduce_numeric_type(left, right, op_span, true) else {
            return Type::error();
        };
        if op == BinaryOp::Rem && !deduced.is_integer() {
            return Type::error();
        }
        deduced
    }

    /// Deduce the joined numeric type of two operands, or report (when
    /// `report` is set) and return `None` when the lattice has no join.
    pub(crate) fn deduce_numeric_type(
        &mut self,
        left: &Type,
        right: &Type,
        op_span: Span,
        report: bool,
    ) -> Option<Type> {
        if left.is_error() || right.is_error() {
            return Some(Type::error());
        }
        if left.is_unknown() || right.is_unknown() {
            return Some(Type::unknown());
        }
        if !left.is_primitive_numeric() || !right.is_primitive_numeric() {
            if report {
                let left_text = self.type_to_string(left);
                let right_text = self.type_to_string(right);
                self.error(
                    op_span,
                    format!(
                        "Operands must be primitive numeric types, got '{}' and '{}'.",
                        left_text, right_text
                    ),
                );
            }
            return None;
        }

        if left.is_integer() && right.is_integer() {
            return Some(if left.numeric_rank() >= right.numeric_rank() {
                left.clone()
            } else {
                right.clone()
            });
        }
        if left.is_integer() && right.is_float() {
            return Some(right.clone());
        }
        if right.is_integer() && left.is_float() {
            return Some(left.clone());
        }
        if left.is_integer() && right.is_fraction() {
            return Some(right.clone());
        }
        if right.is_integer() && left.is_fraction() {
            return Some(left.clone());
        }
        if left.is_float() && right.is_float() {
            return Some(left.clone());
        }
        if left.is_fraction() && right.is_fraction() {
            return Some(left.clone());
        }

        if report {
            let left_text = self.type_to_string(left);
            let right_text = self.type_to_string(right);
            self.error(
                op_span,
                format!(
                    "Operands must share a primitive numeric type (T81Int, T81Float, or \
                     T81Fraction) or widen deterministically from T81Int. Got '{}' and '{}'.",
                    left_text, right_text
                ),
            );
        }
        None
    }

    /// Check a condition expression against `bool`.
    pub(crate) fn expect_condition_bool(&mut self, expr: &'a Expr, anchor: Span) -> Type {
        let cond_type = self.evaluate_expression(expr, None);
        if !types::is_assignable(&Type::bool(), &cond_type) {
            let cond_text = self.type_to_string(&cond_type);
            self.error(
                anchor,
                format!("Condition must be bool, found '{}'.", cond_text),
            );
            return Type::error();
        }
        Type::bool()
    }

    // ============================================================
    // Names and assignment
    // ============================================================

    fn analyze_variable(&mut self, name: &Ident) -> Type {
        let text = self.symbol_name(name.sym);
        if matches!(text.as_str(), "Some" | "None" | "Ok" | "Err") {
            return Type::unknown();
        }

        match self.scopes.resolve(name.sym) {
            Some(symbol) => symbol.ty.clone(),
            None => {
                self.error(name.span, format!("Undefined variable '{}'.", text));
                Type::error()
            }
        }
    }

    fn analyze_assign(&mut self, name: &Ident, value: &'a Expr) -> Type {
        let Some(symbol) = self.scopes.resolve(name.sym) else {
            let text = self.symbol_name(name.sym);
            self.error(name.span, format!("Undefined variable '{}'.", text));
            self.evaluate_expression(value, None);
            return Type::error();
        };
        let symbol_kind = symbol.kind;
        let symbol_type = symbol.ty.clone();

        if symbol_kind != SymbolKind::Variable {
            let text = self.symbol_name(name.sym);
            self.error(
                name.span,
                format!("Cannot assign to non-variable '{}'.", text),
            );
        }

        let value_type = self.evaluate_expression(value, Some(&symbol_type));
        if !types::is_assignable(&symbol_type, &value_type) {
            let value_text = self.type_to_string(&value_type);
            let target_text = self.type_to_string(&symbol_type);
            self.error(
                name.span,
                format!(
                    "Cannot assign value of type '{}' to variable of type '{}'.",
                    value_text, target_text
                ),
            );
        }
        symbol_type
    }

    // ============================================================
    // Calls and contextual constructors
    // ============================================================

    fn analyze_call(&mut self, callee: &'a Expr, args: &'a [Expr]) -> Type {
        let arg_types: Vec<Type> = args
            .iter()
            .map(|arg| self.evaluate_expression(arg, None))
            .collect();

        let ExprKind::Variable { name } = &callee.kind else {
            self.evaluate_expression(callee, None);
            return Type::error();
        };
        let func_name = self.symbol_name(name.sym);
        let expected = self.current_expected_type().cloned();

        // A call whose expected type is a user enum declaring a variant with
        // this name constructs that variant.
        if let Some(enum_type) = self.try_enum_variant_call(name, &arg_types, expected.as_ref()) {
            return enum_type;
        }

        match func_name.as_str() {
            "Some" => return self.analyze_some(name, &arg_types, expected.as_ref()),
            "None" => return self.analyze_none(name, &arg_types, expected.as_ref()),
            "Ok" => return self.analyze_ok_err(name, &arg_types, expected.as_ref(), true),
            "Err" => return self.analyze_ok_err(name, &arg_types, expected.as_ref(), false),
            "weights.load" => return self.analyze_weights_load(name, args, &arg_types),
            _ => {}
        }

        let Some(symbol) = self.scopes.resolve(name.sym) else {
            self.error(name.span, format!("Undefined function '{}'.", func_name));
            return Type::error();
        };
        if symbol.kind != SymbolKind::Function {
            self.error(name.span, format!("'{}' is not a function.", func_name));
            return Type::error();
        }
        let param_types = symbol.param_types.clone();
        let return_type = symbol.ty.clone();

        if param_types.len() != arg_types.len() {
            self.error(
                name.span,
                format!(
                    "Function '{}' expects {} arguments but got {}.",
                    func_name,
                    param_types.len(),
                    arg_types.len()
                ),
            );
            return return_type;
        }

        for (i, (param, arg)) in param_types.iter().zip(arg_types.iter()).enumerate() {
            if !types::is_assignable(param, arg) {
                let param_text = self.type_to_string(param);
                let arg_text = self.type_to_string(arg);
                self.error(
                    name.span,
                    format!(
                        "Argument {} for function '{}' expects '{}' but got '{}'.",
                        i, func_name, param_text, arg_text
                    ),
                );
            }
        }

        return_type
    }

    /// `V(x)` with an expected user-enum type declaring variant `V`.
    fn try_enum_variant_call(
        &mut self,
        name: &Ident,
        arg_types: &[Type],
        expected: Option<&Type>,
    ) -> Option<Type> {
        let expected = expected?;
        if expected.kind != TypeKind::Custom {
            return None;
        }
        let enum_sym = expected.name?;
        let info = self.enum_definitions.get(&enum_sym)?;
        let variant = info.variants.get(&name.sym)?;
        let payload = variant.payload.clone();

        let variant_name = self.symbol_name(name.sym);
        let enum_name = self.symbol_name(enum_sym);
        match payload {
            Some(payload_type) => {
                if arg_types.len() != 1 {
                    self.error(
                        name.span,
                        format!(
                            "Variant '{}' of enum '{}' requires a payload.",
                            variant_name, enum_name
                        ),
                    );
                    return Some(Type::error());
                }
                if !types::is_assignable(&payload_type, &arg_types[0]) {
                    let payload_text = self.type_to_string(&payload_type);
                    self.error(
                        name.span,
                        format!("Enum payload for '{}' must be '{}'.", variant_name, payload_text),
                    );
                    return Some(Type::error());
                }
            }
            None => {
                if !arg_types.is_empty() {
                    self.error(
                        name.span,
                        format!(
                            "Variant '{}' of enum '{}' does not accept a payload.",
                            variant_name, enum_name
                        ),
                    );
                    return Some(Type::error());
                }
            }
        }
        Some(Type::custom(enum_sym))
    }

    fn analyze_some(&mut self, name: &Ident, arg_types: &[Type], expected: Option<&Type>) -> Type {
        if arg_types.len() != 1 {
            self.error(
                name.span,
                "The 'Some' constructor expects exactly one argument.",
            );
            return Type::error();
        }
        let payload = arg_types[0].clone();
        let mut result = Type::with_params(TypeKind::Option, vec![payload.clone()]);
        if let Some(expected) = expected {
            if expected.kind == TypeKind::Option {
                let expected_payload = expected.param(0);
                if !expected_payload.is_unknown() && !types::is_assignable(&expected_payload, &payload)
                {
                    let payload_text = self.type_to_string(&expected_payload);
                    self.error(
                        name.span,
                        format!(
                            "The 'Some' constructor argument must match the contextual Option \
                             payload ('{}').",
                            payload_text
                        ),
                    );
                } else if !expected_payload.is_unknown() {
                    result.params[0] = expected_payload;
                }
                types::merge_expected_params(&mut result, Some(expected));
            }
        }
        result
    }

    fn analyze_none(&mut self, name: &Ident, arg_types: &[Type], expected: Option<&Type>) -> Type {
        if !arg_types.is_empty() {
            self.error(name.span, "The 'None' constructor does not take arguments.");
        }
        let Some(expected) = expected.filter(|e| e.kind == TypeKind::Option) else {
            self.error(
                name.span,
                "The 'None' constructor requires a contextual Option[T] type.",
            );
            return Type::error();
        };
        let mut option_type = expected.clone();
        if option_type.params.is_empty() {
            option_type.params.push(Type::unknown());
        }
        option_type
    }

    fn analyze_ok_err(
        &mut self,
        name: &Ident,
        arg_types: &[Type],
        expected: Option<&Type>,
        is_ok: bool,
    ) -> Type {
        let ctor = if is_ok { "Ok" } else { "Err" };
        if arg_types.len() != 1 {
            self.error(
                name.span,
                format!("The '{}' constructor expects exactly one argument.", ctor),
            );
            return Type::error();
        }
        let Some(expected) = expected.filter(|e| e.kind == TypeKind::Result) else {
            self.error(
                name.span,
                format!(
                    "The '{}' constructor requires a contextual Result[T, E] type.",
                    ctor
                ),
            );
            return Type::error();
        };

        let mut result_type = expected.clone();
        if result_type.params.len() < 2 {
            result_type.params.resize(2, Type::unknown());
        }
        let slot = if is_ok { 0 } else { 1 };
        let slot_expected = result_type.params[slot].clone();
        let arg = arg_types[0].clone();

        if !types::is_assignable(&slot_expected, &arg) {
            let message = if is_ok {
                "The 'Ok' constructor argument must match the success type of the contextual \
                 Result."
            } else {
                "The 'Err' constructor argument must match the error type of the contextual \
                 Result."
            };
            self.error(name.span, message);
        }
        result_type.params[slot] = if slot_expected.is_unknown() {
            arg
        } else {
            slot_expected
        };
        types::merge_expected_params(&mut result_type, Some(expected));
        result_type
    }

    fn analyze_weights_load(
        &mut self,
        name: &Ident,
        args: &'a [Expr],
        arg_types: &[Type],
    ) -> Type {
        if arg_types.len() != 1 {
            self.error(
                name.span,
                "The 'weights.load' builtin expects exactly one argument.",
            );
            return Type::error();
        }
        if arg_types[0].kind != TypeKind::String {
            self.error(
                name.span,
                "The 'weights.load' argument must be a string literal.",
            );
            return Type::error();
        }
        let is_literal = matches!(
            &args[0].kind,
            ExprKind::Literal(lit) if matches!(lit.kind, LitKind::Str { .. })
        );
        if !is_literal {
            self.error(
                name.span,
                "The 'weights.load' argument must be a string literal.",
            );
            return Type::error();
        }
        Type::new(TypeKind::I32)
    }

    // ============================================================
    // Literals and field access
    // ============================================================

    fn analyze_vector_literal(&mut self, expr: &'a Expr, elements: &'a [Expr]) -> Type {
        if elements.is_empty() {
            let expected = self.current_expected_type().cloned();
            if let Some(expected) =
                expected.filter(|e| matches!(e.kind, TypeKind::Vector | TypeKind::Tensor))
            {
                let result = if expected.kind == TypeKind::Vector {
                    expected
                } else {
                    Type::with_params(TypeKind::Vector, vec![expected.param(0)])
                };
                self.vector_literal_data.insert(expr.id, Vec::new());
                return result;
            }
            self.error(
                expr.span,
                "Empty vector literal requires a contextual Vector[T] type.",
            );
            return Type::error();
        }

        let mut element_type = Type::unknown();
        let mut values = Vec::with_capacity(elements.len());

        for element in elements {
            let elem_type = self.evaluate_expression(element, None);
            if elem_type.is_error() {
                return Type::error();
            }

            if element_type.is_unknown() {
                element_type = elem_type;
            } else if element_type != elem_type {
                if element_type.is_numeric() && elem_type.is_numeric() {
                    match self.deduce_numeric_type(&element_type, &elem_type, expr.span, true) {
                        Some(merged) => element_type = merged,
                        None => return Type::error(),
                    }
                } else {
                    self.error(expr.span, "Vector literal elements must share a numeric type.");
                    return Type::error();
                }
            }

            if !element_type.is_numeric() {
                self.error(expr.span, "Vector literal elements must be numeric.");
                return Type::error();
            }

            let ExprKind::Literal(lit) = &element.kind else {
                self.error(expr.span, "Vector literal elements must be literal numerics.");
                return Type::error();
            };
            match lit.kind {
                LitKind::Int {
                    value,
                    base81: false,
                } => values.push(value as f32),
                LitKind::Float {
                    value,
                    base81: false,
                } => values.push(value as f32),
                _ => {
                    self.error(lit.span, "Numeric literal expected in vector literal.");
                    return Type::error();
                }
            }
        }

        let mut result = Type::with_params(TypeKind::Vector, vec![element_type]);
        let expected = self.current_expected_type().cloned();
        types::merge_expected_params(&mut result, expected.as_ref());
        self.vector_literal_data.insert(expr.id, values);
        result
    }

    fn analyze_field_access(&mut self, object: &'a Expr, field: &Ident) -> Type {
        let object_type = self.evaluate_expression(object, None);
        let (TypeKind::Custom, Some(type_sym)) = (object_type.kind, object_type.name) else {
            self.error(field.span, "Field access requires a record value.");
            return Type::error();
        };

        let Some(record) = self.record_definitions.get(&type_sym) else {
            let type_text = self.symbol_name(type_sym);
            self.error(
                field.span,
                format!("Type '{}' has no record fields.", type_text),
            );
            return Type::error();
        };

        match record.field_map.get(&field.sym) {
            Some(field_type) => field_type.clone(),
            None => {
                let type_text = self.symbol_name(type_sym);
                let field_text = self.symbol_name(field.sym);
                self.error(
                    field.span,
                    format!("Record '{}' has no field '{}'.", type_text, field_text),
                );
                Type::error()
            }
        }
    }

    fn analyze_record_literal(
        &mut self,
        type_name: &Ident,
        fields: &'a [RecordLiteralField],
    ) -> Type {
        let Some(info) = self.record_definitions.get(&type_name.sym).cloned() else {
            let text = self.symbol_name(type_name.sym);
            self.error(
                type_name.span,
                format!("Undefined record type '{}'.", text),
            );
            return Type::error();
        };

        let mut had_error = false;
        let mut seen_fields = std::collections::HashSet::new();

        for field in fields {
            let Some(expected_type) = info.field_map.get(&field.name.sym).cloned() else {
                let record_text = self.symbol_name(type_name.sym);
                let field_text = self.symbol_name(field.name.sym);
                self.error(
                    field.name.span,
                    format!("Record '{}' has no field '{}'.", record_text, field_text),
                );
                had_error = true;
                continue;
            };

            if !seen_fields.insert(field.name.sym) {
                let record_text = self.symbol_name(type_name.sym);
                let field_text = self.symbol_name(field.name.sym);
                self.error(
                    field.name.span,
                    format!(
                        "Field '{}' is provided more than once in '{}'.",
                        field_text, record_text
                    ),
                );
                had_error = true;
            }

            let actual_type = self.evaluate_expression(&field.value, Some(&expected_type));
            if !types::is_assignable(&expected_type, &actual_type) {
                let actual_text = self.type_to_string(&actual_type);
                let field_text = self.symbol_name(field.name.sym);
                let expected_text = self.type_to_string(&expected_type);
                self.error(
                    field.name.span,
                    format!(
                        "Cannot assign '{}' to field '{}' of type '{}'.",
                        actual_text, field_text, expected_text
                    ),
                );
                had_error = true;
            }
        }

        if seen_fields.len() != info.fields.len() {
            for field_info in &info.fields {
                if !seen_fields.contains(&field_info.name) {
                    let record_text = self.symbol_name(type_name.sym);
                    let field_text = self.symbol_name(field_info.name);
                    self.error(
                        type_name.span,
                        format!(
                            "Record literal for '{}' is missing field '{}'.",
                            record_text, field_text
                        ),
                    );
                    had_error = true;
                }
            }
        }

        if had_error {
            return Type::error();
        }
        Type::custom(type_name.sym)
    }

    fn analyze_enum_literal(
        &mut self,
        enum_name: &Ident,
        variant: &Ident,
        payload: Option<&'a Expr>,
    ) -> Type {
        let Some(info) = self.enum_definitions.get(&enum_name.sym) else {
            let text = self.symbol_name(enum_name.sym);
            self.error(enum_name.span, format!("Undefined enum '{}'.", text));
            return Type::error();
        };

        let Some(variant_info) = info.variants.get(&variant.sym) else {
            let enum_text = self.symbol_name(enum_name.sym);
            let variant_text = self.symbol_name(variant.sym);
            self.error(
                variant.span,
                format!("Enum '{}' has no variant '{}'.", enum_text, variant_text),
            );
            return Type::error();
        };
        let payload_type = variant_info.payload.clone();

        match payload_type {
            Some(expected_type) => {
                let Some(payload) = payload else {
                    let enum_text = self.symbol_name(enum_name.sym);
                    let variant_text = self.symbol_name(variant.sym);
                    self.error(
                        variant.span,
                        format!(
                            "Variant '{}' of enum '{}' requires a payload.",
                            variant_text, enum_text
                        ),
                    );
                    return Type::error();
                };
                let actual_type = self.evaluate_expression(payload, Some(&expected_type));
                if !types::is_assignable(&expected_type, &actual_type) {
                    let variant_text = self.symbol_name(variant.sym);
                    let expected_text = self.type_to_string(&expected_type);
                    self.error(
                        variant.span,
                        format!(
                            "Enum payload for '{}' must be '{}'.",
                            variant_text, expected_text
                        ),
                    );
                    return Type::error();
                }
            }
            None => {
                if let Some(payload) = payload {
                    let enum_text = self.symbol_name(enum_name.sym);
                    let variant_text = self.symbol_name(variant.sym);
                    let anchor = Self::anchor_span(payload);
                    self.error(
                        anchor,
                        format!(
                            "Variant '{}' of enum '{}' does not accept a payload.",
                            variant_text, enum_text
                        ),
                    );
                    return Type::error();
                }
            }
        }

        Type::custom(enum_name.sym)
    }
}
