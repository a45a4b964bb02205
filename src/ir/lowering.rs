//! Lowering from the typed AST to the intermediate program.
//!
//! The generator borrows the analyzer whose side tables describe the unit it
//! lowers. Registers and labels are allocated by monotonic counters and
//! never reused; every register carries a [`PrimitiveKind`].
//!
//! Only `main` is lowered to instructions. Every other function contributes
//! metadata only; a call to one evaluates its arguments and yields a fresh
//! typed register, leaving `CALL`/`RET` unused.

use super::{
    encode_variant_id, ComparisonRelation, FunctionMetadata, Instruction, IntermediateProgram,
    Label, LiteralKind, Opcode, Operand, PrimitiveKind, Register, StructuralKind, Tensor,
    TypeAliasMetadata, VariantInfo,
};
use crate::ast::{
    BinaryOp, EnumDecl, Expr, ExprKind, FnDecl, LitKind, MatchArm, MatchPattern, Program,
    RecordDecl, Stmt, StmtKind, Symbol, TypeAliasDecl, UnaryOp,
};
use crate::typeck::{MatchArmInfo, MatchKind, SemanticAnalyzer, Type, TypeKind};
use std::collections::HashMap;
use thiserror::Error;

/// A register together with the value category it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedRegister {
    pub reg: Register,
    pub primitive: PrimitiveKind,
}

/// Internal inconsistencies between the analyzed AST and the generator.
/// These only fire on bugs; analyzed units lower totally.
#[derive(Debug, Error)]
pub enum LoweringError {
    #[error("no value produced for {0}")]
    MissingValue(String),
    #[error("implicit conversion only supported from integers")]
    UnsupportedConversion,
    #[error("vector literal data missing during IR generation")]
    MissingVectorData,
    #[error("match metadata missing during IR generation")]
    MissingMatchMetadata,
    #[error("modulo requires integer operands")]
    NonIntegerModulo,
}

#[derive(Clone, Copy)]
enum NumericCategory {
    Integer,
    Float,
    Fraction,
    Unknown,
}

#[derive(Clone, Copy)]
struct LoopFrame {
    entry: Label,
    exit: Label,
}

/// Walks the typed AST of one unit and produces an [`IntermediateProgram`].
pub struct IrGenerator<'s, 'a> {
    analyzer: &'s SemanticAnalyzer<'a>,
    program: IntermediateProgram,
    register_count: u32,
    label_count: u32,
    variables: HashMap<Symbol, TypedRegister>,
    pattern_scopes: Vec<Vec<(Symbol, Option<TypedRegister>)>>,
    loop_stack: Vec<LoopFrame>,
}

impl<'s, 'a> IrGenerator<'s, 'a> {
    /// Create a generator attached to the analyzer that checked the unit.
    pub fn new(analyzer: &'s SemanticAnalyzer<'a>) -> Self {
        Self {
            analyzer,
            program: IntermediateProgram::default(),
            register_count: 0,
            label_count: 0,
            variables: HashMap::new(),
            pattern_scopes: Vec::new(),
            loop_stack: Vec::new(),
        }
    }

    /// Lower the program, consuming the generator.
    pub fn generate(mut self, program: &Program) -> Result<IntermediateProgram, LoweringError> {
        let _span = tracing::debug_span!("lower").entered();
        for stmt in &program.statements {
            self.lower_stmt(stmt)?;
        }
        Ok(self.program)
    }

    // ============================================================
    // Statements
    // ============================================================

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LoweringError> {
        match &stmt.kind {
            StmtKind::Expression { expr } => {
                self.lower_expr(expr)?;
            }
            StmtKind::Block { statements } => {
                for statement in statements {
                    self.lower_stmt(statement)?;
                }
            }
            StmtKind::Var { name, init, .. } => {
                self.bind_variable_from_initializer(name.sym, init.as_ref())?;
            }
            StmtKind::Let { name, init, .. } => {
                self.bind_variable_from_initializer(name.sym, Some(init))?;
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let end_label = self.new_label();
                let cond = self.lower_expr(condition)?;
                if let Some(else_branch) = else_branch {
                    let else_label = self.new_label();
                    self.emit_jump_if_zero(else_label, cond);
                    self.lower_stmt(then_branch)?;
                    self.emit_jump(end_label);
                    self.emit_label(else_label);
                    self.lower_stmt(else_branch)?;
                } else {
                    self.emit_jump_if_zero(end_label, cond);
                    self.lower_stmt(then_branch)?;
                }
                self.emit_label(end_label);
            }
            StmtKind::While { condition, body } => {
                let cond_label = self.new_label();
                let end_label = self.new_label();
                self.loop_stack.push(LoopFrame {
                    entry: cond_label,
                    exit: end_label,
                });

                self.emit_label(cond_label);
                let cond = self.lower_expr(condition)?;
                self.emit_jump_if_zero(end_label, cond);
                self.lower_stmt(body)?;
                self.emit_jump(cond_label);

                self.emit_label(end_label);
                self.loop_stack.pop();
            }
            StmtKind::Loop(decl) => {
                let entry_label = self.new_label();
                let exit_label = self.new_label();
                let mut guard_label = entry_label;

                if let Some(guard) = &decl.guard {
                    guard_label = self.new_label();
                    self.emit_label(guard_label);
                    let guard_value = self.lower_expr(guard)?;
                    self.emit_jump_if_zero(exit_label, guard_value);
                    self.emit_label(entry_label);
                } else {
                    self.emit_label(entry_label);
                }

                // Continue re-enters at the guard when one exists.
                self.loop_stack.push(LoopFrame {
                    entry: guard_label,
                    exit: exit_label,
                });
                for statement in &decl.body {
                    self.lower_stmt(statement)?;
                }
                self.emit_jump(guard_label);
                self.emit_label(exit_label);
                self.loop_stack.pop();
            }
            StmtKind::Return { value, .. } => {
                if let Some(value) = value {
                    let value_reg = self.lower_expr(value)?;
                    let return_slot = TypedRegister {
                        reg: Register(0),
                        primitive: value_reg.primitive,
                    };
                    self.copy_to_dest(value_reg, return_slot);
                }
                self.emit_simple(Opcode::Halt);
            }
            StmtKind::Break { .. } => {
                if let Some(frame) = self.loop_stack.last().copied() {
                    self.emit_jump(frame.exit);
                }
            }
            StmtKind::Continue { .. } => {
                if let Some(frame) = self.loop_stack.last().copied() {
                    self.emit_jump(frame.entry);
                }
            }
            StmtKind::Function(decl) => self.lower_function(decl)?,
            StmtKind::Module { .. } | StmtKind::Import { .. } => {}
            StmtKind::TypeAlias(decl) => self.emit_type_alias_metadata(decl),
            StmtKind::Record(decl) => self.emit_record_metadata(decl),
            StmtKind::Enum(decl) => self.emit_enum_metadata(decl),
        }
        Ok(())
    }

    fn lower_function(&mut self, decl: &FnDecl) -> Result<(), LoweringError> {
        let name = self.analyzer.symbol_name(decl.name.sym);
        self.program.add_function_metadata(FunctionMetadata {
            name: name.clone(),
            is_effectful: decl.attributes.is_effectful,
            tier: decl.attributes.tier,
        });

        if name != "main" {
            return Ok(());
        }
        for statement in &decl.body {
            self.lower_stmt(statement)?;
        }
        Ok(())
    }

    // ============================================================
    // Structural metadata
    // ============================================================

    fn emit_type_alias_metadata(&mut self, decl: &TypeAliasDecl) {
        let Some(info) = self.analyzer.type_alias_info(decl.name.sym) else {
            return;
        };
        let mut meta = TypeAliasMetadata::named(
            self.analyzer.symbol_name(decl.name.sym),
            StructuralKind::TypeAlias,
        );
        for param in &decl.params {
            meta.params.push(self.analyzer.symbol_name(param.sym));
        }
        if let Some(alias) = info.alias {
            meta.alias = self.analyzer.type_expr_to_string(alias);
        }
        self.program.add_type_alias(meta);
    }

    fn emit_record_metadata(&mut self, decl: &RecordDecl) {
        let Some(info) = self.analyzer.record_definitions().get(&decl.name.sym) else {
            return;
        };
        let mut meta = TypeAliasMetadata::named(
            self.analyzer.symbol_name(decl.name.sym),
            StructuralKind::Record,
        );
        meta.schema_version = info.schema_version;
        meta.module_path = info.module_path.clone();
        for field in &info.fields {
            meta.fields.push(super::FieldInfo {
                name: self.analyzer.symbol_name(field.name),
                ty: self.analyzer.type_to_string(&field.ty),
            });
        }
        self.program.add_type_alias(meta);
    }

    fn emit_enum_metadata(&mut self, decl: &EnumDecl) {
        let Some(info) = self.analyzer.enum_definitions().get(&decl.name.sym) else {
            return;
        };
        let mut meta = TypeAliasMetadata::named(
            self.analyzer.symbol_name(decl.name.sym),
            StructuralKind::Enum,
        );
        meta.schema_version = info.schema_version;
        meta.module_path = info.module_path.clone();
        for &variant_sym in &info.variant_order {
            let payload = info
                .variants
                .get(&variant_sym)
                .and_then(|v| v.payload.as_ref())
                .map(|ty| self.analyzer.type_to_string(ty));
            meta.variants.push(VariantInfo {
                name: self.analyzer.symbol_name(variant_sym),
                payload,
            });
        }
        self.program.add_type_alias(meta);
    }

    // ============================================================
    // Expressions
    // ============================================================

    fn lower_expr(&mut self, expr: &Expr) -> Result<TypedRegister, LoweringError> {
        match &expr.kind {
            ExprKind::Binary {
                op, left, right, ..
            } => self.lower_binary(expr, *op, left, right),
            ExprKind::Unary { op, operand, .. } => self.lower_unary(*op, operand),
            ExprKind::Literal(lit) => Ok(self.lower_literal(lit)),
            ExprKind::Grouping(inner) => self.lower_expr(inner),
            ExprKind::Variable { name } => match self.variables.get(&name.sym) {
                Some(reg) => Ok(*reg),
                None => Err(LoweringError::MissingValue(format!(
                    "variable '{}'",
                    self.analyzer.symbol_name(name.sym)
                ))),
            },
            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args),
            ExprKind::Assign { name, value } => {
                let value_reg = self.lower_expr(value)?;
                match self.variables.get(&name.sym).copied() {
                    Some(existing) => {
                        self.copy_to_dest(value_reg, existing);
                        Ok(existing)
                    }
                    None => {
                        self.variables.insert(name.sym, value_reg);
                        Ok(value_reg)
                    }
                }
            }
            ExprKind::Match { scrutinee, arms } => self.lower_match(expr, scrutinee, arms),
            ExprKind::VectorLiteral { .. } => self.lower_vector_literal(expr),
            ExprKind::FieldAccess { object, .. } => self.lower_expr(object),
            ExprKind::RecordLiteral { fields, .. } => {
                for field in fields {
                    self.lower_expr(&field.value)?;
                }
                let primitive = self.primitive_of(expr).unwrap_or(PrimitiveKind::Integer);
                Ok(self.allocate_typed_register(primitive))
            }
            ExprKind::EnumLiteral {
                enum_name,
                variant,
                payload,
            } => self.lower_enum_literal(expr, enum_name.sym, variant.sym, payload.as_deref()),
            ExprKind::TypeRef(_) => Err(LoweringError::MissingValue(
                "type expression in value position".to_string(),
            )),
        }
    }

    fn lower_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<TypedRegister, LoweringError> {
        if op.is_logical() {
            return self.lower_logical(op, left, right);
        }

        let left_reg = self.lower_expr(left)?;
        let right_reg = self.lower_expr(right)?;

        let relation = relation_for(op);
        if relation != ComparisonRelation::None {
            let left_type = self.analyzer.type_of(left.id);
            let right_type = self.analyzer.type_of(right.id);
            let both_bool = matches!(left_type.map(|t| t.kind), Some(TypeKind::Bool))
                && matches!(right_type.map(|t| t.kind), Some(TypeKind::Bool));

            // Booleans compare as integers; otherwise promote to the wider
            // numeric category of the two sides.
            let operand_primitive = if both_bool {
                PrimitiveKind::Integer
            } else {
                let category =
                    merge_category(categorize(left_type), categorize(right_type));
                match category {
                    NumericCategory::Float => PrimitiveKind::Float,
                    NumericCategory::Fraction => PrimitiveKind::Fraction,
                    NumericCategory::Integer => PrimitiveKind::Integer,
                    NumericCategory::Unknown => left_reg.primitive,
                }
            };

            let left_conv = if both_bool {
                left_reg
            } else {
                self.ensure_kind(left_reg, operand_primitive)?
            };
            let right_conv = if both_bool {
                right_reg
            } else {
                self.ensure_kind(right_reg, operand_primitive)?
            };

            let dest = self.allocate_typed_register(PrimitiveKind::Boolean);
            let mut instr = Instruction::new(
                Opcode::Cmp,
                vec![
                    Operand::Register(dest.reg),
                    Operand::Register(left_conv.reg),
                    Operand::Register(right_conv.reg),
                ],
            );
            instr.primitive = PrimitiveKind::Boolean;
            instr.boolean_result = true;
            instr.relation = relation;
            self.emit(instr);
            return Ok(dest);
        }

        let result_type = self.analyzer.type_of(expr.id);
        let category = categorize(result_type);
        let mut primitive = categorize_primitive(result_type);
        if primitive == PrimitiveKind::Unknown {
            primitive = PrimitiveKind::Integer;
        }

        if op == BinaryOp::Rem && primitive != PrimitiveKind::Integer {
            return Err(LoweringError::NonIntegerModulo);
        }

        let left_conv = self.ensure_kind(left_reg, primitive)?;
        let right_conv = self.ensure_kind(right_reg, primitive)?;
        let dest = self.allocate_typed_register(primitive);

        let opcode = match op {
            BinaryOp::Add => select_opcode(category, Opcode::Add, Opcode::FAdd, Opcode::FracAdd),
            BinaryOp::Sub => select_opcode(category, Opcode::Sub, Opcode::FSub, Opcode::FracSub),
            BinaryOp::Mul => select_opcode(category, Opcode::Mul, Opcode::FMul, Opcode::FracMul),
            BinaryOp::Div => select_opcode(category, Opcode::Div, Opcode::FDiv, Opcode::FracDiv),
            _ => Opcode::Mod,
        };

        let mut instr = Instruction::new(
            opcode,
            vec![
                Operand::Register(dest.reg),
                Operand::Register(left_conv.reg),
                Operand::Register(right_conv.reg),
            ],
        );
        instr.primitive = primitive;
        self.emit(instr);
        Ok(dest)
    }

    /// Short-circuit `&&` / `||`: the right side only evaluates when the
    /// left side has not already decided the result.
    fn lower_logical(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<TypedRegister, LoweringError> {
        let left_reg = self.lower_expr(left)?;
        let dest = self.allocate_typed_register(PrimitiveKind::Boolean);
        self.copy_to_dest(left_reg, dest);

        let end_label = self.new_label();
        if op == BinaryOp::And {
            self.emit_jump_if_zero(end_label, dest);
        } else {
            self.emit_jump_if_not_zero(end_label, dest);
        }

        let right_reg = self.lower_expr(right)?;
        self.copy_to_dest(right_reg, dest);
        self.emit_label(end_label);
        Ok(dest)
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<TypedRegister, LoweringError> {
        let operand_reg = self.lower_expr(operand)?;
        match op {
            UnaryOp::Neg => {
                let dest = self.allocate_typed_register(operand_reg.primitive);
                let mut instr = Instruction::new(
                    Opcode::Neg,
                    vec![Operand::Register(dest.reg), Operand::Register(operand_reg.reg)],
                );
                instr.primitive = operand_reg.primitive;
                self.emit(instr);
                Ok(dest)
            }
            UnaryOp::Not => {
                // value == 0, as a boolean-producing comparison.
                let zero = self.allocate_typed_register(PrimitiveKind::Integer);
                let mut load = Instruction::new(
                    Opcode::LoadI,
                    vec![Operand::Register(zero.reg), Operand::Immediate(0)],
                );
                load.primitive = PrimitiveKind::Integer;
                self.emit(load);

                let dest = self.allocate_typed_register(PrimitiveKind::Boolean);
                let mut instr = Instruction::new(
                    Opcode::Cmp,
                    vec![
                        Operand::Register(dest.reg),
                        Operand::Register(operand_reg.reg),
                        Operand::Register(zero.reg),
                    ],
                );
                instr.primitive = PrimitiveKind::Boolean;
                instr.boolean_result = true;
                instr.relation = ComparisonRelation::Equal;
                self.emit(instr);
                Ok(dest)
            }
        }
    }

    fn lower_literal(&mut self, lit: &crate::ast::Lit) -> TypedRegister {
        match &lit.kind {
            LitKind::Str { value } => {
                let dest = self.allocate_typed_register(PrimitiveKind::Integer);
                let mut instr =
                    Instruction::new(Opcode::LoadI, vec![Operand::Register(dest.reg)]);
                instr.literal_kind = LiteralKind::SymbolHandle;
                instr.text_literal = Some(value.clone());
                instr.primitive = PrimitiveKind::Integer;
                self.emit(instr);
                dest
            }
            LitKind::Bool(value) => {
                let dest = self.allocate_typed_register(PrimitiveKind::Boolean);
                let mut instr = Instruction::new(
                    Opcode::LoadI,
                    vec![Operand::Register(dest.reg), Operand::Immediate(i64::from(*value))],
                );
                instr.primitive = PrimitiveKind::Boolean;
                self.emit(instr);
                dest
            }
            LitKind::Int { value, .. } => self.load_integer(*value),
            // Float literal storage stays integral at this level; conversion
            // instructions re-type the value where arithmetic demands it.
            LitKind::Float { value, .. } => self.load_integer(*value as i64),
        }
    }

    fn load_integer(&mut self, value: i64) -> TypedRegister {
        let dest = self.allocate_typed_register(PrimitiveKind::Integer);
        let mut instr = Instruction::new(
            Opcode::LoadI,
            vec![Operand::Register(dest.reg), Operand::Immediate(value)],
        );
        instr.primitive = PrimitiveKind::Integer;
        self.emit(instr);
        dest
    }

    fn lower_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<TypedRegister, LoweringError> {
        if let ExprKind::Variable { name } = &callee.kind {
            // A call typed as a user enum constructs that enum's variant.
            if let Some(dest) = self.try_lower_enum_ctor(expr, name.sym, args)? {
                return Ok(dest);
            }

            let func_name = self.analyzer.symbol_name(name.sym);
            match func_name.as_str() {
                "Some" | "Ok" | "Err" => {
                    let Some(payload_expr) = args.first() else {
                        return Err(LoweringError::MissingValue(format!(
                            "payload of '{}'",
                            func_name
                        )));
                    };
                    let payload = self.lower_expr(payload_expr)?;
                    let dest = self.allocate_typed_register(PrimitiveKind::Integer);
                    let opcode = match func_name.as_str() {
                        "Some" => Opcode::MakeOptionSome,
                        "Ok" => Opcode::MakeResultOk,
                        _ => Opcode::MakeResultErr,
                    };
                    self.emit(Instruction::new(
                        opcode,
                        vec![Operand::Register(dest.reg), Operand::Register(payload.reg)],
                    ));
                    return Ok(dest);
                }
                "None" => {
                    let dest = self.allocate_typed_register(PrimitiveKind::Integer);
                    self.emit(Instruction::new(
                        Opcode::MakeOptionNone,
                        vec![Operand::Register(dest.reg)],
                    ));
                    return Ok(dest);
                }
                "weights.load" => {
                    let text = args.first().and_then(|arg| match &arg.kind {
                        ExprKind::Literal(lit) => match &lit.kind {
                            LitKind::Str { value } => Some(value.clone()),
                            _ => None,
                        },
                        _ => None,
                    });
                    let Some(text) = text else {
                        return Err(LoweringError::MissingValue(
                            "string literal argument of 'weights.load'".to_string(),
                        ));
                    };
                    let dest = self.allocate_typed_register(PrimitiveKind::Integer);
                    let mut instr =
                        Instruction::new(Opcode::WeightsLoad, vec![Operand::Register(dest.reg)]);
                    instr.literal_kind = LiteralKind::SymbolHandle;
                    instr.text_literal = Some(text);
                    self.emit(instr);
                    return Ok(dest);
                }
                _ => {}
            }
        }

        // User function call: arguments evaluate for their effects; the call
        // itself produces an opaque fresh register (single-entry-point IR).
        for arg in args {
            self.lower_expr(arg)?;
        }
        let primitive = self.primitive_of(expr).unwrap_or(PrimitiveKind::Integer);
        Ok(self.allocate_typed_register(primitive))
    }

    /// Lower `V(payload?)` when the analyzer typed it as a user enum with a
    /// variant named `V`.
    fn try_lower_enum_ctor(
        &mut self,
        expr: &Expr,
        callee_sym: Symbol,
        args: &[Expr],
    ) -> Result<Option<TypedRegister>, LoweringError> {
        let Some(ty) = self.analyzer.type_of(expr.id) else {
            return Ok(None);
        };
        if ty.kind != TypeKind::Custom {
            return Ok(None);
        }
        let Some(enum_sym) = ty.name else {
            return Ok(None);
        };
        let Some(info) = self.analyzer.enum_definitions().get(&enum_sym) else {
            return Ok(None);
        };
        let Some(variant) = info.variants.get(&callee_sym) else {
            return Ok(None);
        };

        let global_id = encode_variant_id(info.id, variant.id);
        let has_payload = variant.payload.is_some();

        let payload_reg = match (has_payload, args.first()) {
            (true, Some(payload)) => Some(self.lower_expr(payload)?),
            _ => None,
        };
        let dest = self.allocate_typed_register(PrimitiveKind::Integer);
        match global_id {
            Some(id) => match payload_reg {
                Some(payload) => self.emit(Instruction::new(
                    Opcode::MakeEnumVariantPayload,
                    vec![
                        Operand::Register(dest.reg),
                        Operand::Register(payload.reg),
                        Operand::Immediate(i64::from(id)),
                    ],
                )),
                None => self.emit(Instruction::new(
                    Opcode::MakeEnumVariant,
                    vec![Operand::Register(dest.reg), Operand::Immediate(i64::from(id))],
                )),
            },
            None => self.emit_simple(Opcode::Trap),
        }
        Ok(Some(dest))
    }

    fn lower_enum_literal(
        &mut self,
        expr: &Expr,
        enum_sym: Symbol,
        variant_sym: Symbol,
        payload: Option<&Expr>,
    ) -> Result<TypedRegister, LoweringError> {
        let global_id = self
            .analyzer
            .enum_definitions()
            .get(&enum_sym)
            .and_then(|info| {
                let variant = info.variants.get(&variant_sym)?;
                encode_variant_id(info.id, variant.id)
            });

        let payload_reg = match payload {
            Some(payload) => Some(self.lower_expr(payload)?),
            None => None,
        };

        let primitive = self.primitive_of(expr).unwrap_or(PrimitiveKind::Integer);
        let dest = self.allocate_typed_register(primitive);

        match global_id {
            Some(id) => match payload_reg {
                Some(payload) => self.emit(Instruction::new(
                    Opcode::MakeEnumVariantPayload,
                    vec![
                        Operand::Register(dest.reg),
                        Operand::Register(payload.reg),
                        Operand::Immediate(i64::from(id)),
                    ],
                )),
                None => self.emit(Instruction::new(
                    Opcode::MakeEnumVariant,
                    vec![Operand::Register(dest.reg), Operand::Immediate(i64::from(id))],
                )),
            },
            None => self.emit_simple(Opcode::Trap),
        }
        Ok(dest)
    }

    fn lower_vector_literal(&mut self, expr: &Expr) -> Result<TypedRegister, LoweringError> {
        let Some(data) = self.analyzer.vector_literal_data(expr.id) else {
            return Err(LoweringError::MissingVectorData);
        };
        let handle = self.program.add_tensor(Tensor::vector(data.to_vec()));
        let dest = self.allocate_typed_register(PrimitiveKind::Integer);
        let mut instr = Instruction::new(
            Opcode::LoadI,
            vec![Operand::Register(dest.reg), Operand::Immediate(handle)],
        );
        instr.literal_kind = LiteralKind::TensorHandle;
        self.emit(instr);
        Ok(dest)
    }

    // ============================================================
    // Match lowering
    // ============================================================

    fn lower_match(
        &mut self,
        expr: &Expr,
        scrutinee: &Expr,
        arms: &[MatchArm],
    ) -> Result<TypedRegister, LoweringError> {
        let scrutinee_reg = self.lower_expr(scrutinee)?;
        let Some(metadata) = self.analyzer.match_metadata_for(expr.id) else {
            return Err(LoweringError::MissingMatchMetadata);
        };
        let kind = metadata.kind;
        let arm_infos: Vec<MatchArmInfo> = metadata.arms.clone();
        if arm_infos.len() != arms.len() {
            return Err(LoweringError::MissingMatchMetadata);
        }

        let primitive = self.primitive_of(expr).unwrap_or(PrimitiveKind::Integer);
        let dest = self.allocate_typed_register(primitive);

        let end_label = self.new_label();
        let trap_label = self.new_label();

        // Group arms by variant, preserving first-appearance order.
        let mut variants: Vec<Symbol> = Vec::new();
        let mut arms_by_variant: HashMap<Symbol, Vec<usize>> = HashMap::new();
        for (i, arm) in arms.iter().enumerate() {
            let entry = arms_by_variant.entry(arm.variant.sym).or_default();
            if entry.is_empty() {
                variants.push(arm.variant.sym);
            }
            entry.push(i);
        }

        let flag_reg = self.allocate_typed_register(PrimitiveKind::Boolean);
        let payload_reg = self.allocate_typed_register(PrimitiveKind::Integer);

        for (v_idx, variant_sym) in variants.iter().enumerate() {
            let arm_indices = &arms_by_variant[variant_sym];
            let group_info = &arm_infos[arm_indices[0]];
            let next_variant_label = if v_idx + 1 < variants.len() {
                self.new_label()
            } else {
                trap_label
            };

            // Variant dispatch test, selected by the scrutinee's kind.
            match kind {
                MatchKind::Option => {
                    self.emit_dest_source(Opcode::OptionIsSome, flag_reg, scrutinee_reg);
                    if group_info.variant_id == 0 {
                        self.emit_jump_if_zero(next_variant_label, flag_reg);
                    } else {
                        self.emit_jump_if_not_zero(next_variant_label, flag_reg);
                    }
                }
                MatchKind::Result => {
                    self.emit_dest_source(Opcode::ResultIsOk, flag_reg, scrutinee_reg);
                    if group_info.variant_id == 0 {
                        self.emit_jump_if_zero(next_variant_label, flag_reg);
                    } else {
                        self.emit_jump_if_not_zero(next_variant_label, flag_reg);
                    }
                }
                MatchKind::Enum => {
                    match encode_variant_id(group_info.enum_id, group_info.variant_id) {
                        Some(id) => {
                            self.emit(Instruction::new(
                                Opcode::EnumIsVariant,
                                vec![
                                    Operand::Register(flag_reg.reg),
                                    Operand::Register(scrutinee_reg.reg),
                                    Operand::Immediate(i64::from(id)),
                                ],
                            ));
                            self.emit_jump_if_zero(next_variant_label, flag_reg);
                        }
                        None => self.emit_jump(next_variant_label),
                    }
                }
                MatchKind::Unknown => self.emit_jump(next_variant_label),
            }

            // The variant matched; try its arms in order, guarded ones
            // falling through to the next on a false guard.
            for (a_idx, &arm_idx) in arm_indices.iter().enumerate() {
                let arm = &arms[arm_idx];
                let arm_info = &arm_infos[arm_idx];
                let next_arm_label = if a_idx + 1 < arm_indices.len() {
                    self.new_label()
                } else {
                    next_variant_label
                };

                self.enter_pattern_scope();

                let has_payload = match kind {
                    MatchKind::Option => {
                        if arm_info.variant_id == 0 {
                            self.emit_dest_source(Opcode::OptionUnwrap, payload_reg, scrutinee_reg);
                            true
                        } else {
                            false
                        }
                    }
                    MatchKind::Result => {
                        let opcode = if arm_info.variant_id == 0 {
                            Opcode::ResultUnwrapOk
                        } else {
                            Opcode::ResultUnwrapErr
                        };
                        self.emit_dest_source(opcode, payload_reg, scrutinee_reg);
                        true
                    }
                    MatchKind::Enum => {
                        if !arm_info.payload_type.is_unknown() {
                            self.emit_dest_source(Opcode::EnumUnwrapPayload, payload_reg, scrutinee_reg);
                            true
                        } else {
                            false
                        }
                    }
                    MatchKind::Unknown => false,
                };

                if has_payload {
                    self.bind_variant_payload(arm, payload_reg);
                }

                if let Some(guard) = &arm.guard {
                    self.emit_guard_metadata(arm_info);
                    let guard_value = self.lower_expr(guard)?;
                    self.emit_jump_if_zero(next_arm_label, guard_value);
                }

                let value = self.lower_expr(&arm.body)?;
                self.copy_to_dest(value, dest);
                self.emit_jump(end_label);

                if a_idx + 1 < arm_indices.len() {
                    self.emit_label(next_arm_label);
                }
                self.exit_pattern_scope();
            }

            if v_idx + 1 < variants.len() {
                self.emit_label(next_variant_label);
            }
        }

        // No variant matched: a checked match makes this unreachable.
        self.emit_label(trap_label);
        self.emit_simple(Opcode::Trap);
        self.emit_label(end_label);
        self.emit_simple(Opcode::Nop);
        Ok(dest)
    }

    fn emit_guard_metadata(&mut self, info: &MatchArmInfo) {
        if info.guard_expression.is_empty() {
            return;
        }
        let mut reason = format!(
            "guard-expr \"{}\"",
            escape_metadata_string(&info.guard_expression)
        );
        if !info.enum_name.is_empty() {
            reason.push_str(&format!(" enum={}", info.enum_name));
        }
        reason.push_str(&format!(
            " variant={}",
            self.analyzer.symbol_name(info.variant)
        ));
        if info.variant_id >= 0 {
            reason.push_str(&format!(" variant-id={}", info.variant_id));
        }
        if !info.payload_type.is_unknown() {
            reason.push_str(&format!(
                " payload={}",
                self.analyzer.type_to_string(&info.payload_type)
            ));
        }

        let mut instr = Instruction::new(Opcode::Nop, Vec::new());
        instr.literal_kind = LiteralKind::SymbolHandle;
        instr.text_literal = Some(reason);
        self.emit(instr);
    }

    // ============================================================
    // Pattern variable scoping
    // ============================================================

    fn enter_pattern_scope(&mut self) {
        self.pattern_scopes.push(Vec::new());
    }

    fn exit_pattern_scope(&mut self) {
        let Some(scope) = self.pattern_scopes.pop() else {
            return;
        };
        for (name, previous) in scope {
            match previous {
                Some(reg) => {
                    self.variables.insert(name, reg);
                }
                None => {
                    self.variables.remove(&name);
                }
            }
        }
    }

    fn bind_pattern_variable(&mut self, name: Symbol, reg: TypedRegister) {
        let previous = self.variables.get(&name).copied();
        self.variables.insert(name, reg);
        if let Some(scope) = self.pattern_scopes.last_mut() {
            scope.push((name, previous));
        }
    }

    fn bind_pattern_payload(&mut self, pattern: &MatchPattern, reg: TypedRegister) {
        if let MatchPattern::Identifier { name, is_wildcard } = pattern {
            if !is_wildcard {
                self.bind_pattern_variable(name.sym, reg);
            }
        }
    }

    fn bind_variant_payload(&mut self, arm: &MatchArm, reg: TypedRegister) {
        if let MatchPattern::Variant {
            payload: Some(nested),
            ..
        } = &arm.pattern
        {
            self.bind_pattern_payload(nested, reg);
            return;
        }
        // Option/Result arms carry the payload bindings directly.
        self.bind_pattern_payload(&arm.pattern, reg);
    }

    // ============================================================
    // Emission helpers
    // ============================================================

    fn emit(&mut self, instr: Instruction) {
        self.program.add_instruction(instr);
    }

    fn emit_simple(&mut self, opcode: Opcode) {
        self.emit(Instruction::new(opcode, Vec::new()));
    }

    fn emit_label(&mut self, label: Label) {
        self.emit(Instruction::new(Opcode::Label, vec![Operand::Label(label)]));
    }

    fn emit_jump(&mut self, target: Label) {
        self.emit(Instruction::new(Opcode::Jmp, vec![Operand::Label(target)]));
    }

    fn emit_jump_if_zero(&mut self, target: Label, cond: TypedRegister) {
        self.emit(Instruction::new(
            Opcode::Jz,
            vec![Operand::Label(target), Operand::Register(cond.reg)],
        ));
    }

    fn emit_jump_if_not_zero(&mut self, target: Label, cond: TypedRegister) {
        self.emit(Instruction::new(
            Opcode::Jnz,
            vec![Operand::Label(target), Operand::Register(cond.reg)],
        ));
    }

    fn emit_dest_source(&mut self, opcode: Opcode, dest: TypedRegister, source: TypedRegister) {
        self.emit(Instruction::new(
            opcode,
            vec![Operand::Register(dest.reg), Operand::Register(source.reg)],
        ));
    }

    fn copy_to_dest(&mut self, source: TypedRegister, dest: TypedRegister) {
        if source.reg == dest.reg {
            return;
        }
        let mut instr = Instruction::new(
            Opcode::Mov,
            vec![Operand::Register(dest.reg), Operand::Register(source.reg)],
        );
        instr.primitive = dest.primitive;
        self.emit(instr);
    }

    fn allocate_typed_register(&mut self, primitive: PrimitiveKind) -> TypedRegister {
        let reg = Register(self.register_count);
        self.register_count += 1;
        TypedRegister { reg, primitive }
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.label_count);
        self.label_count += 1;
        label
    }

    /// Insert a widening conversion so `source` carries `target`'s kind.
    /// Only integer sources convert implicitly.
    fn ensure_kind(
        &mut self,
        source: TypedRegister,
        target: PrimitiveKind,
    ) -> Result<TypedRegister, LoweringError> {
        if target == PrimitiveKind::Unknown || source.primitive == target {
            return Ok(source);
        }
        if source.primitive != PrimitiveKind::Integer {
            return Err(LoweringError::UnsupportedConversion);
        }
        let opcode = match target {
            PrimitiveKind::Float => Opcode::I2F,
            PrimitiveKind::Fraction => Opcode::I2Frac,
            _ => return Err(LoweringError::UnsupportedConversion),
        };
        let dest = self.allocate_typed_register(target);
        let mut instr = Instruction::new(
            opcode,
            vec![Operand::Register(dest.reg), Operand::Register(source.reg)],
        );
        instr.primitive = target;
        instr.is_conversion = true;
        self.emit(instr);
        Ok(dest)
    }

    fn bind_variable_from_initializer(
        &mut self,
        name: Symbol,
        init: Option<&Expr>,
    ) -> Result<(), LoweringError> {
        let reg = match init {
            Some(init) => self.lower_expr(init)?,
            None => self.allocate_typed_register(PrimitiveKind::Integer),
        };
        self.variables.insert(name, reg);
        Ok(())
    }

    fn primitive_of(&self, expr: &Expr) -> Option<PrimitiveKind> {
        let primitive = categorize_primitive(self.analyzer.type_of(expr.id));
        (primitive != PrimitiveKind::Unknown).then_some(primitive)
    }
}

// ============================================================
// Category mapping
// ============================================================

/// Pick the comparison relation for an operator. The analyzer diagnoses from
/// the same operator, so the two stay in lockstep.
fn relation_for(op: BinaryOp) -> ComparisonRelation {
    match op {
        BinaryOp::Less => ComparisonRelation::Less,
        BinaryOp::LessEqual => ComparisonRelation::LessEqual,
        BinaryOp::Greater => ComparisonRelation::Greater,
        BinaryOp::GreaterEqual => ComparisonRelation::GreaterEqual,
        BinaryOp::Equal => ComparisonRelation::Equal,
        BinaryOp::NotEqual => ComparisonRelation::NotEqual,
        _ => ComparisonRelation::None,
    }
}

fn categorize(ty: Option<&Type>) -> NumericCategory {
    let Some(ty) = ty else {
        return NumericCategory::Integer;
    };
    match ty.kind {
        TypeKind::I2 | TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::BigInt => {
            NumericCategory::Integer
        }
        TypeKind::Float => NumericCategory::Float,
        TypeKind::Fraction => NumericCategory::Fraction,
        _ => NumericCategory::Unknown,
    }
}

fn categorize_primitive(ty: Option<&Type>) -> PrimitiveKind {
    let Some(ty) = ty else {
        return PrimitiveKind::Integer;
    };
    match ty.kind {
        TypeKind::I2 | TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::BigInt => {
            PrimitiveKind::Integer
        }
        TypeKind::Float => PrimitiveKind::Float,
        TypeKind::Fraction => PrimitiveKind::Fraction,
        TypeKind::Bool => PrimitiveKind::Boolean,
        _ => PrimitiveKind::Unknown,
    }
}

fn select_opcode(
    category: NumericCategory,
    integer_op: Opcode,
    float_op: Opcode,
    fraction_op: Opcode,
) -> Opcode {
    match category {
        NumericCategory::Float => float_op,
        NumericCategory::Fraction => fraction_op,
        _ => integer_op,
    }
}

fn merge_category(a: NumericCategory, b: NumericCategory) -> NumericCategory {
    use NumericCategory::*;
    if matches!(a, Float) || matches!(b, Float) {
        return Float;
    }
    if matches!(a, Fraction) || matches!(b, Fraction) {
        return Fraction;
    }
    if matches!(a, Integer) || matches!(b, Integer) {
        return Integer;
    }
    Unknown
}

fn escape_metadata_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
