//! The register-based intermediate program.
//!
//! Instructions address monotonically-allocated typed registers and labels.
//! The program aggregates the instruction stream, structural type metadata,
//! function metadata, and a tensor literal pool with stable 1-based handles.

pub mod lowering;
pub mod pretty;

pub use lowering::{IrGenerator, LoweringError, TypedRegister};

use std::fmt;

/// The dynamic value category a register carries on the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveKind {
    #[default]
    Unknown,
    Integer,
    Float,
    Fraction,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonRelation {
    #[default]
    None,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

impl ComparisonRelation {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ComparisonRelation::None => "none",
            ComparisonRelation::Less => "lt",
            ComparisonRelation::LessEqual => "le",
            ComparisonRelation::Greater => "gt",
            ComparisonRelation::GreaterEqual => "ge",
            ComparisonRelation::Equal => "eq",
            ComparisonRelation::NotEqual => "ne",
        }
    }
}

/// The closed opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FracAdd,
    FracSub,
    FracMul,
    FracDiv,
    Cmp,
    Mov,
    LoadI,
    Load,
    Store,
    Push,
    Pop,
    Jmp,
    Jz,
    Jnz,
    Jn,
    Jp,
    Call,
    Ret,
    I2F,
    F2I,
    I2Frac,
    Frac2I,
    MakeOptionSome,
    MakeOptionNone,
    MakeResultOk,
    MakeResultErr,
    OptionIsSome,
    OptionUnwrap,
    ResultIsOk,
    ResultUnwrapOk,
    ResultUnwrapErr,
    MakeEnumVariant,
    MakeEnumVariantPayload,
    EnumIsVariant,
    EnumUnwrapPayload,
    Nop,
    Halt,
    Trap,
    WeightsLoad,
    Label,
}

impl Opcode {
    /// Whether this is a conditional branch taking a label plus a register.
    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Opcode::Jz | Opcode::Jnz | Opcode::Jn | Opcode::Jp)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Neg => "NEG",
            Opcode::FAdd => "FADD",
            Opcode::FSub => "FSUB",
            Opcode::FMul => "FMUL",
            Opcode::FDiv => "FDIV",
            Opcode::FracAdd => "FRACADD",
            Opcode::FracSub => "FRACSUB",
            Opcode::FracMul => "FRACMUL",
            Opcode::FracDiv => "FRACDIV",
            Opcode::Cmp => "CMP",
            Opcode::Mov => "MOV",
            Opcode::LoadI => "LOADI",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Jn => "JN",
            Opcode::Jp => "JP",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::I2F => "I2F",
            Opcode::F2I => "F2I",
            Opcode::I2Frac => "I2FRAC",
            Opcode::Frac2I => "FRAC2I",
            Opcode::MakeOptionSome => "MAKE_OPTION_SOME",
            Opcode::MakeOptionNone => "MAKE_OPTION_NONE",
            Opcode::MakeResultOk => "MAKE_RESULT_OK",
            Opcode::MakeResultErr => "MAKE_RESULT_ERR",
            Opcode::OptionIsSome => "OPTION_IS_SOME",
            Opcode::OptionUnwrap => "OPTION_UNWRAP",
            Opcode::ResultIsOk => "RESULT_IS_OK",
            Opcode::ResultUnwrapOk => "RESULT_UNWRAP_OK",
            Opcode::ResultUnwrapErr => "RESULT_UNWRAP_ERR",
            Opcode::MakeEnumVariant => "MAKE_ENUM_VARIANT",
            Opcode::MakeEnumVariantPayload => "MAKE_ENUM_VARIANT_PAYLOAD",
            Opcode::EnumIsVariant => "ENUM_IS_VARIANT",
            Opcode::EnumUnwrapPayload => "ENUM_UNWRAP_PAYLOAD",
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
            Opcode::Trap => "TRAP",
            Opcode::WeightsLoad => "WEIGHTS_LOAD",
            Opcode::Label => "LABEL",
        };
        f.write_str(name)
    }
}

/// A register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(pub u32);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A label id, resolved to a program counter by the bytecode encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    Immediate(i64),
    Label(Label),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(reg) => write!(f, "{}", reg),
            Operand::Immediate(value) => write!(f, "{}", value),
            Operand::Label(label) => write!(f, "{}", label),
        }
    }
}

/// The literal category a `LOADI` carries for the downstream emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiteralKind {
    #[default]
    Int,
    FloatHandle,
    FractionHandle,
    SymbolHandle,
    TensorHandle,
    ShapeHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub primitive: PrimitiveKind,
    pub boolean_result: bool,
    pub is_conversion: bool,
    pub relation: ComparisonRelation,
    pub literal_kind: LiteralKind,
    pub text_literal: Option<String>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self {
            opcode,
            operands,
            primitive: PrimitiveKind::Unknown,
            boolean_result: false,
            is_conversion: false,
            relation: ComparisonRelation::None,
            literal_kind: LiteralKind::Int,
            text_literal: None,
        }
    }

    pub fn with_primitive(mut self, primitive: PrimitiveKind) -> Self {
        self.primitive = primitive;
        self
    }
}

impl Default for Instruction {
    fn default() -> Self {
        Self::new(Opcode::Nop, Vec::new())
    }
}

/// Per-function metadata carried on the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub name: String,
    pub is_effectful: bool,
    pub tier: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralKind {
    TypeAlias,
    Record,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInfo {
    pub name: String,
    pub payload: Option<String>,
}

/// Structural type metadata: one entry per type alias, record, or enum
/// declaration, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAliasMetadata {
    pub name: String,
    pub params: Vec<String>,
    pub alias: String,
    pub kind: StructuralKind,
    pub fields: Vec<FieldInfo>,
    pub variants: Vec<VariantInfo>,
    pub schema_version: u32,
    pub module_path: String,
}

impl TypeAliasMetadata {
    pub fn named(name: impl Into<String>, kind: StructuralKind) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            alias: String::new(),
            kind,
            fields: Vec::new(),
            variants: Vec::new(),
            schema_version: 1,
            module_path: String::new(),
        }
    }
}

/// A dense float tensor with its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<i32>,
    data: Vec<f32>,
}

impl Tensor {
    /// A rank-1 tensor over the given data.
    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len() as i32],
            data,
        }
    }

    pub fn shape(&self) -> &[i32] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// The generated intermediate program.
#[derive(Debug, Default)]
pub struct IntermediateProgram {
    instructions: Vec<Instruction>,
    type_aliases: Vec<TypeAliasMetadata>,
    function_metadata: Vec<FunctionMetadata>,
    tensor_pool: Vec<Tensor>,
}

impl IntermediateProgram {
    pub fn add_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn add_type_alias(&mut self, meta: TypeAliasMetadata) {
        self.type_aliases.push(meta);
    }

    pub fn type_aliases(&self) -> &[TypeAliasMetadata] {
        &self.type_aliases
    }

    pub fn add_function_metadata(&mut self, meta: FunctionMetadata) {
        self.function_metadata.push(meta);
    }

    pub fn function_metadata(&self) -> &[FunctionMetadata] {
        &self.function_metadata
    }

    /// Add a tensor and return its stable 1-based handle.
    pub fn add_tensor(&mut self, tensor: Tensor) -> i64 {
        self.tensor_pool.push(tensor);
        self.tensor_pool.len() as i64
    }

    pub fn tensor_pool(&self) -> &[Tensor] {
        &self.tensor_pool
    }
}

// ============================================================
// Global variant ids
// ============================================================

/// Bits reserved for the within-enum variant index.
pub const VARIANT_ID_BITS: i32 = 16;
pub const VARIANT_ID_MASK: i32 = (1 << VARIANT_ID_BITS) - 1;
pub const ENUM_ID_BITS: i32 = 32 - VARIANT_ID_BITS;
pub const ENUM_ID_MASK: i32 = (1 << ENUM_ID_BITS) - 1;

/// Pack an enum id and variant index into a global variant id. Both sides
/// must fit their bit width.
pub fn encode_variant_id(enum_id: i32, variant_id: i32) -> Option<i32> {
    if enum_id < 0 || variant_id < 0 {
        return None;
    }
    if enum_id > ENUM_ID_MASK || variant_id > VARIANT_ID_MASK {
        return None;
    }
    Some((enum_id << VARIANT_ID_BITS) | (variant_id & VARIANT_ID_MASK))
}

pub fn decode_enum_id(encoded: i32) -> Option<i32> {
    if encoded < 0 {
        return None;
    }
    Some((encoded >> VARIANT_ID_BITS) & ENUM_ID_MASK)
}

pub fn decode_variant_id(encoded: i32) -> Option<i32> {
    if encoded < 0 {
        return None;
    }
    Some(encoded & VARIANT_ID_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_id_round_trip() {
        let encoded = encode_variant_id(3, 7).unwrap();
        assert_eq!(encoded, (3 << 16) | 7);
        assert_eq!(decode_enum_id(encoded), Some(3));
        assert_eq!(decode_variant_id(encoded), Some(7));
    }

    #[test]
    fn variant_id_rejects_out_of_range() {
        assert_eq!(encode_variant_id(-1, 0), None);
        assert_eq!(encode_variant_id(0, 1 << 16), None);
        assert_eq!(encode_variant_id(1 << 16, 0), None);
    }

    #[test]
    fn tensor_handles_are_one_based() {
        let mut program = IntermediateProgram::default();
        assert_eq!(program.add_tensor(Tensor::vector(vec![1.0])), 1);
        assert_eq!(program.add_tensor(Tensor::vector(vec![2.0, 3.0])), 2);
        assert_eq!(program.tensor_pool()[1].shape(), &[2]);
    }
}
