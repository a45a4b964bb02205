//! tisc-json-v1 bytecode encoding.
//!
//! Flattens the instruction stream to `{opcode, a, b, c}` triples. `LABEL`
//! pseudo-instructions occupy no program counter; label operands resolve to
//! the pc of the instruction that follows them. Conditional branches encode
//! as `{a: condition register, b: target pc}`.

use crate::ir::{Instruction, IntermediateProgram, Opcode, Operand};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

pub const FORMAT_VERSION: &str = "tisc-json-v1";
pub const AXION_POLICY_TEXT: &str = "(policy (tier 1))";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("malformed LABEL instruction")]
    MalformedLabel,
    #[error("unresolved label L{0}")]
    UnresolvedLabel(u32),
    #[error("opcode carries more than 3 operands; not encodable in tisc-json-v1")]
    TooManyOperands,
    #[error("unsupported opcode in bytecode emitter")]
    UnsupportedOpcode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BytecodeInsn {
    pub opcode: String,
    pub a: i64,
    pub b: i64,
    pub c: i64,
}

/// The serialized bytecode document.
#[derive(Debug, Serialize)]
pub struct BytecodeFile {
    pub format_version: &'static str,
    pub axion_policy_text: &'static str,
    pub insns: Vec<BytecodeInsn>,
}

/// Encode an intermediate program into the tisc-json-v1 document.
pub fn encode(program: &IntermediateProgram) -> Result<BytecodeFile, EncodeError> {
    let label_pc = collect_label_pcs(program)?;

    let mut insns = Vec::with_capacity(program.instructions().len());
    for instr in program.instructions() {
        if instr.opcode == Opcode::Label {
            continue;
        }
        if instr.operands.len() > 3 {
            return Err(EncodeError::TooManyOperands);
        }
        let Some(opcode) = opcode_name(instr.opcode) else {
            return Err(EncodeError::UnsupportedOpcode);
        };

        let encoded = if instr.opcode.is_conditional_branch()
            && matches!(instr.operands.first(), Some(Operand::Label(_)))
            && matches!(instr.operands.get(1), Some(Operand::Register(_)))
        {
            let target = resolve_operand(instr, 0, &label_pc)?;
            let cond = resolve_operand(instr, 1, &label_pc)?;
            BytecodeInsn {
                opcode: opcode.to_string(),
                a: cond,
                b: target,
                c: 0,
            }
        } else {
            BytecodeInsn {
                opcode: opcode.to_string(),
                a: resolve_operand(instr, 0, &label_pc)?,
                b: resolve_operand(instr, 1, &label_pc)?,
                c: resolve_operand(instr, 2, &label_pc)?,
            }
        };
        insns.push(encoded);
    }

    if insns.is_empty() {
        insns.push(BytecodeInsn {
            opcode: "Halt".to_string(),
            a: 0,
            b: 0,
            c: 0,
        });
    }

    Ok(BytecodeFile {
        format_version: FORMAT_VERSION,
        axion_policy_text: AXION_POLICY_TEXT,
        insns,
    })
}

fn collect_label_pcs(program: &IntermediateProgram) -> Result<HashMap<u32, i64>, EncodeError> {
    let mut label_pc = HashMap::new();
    let mut pc: i64 = 0;
    for instr in program.instructions() {
        if instr.opcode == Opcode::Label {
            let Some(Operand::Label(label)) = instr.operands.first() else {
                return Err(EncodeError::MalformedLabel);
            };
            if instr.operands.len() != 1 {
                return Err(EncodeError::MalformedLabel);
            }
            label_pc.insert(label.0, pc);
            continue;
        }
        pc += 1;
    }
    Ok(label_pc)
}

fn resolve_operand(
    instr: &Instruction,
    index: usize,
    label_pc: &HashMap<u32, i64>,
) -> Result<i64, EncodeError> {
    match instr.operands.get(index) {
        None => Ok(0),
        Some(Operand::Register(reg)) => Ok(i64::from(reg.0)),
        Some(Operand::Immediate(value)) => Ok(*value),
        Some(Operand::Label(label)) => label_pc
            .get(&label.0)
            .copied()
            .ok_or(EncodeError::UnresolvedLabel(label.0)),
    }
}

/// The fixed opcode-name table. `LABEL` is a pseudo-instruction and has no
/// bytecode name.
fn opcode_name(opcode: Opcode) -> Option<&'static str> {
    let name = match opcode {
        Opcode::Add => "Add",
        Opcode::Sub => "Sub",
        Opcode::Mul => "Mul",
        Opcode::Div => "Div",
        Opcode::Mod => "Mod",
        Opcode::Neg => "Neg",
        Opcode::FAdd => "FAdd",
        Opcode::FSub => "FSub",
        Opcode::FMul => "FMul",
        Opcode::FDiv => "FDiv",
        Opcode::FracAdd => "FracAdd",
        Opcode::FracSub => "FracSub",
        Opcode::FracMul => "FracMul",
        Opcode::FracDiv => "FracDiv",
        Opcode::Cmp => "Cmp",
        Opcode::Mov => "Mov",
        Opcode::LoadI => "LoadImm",
        Opcode::Load => "Load",
        Opcode::Store => "Store",
        Opcode::Push => "Push",
        Opcode::Pop => "Pop",
        Opcode::Jmp => "Jump",
        Opcode::Jz => "JumpIfZero",
        Opcode::Jnz => "JumpIfNotZero",
        Opcode::Jn => "JumpIfNegative",
        Opcode::Jp => "JumpIfPositive",
        Opcode::Call => "Call",
        Opcode::Ret => "Ret",
        Opcode::I2F => "I2F",
        Opcode::F2I => "F2I",
        Opcode::I2Frac => "I2Frac",
        Opcode::Frac2I => "Frac2I",
        Opcode::MakeOptionSome => "MakeOptionSome",
        Opcode::MakeOptionNone => "MakeOptionNone",
        Opcode::MakeResultOk => "MakeResultOk",
        Opcode::MakeResultErr => "MakeResultErr",
        Opcode::OptionIsSome => "OptionIsSome",
        Opcode::OptionUnwrap => "OptionUnwrap",
        Opcode::ResultIsOk => "ResultIsOk",
        Opcode::ResultUnwrapOk => "ResultUnwrapOk",
        Opcode::ResultUnwrapErr => "ResultUnwrapErr",
        Opcode::MakeEnumVariant => "MakeEnumVariant",
        Opcode::MakeEnumVariantPayload => "MakeEnumVariantPayload",
        Opcode::EnumIsVariant => "EnumIsVariant",
        Opcode::EnumUnwrapPayload => "EnumUnwrapPayload",
        Opcode::Nop => "Nop",
        Opcode::Halt => "Halt",
        Opcode::Trap => "Trap",
        Opcode::WeightsLoad => "WeightsLoad",
        Opcode::Label => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Label, Register};

    fn program_of(instructions: Vec<Instruction>) -> IntermediateProgram {
        let mut program = IntermediateProgram::default();
        for instr in instructions {
            program.add_instruction(instr);
        }
        program
    }

    #[test]
    fn empty_program_encodes_single_halt() {
        let file = encode(&IntermediateProgram::default()).unwrap();
        assert_eq!(file.insns.len(), 1);
        assert_eq!(file.insns[0].opcode, "Halt");
    }

    #[test]
    fn labels_take_no_pc_and_resolve_forward() {
        // LABEL L0; LOADI r0, 7; JMP L0
        let program = program_of(vec![
            Instruction::new(Opcode::Label, vec![Operand::Label(Label(0))]),
            Instruction::new(
                Opcode::LoadI,
                vec![Operand::Register(Register(0)), Operand::Immediate(7)],
            ),
            Instruction::new(Opcode::Jmp, vec![Operand::Label(Label(0))]),
        ]);
        let file = encode(&program).unwrap();
        assert_eq!(file.insns.len(), 2);
        assert_eq!(file.insns[1].opcode, "Jump");
        assert_eq!(file.insns[1].a, 0);
    }

    #[test]
    fn conditional_branch_swizzles_operands() {
        // LABEL L3 at pc 1; JZ L3, r5
        let program = program_of(vec![
            Instruction::new(
                Opcode::Jz,
                vec![Operand::Label(Label(3)), Operand::Register(Register(5))],
            ),
            Instruction::new(Opcode::Label, vec![Operand::Label(Label(3))]),
            Instruction::new(Opcode::Halt, vec![]),
        ]);
        let file = encode(&program).unwrap();
        assert_eq!(file.insns[0].opcode, "JumpIfZero");
        assert_eq!(file.insns[0].a, 5, "a carries the condition register");
        assert_eq!(file.insns[0].b, 1, "b carries the target pc");
        assert_eq!(file.insns[0].c, 0);
    }

    #[test]
    fn unresolved_label_is_an_error() {
        let program = program_of(vec![Instruction::new(
            Opcode::Jmp,
            vec![Operand::Label(Label(9))],
        )]);
        assert!(matches!(
            encode(&program),
            Err(EncodeError::UnresolvedLabel(9))
        ));
    }

    #[test]
    fn json_document_shape() {
        let file = encode(&IntermediateProgram::default()).unwrap();
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["format_version"], "tisc-json-v1");
        assert_eq!(json["axion_policy_text"], "(policy (tier 1))");
        assert!(json["insns"].is_array());
        assert_eq!(json["insns"][0]["opcode"], "Halt");
    }
}
