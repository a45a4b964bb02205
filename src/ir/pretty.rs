//! Human-readable IR listing for `emit-ir`.
//!
//! One instruction per line with its annotations, followed by a summary
//! trailer. Labels print flush-left so control flow is scannable.

use super::{ComparisonRelation, IntermediateProgram, LiteralKind, Opcode, PrimitiveKind};
use std::fmt::Write;

/// Render the full program listing.
pub fn pretty_print(program: &IntermediateProgram) -> String {
    let mut out = String::new();

    for instr in program.instructions() {
        if instr.opcode == Opcode::Label {
            if let Some(operand) = instr.operands.first() {
                let _ = writeln!(out, "{}:", operand);
            }
            continue;
        }

        let mut line = format!("    {}", instr.opcode);
        for (i, operand) in instr.operands.iter().enumerate() {
            if i == 0 {
                line.push(' ');
            } else {
                line.push_str(", ");
            }
            let _ = write!(line, "{}", operand);
        }

        let mut notes = Vec::new();
        if instr.primitive != PrimitiveKind::Unknown {
            notes.push(format!("{:?}", instr.primitive).to_lowercase());
        }
        if instr.relation != ComparisonRelation::None {
            notes.push(instr.relation.mnemonic().to_string());
        }
        if instr.is_conversion {
            notes.push("conv".to_string());
        }
        if instr.literal_kind != LiteralKind::Int {
            notes.push(format!("{:?}", instr.literal_kind));
        }
        if let Some(text) = &instr.text_literal {
            notes.push(format!("{:?}", text));
        }
        if !notes.is_empty() {
            let _ = write!(line, "  ; {}", notes.join(" "));
        }
        out.push_str(&line);
        out.push('\n');
    }

    let _ = write!(
        out,
        "instructions={}, type_aliases={}, tensors={}",
        program.instructions().len(),
        program.type_aliases().len(),
        program.tensor_pool().len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Label, Operand, Register};

    #[test]
    fn listing_ends_with_summary() {
        let mut program = IntermediateProgram::default();
        program.add_instruction(Instruction::new(
            Opcode::Label,
            vec![Operand::Label(Label(0))],
        ));
        program.add_instruction(Instruction::new(
            Opcode::LoadI,
            vec![Operand::Register(Register(0)), Operand::Immediate(42)],
        ));
        let text = pretty_print(&program);
        assert!(text.starts_with("L0:\n"));
        assert!(text.contains("LOADI r0, 42"));
        assert!(text.ends_with("instructions=2, type_aliases=0, tensors=0"));
    }
}
