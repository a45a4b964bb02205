//! End-to-end tests driving whole programs through parsing, analysis,
//! lowering, and bytecode encoding.

use t81c::bytecode;
use t81c::ir::{IntermediateProgram, IrGenerator, Opcode, Operand, StructuralKind};
use t81c::typeck::SemanticAnalyzer;
use t81c::Parser;

/// Full pipeline, asserting a clean compile.
fn compile(source: &str) -> IntermediateProgram {
    let mut parser = Parser::new(source, "test.t81");
    let program = parser.parse();
    assert!(
        !parser.had_error(),
        "parse errors: {:?}",
        parser
            .errors()
            .iter()
            .map(|d| d.render())
            .collect::<Vec<_>>()
    );

    let mut analyzer = SemanticAnalyzer::new("test.t81", parser.take_interner());
    analyzer.analyze(&program);
    assert!(
        !analyzer.had_error(),
        "semantic errors: {:?}",
        analyzer
            .diagnostics()
            .iter()
            .map(|d| d.render())
            .collect::<Vec<_>>()
    );

    IrGenerator::new(&analyzer)
        .generate(&program)
        .expect("IR generation should be total over analyzed programs")
}

fn count_opcode(program: &IntermediateProgram, opcode: Opcode) -> usize {
    program
        .instructions()
        .iter()
        .filter(|i| i.opcode == opcode)
        .count()
}

fn has_opcode(program: &IntermediateProgram, opcode: Opcode) -> bool {
    count_opcode(program, opcode) > 0
}

fn immediates_of(program: &IntermediateProgram, opcode: Opcode) -> Vec<i64> {
    program
        .instructions()
        .iter()
        .filter(|i| i.opcode == opcode)
        .flat_map(|i| {
            i.operands.iter().filter_map(|op| match op {
                Operand::Immediate(value) => Some(*value),
                _ => None,
            })
        })
        .collect()
}

// ============================================================
// Base-81 literal decoding and integer arithmetic
// ============================================================

#[test]
fn integer_return_with_base81_literals() {
    let program = compile("fn main() -> T81Int { return 20t81 + 22t81; }");
    assert!(has_opcode(&program, Opcode::LoadI));
    assert!(has_opcode(&program, Opcode::Add));
    assert!(has_opcode(&program, Opcode::Halt));

    // Pins the decoding convention: the digit run decodes as decimal.
    let immediates = immediates_of(&program, Opcode::LoadI);
    assert!(immediates.contains(&20));
    assert!(immediates.contains(&22));

    // The result lands in register 0 before HALT.
    let mov = program
        .instructions()
        .iter()
        .find(|i| i.opcode == Opcode::Mov)
        .expect("return moves into register 0");
    assert_eq!(mov.operands[0], Operand::Register(t81c::ir::Register(0)));
}

// ============================================================
// Conditional control flow
// ============================================================

#[test]
fn if_else_control_flow() {
    let program = compile("fn main() -> T81Int { if (2 < 1) { return 1; } else { return 123; } }");
    assert!(has_opcode(&program, Opcode::Cmp));
    assert!(has_opcode(&program, Opcode::Jz));
    assert!(has_opcode(&program, Opcode::Jmp));
    assert!(count_opcode(&program, Opcode::Label) >= 2);

    let cmp = program
        .instructions()
        .iter()
        .find(|i| i.opcode == Opcode::Cmp)
        .expect("comparison instruction");
    assert!(cmp.boolean_result);
    assert_eq!(cmp.relation, t81c::ir::ComparisonRelation::Less);
}

// ============================================================
// Bounded loops
// ============================================================

#[test]
fn bounded_loop_summation() {
    let program = compile(
        "fn main() -> i32 { var i: i32 = 0; var sum: i32 = 0; @bounded(100) loop { \
         if (i == 10) { return sum; } sum = sum + i; i = i + 1; } return sum; }",
    );
    assert!(has_opcode(&program, Opcode::Add));
    assert!(has_opcode(&program, Opcode::Jmp));
    assert!(has_opcode(&program, Opcode::Halt));
    // The equality test inside the loop drives a conditional branch.
    assert!(has_opcode(&program, Opcode::Jz));
}

#[test]
fn guarded_loop_continue_targets_guard() {
    let program = compile(
        "fn main() { var i: i32 = 0; @bounded(loop(i < 3)) loop { i = i + 1; continue; } }",
    );
    // Guard evaluation emits a conditional exit; continue jumps backward.
    assert!(has_opcode(&program, Opcode::Jz));
    assert!(count_opcode(&program, Opcode::Jmp) >= 2);
}

// ============================================================
// Match dispatch and guarded fallthrough
// ============================================================

#[test]
fn option_match_with_guards() {
    let program = compile(
        "fn main() -> i32 {\
           let x: i32 = 5;\
           let opt: Option[i32] = Some(x);\
           let r: i32 = match (opt) {\
             Some(v) if v > 10 => 100,\
             Some(v) if v < 10 => 200,\
             Some(v) => 300,\
             None => 0\
           };\
           return r;\
         }",
    );
    assert!(has_opcode(&program, Opcode::MakeOptionSome));
    assert!(has_opcode(&program, Opcode::OptionIsSome));
    assert!(has_opcode(&program, Opcode::OptionUnwrap));
    // Guards fall through via conditional branches.
    assert!(count_opcode(&program, Opcode::Jz) >= 2);
    // The guard breadcrumb survives as a NOP with a text literal.
    let breadcrumb = program
        .instructions()
        .iter()
        .find(|i| i.opcode == Opcode::Nop && i.text_literal.is_some())
        .expect("guard breadcrumb NOP");
    let text = breadcrumb.text_literal.as_deref().unwrap();
    assert!(text.starts_with("guard-expr"), "got: {}", text);
    assert!(text.contains("v > 10"));
    assert!(text.contains("variant=Some"));
}

#[test]
fn match_dispatch_sites_equal_distinct_variants() {
    let program = compile(
        "fn main() -> i32 { let o: Option[i32] = Some(1);\
         return match (o) { Some(v) if v > 2 => 1; Some(v) => 2; None => 0 }; }",
    );
    // Two distinct variant names (Some, None) -> two OPTION_IS_SOME tests.
    assert_eq!(count_opcode(&program, Opcode::OptionIsSome), 2);
}

#[test]
fn result_match_uses_result_opcodes() {
    let program = compile(
        "fn main() -> i32 { let r: Result[i32, T81String] = Ok(1);\
         return match (r) { Ok(v) => v; Err(e) => 0 }; }",
    );
    assert!(has_opcode(&program, Opcode::MakeResultOk));
    assert_eq!(count_opcode(&program, Opcode::ResultIsOk), 2);
    assert!(has_opcode(&program, Opcode::ResultUnwrapOk));
    assert!(has_opcode(&program, Opcode::ResultUnwrapErr));
    assert!(has_opcode(&program, Opcode::Trap));
}

// ============================================================
// Generic syntax rejection
// ============================================================

#[test]
fn legacy_generics_rejected() {
    let mut parser = Parser::new("let x: Vector<T81Int> = 1;", "test.t81");
    let _ = parser.parse();
    assert!(parser.had_error());
    assert!(parser.errors().iter().any(|d| d
        .message
        .contains("Legacy '<...>' syntax for generics is not supported.")));
}

// ============================================================
// Records, enum payloads, and structural metadata
// ============================================================

const RECORD_ENUM_PROGRAM: &str = "\
record Point { x: i32; y: i32; };\n\
enum MaybePoint { Some(Point); None; };\n\
fn sum(point: Point, payload: MaybePoint) -> i32 {\n\
  return match (payload) { Some(inner) => inner.x + inner.y; None => point.x - point.y; };\n\
}\n\
fn main() -> i32 {\n\
  let base: Point = Point { x: 7; y: 5; };\n\
  let payload: MaybePoint = Some(Point { x: 3; y: 2; });\n\
  return sum(base, payload);\n\
}\n";

#[test]
fn record_enum_payload_pipeline() {
    let program = compile(RECORD_ENUM_PROGRAM);

    // Structural metadata in declaration order with default schema version.
    let aliases = program.type_aliases();
    assert_eq!(aliases.len(), 2);
    assert_eq!(aliases[0].name, "Point");
    assert_eq!(aliases[0].kind, StructuralKind::Record);
    assert_eq!(aliases[0].schema_version, 1);
    assert_eq!(aliases[0].fields.len(), 2);
    assert_eq!(aliases[0].fields[0].name, "x");
    assert_eq!(aliases[0].fields[0].ty, "i32");
    assert_eq!(aliases[1].name, "MaybePoint");
    assert_eq!(aliases[1].kind, StructuralKind::Enum);
    assert_eq!(aliases[1].schema_version, 1);
    assert_eq!(aliases[1].variants.len(), 2);
    assert_eq!(aliases[1].variants[0].name, "Some");
    assert_eq!(aliases[1].variants[0].payload.as_deref(), Some("Point"));
    assert_eq!(aliases[1].variants[1].payload, None);

    // The contextual `Some(...)` constructs the user enum's variant 0 of
    // enum 0: global id (0 << 16) | 0.
    assert!(has_opcode(&program, Opcode::MakeEnumVariantPayload));
    let ids = immediates_of(&program, Opcode::MakeEnumVariantPayload);
    assert_eq!(ids, vec![0]);

    // Function metadata for both functions, in declaration order.
    let functions: Vec<&str> = program
        .function_metadata()
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(functions, vec!["sum", "main"]);
}

#[test]
fn enum_match_dispatches_on_global_variant_ids() {
    let program = compile(
        "enum Color { Red; Green; Blue; };\n\
         fn main() -> i32 { let c: Color = Color.Green;\n\
         return match (c) { Red => 1; Green => 2; Blue => 3 }; }",
    );
    // Three distinct variants -> three dispatch tests carrying ids 0, 1, 2.
    assert_eq!(count_opcode(&program, Opcode::EnumIsVariant), 3);
    assert_eq!(immediates_of(&program, Opcode::EnumIsVariant), vec![0, 1, 2]);
    // Constructing Color.Green uses the same packed encoding.
    assert_eq!(immediates_of(&program, Opcode::MakeEnumVariant), vec![1]);
}

#[test]
fn second_enum_gets_shifted_global_ids() {
    let program = compile(
        "enum A { X; };\nenum B { Y; Z; };\n\
         fn main() { let b: B = B.Z; }",
    );
    // B is enum id 1, Z is variant 1: (1 << 16) | 1.
    assert_eq!(
        immediates_of(&program, Opcode::MakeEnumVariant),
        vec![(1 << 16) | 1]
    );
}

// ============================================================
// Effects and attributes in metadata
// ============================================================

#[test]
fn function_attributes_reach_metadata() {
    let program = compile(
        "@effect @tier(3) fn side_effect(v: i32) -> bool { return v > 0; }\n\
         @effect fn main() -> i32 { let a: bool = false && (1 < 2);\n\
         let b: bool = true || (1 < 2); return 0; }",
    );

    let side_effect = program
        .function_metadata()
        .iter()
        .find(|f| f.name == "side_effect")
        .expect("side_effect metadata");
    assert!(side_effect.is_effectful);
    assert_eq!(side_effect.tier, Some(3));

    // Short-circuit lowering: && emits JZ, || emits JNZ.
    assert!(has_opcode(&program, Opcode::Jz));
    assert!(has_opcode(&program, Opcode::Jnz));
}

// ============================================================
// Vector literals and the tensor pool
// ============================================================

#[test]
fn vector_literal_fills_tensor_pool() {
    let program = compile("fn main() { let v: Vector[i32] = [1, 2, 3]; }");
    assert_eq!(program.tensor_pool().len(), 1);
    let tensor = &program.tensor_pool()[0];
    assert_eq!(tensor.shape(), &[3]);
    assert_eq!(tensor.data(), &[1.0, 2.0, 3.0]);

    // The LOADI carries the 1-based handle as a tensor-handle literal.
    let load = program
        .instructions()
        .iter()
        .find(|i| {
            i.opcode == Opcode::LoadI && i.literal_kind == t81c::ir::LiteralKind::TensorHandle
        })
        .expect("tensor LOADI");
    assert_eq!(load.operands[1], Operand::Immediate(1));
}

#[test]
fn string_literals_stay_on_the_instruction() {
    let program = compile(r#"fn main() { let s: T81String = "hi\nthere"; }"#);
    let load = program
        .instructions()
        .iter()
        .find(|i| i.opcode == Opcode::LoadI && i.text_literal.is_some())
        .expect("string LOADI");
    assert_eq!(load.literal_kind, t81c::ir::LiteralKind::SymbolHandle);
    assert_eq!(load.text_literal.as_deref(), Some("hi\nthere"));
}

#[test]
fn weights_load_lowering() {
    let program = compile(r#"fn main() -> i32 { return weights.load("model.bin"); }"#);
    let insn = program
        .instructions()
        .iter()
        .find(|i| i.opcode == Opcode::WeightsLoad)
        .expect("WEIGHTS_LOAD instruction");
    assert_eq!(insn.text_literal.as_deref(), Some("model.bin"));
}

// ============================================================
// Determinism
// ============================================================

#[test]
fn ir_generation_is_deterministic() {
    let source = RECORD_ENUM_PROGRAM;
    let mut parser = Parser::new(source, "test.t81");
    let program = parser.parse();
    assert!(!parser.had_error());
    let mut analyzer = SemanticAnalyzer::new("test.t81", parser.take_interner());
    analyzer.analyze(&program);
    assert!(!analyzer.had_error());

    let first = IrGenerator::new(&analyzer).generate(&program).unwrap();
    let second = IrGenerator::new(&analyzer).generate(&program).unwrap();
    assert_eq!(first.instructions(), second.instructions());
    assert_eq!(first.type_aliases(), second.type_aliases());
    assert_eq!(first.function_metadata(), second.function_metadata());
}

// ============================================================
// Bytecode encoding
// ============================================================

#[test]
fn bytecode_round_trip_for_if_else() {
    let program = compile("fn main() -> i32 { if (2 < 1) { return 1; } else { return 123; } }");
    let encoded = bytecode::encode(&program).unwrap();

    // No Label pseudo-instructions survive encoding.
    assert!(encoded.insns.iter().all(|i| i.opcode != "Label"));

    // Conditional branch carries {a: cond register, b: target pc}.
    let jz = encoded
        .insns
        .iter()
        .find(|i| i.opcode == "JumpIfZero")
        .expect("encoded JZ");
    assert!(jz.b >= 0 && (jz.b as usize) <= encoded.insns.len());
    assert_eq!(jz.c, 0);

    let json = serde_json::to_string(&encoded).unwrap();
    assert!(json.contains("\"format_version\":\"tisc-json-v1\""));
    assert!(json.contains("(policy (tier 1))"));
}

#[test]
fn bytecode_for_empty_main_is_nonempty() {
    let program = compile("fn main() { }");
    let encoded = bytecode::encode(&program).unwrap();
    assert_eq!(encoded.insns[0].opcode, "Halt");
}

// ============================================================
// Boundary behaviors
// ============================================================

#[test]
fn empty_source_produces_empty_program() {
    let program = compile("");
    assert!(program.instructions().is_empty());
    assert!(program.type_aliases().is_empty());
    assert!(program.function_metadata().is_empty());
}

#[test]
fn huge_integer_literal_does_not_crash() {
    let mut parser = Parser::new(
        "fn main() -> i32 { return 99999999999999999999999999; }",
        "test.t81",
    );
    let _ = parser.parse();
    assert!(parser.had_error());
    assert!(parser
        .errors()
        .iter()
        .any(|d| d.message.contains("Integer literal is out of range.")));
}

#[test]
fn non_main_functions_contribute_metadata_only() {
    let program = compile(
        "fn helper() -> i32 { return 1 + 2; }\nfn main() -> i32 { return 0; }",
    );
    assert_eq!(program.function_metadata().len(), 2);
    // helper's body is not lowered: exactly one ADD-free stream with the
    // main return only.
    assert_eq!(count_opcode(&program, Opcode::Add), 0);
}
