//! Semantic analyzer unit tests.

use super::{MatchKind, SemanticAnalyzer};
use crate::ast::{BoundKind, Program};
use crate::parser::Parser;

fn with_analysis<R>(source: &str, f: impl FnOnce(&SemanticAnalyzer, &Program) -> R) -> R {
    let mut parser = Parser::new(source, "test.t81");
    let program = parser.parse();
    assert!(
        !parser.had_error(),
        "unexpected parse errors: {:?}",
        parser
            .errors()
            .iter()
            .map(|d| d.message.clone())
            .collect::<Vec<_>>()
    );
    let mut analyzer = SemanticAnalyzer::new("test.t81", parser.take_interner());
    analyzer.analyze(&program);
    f(&analyzer, &program)
}

fn check_messages(source: &str) -> Vec<String> {
    with_analysis(source, |analyzer, _| {
        analyzer
            .diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect()
    })
}

#[track_caller]
fn assert_checks(source: &str) {
    let messages = check_messages(source);
    assert!(messages.is_empty(), "unexpected diagnostics: {:?}", messages);
}

#[track_caller]
fn assert_check_error(source: &str, expected: &str) {
    let messages = check_messages(source);
    assert!(
        messages.iter().any(|m| m.contains(expected)),
        "expected error containing '{}', got: {:?}",
        expected,
        messages
    );
}

// ============================================================
// Numeric lattice
// ============================================================

#[test]
fn integer_widening_in_arithmetic() {
    assert_checks("fn main() -> i32 { let a: i8 = 1; let b: i32 = 2; return a + b; }");
    assert_checks("fn main() -> T81BigInt { let a: i16 = 1; let b: T81BigInt = 2; return a * b; }");
}

#[test]
fn narrowing_assignment_is_rejected() {
    assert_check_error(
        "fn main() { let a: i32 = 1; let b: i8 = a; }",
        "Cannot assign initializer of type 'i32' to constant of type 'i8'.",
    );
}

#[test]
fn integer_widens_into_float_and_fraction() {
    assert_checks("fn main() -> T81Float { let x: T81Float = 1.5; return x + 1; }");
    assert_checks("fn main() -> T81Fraction { let x: T81Fraction = 1; return x * 2; }");
}

#[test]
fn float_fraction_mix_is_rejected() {
    assert_check_error(
        "fn main() { let f: T81Float = 1.5; let q: T81Fraction = 1; let x = f + q; }",
        "Operands must share a primitive numeric type",
    );
}

#[test]
fn modulo_requires_integers() {
    assert_check_error(
        "fn main() { let x = 1.5 % 2; }",
        "Modulo requires integer operands",
    );
}

#[test]
fn comparison_produces_bool() {
    assert_checks("fn main() -> bool { return 1 < 2; }");
    assert_check_error(
        "fn main() { let s: T81String = \"a\"; let x = s < 1; }",
        "Operands must be primitive numeric types",
    );
}

#[test]
fn equality_mismatch_reports_once() {
    let messages = check_messages("fn main() { let b: bool = true; let x = b == 1; }");
    assert_eq!(
        messages.len(),
        1,
        "expected exactly one diagnostic: {:?}",
        messages
    );
    assert!(messages[0].contains("Invalid operands for equality check."));
}

#[test]
fn logical_operators_require_bool() {
    assert_checks("fn main() -> bool { return true && (1 < 2); }");
    assert_check_error(
        "fn main() { let x = 1 || true; }",
        "Logical operators require boolean operands.",
    );
}

#[test]
fn unary_operand_rules() {
    assert_checks("fn main() -> i32 { return -(1 + 2); }");
    assert_check_error("fn main() { let x = -true; }", "Unary minus requires a numeric operand.");
    assert_check_error("fn main() { let x = !1; }", "Logical not requires a boolean operand.");
}

// ============================================================
// Names, scopes, control flow
// ============================================================

#[test]
fn undefined_variable() {
    assert_check_error("fn main() { let x = y; }", "Undefined variable 'y'.");
}

#[test]
fn duplicate_in_scope() {
    assert_check_error(
        "fn main() { let x = 1; let x = 2; }",
        "Variable 'x' is already defined in this scope.",
    );
}

#[test]
fn shadowing_in_nested_block_is_allowed() {
    assert_checks("fn main() { let x = 1; { let x = 2; let y = x; } }");
}

#[test]
fn condition_must_be_bool() {
    assert_check_error("fn main() { if (1) { } }", "Condition must be bool, found 'i32'.");
    assert_check_error("fn main() { while (1) { } }", "Condition must be bool");
}

#[test]
fn break_and_continue_outside_loop() {
    assert_check_error("fn main() { break; }", "Break statement outside of a loop.");
    assert_check_error("fn main() { continue; }", "Continue statement outside of a loop.");
}

#[test]
fn break_inside_while_is_allowed() {
    assert_checks("fn main() { while (true) { break; } }");
}

#[test]
fn return_type_checking() {
    assert_check_error(
        "fn main() -> i32 { return true; }",
        "Return type mismatch: expected 'i32' but got 'bool'.",
    );
    assert_check_error(
        "fn main() -> i32 { return; }",
        "Return type mismatch: expected 'i32' but got 'void'.",
    );
    assert_checks("fn main() { return; }");
}

#[test]
fn forward_references_type_check() {
    assert_checks("fn main() -> i32 { return helper(); } fn helper() -> i32 { return 1; }");
}

#[test]
fn duplicate_function_definition() {
    assert_check_error(
        "fn f() { return; } fn f() { return; }",
        "Function 'f' is already defined.",
    );
}

#[test]
fn call_arity_and_argument_types() {
    assert_check_error(
        "fn f(a: i32) -> i32 { return a; } fn main() { let x = f(); }",
        "Function 'f' expects 1 arguments but got 0.",
    );
    assert_check_error(
        "fn f(a: i32) -> i32 { return a; } fn main() { let x = f(true); }",
        "Argument 0 for function 'f' expects 'i32' but got 'bool'.",
    );
}

#[test]
fn calling_a_variable_is_rejected() {
    assert_check_error(
        "fn main() { let x = 1; let y = x(); }",
        "'x' is not a function.",
    );
}

// ============================================================
// Contextual constructors
// ============================================================

#[test]
fn option_constructors() {
    assert_checks("fn main() { let o: Option[i32] = Some(5); }");
    assert_checks("fn main() { let o: Option[i32] = None(); }");
    assert_check_error(
        "fn main() { let o = None(); }",
        "The 'None' constructor requires a contextual Option[T] type.",
    );
    assert_check_error(
        "fn main() { let o: Option[i32] = Some(\"s\"); }",
        "The 'Some' constructor argument must match the contextual Option payload ('i32').",
    );
}

#[test]
fn result_constructors() {
    assert_checks("fn main() { let r: Result[i32, T81String] = Ok(1); }");
    assert_checks("fn main() { let r: Result[i32, T81String] = Err(\"no\"); }");
    assert_check_error(
        "fn main() { let r = Ok(1); }",
        "The 'Ok' constructor requires a contextual Result[T, E] type.",
    );
    assert_check_error(
        "fn main() { let r: Result[i32, T81String] = Ok(\"s\"); }",
        "The 'Ok' constructor argument must match the success type of the contextual Result.",
    );
    assert_check_error(
        "fn main() { let r: Result[i32, T81String] = Err(1); }",
        "The 'Err' constructor argument must match the error type of the contextual Result.",
    );
}

#[test]
fn weights_load_builtin() {
    assert_checks("fn main() -> i32 { return weights.load(\"model.bin\"); }");
    assert_check_error(
        "fn main() { let s: T81String = \"m\"; let h = weights.load(s); }",
        "The 'weights.load' argument must be a string literal.",
    );
    assert_check_error(
        "fn main() { let h = weights.load(1); }",
        "The 'weights.load' argument must be a string literal.",
    );
}

#[test]
fn refine_fills_declared_generic_slots() {
    // Declared Option with an unknown payload refines from the initializer.
    assert_checks(
        "fn make() -> Option[i32] { let x: Option[i32] = Some(1); return x; }\
         fn main() { let o: Option[i32] = make(); }",
    );
}

// ============================================================
// Records and enums
// ============================================================

const POINT: &str = "record Point { x: i32; y: i32; };\n";

#[test]
fn record_literal_checks() {
    assert_checks(&format!("{}fn main() {{ let p: Point = Point {{ x: 1; y: 2; }}; }}", POINT));
    assert_check_error(
        &format!("{}fn main() {{ let p = Point {{ x: 1; }}; }}", POINT),
        "Record literal for 'Point' is missing field 'y'.",
    );
    assert_check_error(
        &format!("{}fn main() {{ let p = Point {{ x: 1; y: 2; z: 3; }}; }}", POINT),
        "Record 'Point' has no field 'z'.",
    );
    assert_check_error(
        &format!("{}fn main() {{ let p = Point {{ x: 1; x: 2; y: 3; }}; }}", POINT),
        "Field 'x' is provided more than once in 'Point'.",
    );
    assert_check_error(
        &format!("{}fn main() {{ let p = Point {{ x: true; y: 2; }}; }}", POINT),
        "Cannot assign 'bool' to field 'x' of type 'i32'.",
    );
}

#[test]
fn field_access_checks() {
    assert_checks(&format!(
        "{}fn main() -> i32 {{ let p: Point = Point {{ x: 1; y: 2; }}; return p.x + p.y; }}",
        POINT
    ));
    assert_check_error(
        &format!("{}fn main() -> i32 {{ let p: Point = Point {{ x: 1; y: 2; }}; return p.z; }}", POINT),
        "Record 'Point' has no field 'z'.",
    );
    assert_check_error(
        "fn main() { let x = 1; let y = x.field; }",
        "Field access requires a record value.",
    );
}

#[test]
fn duplicate_record_and_field() {
    assert_check_error(
        &format!("{}record Point {{ z: i32; }};", POINT),
        "Record 'Point' is already defined.",
    );
    assert_check_error(
        "record R { x: i32; x: i32; };",
        "Field 'x' is already declared in record 'R'.",
    );
}

#[test]
fn enum_declaration_and_literals() {
    let source = "enum Color { Red; Green; Blue; };\n";
    assert_checks(&format!("{}fn main() {{ let c: Color = Color.Red; }}", source));
    assert_check_error(
        &format!("{}fn main() {{ let c = Color.Purple; }}", source),
        "Enum 'Color' has no variant 'Purple'.",
    );
    assert_check_error(
        &format!("{}fn main() {{ let c = Color.Red(1); }}", source),
        "Variant 'Red' of enum 'Color' does not accept a payload.",
    );
    assert_check_error(
        "fn main() { let c = Color.Red; }",
        "Undefined enum 'Color'.",
    );
}

#[test]
fn enum_payload_rules() {
    let source = "record Point { x: i32; y: i32; };\nenum MaybePoint { Some(Point); None; };\n";
    assert_checks(&format!(
        "{}fn main() {{ let m: MaybePoint = MaybePoint.Some(Point {{ x: 1; y: 2; }}); }}",
        source
    ));
    assert_check_error(
        &format!("{}fn main() {{ let m = MaybePoint.Some; }}", source),
        "Variant 'Some' of enum 'MaybePoint' requires a payload.",
    );
    assert_check_error(
        &format!("{}fn main() {{ let m = MaybePoint.Some(1); }}", source),
        "Enum payload for 'Some' must be 'Point'.",
    );
}

#[test]
fn enum_variant_constructor_from_context() {
    let source = "record Point { x: i32; y: i32; };\nenum MaybePoint { Some(Point); None; };\n";
    assert_checks(&format!(
        "{}fn main() {{ let m: MaybePoint = Some(Point {{ x: 3; y: 2; }}); }}",
        source
    ));
}

#[test]
fn enum_ids_are_monotonic_in_declaration_order() {
    let source = "enum A { X; Y; };\nenum B { Z; };\nfn main() { return; }";
    with_analysis(source, |analyzer, _| {
        let defs = analyzer.enum_definitions();
        let a = defs
            .iter()
            .find(|(sym, _)| analyzer.symbol_name(**sym) == "A")
            .map(|(_, info)| info)
            .expect("enum A registered");
        let b = defs
            .iter()
            .find(|(sym, _)| analyzer.symbol_name(**sym) == "B")
            .map(|(_, info)| info)
            .expect("enum B registered");
        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(a.variant_order.len(), 2);
        let y = a
            .variants
            .get(&a.variant_order[1])
            .expect("variant Y registered");
        assert_eq!(y.id, 1);
    });
}

// ============================================================
// Match expressions
// ============================================================

#[test]
fn option_match_requires_both_arms() {
    assert_check_error(
        "fn main() -> i32 { let o: Option[i32] = Some(1);\
         return match (o) { Some(v) => v }; }",
        "Option match on 'Option[i32]' requires 'None' arm.",
    );
}

#[test]
fn result_match_requires_ok_and_err() {
    assert_check_error(
        "fn main() -> i32 { let r: Result[i32, T81String] = Ok(1);\
         return match (r) { Ok(v) => v }; }",
        "Result match on 'Result[i32, T81String]' requires 'Err' arm.",
    );
}

#[test]
fn enum_match_requires_all_variants() {
    assert_check_error(
        "enum Color { Red; Green; Blue; };\
         fn pick(c: Color) -> i32 { return match (c) { Red => 1; Green => 2 }; }",
        "Enum match on 'Color' requires 'Blue' arm.",
    );
}

#[test]
fn duplicate_unguarded_arm_is_rejected() {
    assert_check_error(
        "fn main() -> i32 { let o: Option[i32] = Some(1);\
         return match (o) { Some(v) => 1; Some(w) => 2; None => 0 }; }",
        "Duplicate match arm for 'Some' without a guard.",
    );
}

#[test]
fn duplicate_guarded_arms_are_allowed() {
    assert_checks(
        "fn main() -> i32 { let o: Option[i32] = Some(5);\
         return match (o) { Some(v) if v > 10 => 100; Some(v) if v < 10 => 200;\
         Some(v) => 300; None => 0 }; }",
    );
}

#[test]
fn invalid_variant_for_scrutinee() {
    assert_check_error(
        "fn main() -> i32 { let o: Option[i32] = Some(1);\
         return match (o) { Ok(v) => v; None => 0 }; }",
        "Variant 'Ok' is not part of 'Option[i32]'.",
    );
}

#[test]
fn match_scrutinee_must_be_matchable() {
    assert_check_error(
        "fn main() -> i32 { return match (1) { Some(v) => v; None => 0 }; }",
        "Match expressions require Option[T], Result[T, E], or enum values.",
    );
}

#[test]
fn payload_binding_rules() {
    assert_check_error(
        "fn main() -> i32 { let o: Option[i32] = Some(1);\
         return match (o) { Some => 1; None => 0 }; }",
        "Variant 'Some' requires a binding.",
    );
    assert_check_error(
        "fn main() -> i32 { let o: Option[i32] = Some(1);\
         return match (o) { Some(v) => v; None(x) => 0 }; }",
        "Variant 'None' does not accept a binding.",
    );
}

#[test]
fn guard_must_be_bool() {
    assert_check_error(
        "fn main() -> i32 { let o: Option[i32] = Some(1);\
         return match (o) { Some(v) if v + 1 => v; None => 0 }; }",
        "Condition must be bool, found 'i32'.",
    );
}

#[test]
fn arms_must_share_a_type() {
    assert_check_error(
        "fn main() { let o: Option[i32] = Some(1);\
         let x = match (o) { Some(v) => 1; None => \"s\" }; }",
        "All match arms must produce the same type.",
    );
}

#[test]
fn tuple_pattern_arity() {
    let source = "enum Wrap { Pair(Result[i32, T81String]); Empty; };\n";
    assert_checks(&format!(
        "{}fn f(w: Wrap) -> i32 {{ return match (w) {{ Pair(a, b) => 1; Empty => 0 }}; }}",
        source
    ));
    assert_check_error(
        &format!(
            "{}fn f(w: Wrap) -> i32 {{ return match (w) {{ Pair(a, b, c) => 1; Empty => 0 }}; }}",
            source
        ),
        "Tuple pattern for variant 'Pair' expects 3 fields but payload has 2.",
    );
}

#[test]
fn record_pattern_fields() {
    let source = "record P { x: i32; y: i32; };\nenum M { Boxed(P); Nothing; };\n";
    assert_checks(&format!(
        "{}fn f(m: M) -> i32 {{ return match (m) {{ Boxed({{ x, y: inner }}) => inner + x; Nothing => 0 }}; }}",
        source
    ));
    assert_check_error(
        &format!(
            "{}fn f(m: M) -> i32 {{ return match (m) {{ Boxed({{ z }}) => z; Nothing => 0 }}; }}",
            source
        ),
        "Record 'P' has no field 'z'.",
    );
}

#[test]
fn nested_variant_pattern() {
    let source = "enum Leaf { Val(i32); Nil; };\nenum Tree { Node(Leaf); Empty; };\n";
    assert_checks(&format!(
        "{}fn f(t: Tree) -> i32 {{ return match (t) {{ Node(Val(v)) => v; Empty => 0 }}; }}",
        source
    ));
    assert_check_error(
        &format!(
            "{}fn f(t: Tree) -> i32 {{ return match (t) {{ Node(Missing(v)) => v; Empty => 0 }}; }}",
            source
        ),
        "Variant 'Missing' is not part of 'Leaf'.",
    );
}

#[test]
fn match_metadata_records_arms_and_guards() {
    let source = "fn main() -> i32 { let o: Option[i32] = Some(5);\
                  let r: i32 = match (o) { Some(v) if v > 10 => 100; Some(v) => 300;\
                  None => 0 }; return r; }";
    with_analysis(source, |analyzer, _| {
        assert!(!analyzer.had_error());
        let metadata = analyzer.match_metadata();
        assert_eq!(metadata.len(), 1);
        let meta = &metadata[0];
        assert_eq!(meta.kind, MatchKind::Option);
        assert!(meta.has_some && meta.has_none);
        assert!(meta.guard_present);
        assert_eq!(meta.arms.len(), 3);
        assert!(meta.arms[0].has_guard);
        assert_eq!(meta.arms[0].guard_expression, "v > 10");
        assert!(!meta.arms[1].has_guard);
    });
}

#[test]
fn enum_match_metadata_has_variant_ids() {
    let source = "enum Color { Red; Green; Blue; };\
                  fn pick(c: Color) -> i32 { return match (c) { Red => 1; Green => 2; Blue => 3 }; }";
    with_analysis(source, |analyzer, _| {
        assert!(!analyzer.had_error());
        let meta = &analyzer.match_metadata()[0];
        assert_eq!(meta.kind, MatchKind::Enum);
        let ids: Vec<i32> = meta.arms.iter().map(|a| a.variant_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(meta.arms.iter().all(|a| a.enum_id == 0));
    });
}

// ============================================================
// Loops
// ============================================================

#[test]
fn loop_requires_annotation() {
    assert_check_error(
        "fn main() { loop { break; } }",
        "Loops must be annotated with '@bounded(...)'.",
    );
}

#[test]
fn static_bound_must_be_positive() {
    assert_check_error(
        "fn main() { @bounded(0) loop { break; } }",
        "Static loop bounds must be a positive integer.",
    );
}

#[test]
fn guarded_loop_guard_must_be_bool() {
    assert_check_error(
        "fn main() { var i: i32 = 0; @bounded(loop(i + 1)) loop { break; } }",
        "Condition must be bool",
    );
    assert_checks("fn main() { var i: i32 = 0; @bounded(loop(i < 3)) loop { i = i + 1; } }");
}

#[test]
fn loop_metadata_tracks_depth_and_id() {
    let source = "fn main() { @bounded(infinite) loop { @bounded(10) loop { break; } break; } }";
    with_analysis(source, |analyzer, _| {
        assert!(!analyzer.had_error());
        let metadata = analyzer.loop_metadata();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].id, 0);
        assert_eq!(metadata[0].depth, 0);
        assert_eq!(metadata[0].bound, BoundKind::Infinite);
        assert_eq!(metadata[1].id, 1);
        assert_eq!(metadata[1].depth, 1);
        assert_eq!(metadata[1].bound_value, Some(10));
        assert!(metadata.iter().all(|m| m.source_file == "test.t81"));
    });
}

#[test]
fn while_counts_toward_loop_depth() {
    let source = "fn main() { while (true) { @bounded(5) loop { break; } } }";
    with_analysis(source, |analyzer, _| {
        assert!(!analyzer.had_error());
        assert_eq!(analyzer.loop_metadata()[0].depth, 1);
    });
}

// ============================================================
// Generics and aliases
// ============================================================

#[test]
fn alias_arity_mismatch() {
    assert_check_error(
        "type Pair[T] = Vector[T];\nfn main() { var x: Pair[i32, i32]; }",
        "Generic type 'Pair' expects 1 parameters but got 2.",
    );
}

#[test]
fn alias_substitution() {
    assert_checks("type Ints = Vector[i32];\nfn main() { let v: Ints = [1, 2]; }");
    assert_checks("type Boxed[T] = Option[T];\nfn main() { let o: Boxed[i32] = Some(1); }");
}

#[test]
fn duplicate_alias_definition() {
    assert_check_error(
        "type A = i32;\ntype A = i16;",
        "Generic type 'A' is already defined.",
    );
}

#[test]
fn constant_parameters_compare_by_repr() {
    assert_checks(
        "fn main() { var a: Tensor[T81Float, 3]; var b: Tensor[T81Float, 3]; b = a; }",
    );
    assert_check_error(
        "fn main() { var a: Tensor[T81Float, 3]; var b: Tensor[T81Float, 4]; b = a; }",
        "Cannot assign value of type",
    );
    assert_checks("fn main() { var a: Tensor[T81Float, N]; var b: Tensor[T81Float, N]; b = a; }");
}

#[test]
fn option_and_result_arity() {
    assert_check_error(
        "fn main() { var o: Option[i32, i32]; }",
        "The 'Option' type expects exactly one type parameter, but got 2.",
    );
    assert_check_error(
        "fn main() { var r: Result[i32]; }",
        "The 'Result' type expects exactly two type parameters, but got 1.",
    );
}

// ============================================================
// Vector literals
// ============================================================

#[test]
fn vector_literal_typing() {
    assert_checks("fn main() { let v: Vector[i32] = [1, 2, 3]; }");
    assert_checks("fn main() { let v: Vector[i32] = []; }");
    assert_check_error(
        "fn main() { let v = []; }",
        "Empty vector literal requires a contextual Vector[T] type.",
    );
    assert_check_error(
        "fn main() { let v = [1, \"a\"]; }",
        "Vector literal elements must share a numeric type.",
    );
    assert_check_error(
        "fn main() { let x = 1; let v = [x]; }",
        "Vector literal elements must be literal numerics.",
    );
}

#[test]
fn empty_source_has_no_diagnostics() {
    with_analysis("", |analyzer, program| {
        assert!(!analyzer.had_error());
        assert!(analyzer.diagnostics().is_empty());
        assert!(program.statements.is_empty());
    });
}
