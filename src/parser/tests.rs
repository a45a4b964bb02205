//! Parser unit tests, asserted against the canonical AST rendering.

use crate::ast::{ExprKind, Program, StmtKind};
use crate::parser::Parser;
use crate::printer::CanonicalAstPrinter;
use string_interner::DefaultStringInterner;

fn parse_ok(source: &str) -> (Program, DefaultStringInterner) {
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
    let interner = parser.take_interner();
    (program, interner)
}

fn canonical(source: &str) -> String {
    let (program, interner) = parse_ok(source);
    let printer = CanonicalAstPrinter::new(&interner);
    program
        .statements
        .iter()
        .map(|s| printer.print_stmt(s))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_errors(source: &str) -> Vec<String> {
    let mut parser = Parser::new(source, "test.t81");
    let _ = parser.parse();
    parser.errors().iter().map(|d| d.message.clone()).collect()
}

#[test]
fn let_declaration() {
    assert_eq!(canonical("let x = 1 + 2;"), "(let x = (+ 1 2))");
    assert_eq!(canonical("let x: i32 = 1;"), "(let x: i32 = 1)");
}

#[test]
fn var_declaration_forms() {
    assert_eq!(canonical("var i: i32 = 0;"), "(var i: i32 0)");
    assert_eq!(canonical("var i: i32;"), "(var i: i32)");
    assert_eq!(canonical("var i = 3;"), "(var i 3)");
}

#[test]
fn operator_precedence() {
    assert_eq!(canonical("let x = 1 + 2 * 3;"), "(let x = (+ 1 (* 2 3)))");
    assert_eq!(
        canonical("let x = 1 < 2 == true;"),
        "(let x = (== (< 1 2) true))"
    );
    assert_eq!(
        canonical("let x = a || b && c;"),
        "(let x = (|| a (&& b c)))"
    );
}

#[test]
fn unary_and_grouping() {
    assert_eq!(canonical("let x = -(1 + 2);"), "(let x = (- (group (+ 1 2))))");
    assert_eq!(canonical("let x = !flag;"), "(let x = (! flag))");
}

#[test]
fn function_declaration() {
    assert_eq!(
        canonical("fn main() -> i32 { return 0; }"),
        "(fn main ( ) -> i32 (block (return 0)))"
    );
    assert_eq!(
        canonical("fn add(a: i32, b: i32) -> i32 { return a + b; }"),
        "(fn add (a: i32 b: i32 ) -> i32 (block (return (+ a b))))"
    );
}

#[test]
fn function_attributes() {
    assert_eq!(
        canonical("@effect @tier(3) fn run() { return; }"),
        "(fn @effect @tier(3) run ( ) (block (return)))"
    );
}

#[test]
fn attribute_on_wrong_declaration() {
    let errors = parse_errors("@schema(2) fn f() { return; }");
    assert!(errors
        .iter()
        .any(|m| m.contains("Structural attributes may only decorate records or enums.")));

    let errors = parse_errors("@effect record R { x: i32; };");
    assert!(errors
        .iter()
        .any(|m| m.contains("Function attributes may only decorate functions.")));
}

#[test]
fn duplicate_schema_attribute() {
    let errors = parse_errors("@schema(1) @schema(2) record R { x: i32; };");
    assert_eq!(
        errors
            .iter()
            .filter(|m| m.contains("Duplicate '@schema' attribute."))
            .count(),
        1
    );
}

#[test]
fn schema_version_must_be_positive() {
    let errors = parse_errors("@schema(0) record R { x: i32; };");
    assert!(errors.iter().any(|m| m.contains("Schema version must be positive.")));
}

#[test]
fn module_and_import_declarations() {
    assert_eq!(canonical("module app.main;"), "(module app.main)");
    assert_eq!(canonical("import util.math;"), "(import util.math)");
}

#[test]
fn record_and_enum_declarations() {
    assert_eq!(
        canonical("record Point { x: i32; y: i32; };"),
        "(record Point x: i32 y: i32)"
    );
    assert_eq!(
        canonical("enum MaybePoint { Some(Point); None; };"),
        "(enum MaybePoint Some(Point) None)"
    );
}

#[test]
fn type_alias_declaration() {
    assert_eq!(
        canonical("type Pair[T] = Vector[T];"),
        "(type Pair [T] = (generic Vector T))"
    );
}

#[test]
fn generic_bracket_syntax() {
    assert_eq!(
        canonical("let x: Option[i32] = Some(1);"),
        "(let x: (generic Option i32) = (call Some 1))"
    );
    assert_eq!(
        canonical("let t: Tensor[T81Float, N] = v;"),
        "(let t: (generic Tensor T81Float N) = v)"
    );
}

#[test]
fn legacy_angle_generics_rejected() {
    let errors = parse_errors("let x: Vector<T81Int> = 1;");
    assert!(errors
        .iter()
        .any(|m| m.contains("Legacy '<...>' syntax for generics is not supported.")));
}

#[test]
fn enum_literal_splits_dotted_identifier() {
    assert_eq!(
        canonical("let c = Color.Red;"),
        "(let c = (enumlit Color.Red))"
    );
    assert_eq!(
        canonical("let c = Color.Rgb(5);"),
        "(let c = (enumlit Color.Rgb 5))"
    );
}

#[test]
fn dotted_identifier_becomes_field_access() {
    assert_eq!(
        canonical("let x = inner.x + inner.y;"),
        "(let x = (+ (field x inner) (field y inner)))"
    );
}

#[test]
fn dotted_callee_stays_whole() {
    assert_eq!(
        canonical(r#"let h = weights.load("model.bin");"#),
        r#"(let h = (call weights.load "model.bin"))"#
    );
}

#[test]
fn field_access_after_call() {
    assert_eq!(
        canonical("let x = get().x;"),
        "(let x = (field x (call get)))"
    );
}

#[test]
fn record_literal_with_trailing_separator() {
    assert_eq!(
        canonical("let p = Point { x: 7; y: 5; };"),
        "(let p = (recordlit Point x: 7 y: 5))"
    );
    assert_eq!(
        canonical("let p = Point { x: 7, y: 5 };"),
        "(let p = (recordlit Point x: 7 y: 5))"
    );
}

#[test]
fn vector_literal() {
    assert_eq!(canonical("let v = [1, 2, 3];"), "(let v = [1, 2, 3])");
    assert_eq!(canonical("let v: Vector[i32] = [];"), "(let v: (generic Vector i32) = [])");
}

#[test]
fn match_expression_with_guards() {
    assert_eq!(
        canonical("let r = match (opt) { Some(v) if v > 10 => 100, None => 0 };"),
        "(let r = (match opt (Some v if (> v 10) => 100) (None => 0)))"
    );
}

#[test]
fn match_patterns() {
    assert_eq!(
        canonical("let r = match (p) { Pair(a, b) => a; Empty => 0 };"),
        "(let r = (match p (Pair a b => a) (Empty => 0)))"
    );
    assert_eq!(
        canonical("let r = match (p) { Boxed({ x, y: inner }) => inner; Empty => 0 };"),
        "(let r = (match p (Boxed {x,y:inner, } => inner) (Empty => 0)))"
    );
    assert_eq!(
        canonical("let r = match (m) { Some(Inner(v)) => v; None => 0 };"),
        "(let r = (match m (Some Inner(v) => v) (None => 0)))"
    );
}

#[test]
fn loop_annotations() {
    assert_eq!(
        canonical("fn main() { @bounded(infinite) loop { break; } }"),
        "(fn main ( ) (block (loop @bounded(infinite) (block (break)))))"
    );
    assert_eq!(
        canonical("fn main() { @bounded(100) loop { continue; } }"),
        "(fn main ( ) (block (loop @bounded(100) (block (continue)))))"
    );
    assert_eq!(
        canonical("fn main() { @bounded(loop(x < 3)) loop { break; } }"),
        "(fn main ( ) (block (loop (block (break)))))"
    );
}

#[test]
fn loop_without_annotation_still_parses() {
    let (program, _) = parse_ok("fn main() { loop { break; } }");
    let StmtKind::Function(decl) = &program.statements[0].kind else {
        panic!("expected function");
    };
    let StmtKind::Loop(loop_stmt) = &decl.body[0].kind else {
        panic!("expected loop statement");
    };
    assert_eq!(loop_stmt.bound, crate::ast::BoundKind::None);
}

#[test]
fn unsupported_annotation_is_reported() {
    let errors = parse_errors("fn main() { @frobnicate(1) loop { break; } }");
    assert!(errors.iter().any(|m| m.contains("Unsupported annotation 'frobnicate'")));
}

#[test]
fn bounded_requires_argument() {
    let errors = parse_errors("fn main() { @bounded() loop { break; } }");
    assert!(errors.iter().any(|m| m.contains("'@bounded' requires an argument")));
}

#[test]
fn invalid_assignment_target() {
    let errors = parse_errors("fn main() { 1 = 2; }");
    assert!(errors.iter().any(|m| m.contains("Invalid assignment target")));
}

#[test]
fn error_recovery_reports_multiple_errors() {
    let errors = parse_errors("fn main() { let = 1; let y = 2; return }");
    assert!(errors.len() >= 2);
}

#[test]
fn base81_literals_parse() {
    assert_eq!(canonical("let x = 20t81 + 22t81;"), "(let x = (+ 20t81 22t81))");
    let (program, _) = parse_ok("let x = 20t81;");
    let StmtKind::Let { init, .. } = &program.statements[0].kind else {
        panic!("expected let");
    };
    let ExprKind::Literal(lit) = &init.kind else {
        panic!("expected literal");
    };
    assert_eq!(
        lit.kind,
        crate::ast::LitKind::Int {
            value: 20,
            base81: true
        }
    );
}

#[test]
fn node_ids_are_unique() {
    let (program, _) = parse_ok("fn main() -> i32 { let x = 1 + 2; return x; }");
    let mut ids = Vec::new();
    fn collect_stmt(stmt: &crate::ast::Stmt, ids: &mut Vec<u32>) {
        ids.push(stmt.id.0);
        match &stmt.kind {
            StmtKind::Function(decl) => {
                for s in &decl.body {
                    collect_stmt(s, ids);
                }
            }
            StmtKind::Let { init, .. } => collect_expr(init, ids),
            StmtKind::Return { value: Some(v), .. } => collect_expr(v, ids),
            _ => {}
        }
    }
    fn collect_expr(expr: &crate::ast::Expr, ids: &mut Vec<u32>) {
        ids.push(expr.id.0);
        if let ExprKind::Binary { left, right, .. } = &expr.kind {
            collect_expr(left, ids);
            collect_expr(right, ids);
        }
    }
    for stmt in &program.statements {
        collect_stmt(stmt, &mut ids);
    }
    let len = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), len, "node ids must be unique");
}
