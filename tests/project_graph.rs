//! Import-graph resolution tests.

use std::fs;
use std::path::PathBuf;
use t81c::project::{self, ProjectError};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("t81c-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn resolves_relative_imports_dependency_first() {
    let dir = temp_dir("imports");
    fs::write(dir.join("util.t81"), "fn helper() -> i32 { return 1; }\n").unwrap();
    fs::write(
        dir.join("main.t81"),
        "import util;\nfn main() -> i32 { return 0; }\n",
    )
    .unwrap();

    let units = project::load_module_graph(&dir.join("main.t81")).unwrap();
    assert_eq!(units.len(), 2);
    assert!(units[0].path.ends_with("util.t81"));
    assert!(units[1].path.ends_with("main.t81"));
    assert_eq!(units[1].imports, vec!["util".to_string()]);
}

#[test]
fn missing_import_is_an_error() {
    let dir = temp_dir("missing");
    fs::write(dir.join("main.t81"), "import nowhere;\nfn main() { return; }\n").unwrap();

    let err = project::load_module_graph(&dir.join("main.t81")).unwrap_err();
    assert!(matches!(err, ProjectError::MissingImport { .. }));
    assert!(err.to_string().contains("missing import 'nowhere'"));
}

#[test]
fn import_cycle_is_detected() {
    let dir = temp_dir("cycle");
    fs::write(dir.join("a.t81"), "import b;\n").unwrap();
    fs::write(dir.join("b.t81"), "import a;\n").unwrap();

    let err = project::load_module_graph(&dir.join("a.t81")).unwrap_err();
    assert!(matches!(err, ProjectError::Cycle { .. }));
}

#[test]
fn module_decl_resolves_from_module_root() {
    let dir = temp_dir("module-root");
    fs::create_dir_all(dir.join("app")).unwrap();
    fs::write(dir.join("util.t81"), "fn helper() { return; }\n").unwrap();
    fs::write(
        dir.join("app").join("main.t81"),
        "module app.main;\nimport util;\nfn main() { return; }\n",
    )
    .unwrap();

    let units = project::load_module_graph(&dir.join("app").join("main.t81")).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[1].module_decl.as_deref(), Some("app.main"));
}

#[test]
fn parse_errors_surface_with_diagnostics() {
    let dir = temp_dir("parse-errors");
    fs::write(dir.join("main.t81"), "fn main() { let = 1; }\n").unwrap();

    let err = project::load_module_graph(&dir.join("main.t81")).unwrap_err();
    let ProjectError::Parse { diagnostics, .. } = err else {
        panic!("expected parse error");
    };
    assert!(!diagnostics.is_empty());
}
