//! Module graph loading and import resolution.
//!
//! An entry file pulls in its imports transitively. An import path `a.b.c`
//! resolves against the importer's directory first; when the importer
//! declares `module x.y.z`, the search ascends `len(segments) - 1`
//! directories to the module root and resolves there. Cycles and missing
//! files are errors. Each loaded unit is analyzed with its own analyzer.

use crate::ast::{Program, StmtKind};
use crate::diagnostics::Diagnostic;
use crate::parser::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use string_interner::DefaultStringInterner;
use thiserror::Error;

/// One parsed module in the import graph.
#[derive(Debug)]
pub struct ModuleUnit {
    pub path: PathBuf,
    pub source: String,
    pub module_decl: Option<String>,
    pub imports: Vec<String>,
    pub program: Program,
    pub interner: DefaultStringInterner,
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("unable to read source file: {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing import '{import}' referenced from {}", .importer.display())]
    MissingImport { import: String, importer: PathBuf },
    #[error("import cycle detected:{cycle}")]
    Cycle { cycle: String },
    /// Syntax errors in one module; the diagnostics carry the detail.
    #[error("parse errors in {}", .path.display())]
    Parse {
        path: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },
}

/// Resolve an import path relative to its importer.
pub fn resolve_import_path(
    importer: &Path,
    module_decl: Option<&str>,
    import_path: &str,
) -> PathBuf {
    let relative = format!("{}.t81", import_path.replace('.', "/"));
    let importer_dir = importer.parent().unwrap_or_else(|| Path::new("."));

    let direct = importer_dir.join(&relative);
    if direct.exists() {
        return direct;
    }

    if let Some(module_decl) = module_decl {
        // `module app.main` at app/main.t81: ascend to the repo-local root.
        let segments = module_decl.split('.').filter(|s| !s.is_empty()).count();
        let mut module_root = importer_dir.to_path_buf();
        for _ in 1..segments {
            if let Some(parent) = module_root.parent() {
                module_root = parent.to_path_buf();
            }
        }
        return module_root.join(&relative);
    }

    direct
}

/// Load the transitive import graph from an entry file. Units come back in
/// dependency-first order.
pub fn load_module_graph(entry: &Path) -> Result<Vec<ModuleUnit>, ProjectError> {
    let _span = tracing::debug_span!("load_module_graph", entry = %entry.display()).entered();

    let mut loader = Loader {
        state: HashMap::new(),
        stack: Vec::new(),
        units: Vec::new(),
    };
    let entry = canonical_key(entry);
    loader.load(entry)?;
    Ok(loader.units)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

struct Loader {
    state: HashMap<PathBuf, VisitState>,
    stack: Vec<PathBuf>,
    units: Vec<ModuleUnit>,
}

impl Loader {
    fn load(&mut self, path: PathBuf) -> Result<(), ProjectError> {
        match self.state.get(&path) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::Visiting) => {
                let mut cycle = String::new();
                let start = self
                    .stack
                    .iter()
                    .position(|p| *p == path)
                    .unwrap_or(0);
                for entry in &self.stack[start..] {
                    cycle.push_str(&format!("\n  -> {}", entry.display()));
                }
                cycle.push_str(&format!("\n  -> {}", path.display()));
                return Err(ProjectError::Cycle { cycle });
            }
            None => {}
        }

        self.state.insert(path.clone(), VisitState::Visiting);
        self.stack.push(path.clone());

        let unit = parse_unit(&path)?;
        for import in &unit.imports {
            let dep = resolve_import_path(&path, unit.module_decl.as_deref(), import);
            if !dep.exists() {
                return Err(ProjectError::MissingImport {
                    import: import.clone(),
                    importer: path.clone(),
                });
            }
            self.load(canonical_key(&dep))?;
        }

        self.units.push(unit);
        self.stack.pop();
        self.state.insert(path, VisitState::Done);
        Ok(())
    }
}

fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parse_unit(path: &Path) -> Result<ModuleUnit, ProjectError> {
    let source = std::fs::read_to_string(path).map_err(|e| ProjectError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let source_name = path.display().to_string();
    let mut parser = Parser::new(&source, source_name);
    let program = parser.parse();
    if parser.had_error() {
        return Err(ProjectError::Parse {
            path: path.to_path_buf(),
            diagnostics: parser.take_errors(),
        });
    }

    let mut module_decl = None;
    let mut imports = Vec::new();
    for stmt in &program.statements {
        match &stmt.kind {
            StmtKind::Module { path } => module_decl = Some(path.clone()),
            StmtKind::Import { path } => imports.push(path.clone()),
            _ => {}
        }
    }

    let interner = parser.take_interner();
    Ok(ModuleUnit {
        path: path.to_path_buf(),
        source,
        module_decl,
        imports,
        program,
        interner,
    })
}
