//! T81Lang compiler CLI.
//!
//! ```text
//! t81c parse <file.t81>
//! t81c check <file.t81>
//! t81c emit-ir <file.t81> [-o out.ir]
//! t81c emit-bytecode <file.t81> [-o out.tisc.json]
//! t81c build <file.t81> [-o out.tisc.json]
//! ```
//!
//! Exit codes: 0 success, 1 compilation error, 64 usage error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use t81c::diagnostics::{Diagnostic, DiagnosticEmitter};
use t81c::ir::{self, IntermediateProgram, IrGenerator};
use t81c::printer::CanonicalAstPrinter;
use t81c::project::{self, ProjectError};
use t81c::typeck::SemanticAnalyzer;

const USAGE_EXIT_CODE: u8 = 64;

/// The T81Lang compiler front end.
#[derive(Parser)]
#[command(name = "t81c")]
#[command(version)]
#[command(about = "The T81Lang compiler front end", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Render diagnostics as annotated source reports
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lex and parse a file, printing the canonical AST
    Parse(FileArgs),

    /// Parse and semantically analyze each module in the import graph
    Check(FileArgs),

    /// Check, then pretty-print the intermediate program
    EmitIr(OutputArgs),

    /// Check, then encode the instruction stream as tisc-json-v1
    EmitBytecode(OutputArgs),

    /// Alias for emit-bytecode
    Build(OutputArgs),
}

#[derive(Args)]
struct FileArgs {
    /// Source file to process
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Args)]
struct OutputArgs {
    /// Source file to process
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output path
    #[arg(short, long, value_name = "OUT")]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => USAGE_EXIT_CODE,
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    let code = match &cli.command {
        Commands::Parse(args) => cmd_parse(&args.file, cli.pretty),
        Commands::Check(args) => cmd_check(&args.file, cli.pretty),
        Commands::EmitIr(args) => cmd_emit_ir(&args.file, args.output.as_deref(), cli.pretty),
        Commands::EmitBytecode(args) | Commands::Build(args) => {
            cmd_emit_bytecode(&args.file, args.output.as_deref(), cli.pretty)
        }
    };
    ExitCode::from(code)
}

fn init_tracing(verbosity: u8) {
    if verbosity == 0 {
        return;
    }
    let level = if verbosity == 1 { "debug" } else { "trace" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(format!("t81c={}", level))
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_source(path: &Path) -> Result<String, u8> {
    std::fs::read_to_string(path).map_err(|_| {
        eprintln!("error: unable to read source file: {}", path.display());
        1
    })
}

fn emit_diagnostics(diagnostics: &[Diagnostic], source_name: &str, source: &str, pretty: bool) {
    if pretty {
        let emitter = DiagnosticEmitter::new(source_name, source);
        for diagnostic in diagnostics {
            emitter.emit(diagnostic);
        }
    } else {
        for diagnostic in diagnostics {
            eprintln!("{}", diagnostic.render());
        }
    }
}

fn report_project_error(error: &ProjectError) {
    match error {
        ProjectError::Parse { diagnostics, .. } => {
            for diagnostic in diagnostics {
                eprintln!("{}", diagnostic.render());
            }
        }
        other => eprintln!("error: {}", other),
    }
}

// ============================================================
// Commands
// ============================================================

fn cmd_parse(file: &Path, pretty: bool) -> u8 {
    let source = match read_source(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let source_name = file.display().to_string();

    let mut parser = t81c::Parser::new(&source, source_name.clone());
    let program = parser.parse();
    if parser.had_error() {
        emit_diagnostics(parser.errors(), &source_name, &source, pretty);
        return 1;
    }

    let interner = parser.take_interner();
    let printer = CanonicalAstPrinter::new(&interner);
    for stmt in &program.statements {
        println!("{}", printer.print_stmt(stmt));
    }
    0
}

fn cmd_check(file: &Path, pretty: bool) -> u8 {
    run_check(file, pretty)
}

fn run_check(entry: &Path, pretty: bool) -> u8 {
    if !entry.exists() {
        eprintln!("error: entry file does not exist: {}", entry.display());
        return 1;
    }

    let units = match project::load_module_graph(entry) {
        Ok(units) => units,
        Err(err) => {
            report_project_error(&err);
            return 1;
        }
    };

    let mut failed = false;
    for unit in &units {
        let source_name = unit.path.display().to_string();
        let mut analyzer = SemanticAnalyzer::new(source_name.clone(), unit.interner.clone());
        analyzer.analyze(&unit.program);
        if analyzer.had_error() {
            failed = true;
            emit_diagnostics(analyzer.diagnostics(), &source_name, &unit.source, pretty);
        }
    }

    if failed {
        1
    } else {
        0
    }
}

/// Parse, analyze, and lower the entry file on its own.
fn compile_entry_to_ir(path: &Path, pretty: bool) -> Result<IntermediateProgram, u8> {
    let source = read_source(path)?;
    let source_name = path.display().to_string();

    let mut parser = t81c::Parser::new(&source, source_name.clone());
    let program = parser.parse();
    if parser.had_error() {
        emit_diagnostics(parser.errors(), &source_name, &source, pretty);
        return Err(1);
    }

    let mut analyzer = SemanticAnalyzer::new(source_name.clone(), parser.take_interner());
    analyzer.analyze(&program);
    if analyzer.had_error() {
        emit_diagnostics(analyzer.diagnostics(), &source_name, &source, pretty);
        return Err(1);
    }

    IrGenerator::new(&analyzer).generate(&program).map_err(|err| {
        eprintln!("error: internal IR generation failure: {}", err);
        1
    })
}

fn write_output(path: &Path, content: &str) -> u8 {
    match std::fs::write(path, content) {
        Ok(()) => {
            println!("{}", path.display());
            0
        }
        Err(_) => {
            eprintln!("error: unable to write output file: {}", path.display());
            1
        }
    }
}

fn cmd_emit_ir(file: &Path, output: Option<&Path>, pretty: bool) -> u8 {
    let code = run_check(file, pretty);
    if code != 0 {
        return code;
    }
    let program = match compile_entry_to_ir(file, pretty) {
        Ok(program) => program,
        Err(code) => return code,
    };

    let mut text = ir::pretty::pretty_print(&program);
    text.push('\n');

    match output {
        Some(path) => write_output(path, &text),
        None => {
            print!("{}", text);
            0
        }
    }
}

fn cmd_emit_bytecode(file: &Path, output: Option<&Path>, pretty: bool) -> u8 {
    let code = run_check(file, pretty);
    if code != 0 {
        return code;
    }
    let program = match compile_entry_to_ir(file, pretty) {
        Ok(program) => program,
        Err(code) => return code,
    };

    let encoded = match t81c::bytecode::encode(&program) {
        Ok(encoded) => encoded,
        Err(err) => {
            eprintln!("error: {}", err);
            return 1;
        }
    };
    let json = match serde_json::to_string_pretty(&encoded) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("error: unable to serialize bytecode: {}", err);
            return 1;
        }
    };

    let out = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| file.with_extension("tisc.json"));
    write_output(&out, &json)
}
