//! # T81Lang Compiler Core
//!
//! The front end and middle end of the T81Lang compiler: lexer, parser,
//! semantic analyzer, and register-IR generator, plus the bytecode encoder
//! and import-graph driver behind the CLI.
//!
//! ## Pipeline
//!
//! ```text
//! Source -> Lexer -> Parser -> AST -> Semantic Analysis -> IR -> tisc-json
//! ```
//!
//! Each stage accumulates diagnostics and the pipeline halts at the first
//! stage that reports errors (parsing recovers and keeps collecting).
//!
//! ## Quick Start
//!
//! ```rust
//! use t81c::ir::IrGenerator;
//! use t81c::typeck::SemanticAnalyzer;
//! use t81c::Parser;
//!
//! let source = "fn main() -> i32 { return 20t81 + 22t81; }";
//! let mut parser = Parser::new(source, "demo.t81");
//! let program = parser.parse();
//! assert!(!parser.had_error());
//!
//! let mut analyzer = SemanticAnalyzer::new("demo.t81", parser.take_interner());
//! analyzer.analyze(&program);
//! assert!(!analyzer.had_error());
//!
//! let ir = IrGenerator::new(&analyzer).generate(&program).unwrap();
//! assert!(!ir.instructions().is_empty());
//! ```
//!
//! ## Module Overview
//!
//! - [`span`] - source location tracking
//! - [`lexer`] - tokenization
//! - [`ast`] - abstract syntax tree types
//! - [`parser`] - recursive descent parsing with panic-mode recovery
//! - [`printer`] - canonical S-expression AST rendering
//! - [`diagnostics`] - error reporting
//! - [`typeck`] - semantic analysis and side tables
//! - [`ir`] - the intermediate program and its lowering
//! - [`bytecode`] - tisc-json-v1 encoding
//! - [`project`] - import graph resolution

pub mod ast;
pub mod bytecode;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod project;
pub mod span;
pub mod typeck;

// Re-export commonly used types.
pub use diagnostics::{Diagnostic, DiagnosticEmitter};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use printer::CanonicalAstPrinter;
pub use span::Span;
