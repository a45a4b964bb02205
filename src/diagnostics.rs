//! Diagnostic reporting infrastructure.
//!
//! Every stage accumulates [`Diagnostic`]s rather than printing directly.
//! The user-visible format is one line per diagnostic:
//!
//! ```text
//! file.t81:3:14: error: Undefined variable 'y'.
//! ```
//!
//! The [`DiagnosticEmitter`] renders the same diagnostics as annotated
//! source reports (behind the CLI `--pretty` flag).

use crate::span::Span;
use ariadne::{Color, Label, Report, ReportKind, Source};

/// A compiler diagnostic with a resolved file/line/column location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source file name the diagnostic refers to.
    pub file: String,
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed byte column.
    pub column: u32,
    /// The error message.
    pub message: String,
    /// The source span the diagnostic anchors to.
    pub span: Span,
}

impl Diagnostic {
    /// Create an error diagnostic anchored at `span`.
    pub fn error(file: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: span.line,
            column: span.column,
            message: message.into(),
            span,
        }
    }

    /// Render in the canonical `file:line:column: error: message` form.
    pub fn render(&self) -> String {
        format!(
            "{}:{}:{}: error: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Renders diagnostics as annotated source reports on stderr.
pub struct DiagnosticEmitter<'a> {
    filename: &'a str,
    source: &'a str,
}

impl<'a> DiagnosticEmitter<'a> {
    pub fn new(filename: &'a str, source: &'a str) -> Self {
        Self { filename, source }
    }

    /// Emit a diagnostic to stderr.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        let span = diagnostic.span;
        let range = span.start..span.end.max(span.start);
        let report = Report::build(ReportKind::Error, self.filename, span.start)
            .with_message(&diagnostic.message)
            .with_label(
                Label::new((self.filename, range))
                    .with_color(Color::Red)
                    .with_message(&diagnostic.message),
            )
            .finish();

        if report
            .eprint((self.filename, Source::from(self.source)))
            .is_err()
        {
            eprintln!("{}", diagnostic.render());
        }
    }
}
