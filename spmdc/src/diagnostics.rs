//! Diagnostic reporting infrastructure.
//!
//! Diagnostics raised while linking builtin libraries concern library
//! symbols, not user source: the subject of a diagnostic is the name of
//! the offending function (or library), and rendering labels that name.
//!
//! # Error Codes
//!
//! Builtin linking error codes are organized by category:
//!
//! - **E0501-E0509**: Foreign symbol binding errors (unrepresentable types)
//! - **E0510-E0519**: Library resolution and merge errors
//! - **E0520-E0529**: Intrinsic validation errors
//! - **E0530-E0539**: Debug output problems (reported as warnings)

use std::io;
use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

/// Builtin linking error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // ============================================================
    // Binding errors (E0501-E0509)
    // ============================================================
    /// Return type of a foreign function has no source-level equivalent.
    UnrepresentableReturnType = 501,
    /// A parameter type of a foreign function has no source-level equivalent.
    UnrepresentableParamType = 502,
    /// Name in the intrinsic namespace that LLVM does not know.
    UnknownIntrinsic = 503,
    /// Overloaded intrinsic referenced without its type arguments.
    OverloadedIntrinsic = 504,

    // ============================================================
    // Library errors (E0510-E0519)
    // ============================================================
    /// No library registered for the requested role and target.
    MissingLibrary = 510,
    /// The module linker rejected a library.
    LinkConflict = 511,
    /// A library image could not be parsed.
    MalformedLibrary = 512,
    /// A library file could not be read.
    LibraryIo = 513,

    // ============================================================
    // Intrinsic errors (E0520-E0529)
    // ============================================================
    /// Declared intrinsic signature differs from the canonical one.
    IntrinsicSignatureMismatch = 520,
    /// Name in an intrinsic namespace does not resolve to an intrinsic.
    IntrinsicIdUnresolved = 521,

    // ============================================================
    // Debug output (E0530-E0539)
    // ============================================================
    /// An IR dump could not be written.
    DumpFailed = 530,
}

impl ErrorCode {
    /// Get the formatted error code string (e.g., "E0501").
    pub fn as_str(&self) -> String {
        format!("E{:04}", *self as u16)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::UnrepresentableReturnType => "return type not representable",
            ErrorCode::UnrepresentableParamType => "parameter type not representable",
            ErrorCode::UnknownIntrinsic => "unknown intrinsic",
            ErrorCode::OverloadedIntrinsic => "overloaded intrinsic",
            ErrorCode::MissingLibrary => "builtin library not available for target",
            ErrorCode::LinkConflict => "builtin library failed to link",
            ErrorCode::MalformedLibrary => "builtin library is malformed",
            ErrorCode::LibraryIo => "builtin library could not be read",
            ErrorCode::IntrinsicSignatureMismatch => "intrinsic signature mismatch",
            ErrorCode::IntrinsicIdUnresolved => "intrinsic is not found",
            ErrorCode::DumpFailed => "IR dump could not be written",
        }
    }

    /// Get a help message suggesting how to fix the error.
    pub fn help(&self) -> Option<&'static str> {
        match self {
            ErrorCode::UnrepresentableReturnType | ErrorCode::UnrepresentableParamType => {
                Some("the function cannot be called from SPMD source")
            }
            ErrorCode::MissingLibrary => {
                Some("the target is not supported by the installed builtin libraries")
            }
            ErrorCode::LinkConflict | ErrorCode::MalformedLibrary => {
                Some("the precompiled builtin libraries are inconsistent; rebuild them")
            }
            ErrorCode::IntrinsicSignatureMismatch | ErrorCode::IntrinsicIdUnresolved => {
                Some("the builtin library was built against a different LLVM version")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
    Note,
}

impl DiagnosticKind {
    fn to_report_kind(self) -> ReportKind<'static> {
        match self {
            DiagnosticKind::Error => ReportKind::Error,
            DiagnosticKind::Warning => ReportKind::Warning,
            DiagnosticKind::Note => ReportKind::Advice,
        }
    }

    fn color(self) -> Color {
        match self {
            DiagnosticKind::Error => Color::Red,
            DiagnosticKind::Warning => Color::Yellow,
            DiagnosticKind::Note => Color::Cyan,
        }
    }
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub code: Option<ErrorCode>,
    pub message: String,
    /// Library symbol or library name the diagnostic is about.
    pub subject: Option<String>,
    pub notes: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, message)
    }

    fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            subject: None,
            notes: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_error_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        if let Some(help) = code.help() {
            self.suggestions.push(help.to_string());
        }
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }
}

/// Collects diagnostics reported while processing one module.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Renders diagnostics with ariadne.
///
/// The rendered "source" is the diagnostic's subject, so the label points
/// at the library symbol the problem concerns.
pub struct DiagnosticEmitter {
    color: bool,
}

impl Default for DiagnosticEmitter {
    fn default() -> Self {
        Self { color: true }
    }
}

impl DiagnosticEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_color() -> Self {
        Self { color: false }
    }

    /// Write a diagnostic to stderr.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        if let Err(err) = self.write(diagnostic, io::stderr()) {
            tracing::warn!(error = %err, "failed to write diagnostic");
        }
    }

    /// Render a diagnostic to a string.
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write(diagnostic, &mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    pub fn write<W: io::Write>(&self, diagnostic: &Diagnostic, out: W) -> io::Result<()> {
        let message = match &diagnostic.code {
            Some(code) => format!("[{}] {}", code.as_str(), diagnostic.message),
            None => diagnostic.message.clone(),
        };
        let subject = diagnostic
            .subject
            .clone()
            .unwrap_or_else(|| diagnostic.message.clone());

        let mut builder = Report::<Range<usize>>::build(diagnostic.kind.to_report_kind(), (), 0)
            .with_config(Config::default().with_color(self.color))
            .with_message(&message)
            .with_label(
                Label::new(0..subject.len())
                    .with_color(diagnostic.kind.color())
                    .with_message(diagnostic.code.map_or("here", |c| c.description())),
            );

        if !diagnostic.notes.is_empty() {
            builder = builder.with_note(diagnostic.notes.join("\n"));
        }
        if !diagnostic.suggestions.is_empty() {
            builder = builder.with_help(diagnostic.suggestions.join("\n"));
        }

        builder.finish().write(Source::from(subject), out)
    }
}
