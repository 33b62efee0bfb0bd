use std::fmt;

use serde::Serialize;

use crate::span::Span;

/// How serious a diagnostic is. Only errors stop a driver from invoking
/// the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single reported problem, already reduced to text.
///
/// Semantic passes never abort on a problem; they build one of these,
/// hand it to a [`DiagnosticSink`], and carry on with a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable code such as `T301`.
    pub code: &'static str,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)
    }
}

/// Receiver for diagnostics produced by a compilation stage.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// A sink that simply keeps everything it is given, in order.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items.len() - self.error_count()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_severity_and_code() {
        let d = Diagnostic::error("T301", "Undefined variable: x", Span::new(3, 4));
        assert_eq!(d.to_string(), "error[T301]: Undefined variable: x");
        let w = Diagnostic::warning("W001", "iteration limit reached", Span::DUMMY);
        assert_eq!(w.to_string(), "warning[W001]: iteration limit reached");
    }

    #[test]
    fn collecting_sink_counts_by_severity() {
        let mut sink = Diagnostics::new();
        sink.report(Diagnostic::error("T304", "a", Span::DUMMY));
        sink.report(Diagnostic::warning("W001", "b", Span::DUMMY));
        sink.report(Diagnostic::error("T312", "c", Span::DUMMY));
        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_errors());
        let codes: Vec<_> = sink.iter().map(|d| d.code).collect();
        assert_eq!(codes, ["T304", "W001", "T312"]);
    }

    #[test]
    fn warnings_alone_are_not_errors() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.report(Diagnostic::warning("W001", "b", Span::DUMMY));
        assert!(!sink[0].is_error());
    }
}
