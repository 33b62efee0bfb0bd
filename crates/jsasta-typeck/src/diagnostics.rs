//! Ariadne-based rendering of type errors.
//!
//! One report per error: the code, the message, one label on the offending
//! span and an optional help line. Output is uncolored so it can be
//! compared in tests and written to logs.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use crate::error::TypeError;

/// Short label text shown under the highlighted span.
fn label_text(error: &TypeError) -> String {
    match error {
        TypeError::UndefinedVariable { name, .. } => format!("`{}` is not defined here", name),
        TypeError::MethodCallOnNonRecord { .. } => "receiver is not a record".to_string(),
        TypeError::UnknownMethod { .. } => "no such method".to_string(),
        TypeError::IndexNotImplemented { index, .. } => format!("indexed with {}", index),
        TypeError::RefIndexNotImplemented { index, .. } => format!("assigned through {} index", index),
        TypeError::DefaultValueMismatch { expected, .. } => format!("expected {}", expected),
        TypeError::DeclarationMismatch { declared, .. } => format!("declared as {}", declared),
        TypeError::PropertyMismatch { expected, .. } => format!("expected {}", expected),
        TypeError::UnknownProperty { record, .. } => format!("not a field of {}", record),
        TypeError::MissingProperty { field, .. } => format!("missing `{}`", field),
        TypeError::AssignmentMismatch { expected, .. } => format!("field has type {}", expected),
        TypeError::ArgumentMismatch { expected, found, .. } => {
            format!("expected {}, found {}", expected, found)
        }
        TypeError::InvalidArraySize { .. } | TypeError::ConstEval { .. } => {
            "not a positive compile-time integer".to_string()
        }
        TypeError::UnresolvedConst { name, .. } => format!("`{}` never resolved", name),
        TypeError::UnknownType { .. } => "unknown type".to_string(),
        TypeError::ReturnTypeMismatch { inferred, .. } => format!("body returns {}", inferred),
        TypeError::UndefinedFunction { .. } => "not a function".to_string(),
        TypeError::OperatorNotImplemented { op, .. } => format!("no impl for `{}`", op),
        TypeError::UnknownPropertyAccess { field, .. } => format!("no field `{}`", field),
        TypeError::IterationLimit { .. } => String::new(),
    }
}

/// Render `error` against `source` as plain text.
pub fn render_diagnostic(error: &TypeError, source: &str, filename: &str) -> String {
    let config = Config::default().with_color(false);
    let source_len = source.len();

    // Clamp a range to be valid within source bounds.
    let clamp = |r: Range<usize>| -> Range<usize> {
        let s = r.start.min(source_len);
        let e = r.end.min(source_len).max(s);
        // ariadne needs at least one character to point at.
        if s == e {
            s..e.saturating_add(1).min(source_len)
        } else {
            s..e
        }
    };

    let kind = if error.is_error() {
        ReportKind::Error
    } else {
        ReportKind::Warning
    };
    let span = clamp(error.span().to_range());

    let mut builder = Report::build(kind, span.clone())
        .with_code(error.code())
        .with_message(error.to_string())
        .with_config(config);

    if !matches!(error, TypeError::IterationLimit { .. }) {
        builder = builder.with_label(
            Label::new(span)
                .with_message(label_text(error))
                .with_color(Color::Red),
        );
    }
    if let Some(help) = error.help() {
        builder = builder.with_help(help);
    }
    if !filename.is_empty() {
        builder = builder.with_note(format!("in {}", filename));
    }

    let mut buf = Vec::new();
    let cache = Source::from(source);
    if builder.finish().write(cache, &mut buf).is_err() {
        // Fall back to the one-line form.
        return error.to_diagnostic().to_string();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Render every error, separated by blank lines.
pub fn render_all(errors: &[TypeError], source: &str, filename: &str) -> String {
    errors
        .iter()
        .map(|e| render_diagnostic(e, source, filename))
        .collect::<Vec<_>>()
        .join("\n")
}
