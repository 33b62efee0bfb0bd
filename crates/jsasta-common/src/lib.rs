//! Shared types for the Jsasta compiler: source spans and the
//! diagnostics contract between compilation stages and their driver.

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticSink, Diagnostics, Severity};
pub use span::Span;
