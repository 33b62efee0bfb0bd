//! Type errors reported by the checker.
//!
//! Errors never abort a check. The pass that finds a problem records one of
//! these, substitutes `TypeId::UNKNOWN` (or the declared type, where there
//! is one) and keeps going, so a single run surfaces every independent
//! problem in the module. Type names are captured as display strings at the
//! point of failure.

use std::fmt;

use jsasta_common::{Diagnostic, Severity, Span};
use serde::Serialize;

/// A problem found while checking a module.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TypeError {
    /// An identifier resolves to nothing in scope.
    UndefinedVariable { name: String, span: Span },
    /// `x.m()` where `x` is not a record.
    MethodCallOnNonRecord { span: Span },
    /// `x.m()` where the record has no method `m`.
    UnknownMethod { name: String, span: Span },
    /// Indexing a type with no `Index<I>` impl for the index type.
    IndexNotImplemented {
        ty: String,
        index: String,
        span: Span,
    },
    /// Assigning through an index on a type with no `RefIndex<I>` impl.
    RefIndexNotImplemented {
        ty: String,
        index: String,
        span: Span,
    },
    /// A record field's default value does not fit the field type.
    DefaultValueMismatch {
        record: String,
        field: String,
        expected: String,
        found: String,
        span: Span,
    },
    /// A declaration's initializer does not fit its type annotation.
    DeclarationMismatch {
        name: String,
        declared: String,
        found: String,
        span: Span,
    },
    /// A record literal supplies a value of the wrong type for a field.
    PropertyMismatch {
        field: String,
        expected: String,
        found: String,
        span: Span,
    },
    /// A record literal names a field the record does not have.
    UnknownProperty {
        field: String,
        record: String,
        span: Span,
    },
    /// A record literal omits a field that has no default.
    MissingProperty {
        field: String,
        record: String,
        span: Span,
    },
    /// `obj.field = value` with a value of the wrong type.
    AssignmentMismatch {
        field: String,
        expected: String,
        found: String,
        span: Span,
    },
    /// A call passes an argument that does not fit a declared parameter.
    ArgumentMismatch {
        function: String,
        /// 1-based parameter position.
        position: usize,
        expected: String,
        found: String,
        span: Span,
    },
    /// An array extent on a local declaration could not be evaluated.
    InvalidArraySize { message: String, span: Span },
    /// An array extent on a top-level const or record field could not be
    /// evaluated.
    ConstEval {
        message: String,
        help: Option<String>,
        span: Span,
    },
    /// A top-level const never became resolvable.
    UnresolvedConst { name: String, span: Span },
    /// A type annotation names no known type.
    UnknownType { name: String, span: Span },
    /// A function's body returns something other than its declared type.
    ReturnTypeMismatch {
        function: String,
        declared: String,
        inferred: String,
        span: Span,
    },
    /// A call names neither a function nor a runtime routine.
    UndefinedFunction { name: String, span: Span },
    /// No trait impl exists for an operator and its operand types.
    OperatorNotImplemented {
        op: String,
        lhs: String,
        rhs: Option<String>,
        span: Span,
    },
    /// `obj.field` where the type has no such field.
    UnknownPropertyAccess {
        field: String,
        ty: String,
        span: Span,
    },
    /// A fixpoint loop stopped at its bound before converging.
    IterationLimit { pass: String, limit: usize },
}

impl TypeError {
    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            TypeError::UndefinedVariable { .. } => "T301",
            TypeError::MethodCallOnNonRecord { .. } | TypeError::UnknownMethod { .. } => "T302",
            TypeError::IndexNotImplemented { .. } => "T304",
            TypeError::RefIndexNotImplemented { .. } => "T305",
            TypeError::DefaultValueMismatch { .. } => "T306",
            TypeError::DeclarationMismatch { .. } => "T307",
            TypeError::PropertyMismatch { .. } => "T308",
            TypeError::UnknownProperty { .. } => "T309",
            TypeError::MissingProperty { .. } => "T310",
            TypeError::AssignmentMismatch { .. } => "T311",
            TypeError::ArgumentMismatch { .. } => "T312",
            TypeError::InvalidArraySize { .. } => "T313",
            TypeError::ConstEval { .. } => "T314",
            TypeError::UnresolvedConst { .. } => "T315",
            TypeError::UnknownType { .. } => "T316",
            TypeError::ReturnTypeMismatch { .. } => "T317",
            TypeError::UndefinedFunction { .. } => "T318",
            TypeError::OperatorNotImplemented { .. } => "T319",
            TypeError::UnknownPropertyAccess { .. } => "T320",
            TypeError::IterationLimit { .. } => "W001",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TypeError::IterationLimit { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn span(&self) -> Span {
        match self {
            TypeError::UndefinedVariable { span, .. }
            | TypeError::MethodCallOnNonRecord { span }
            | TypeError::UnknownMethod { span, .. }
            | TypeError::IndexNotImplemented { span, .. }
            | TypeError::RefIndexNotImplemented { span, .. }
            | TypeError::DefaultValueMismatch { span, .. }
            | TypeError::DeclarationMismatch { span, .. }
            | TypeError::PropertyMismatch { span, .. }
            | TypeError::UnknownProperty { span, .. }
            | TypeError::MissingProperty { span, .. }
            | TypeError::AssignmentMismatch { span, .. }
            | TypeError::ArgumentMismatch { span, .. }
            | TypeError::InvalidArraySize { span, .. }
            | TypeError::ConstEval { span, .. }
            | TypeError::UnresolvedConst { span, .. }
            | TypeError::UnknownType { span, .. }
            | TypeError::ReturnTypeMismatch { span, .. }
            | TypeError::UndefinedFunction { span, .. }
            | TypeError::OperatorNotImplemented { span, .. }
            | TypeError::UnknownPropertyAccess { span, .. } => *span,
            TypeError::IterationLimit { .. } => Span::DUMMY,
        }
    }

    /// Extra guidance shown under the report, if any.
    pub fn help(&self) -> Option<String> {
        match self {
            TypeError::ConstEval { help, .. } => help.clone(),
            TypeError::DeclarationMismatch { declared, .. } if declared == "double" => {
                Some("integer values widen to double implicitly; other conversions must be explicit".into())
            }
            TypeError::MissingProperty { field, .. } => {
                Some(format!("add a value for '{field}' or give the field a default"))
            }
            TypeError::UnresolvedConst { .. } => {
                Some("const initializers may only refer to other resolvable consts".into())
            }
            TypeError::IterationLimit { .. } => {
                Some("the partial result is still usable; check for unbounded generic recursion".into())
            }
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            severity: self.severity(),
            code: self.code(),
            message: self.to_string(),
            span: self.span(),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::UndefinedVariable { name, .. } => write!(f, "Undefined variable: {}", name),
            TypeError::MethodCallOnNonRecord { .. } => {
                write!(f, "Cannot call method on non-object type")
            }
            TypeError::UnknownMethod { name, .. } => write!(f, "Method '{}' not found", name),
            TypeError::IndexNotImplemented { ty, index, .. } => {
                write!(f, "Type '{}' does not implement Index<{}>", ty, index)
            }
            TypeError::RefIndexNotImplemented { ty, index, .. } => write!(
                f,
                "Type '{}' does not implement RefIndex<{}> (required for index assignment)",
                ty, index
            ),
            TypeError::DefaultValueMismatch {
                record,
                field,
                expected,
                found,
                ..
            } => write!(
                f,
                "Type mismatch in struct '{}': property '{}' has type {} but default value has type {}",
                record, field, expected, found
            ),
            TypeError::DeclarationMismatch {
                name,
                declared,
                found,
                ..
            } => write!(
                f,
                "Type mismatch: variable '{}' declared as {} but initialized with {}",
                name, declared, found
            ),
            TypeError::PropertyMismatch {
                field,
                expected,
                found,
                ..
            } => write!(
                f,
                "Property '{}' type mismatch: expected {} but got {}",
                field, expected, found
            ),
            TypeError::UnknownProperty { field, record, .. } => {
                write!(f, "Unknown property '{}' in struct '{}'", field, record)
            }
            TypeError::MissingProperty { field, record, .. } => write!(
                f,
                "Missing required property '{}' in struct '{}' (no default value)",
                field, record
            ),
            TypeError::AssignmentMismatch {
                field,
                expected,
                found,
                ..
            } => write!(
                f,
                "Type mismatch: cannot assign {} to property '{}' of type {}",
                found, field, expected
            ),
            TypeError::ArgumentMismatch {
                function,
                position,
                expected,
                found,
                ..
            } => write!(
                f,
                "Type mismatch in call to '{}': parameter {} expects {} but got {}",
                function, position, expected, found
            ),
            TypeError::InvalidArraySize { message, .. } | TypeError::ConstEval { message, .. } => {
                write!(f, "{}", message)
            }
            TypeError::UnresolvedConst { name, .. } => write!(
                f,
                "Could not resolve const declaration '{}' (circular dependency or undefined reference)",
                name
            ),
            TypeError::UnknownType { name, .. } => write!(f, "Unknown type '{}'", name),
            TypeError::ReturnTypeMismatch {
                function,
                declared,
                inferred,
                ..
            } => write!(
                f,
                "Return type mismatch in function '{}': declared {} but body returns {}",
                function, declared, inferred
            ),
            TypeError::UndefinedFunction { name, .. } => write!(f, "Undefined function: {}", name),
            TypeError::OperatorNotImplemented { op, lhs, rhs, .. } => match rhs {
                Some(rhs) => write!(
                    f,
                    "Operator '{}' is not implemented for {} and {}",
                    op, lhs, rhs
                ),
                None => write!(f, "Operator '{}' is not implemented for {}", op, lhs),
            },
            TypeError::UnknownPropertyAccess { field, ty, .. } => {
                write!(f, "Property '{}' does not exist on type '{}'", field, ty)
            }
            TypeError::IterationLimit { pass, limit } => write!(
                f,
                "{} did not converge after {} iterations",
                pass, limit
            ),
        }
    }
}

impl std::error::Error for TypeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_codes() {
        let err = TypeError::IndexNotImplemented {
            ty: "double[]".into(),
            index: "Object_0".into(),
            span: Span::new(4, 9),
        };
        assert_eq!(err.code(), "T304");
        assert_eq!(err.to_string(), "Type 'double[]' does not implement Index<Object_0>");
        assert_eq!(err.span(), Span::new(4, 9));

        let err = TypeError::ArgumentMismatch {
            function: "scale".into(),
            position: 2,
            expected: "double".into(),
            found: "string".into(),
            span: Span::DUMMY,
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch in call to 'scale': parameter 2 expects double but got string"
        );
    }

    #[test]
    fn iteration_limit_is_a_warning() {
        let warn = TypeError::IterationLimit {
            pass: "Specialization discovery".into(),
            limit: 100,
        };
        assert!(!warn.is_error());
        let d = warn.to_diagnostic();
        assert_eq!(d.code, "W001");
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(
            d.message,
            "Specialization discovery did not converge after 100 iterations"
        );
    }

    #[test]
    fn unary_operator_message() {
        let err = TypeError::OperatorNotImplemented {
            op: "-".into(),
            lhs: "string".into(),
            rhs: None,
            span: Span::DUMMY,
        };
        assert_eq!(err.to_string(), "Operator '-' is not implemented for string");
        assert_eq!(err.code(), "T319");
    }
}
