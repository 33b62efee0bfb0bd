//! Compile-time evaluation of integer constant expressions.
//!
//! Used for fixed array extents such as `let buf: u8[N * 2]`. Supported
//! forms are positive integer literals, identifiers bound to `const`
//! declarations (evaluated through their initializer), and the binary
//! operators `+ - * / %`. Every literal and intermediate result must be
//! positive, so a zero divisor is rejected as a non-positive operand before
//! any division happens.
//!
//! The evaluator keeps an explicit stack of the constants it is currently
//! expanding, so `const N = N;` and longer cycles are reported instead of
//! recursing forever. Total recursion depth, through nested operators and
//! const expansions alike, is capped as well.

use std::fmt;

use jsasta_common::Span;
use serde::Serialize;

use crate::ast::{Expr, ExprKind};
use crate::env::{ScopeId, SymbolTables};

/// Why an evaluation did not produce a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EvalStatus {
    /// Depends on a name that is not declared yet; retrying later may work.
    Waiting,
    /// A constant depends on itself.
    Cycle,
    /// The expression can never be a valid extent.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConstEvalError {
    pub status: EvalStatus,
    pub message: String,
    pub span: Span,
}

impl ConstEvalError {
    fn new(status: EvalStatus, message: impl Into<String>, span: Span) -> Self {
        ConstEvalError {
            status,
            message: message.into(),
            span,
        }
    }

    fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(EvalStatus::Error, message, span)
    }

    pub fn is_waiting(&self) -> bool {
        self.status == EvalStatus::Waiting
    }
}

impl fmt::Display for ConstEvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConstEvalError {}

/// Evaluate `expr` in `scope` to a positive integer.
pub fn eval_const_int(
    expr: &Expr,
    scope: ScopeId,
    scopes: &SymbolTables,
    max_depth: usize,
) -> Result<i64, ConstEvalError> {
    let mut eval = ConstEvaluator {
        scopes,
        max_depth,
        depth: 0,
        stack: Vec::new(),
    };
    eval.eval(expr, scope)
}

struct ConstEvaluator<'a> {
    scopes: &'a SymbolTables,
    max_depth: usize,
    /// Expressions currently being evaluated.
    depth: usize,
    /// Constants currently being expanded, innermost last.
    stack: Vec<(ScopeId, String)>,
}

impl ConstEvaluator<'_> {
    fn eval(&mut self, expr: &Expr, scope: ScopeId) -> Result<i64, ConstEvalError> {
        if self.depth >= self.max_depth {
            return Err(ConstEvalError::error(
                "Const expression recursion too deep",
                expr.span,
            ));
        }
        self.depth += 1;
        let result = self.eval_kind(expr, scope);
        self.depth -= 1;
        result
    }

    fn eval_kind(&mut self, expr: &Expr, scope: ScopeId) -> Result<i64, ConstEvalError> {
        match &expr.kind {
            ExprKind::Int(value) => positive_literal(*value, expr.span),
            ExprKind::Float(value) => {
                if value.fract() != 0.0 {
                    return Err(ConstEvalError::error(
                        format!("Array size must be an integer, got {value:.2}"),
                        expr.span,
                    ));
                }
                positive_literal(*value as i64, expr.span)
            }
            ExprKind::Ident(name) => self.eval_ident(name, scope, expr.span),
            ExprKind::Binary { op, lhs, rhs, .. } => {
                let left = self.eval(lhs, scope)?;
                let right = self.eval(rhs, scope)?;
                let computed = match op.as_str() {
                    "+" => left.checked_add(right),
                    "-" => left.checked_sub(right),
                    "*" => left.checked_mul(right),
                    "/" => left.checked_div(right),
                    "%" => left.checked_rem(right),
                    other => {
                        return Err(ConstEvalError::error(
                            format!(
                                "Operator '{other}' is not supported in array size expressions (supported: + - * / %)"
                            ),
                            expr.span,
                        ))
                    }
                };
                let Some(computed) = computed else {
                    return Err(ConstEvalError::error(
                        "Array size expression overflows",
                        expr.span,
                    ));
                };
                if computed <= 0 {
                    return Err(ConstEvalError::error(
                        format!("Array size expression evaluates to {computed}, but must be positive"),
                        expr.span,
                    ));
                }
                Ok(computed)
            }
            ExprKind::Str(_) => Err(ConstEvalError::error(
                "String literals cannot be used in array size expressions",
                expr.span,
            )),
            ExprKind::Bool(_) => Err(ConstEvalError::error(
                "Boolean values cannot be used in array size expressions",
                expr.span,
            )),
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => Err(ConstEvalError::error(
                "Function calls cannot be used in array size expressions (must be compile-time constants)",
                expr.span,
            )),
            _ => Err(ConstEvalError::error(
                "This expression cannot be used in array size (must be a const integer expression)",
                expr.span,
            )),
        }
    }

    fn eval_ident(&mut self, name: &str, scope: ScopeId, span: Span) -> Result<i64, ConstEvalError> {
        let Some((def_scope, symbol)) = self.scopes.lookup_with_scope(scope, name) else {
            return Err(ConstEvalError::new(
                EvalStatus::Waiting,
                format!("Undefined identifier '{name}' in array size expression"),
                span,
            ));
        };
        if !symbol.is_const {
            return Err(ConstEvalError::error(
                format!(
                    "Variable '{name}' is not declared as 'const' and cannot be used in array size expression"
                ),
                span,
            ));
        }
        let Some(init) = &symbol.const_init else {
            return Err(ConstEvalError::error(
                format!("Const '{name}' has no initializer and cannot be evaluated"),
                span,
            ));
        };

        let key = (def_scope, name.to_string());
        if self.stack.contains(&key) {
            return Err(ConstEvalError::new(
                EvalStatus::Cycle,
                "Circular dependency detected in const expression",
                span,
            ));
        }
        self.stack.push(key);
        let result = self.eval(init, def_scope);
        self.stack.pop();
        result
    }
}

fn positive_literal(value: i64, span: Span) -> Result<i64, ConstEvalError> {
    if value <= 0 {
        return Err(ConstEvalError::error(
            format!("Array size must be positive, got {value}"),
            span,
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Symbol;
    use crate::ty::TypeId;

    fn tables_with(consts: &[(&str, Expr)]) -> SymbolTables {
        let mut tables = SymbolTables::new();
        let root = tables.root();
        for (name, init) in consts {
            tables.insert(root, Symbol::constant(*name, TypeId::I32, Some(init.clone())));
        }
        tables
    }

    fn eval(expr: &Expr, tables: &SymbolTables) -> Result<i64, ConstEvalError> {
        eval_const_int(expr, tables.root(), tables, 100)
    }

    // ── values ──────────────────────────────────────────────────────────

    #[test]
    fn arithmetic_folds() {
        let tables = SymbolTables::new();
        let expr = Expr::binary(
            "+",
            Expr::binary("*", Expr::int(2), Expr::int(3)),
            Expr::int(4),
        );
        assert_eq!(eval(&expr, &tables), Ok(10));
        assert_eq!(eval(&Expr::binary("%", Expr::int(7), Expr::int(4)), &tables), Ok(3));
        assert_eq!(eval(&Expr::float(8.0), &tables), Ok(8));
    }

    #[test]
    fn consts_are_followed_through_chains() {
        let tables = tables_with(&[
            ("A", Expr::int(4)),
            ("B", Expr::binary("*", Expr::ident("A"), Expr::int(2))),
        ]);
        assert_eq!(eval(&Expr::binary("+", Expr::ident("B"), Expr::ident("A")), &tables), Ok(12));
    }

    #[test]
    fn inner_scope_sees_outer_consts() {
        let mut tables = tables_with(&[("N", Expr::int(16))]);
        let inner = tables.push(tables.root());
        assert_eq!(eval_const_int(&Expr::ident("N"), inner, &tables, 100), Ok(16));
    }

    // ── failures ────────────────────────────────────────────────────────

    #[test]
    fn self_reference_is_a_cycle() {
        let tables = tables_with(&[("N", Expr::ident("N"))]);
        let err = eval(&Expr::ident("N"), &tables).unwrap_err();
        assert_eq!(err.status, EvalStatus::Cycle);
        assert_eq!(err.message, "Circular dependency detected in const expression");
    }

    #[test]
    fn indirect_cycle_is_detected() {
        let tables = tables_with(&[
            ("A", Expr::binary("+", Expr::ident("B"), Expr::int(1))),
            ("B", Expr::ident("A")),
        ]);
        assert_eq!(eval(&Expr::ident("A"), &tables).unwrap_err().status, EvalStatus::Cycle);
    }

    #[test]
    fn non_const_variable_is_rejected() {
        let mut tables = SymbolTables::new();
        let root = tables.root();
        tables.insert(root, Symbol::variable("n", TypeId::I32));
        let err = eval(&Expr::ident("n"), &tables).unwrap_err();
        assert_eq!(err.status, EvalStatus::Error);
        assert!(err.message.contains("is not declared as 'const'"));
    }

    #[test]
    fn undefined_name_waits() {
        let tables = SymbolTables::new();
        let err = eval(&Expr::ident("LATER"), &tables).unwrap_err();
        assert!(err.is_waiting());
        assert_eq!(err.message, "Undefined identifier 'LATER' in array size expression");
    }

    #[test]
    fn non_positive_and_non_integer_values() {
        let tables = SymbolTables::new();
        let err = |e: Expr| eval(&e, &tables).unwrap_err().message;
        assert_eq!(err(Expr::int(0)), "Array size must be positive, got 0");
        assert_eq!(err(Expr::float(2.5)), "Array size must be an integer, got 2.50");
        assert_eq!(
            err(Expr::binary("-", Expr::int(2), Expr::int(5))),
            "Array size expression evaluates to -3, but must be positive"
        );
        assert_eq!(
            err(Expr::binary("/", Expr::int(2), Expr::binary("-", Expr::int(2), Expr::int(2)))),
            "Array size expression evaluates to 0, but must be positive"
        );
        assert_eq!(
            err(Expr::binary("%", Expr::int(8), Expr::int(0))),
            "Array size must be positive, got 0"
        );
        assert_eq!(err(Expr::str("x")), "String literals cannot be used in array size expressions");
        assert_eq!(
            err(Expr::binary("<<", Expr::int(1), Expr::int(2))),
            "Operator '<<' is not supported in array size expressions (supported: + - * / %)"
        );
    }

    #[test]
    fn depth_is_capped() {
        let tables = tables_with(&[
            ("A", Expr::ident("B")),
            ("B", Expr::ident("C")),
            ("C", Expr::int(1)),
        ]);
        let err = eval_const_int(&Expr::ident("A"), tables.root(), &tables, 2).unwrap_err();
        assert_eq!(err.message, "Const expression recursion too deep");
        assert_eq!(eval_const_int(&Expr::ident("A"), tables.root(), &tables, 4), Ok(1));
    }

    #[test]
    fn nested_operators_count_towards_depth() {
        let tables = SymbolTables::new();
        let mut expr = Expr::int(1);
        for _ in 0..200 {
            expr = Expr::binary("+", expr, Expr::int(1));
        }
        let err = eval_const_int(&expr, tables.root(), &tables, 100).unwrap_err();
        assert_eq!(err.status, EvalStatus::Error);
        assert_eq!(err.message, "Const expression recursion too deep");
        assert_eq!(eval_const_int(&expr, tables.root(), &tables, 300), Ok(201));
    }
}
