//! Operator resolution table.
//!
//! Maps surface operators to the trait and method that implement them. The
//! same table serves inference (to find an impl and its `Output`) and the
//! backend (to find the method to emit).

use crate::traits::TraitId;

/// How an operator is dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorEntry {
    pub op: &'static str,
    pub trait_id: TraitId,
    pub method: &'static str,
}

const fn entry(op: &'static str, trait_id: TraitId, method: &'static str) -> OperatorEntry {
    OperatorEntry {
        op,
        trait_id,
        method,
    }
}

/// Every trait-driven operator. `&&`, `||` and string `+` are not in here;
/// callers handle them before consulting the table.
pub static OPERATOR_TABLE: &[OperatorEntry] = &[
    entry("+", TraitId::ADD, "add"),
    entry("-", TraitId::SUB, "sub"),
    entry("*", TraitId::MUL, "mul"),
    entry("/", TraitId::DIV, "div"),
    entry("%", TraitId::REM, "rem"),
    entry("&", TraitId::BIT_AND, "bitand"),
    entry("|", TraitId::BIT_OR, "bitor"),
    entry("^", TraitId::BIT_XOR, "bitxor"),
    entry("<<", TraitId::SHL, "shl"),
    entry(">>", TraitId::SHR, "shr"),
    entry("==", TraitId::EQ, "eq"),
    entry("!=", TraitId::EQ, "ne"),
    entry("<", TraitId::ORD, "lt"),
    entry("<=", TraitId::ORD, "le"),
    entry(">", TraitId::ORD, "gt"),
    entry(">=", TraitId::ORD, "ge"),
    entry("+=", TraitId::ADD_ASSIGN, "add_assign"),
    entry("-=", TraitId::SUB_ASSIGN, "sub_assign"),
    entry("*=", TraitId::MUL_ASSIGN, "mul_assign"),
    entry("/=", TraitId::DIV_ASSIGN, "div_assign"),
];

pub fn lookup_operator(op: &str) -> Option<&'static OperatorEntry> {
    OPERATOR_TABLE.iter().find(|e| e.op == op)
}

/// Trait and method for `op`.
pub fn operator_trait(op: &str) -> Option<(TraitId, &'static str)> {
    lookup_operator(op).map(|e| (e.trait_id, e.method))
}

/// `&&` and `||` always produce `bool` and are not trait-driven.
pub fn is_logical(op: &str) -> bool {
    matches!(op, "&&" | "||")
}

/// Compound assignment operators dispatch through the `*Assign` traits.
pub fn is_compound_assign(op: &str) -> bool {
    matches!(op, "+=" | "-=" | "*=" | "/=")
}

/// Compound assignment for `++`/`--`.
pub fn step_operator(increment: bool) -> &'static str {
    if increment {
        "+="
    } else {
        "-="
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_resolves_operators() {
        assert_eq!(operator_trait("+"), Some((TraitId::ADD, "add")));
        assert_eq!(operator_trait("!="), Some((TraitId::EQ, "ne")));
        assert_eq!(operator_trait(">="), Some((TraitId::ORD, "ge")));
        assert_eq!(operator_trait("<<"), Some((TraitId::SHL, "shl")));
        assert_eq!(operator_trait("-="), Some((TraitId::SUB_ASSIGN, "sub_assign")));
    }

    #[test]
    fn logical_operators_are_not_in_the_table() {
        assert!(is_logical("&&"));
        assert!(is_logical("||"));
        assert_eq!(operator_trait("&&"), None);
        assert_eq!(operator_trait("**"), None);
    }

    #[test]
    fn operators_are_unique() {
        for (i, a) in OPERATOR_TABLE.iter().enumerate() {
            for b in &OPERATOR_TABLE[i + 1..] {
                assert_ne!(a.op, b.op);
            }
        }
        assert!(is_compound_assign("*="));
        assert_eq!(step_operator(false), "-=");
    }
}
