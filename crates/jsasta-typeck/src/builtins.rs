//! Builtin traits and their primitive impls.
//!
//! Every operator trait is defined here, in the order the `TraitId`
//! constants expect, and implemented for the primitive types up front.
//! Indexing, mutable indexing, `length` and C-string conversion depend on
//! the concrete array or string type being queried, so those impls are
//! only created on demand by the `ensure_*` functions.

use crate::registry::TypeRegistry;
use crate::traits::{Intrinsic, IntrinsicOp, MethodImpl, OperandKind, TraitId, TraitImpl, TraitRegistry};
use crate::ty::{global_types, TypeId, TypeKind};

/// Define every builtin trait and register the primitive impls.
pub fn register_builtin_traits(registry: &mut TraitRegistry) {
    // Builtin impls only mention process-wide types, which an empty
    // registry resolves just as well as the module's.
    let types = TypeRegistry::new();

    // ── Trait definitions ──────────────────────────────────────────

    let binary = [
        ("Add", "add"),
        ("Sub", "sub"),
        ("Mul", "mul"),
        ("Div", "div"),
        ("Rem", "rem"),
        ("BitAnd", "bitand"),
        ("BitOr", "bitor"),
        ("BitXor", "bitxor"),
        ("Shl", "shl"),
        ("Shr", "shr"),
    ];
    for (name, method) in binary {
        registry.define_trait(name, &["Rhs"], &["Output"], &[method]);
    }
    registry.define_trait("Eq", &["Rhs"], &["Output"], &["eq", "ne"]);
    registry.define_trait("Ord", &["Rhs"], &["Output"], &["lt", "le", "gt", "ge"]);
    registry.define_trait("Not", &[], &["Output"], &["not"]);
    registry.define_trait("Neg", &[], &["Output"], &["neg"]);
    registry.define_trait("AddAssign", &["Rhs"], &[], &["add_assign"]);
    registry.define_trait("SubAssign", &["Rhs"], &[], &["sub_assign"]);
    registry.define_trait("MulAssign", &["Rhs"], &[], &["mul_assign"]);
    registry.define_trait("DivAssign", &["Rhs"], &[], &["div_assign"]);
    registry.define_trait("Index", &["Idx"], &["Output"], &["index"]);
    registry.define_trait("RefIndex", &["Idx"], &["Output"], &["ref_index"]);
    registry.define_trait("Length", &[], &["Output"], &["length"]);
    registry.define_trait("ToCStr", &[], &["Output"], &["to_cstr"]);
    debug_assert_eq!(registry.find_trait("ToCStr"), Some(TraitId::TO_CSTR));

    // ── Integer x integer ──────────────────────────────────────────

    let arithmetic = [
        (TraitId::ADD, "add", IntrinsicOp::Add),
        (TraitId::SUB, "sub", IntrinsicOp::Sub),
        (TraitId::MUL, "mul", IntrinsicOp::Mul),
        (TraitId::DIV, "div", IntrinsicOp::Div),
        (TraitId::REM, "rem", IntrinsicOp::Rem),
        (TraitId::BIT_AND, "bitand", IntrinsicOp::BitAnd),
        (TraitId::BIT_OR, "bitor", IntrinsicOp::BitOr),
        (TraitId::BIT_XOR, "bitxor", IntrinsicOp::BitXor),
    ];
    let shifts = [
        (TraitId::SHL, "shl", IntrinsicOp::Shl),
        (TraitId::SHR, "shr", IntrinsicOp::Shr),
    ];

    for lhs in TypeId::INTEGERS {
        for rhs in TypeId::INTEGERS {
            let out = promote_integers(lhs, rhs);
            let operands = int_operands(out);

            for (trait_id, method, op) in arithmetic {
                let imp = TraitImpl::new(lhs, vec![rhs])
                    .assoc("Output", out)
                    .method(method, intrinsic(op, operands));
                registry.implement(&types, trait_id, imp);
            }
            for (trait_id, method, op) in shifts {
                let imp = TraitImpl::new(lhs, vec![rhs])
                    .assoc("Output", lhs)
                    .method(method, intrinsic(op, int_operands(lhs)));
                registry.implement(&types, trait_id, imp);
            }
            registry.implement(&types, TraitId::EQ, equality(lhs, rhs, operands));
            registry.implement(&types, TraitId::ORD, ordering(lhs, rhs, operands));
        }
    }

    // ── Floating point and mixed i32/double ────────────────────────

    let float_pairs = [
        (TypeId::I32, TypeId::DOUBLE),
        (TypeId::DOUBLE, TypeId::I32),
        (TypeId::DOUBLE, TypeId::DOUBLE),
    ];
    for (lhs, rhs) in float_pairs {
        for (trait_id, method, op) in &arithmetic[..4] {
            let imp = TraitImpl::new(lhs, vec![rhs])
                .assoc("Output", TypeId::DOUBLE)
                .method(method, intrinsic(*op, OperandKind::Float));
            registry.implement(&types, *trait_id, imp);
        }
        registry.implement(&types, TraitId::EQ, equality(lhs, rhs, OperandKind::Float));
        registry.implement(&types, TraitId::ORD, ordering(lhs, rhs, OperandKind::Float));
    }

    // ── Bool and string ────────────────────────────────────────────

    for (trait_id, method, op) in &arithmetic[5..] {
        let imp = TraitImpl::new(TypeId::BOOL, vec![TypeId::BOOL])
            .assoc("Output", TypeId::BOOL)
            .method(method, intrinsic(*op, OperandKind::Bool));
        registry.implement(&types, *trait_id, imp);
    }
    registry.implement(
        &types,
        TraitId::EQ,
        equality(TypeId::BOOL, TypeId::BOOL, OperandKind::Bool),
    );
    registry.implement(
        &types,
        TraitId::EQ,
        equality(TypeId::STRING, TypeId::STRING, OperandKind::String),
    );

    // ── Unary ──────────────────────────────────────────────────────

    registry.implement(
        &types,
        TraitId::NOT,
        TraitImpl::new(TypeId::BOOL, vec![])
            .assoc("Output", TypeId::BOOL)
            .method("not", intrinsic(IntrinsicOp::Not, OperandKind::Bool)),
    );
    for ty in TypeId::INTEGERS {
        registry.implement(
            &types,
            TraitId::NEG,
            TraitImpl::new(ty, vec![])
                .assoc("Output", ty)
                .method("neg", intrinsic(IntrinsicOp::Neg, int_operands(ty))),
        );
    }
    registry.implement(
        &types,
        TraitId::NEG,
        TraitImpl::new(TypeId::DOUBLE, vec![])
            .assoc("Output", TypeId::DOUBLE)
            .method("neg", intrinsic(IntrinsicOp::Neg, OperandKind::Float)),
    );

    // ── Compound assignment ────────────────────────────────────────

    let assigns = [
        (TraitId::ADD_ASSIGN, "add_assign", IntrinsicOp::Add),
        (TraitId::SUB_ASSIGN, "sub_assign", IntrinsicOp::Sub),
        (TraitId::MUL_ASSIGN, "mul_assign", IntrinsicOp::Mul),
        (TraitId::DIV_ASSIGN, "div_assign", IntrinsicOp::Div),
    ];
    for (trait_id, method, op) in assigns {
        for lhs in TypeId::INTEGERS {
            for rhs in TypeId::INTEGERS {
                let imp = TraitImpl::new(lhs, vec![rhs]).method(method, intrinsic(op, int_operands(lhs)));
                registry.implement(&types, trait_id, imp);
            }
        }
        for rhs in [TypeId::DOUBLE, TypeId::I32] {
            let imp = TraitImpl::new(TypeId::DOUBLE, vec![rhs]).method(method, intrinsic(op, OperandKind::Float));
            registry.implement(&types, trait_id, imp);
        }
    }
}

/// Result type of an integer binary operation. Equal types give that type,
/// otherwise the wider type wins; at equal width the unsigned one wins.
pub fn promote_integers(lhs: TypeId, rhs: TypeId) -> TypeId {
    if lhs == rhs {
        return lhs;
    }
    let types = global_types();
    let (Some(l), Some(r)) = (
        types[lhs.index()].as_primitive(),
        types[rhs.index()].as_primitive(),
    ) else {
        return lhs;
    };
    match (l.bit_width(), r.bit_width()) {
        (Some(lw), Some(rw)) if lw > rw => lhs,
        (Some(lw), Some(rw)) if rw > lw => rhs,
        (Some(_), Some(_)) if l.is_signed() && !r.is_signed() => rhs,
        _ => lhs,
    }
}

fn int_operands(ty: TypeId) -> OperandKind {
    let signed = global_types()[ty.index()]
        .as_primitive()
        .is_some_and(|p| p.is_signed());
    OperandKind::Int { signed }
}

fn intrinsic(op: IntrinsicOp, operands: OperandKind) -> MethodImpl {
    MethodImpl::Intrinsic(Intrinsic { op, operands })
}

fn equality(lhs: TypeId, rhs: TypeId, operands: OperandKind) -> TraitImpl {
    TraitImpl::new(lhs, vec![rhs])
        .assoc("Output", TypeId::BOOL)
        .method("eq", intrinsic(IntrinsicOp::Eq, operands))
        .method("ne", intrinsic(IntrinsicOp::Ne, operands))
}

fn ordering(lhs: TypeId, rhs: TypeId, operands: OperandKind) -> TraitImpl {
    TraitImpl::new(lhs, vec![rhs])
        .assoc("Output", TypeId::BOOL)
        .method("lt", intrinsic(IntrinsicOp::Lt, operands))
        .method("le", intrinsic(IntrinsicOp::Le, operands))
        .method("gt", intrinsic(IntrinsicOp::Gt, operands))
        .method("ge", intrinsic(IntrinsicOp::Ge, operands))
}

// ── On-demand impls ─────────────────────────────────────────────────────

/// `Index<i32>` for arrays (yielding the element) and strings (yielding
/// `u8`). Idempotent.
pub fn ensure_index_impl(traits: &mut TraitRegistry, types: &TypeRegistry, ty: TypeId) {
    let ty = types.resolve_alias(ty);
    let (output, operands) = match types.get(ty).kind {
        TypeKind::Array(elem) => (elem, OperandKind::Array),
        _ if ty == TypeId::STRING => (TypeId::U8, OperandKind::String),
        _ => return,
    };
    if traits.has_impl(types, TraitId::INDEX, ty, &[TypeId::I32]) {
        return;
    }
    traits.implement(
        types,
        TraitId::INDEX,
        TraitImpl::new(ty, vec![TypeId::I32])
            .assoc("Output", output)
            .method("index", intrinsic(IntrinsicOp::Index, operands)),
    );
}

/// `RefIndex<i32>` for arrays. Idempotent.
pub fn ensure_ref_index_impl(traits: &mut TraitRegistry, types: &TypeRegistry, ty: TypeId) {
    let ty = types.resolve_alias(ty);
    let TypeKind::Array(elem) = types.get(ty).kind else {
        return;
    };
    if traits.has_impl(types, TraitId::REF_INDEX, ty, &[TypeId::I32]) {
        return;
    }
    traits.implement(
        types,
        TraitId::REF_INDEX,
        TraitImpl::new(ty, vec![TypeId::I32])
            .assoc("Output", elem)
            .method("ref_index", intrinsic(IntrinsicOp::RefIndex, OperandKind::Array)),
    );
}

/// `Length` with `Output = u32` for arrays and strings. Idempotent.
pub fn ensure_length_impl(traits: &mut TraitRegistry, types: &TypeRegistry, ty: TypeId) {
    let ty = types.resolve_alias(ty);
    let operands = match types.get(ty).kind {
        TypeKind::Array(_) => OperandKind::Array,
        _ if ty == TypeId::STRING => OperandKind::String,
        _ => return,
    };
    if traits.has_impl(types, TraitId::LENGTH, ty, &[]) {
        return;
    }
    traits.implement(
        types,
        TraitId::LENGTH,
        TraitImpl::new(ty, vec![])
            .assoc("Output", TypeId::U32)
            .method("length", intrinsic(IntrinsicOp::Length, operands)),
    );
}

/// `ToCStr` with `Output = ref<u8>` for strings. Idempotent.
pub fn ensure_cstr_impl(traits: &mut TraitRegistry, types: &mut TypeRegistry, ty: TypeId) {
    if types.resolve_alias(ty) != TypeId::STRING {
        return;
    }
    if traits.has_impl(types, TraitId::TO_CSTR, TypeId::STRING, &[]) {
        return;
    }
    let bytes = types.ref_to(TypeId::U8, true);
    traits.implement(
        types,
        TraitId::TO_CSTR,
        TraitImpl::new(TypeId::STRING, vec![])
            .assoc("Output", bytes)
            .method("to_cstr", intrinsic(IntrinsicOp::ToCStr, OperandKind::String)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(traits: &TraitRegistry, trait_id: TraitId, lhs: TypeId, rhs: TypeId) -> Option<TypeId> {
        let types = TypeRegistry::new();
        traits.binary_output(&types, trait_id, lhs, rhs).map(|(_, out)| out)
    }

    // ── promotion ───────────────────────────────────────────────────────

    #[test]
    fn integer_promotion_rules() {
        assert_eq!(promote_integers(TypeId::I32, TypeId::I32), TypeId::I32);
        assert_eq!(promote_integers(TypeId::I8, TypeId::I64), TypeId::I64);
        assert_eq!(promote_integers(TypeId::U64, TypeId::I16), TypeId::U64);
        assert_eq!(promote_integers(TypeId::I32, TypeId::U32), TypeId::U32);
        assert_eq!(promote_integers(TypeId::U32, TypeId::I32), TypeId::U32);
    }

    // ── registered impls ────────────────────────────────────────────────

    #[test]
    fn arithmetic_outputs() {
        let traits = TraitRegistry::new();
        assert_eq!(output(&traits, TraitId::ADD, TypeId::I32, TypeId::I32), Some(TypeId::I32));
        assert_eq!(output(&traits, TraitId::MUL, TypeId::U8, TypeId::I16), Some(TypeId::I16));
        assert_eq!(output(&traits, TraitId::ADD, TypeId::I32, TypeId::DOUBLE), Some(TypeId::DOUBLE));
        assert_eq!(output(&traits, TraitId::DIV, TypeId::DOUBLE, TypeId::DOUBLE), Some(TypeId::DOUBLE));
        assert_eq!(output(&traits, TraitId::REM, TypeId::DOUBLE, TypeId::DOUBLE), None);
        assert_eq!(output(&traits, TraitId::ADD, TypeId::I64, TypeId::DOUBLE), None);
        assert_eq!(output(&traits, TraitId::SHL, TypeId::U8, TypeId::I32), Some(TypeId::U8));
    }

    #[test]
    fn comparisons_yield_bool() {
        let traits = TraitRegistry::new();
        assert_eq!(output(&traits, TraitId::EQ, TypeId::I64, TypeId::U8), Some(TypeId::BOOL));
        assert_eq!(output(&traits, TraitId::ORD, TypeId::DOUBLE, TypeId::I32), Some(TypeId::BOOL));
        assert_eq!(output(&traits, TraitId::EQ, TypeId::STRING, TypeId::STRING), Some(TypeId::BOOL));
        assert_eq!(output(&traits, TraitId::ORD, TypeId::BOOL, TypeId::BOOL), None);
    }

    #[test]
    fn int_alias_finds_i32_impls() {
        let traits = TraitRegistry::new();
        assert_eq!(output(&traits, TraitId::SUB, TypeId::INT, TypeId::INT), Some(TypeId::I32));
    }

    #[test]
    fn ordering_impl_carries_all_methods() {
        let traits = TraitRegistry::new();
        let types = TypeRegistry::new();
        let method = traits.get_method(&types, TraitId::ORD, TypeId::U16, &[TypeId::U16], "ge");
        assert_eq!(
            method,
            Some(&MethodImpl::Intrinsic(Intrinsic {
                op: IntrinsicOp::Ge,
                operands: OperandKind::Int { signed: false },
            }))
        );
    }

    // ── on-demand impls ─────────────────────────────────────────────────

    #[test]
    fn index_impls_are_created_once() {
        let mut traits = TraitRegistry::new();
        let mut types = TypeRegistry::new();
        let arr = types.array_of(TypeId::DOUBLE);

        ensure_index_impl(&mut traits, &types, arr);
        ensure_index_impl(&mut traits, &types, arr);
        assert_eq!(traits.trait_def(TraitId::INDEX).impls.len(), 1);
        assert_eq!(
            traits.get_associated_type(&types, TraitId::INDEX, arr, &[TypeId::I32], "Output"),
            Some(TypeId::DOUBLE)
        );

        ensure_index_impl(&mut traits, &types, TypeId::STRING);
        assert_eq!(
            traits.get_associated_type(&types, TraitId::INDEX, TypeId::STRING, &[TypeId::I32], "Output"),
            Some(TypeId::U8)
        );
    }

    #[test]
    fn non_indexable_types_get_nothing() {
        let mut traits = TraitRegistry::new();
        let types = TypeRegistry::new();
        ensure_index_impl(&mut traits, &types, TypeId::BOOL);
        ensure_ref_index_impl(&mut traits, &types, TypeId::STRING);
        ensure_length_impl(&mut traits, &types, TypeId::I32);
        assert!(traits.trait_def(TraitId::INDEX).impls.is_empty());
        assert!(traits.trait_def(TraitId::REF_INDEX).impls.is_empty());
        assert!(traits.trait_def(TraitId::LENGTH).impls.is_empty());
    }

    #[test]
    fn length_and_cstr() {
        let mut traits = TraitRegistry::new();
        let mut types = TypeRegistry::new();
        let arr = types.array_of(TypeId::U8);
        ensure_length_impl(&mut traits, &types, arr);
        ensure_ref_index_impl(&mut traits, &types, arr);
        assert_eq!(
            traits.get_associated_type(&types, TraitId::LENGTH, arr, &[], "Output"),
            Some(TypeId::U32)
        );
        assert!(traits.has_impl(&types, TraitId::REF_INDEX, arr, &[TypeId::I32]));

        ensure_cstr_impl(&mut traits, &mut types, TypeId::STRING);
        ensure_cstr_impl(&mut traits, &mut types, TypeId::STRING);
        let out = traits.get_associated_type(&types, TraitId::TO_CSTR, TypeId::STRING, &[], "Output");
        assert_eq!(out.map(|t| types.name(t).to_string()).as_deref(), Some("ref<u8>"));
        assert_eq!(traits.trait_def(TraitId::TO_CSTR).impls.len(), 1);
    }
}
