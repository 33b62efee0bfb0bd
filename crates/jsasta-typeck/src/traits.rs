//! Trait registry and impl lookup.
//!
//! Traits drive every operator and a few pseudo-members (`length`,
//! indexing). A trait has ordered generic parameters (e.g. `Rhs`), ordered
//! associated type names (e.g. `Output`) and the names of its methods. Each
//! trait owns its list of impls; an impl is keyed by the implementing type
//! plus one tuple of generic bindings.
//!
//! Lookup scans a trait's impls oldest first and returns the first match.
//! Registering a second impl for a key that already resolves leaves the new
//! impl unreachable; this is logged, not rejected.

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{trace, warn};

use crate::builtins;
use crate::registry::TypeRegistry;
use crate::ty::TypeId;

/// Handle to a trait definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TraitId(u32);

impl TraitId {
    // The builtin traits, in the order `builtins` defines them.
    pub const ADD: TraitId = TraitId(0);
    pub const SUB: TraitId = TraitId(1);
    pub const MUL: TraitId = TraitId(2);
    pub const DIV: TraitId = TraitId(3);
    pub const REM: TraitId = TraitId(4);
    pub const BIT_AND: TraitId = TraitId(5);
    pub const BIT_OR: TraitId = TraitId(6);
    pub const BIT_XOR: TraitId = TraitId(7);
    pub const SHL: TraitId = TraitId(8);
    pub const SHR: TraitId = TraitId(9);
    pub const EQ: TraitId = TraitId(10);
    pub const ORD: TraitId = TraitId(11);
    pub const NOT: TraitId = TraitId(12);
    pub const NEG: TraitId = TraitId(13);
    pub const ADD_ASSIGN: TraitId = TraitId(14);
    pub const SUB_ASSIGN: TraitId = TraitId(15);
    pub const MUL_ASSIGN: TraitId = TraitId(16);
    pub const DIV_ASSIGN: TraitId = TraitId(17);
    pub const INDEX: TraitId = TraitId(18);
    pub const REF_INDEX: TraitId = TraitId(19);
    pub const LENGTH: TraitId = TraitId(20);
    pub const TO_CSTR: TraitId = TraitId(21);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Address of one impl: its trait plus its position in that trait's list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ImplId {
    pub trait_id: TraitId,
    pub index: u32,
}

/// Operation an intrinsic method lowers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IntrinsicOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    Neg,
    Index,
    RefIndex,
    Length,
    ToCStr,
}

/// Operand representation the backend emits the intrinsic for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OperandKind {
    Int { signed: bool },
    /// Floating point; integer operands are widened first.
    Float,
    Bool,
    Array,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Intrinsic {
    pub op: IntrinsicOp,
    pub operands: OperandKind,
}

/// How a trait method is dispatched at code generation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MethodImpl {
    /// Emitted inline by the backend.
    Intrinsic(Intrinsic),
    /// A call to a compiled function (a specialization's mangled name).
    Function(String),
    /// A call to an external symbol.
    External(String),
}

/// A trait definition and the impls registered for it.
#[derive(Clone, Debug)]
pub struct TraitDef {
    pub name: String,
    /// Generic parameter names, e.g. `["Rhs"]` for `Add<Rhs>`.
    pub generics: Vec<String>,
    /// Associated type names, e.g. `["Output"]`.
    pub assoc_types: Vec<String>,
    /// Required method names.
    pub methods: Vec<String>,
    pub impls: Vec<TraitImpl>,
}

/// One implementation of a trait for a type and a generic binding tuple.
#[derive(Clone, Debug)]
pub struct TraitImpl {
    pub impl_type: TypeId,
    pub bindings: Vec<TypeId>,
    pub assoc_types: Vec<(String, TypeId)>,
    pub methods: Vec<(String, MethodImpl)>,
}

impl TraitImpl {
    pub fn new(impl_type: TypeId, bindings: Vec<TypeId>) -> Self {
        TraitImpl {
            impl_type,
            bindings,
            assoc_types: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn assoc(mut self, name: &str, ty: TypeId) -> Self {
        self.assoc_types.push((name.to_string(), ty));
        self
    }

    pub fn method(mut self, name: &str, method: MethodImpl) -> Self {
        self.methods.push((name.to_string(), method));
        self
    }

    pub fn associated_type(&self, name: &str) -> Option<TypeId> {
        self.assoc_types
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, ty)| ty)
    }

    pub fn get_method(&self, name: &str) -> Option<&MethodImpl> {
        self.methods.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }
}

/// All trait definitions of one module.
#[derive(Debug)]
pub struct TraitRegistry {
    traits: Vec<TraitDef>,
    by_name: FxHashMap<String, TraitId>,
}

impl TraitRegistry {
    /// A registry with every builtin trait and its primitive impls installed.
    pub fn new() -> Self {
        let mut registry = TraitRegistry::empty();
        builtins::register_builtin_traits(&mut registry);
        registry
    }

    /// A registry with no traits at all.
    pub fn empty() -> Self {
        TraitRegistry {
            traits: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Define a trait. Defining an existing name returns the existing trait.
    pub fn define_trait(
        &mut self,
        name: &str,
        generics: &[&str],
        assoc_types: &[&str],
        methods: &[&str],
    ) -> TraitId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TraitId(self.traits.len() as u32);
        let to_owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.traits.push(TraitDef {
            name: name.to_string(),
            generics: to_owned(generics),
            assoc_types: to_owned(assoc_types),
            methods: to_owned(methods),
            impls: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        trace!(trait_name = name, "defined trait");
        id
    }

    pub fn find_trait(&self, name: &str) -> Option<TraitId> {
        self.by_name.get(name).copied()
    }

    pub fn trait_def(&self, id: TraitId) -> &TraitDef {
        &self.traits[id.index()]
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    /// Append an impl to `trait_id`. An impl whose key already resolves is
    /// appended anyway and stays shadowed by the earlier one.
    pub fn implement(&mut self, types: &TypeRegistry, trait_id: TraitId, imp: TraitImpl) -> ImplId {
        if let Some(existing) = self.find_impl(types, trait_id, imp.impl_type, &imp.bindings) {
            warn!(
                trait_name = %self.trait_def(trait_id).name,
                impl_type = %types.name(imp.impl_type),
                shadowed_by = existing.index,
                "duplicate trait impl is unreachable"
            );
        }
        let def = &mut self.traits[trait_id.index()];
        let index = def.impls.len() as u32;
        def.impls.push(imp);
        ImplId { trait_id, index }
    }

    /// First impl of `trait_id` for `impl_type` with exactly `bindings`.
    /// Aliases are resolved on the queried type, the stored impl types and
    /// every binding.
    pub fn find_impl(
        &self,
        types: &TypeRegistry,
        trait_id: TraitId,
        impl_type: TypeId,
        bindings: &[TypeId],
    ) -> Option<ImplId> {
        let want = types.resolve_alias(impl_type);
        let def = self.traits.get(trait_id.index())?;
        def.impls
            .iter()
            .position(|imp| {
                types.resolve_alias(imp.impl_type) == want
                    && imp.bindings.len() == bindings.len()
                    && imp
                        .bindings
                        .iter()
                        .zip(bindings)
                        .all(|(&a, &b)| types.resolve_alias(a) == types.resolve_alias(b))
            })
            .map(|index| ImplId {
                trait_id,
                index: index as u32,
            })
    }

    pub fn get_impl(&self, id: ImplId) -> Option<&TraitImpl> {
        self.traits
            .get(id.trait_id.index())?
            .impls
            .get(id.index as usize)
    }

    pub fn has_impl(&self, types: &TypeRegistry, trait_id: TraitId, impl_type: TypeId, bindings: &[TypeId]) -> bool {
        self.find_impl(types, trait_id, impl_type, bindings).is_some()
    }

    pub fn get_method(
        &self,
        types: &TypeRegistry,
        trait_id: TraitId,
        impl_type: TypeId,
        bindings: &[TypeId],
        method: &str,
    ) -> Option<&MethodImpl> {
        let id = self.find_impl(types, trait_id, impl_type, bindings)?;
        self.get_impl(id)?.get_method(method)
    }

    pub fn get_associated_type(
        &self,
        types: &TypeRegistry,
        trait_id: TraitId,
        impl_type: TypeId,
        bindings: &[TypeId],
        assoc: &str,
    ) -> Option<TypeId> {
        let id = self.find_impl(types, trait_id, impl_type, bindings)?;
        self.get_impl(id)?.associated_type(assoc)
    }

    /// Result type of a binary trait: `Output` of `trait_id<rhs>` for `lhs`.
    pub fn binary_output(
        &self,
        types: &TypeRegistry,
        trait_id: TraitId,
        lhs: TypeId,
        rhs: TypeId,
    ) -> Option<(ImplId, TypeId)> {
        let id = self.find_impl(types, trait_id, lhs, &[rhs])?;
        let output = self.get_impl(id)?.associated_type("Output")?;
        Some((id, output))
    }
}

impl Default for TraitRegistry {
    fn default() -> Self {
        Self::new()
    }
}
