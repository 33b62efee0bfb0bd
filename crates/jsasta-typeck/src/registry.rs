//! The per-module type registry.
//!
//! The registry owns every non-primitive [`TypeDesc`] of one module in an
//! insertion-ordered arena. Anonymous record types are interned
//! structurally; declared records, functions and aliases are found by
//! name. Array and reference types are interned by their target so that
//! `i32[]` has exactly one id per module.
//!
//! Each entry also has a slot for the backend's compiled representation.
//! The checker never fills it in.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ty::{
    global_type_by_name, global_types, FunctionType, RecordType, Specialization, SpecId,
    TypeDesc, TypeId, TypeKind, GLOBAL_TYPE_COUNT,
};

/// Opaque handle the backend may attach to a registered type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendRepr(pub u64);

#[derive(Debug)]
struct Entry {
    desc: TypeDesc,
    backend: Option<BackendRepr>,
}

/// Result of [`TypeRegistry::add_specialization`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecOutcome {
    /// A new specialization was appended; its body still has to be inferred.
    Created(SpecId),
    /// The exact argument tuple was already specialized.
    Existing(SpecId),
}

impl SpecOutcome {
    pub fn id(self) -> SpecId {
        match self {
            SpecOutcome::Created(id) | SpecOutcome::Existing(id) => id,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, SpecOutcome::Created(_))
    }
}

/// Owner of all module-local type descriptors.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    /// Module-local descriptors. Entry `i` has id `GLOBAL_TYPE_COUNT + i`.
    entries: Vec<Entry>,
    /// Named lookup for declared records, functions and aliases.
    by_name: FxHashMap<String, TypeId>,
    /// Interned `T[]` types keyed by element.
    arrays: FxHashMap<TypeId, TypeId>,
    /// Interned `ref<T>` types keyed by (target, mutable).
    refs: FxHashMap<(TypeId, bool), TypeId>,
    /// Counter behind the generated `Object_<n>` names.
    anonymous_records: u32,
    /// Total specializations created across every function.
    specialization_count: usize,
    module_prefix: Option<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module_prefix(prefix: Option<String>) -> Self {
        TypeRegistry {
            module_prefix: prefix,
            ..Self::default()
        }
    }

    pub fn module_prefix(&self) -> Option<&str> {
        self.module_prefix.as_deref()
    }

    /// Add a descriptor and return its id. A primitive descriptor is never
    /// copied into the module; its process-wide id comes back unchanged.
    pub fn register(&mut self, desc: TypeDesc) -> TypeId {
        if let TypeKind::Primitive(p) = desc.kind {
            if let Some(id) = global_type_by_name(p.name()) {
                return id;
            }
        }
        let id = TypeId::from_index(GLOBAL_TYPE_COUNT + self.entries.len());
        trace!(id = id.index(), name = %desc.name, "registered type");
        self.entries.push(Entry {
            desc,
            backend: None,
        });
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeDesc {
        match id.index().checked_sub(GLOBAL_TYPE_COUNT) {
            None => &global_types()[id.index()],
            Some(local) => &self.entries[local].desc,
        }
    }

    /// Mutable access to a module-local descriptor. Global descriptors are
    /// read-only, so `None` comes back for them.
    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut TypeDesc> {
        let local = id.index().checked_sub(GLOBAL_TYPE_COUNT)?;
        self.entries.get_mut(local).map(|e| &mut e.desc)
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.get(id).name
    }

    /// Number of module-local descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every module-local id, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.entries.len()).map(|i| TypeId::from_index(GLOBAL_TYPE_COUNT + i))
    }

    pub fn backend_repr(&self, id: TypeId) -> Option<BackendRepr> {
        let local = id.index().checked_sub(GLOBAL_TYPE_COUNT)?;
        self.entries.get(local).and_then(|e| e.backend)
    }

    pub fn set_backend_repr(&mut self, id: TypeId, repr: BackendRepr) {
        if let Some(local) = id.index().checked_sub(GLOBAL_TYPE_COUNT) {
            if let Some(entry) = self.entries.get_mut(local) {
                entry.backend = Some(repr);
            }
        }
    }

    // ── lookup ──────────────────────────────────────────────────────────

    /// Find a type by name: globals (and their aliases) first, then the
    /// module's named types, then interned array and reference names.
    pub fn find_by_name(&self, name: &str) -> Option<TypeId> {
        if let Some(id) = global_type_by_name(name) {
            return Some(id);
        }
        if let Some(&id) = self.by_name.get(name) {
            return Some(id);
        }
        self.ids().find(|&id| self.get(id).name == name)
    }

    /// Follow alias links until a non-alias type is reached.
    pub fn resolve_alias(&self, mut id: TypeId) -> TypeId {
        while let TypeKind::Alias(target) = self.get(id).kind {
            id = target;
        }
        id
    }

    /// The target of a reference, or the type itself, aliases resolved.
    pub fn ref_target(&self, id: TypeId) -> TypeId {
        let id = self.resolve_alias(id);
        match self.get(id).kind {
            TypeKind::Ref { target, .. } => self.resolve_alias(target),
            _ => id,
        }
    }

    pub fn is_unknown(&self, id: TypeId) -> bool {
        matches!(self.get(self.resolve_alias(id)).kind, TypeKind::Unknown)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        self.get(self.resolve_alias(id)).is_integer()
    }

    pub fn is_double(&self, id: TypeId) -> bool {
        self.resolve_alias(id) == TypeId::DOUBLE
    }

    pub fn is_record(&self, id: TypeId) -> bool {
        self.record(id).is_some()
    }

    pub fn record(&self, id: TypeId) -> Option<&RecordType> {
        self.get(self.resolve_alias(id)).as_record()
    }

    pub fn array_element(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.resolve_alias(id)).kind {
            TypeKind::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// A type is concrete when it, and everything it is built from, is
    /// known. Records and functions count as concrete once declared.
    pub fn is_concrete(&self, id: TypeId) -> bool {
        let id = self.resolve_alias(id);
        match &self.get(id).kind {
            TypeKind::Unknown => false,
            TypeKind::Array(elem) => self.is_concrete(*elem),
            TypeKind::Ref { target, .. } => self.is_concrete(*target),
            _ => true,
        }
    }

    // ── construction ────────────────────────────────────────────────────

    /// Intern an anonymous record. A structurally equal record already in
    /// the registry is returned and the candidate dropped; otherwise the
    /// candidate is named `Object_<n>` and registered.
    pub fn intern_record(&mut self, candidate: RecordType) -> TypeId {
        let existing = self.ids().find(|&id| {
            self.get(id)
                .as_record()
                .is_some_and(|r| !r.declared && self.records_equal(r, &candidate))
        });
        if let Some(id) = existing {
            return id;
        }
        let name = format!("Object_{}", self.anonymous_records);
        self.anonymous_records += 1;
        self.register(TypeDesc::new(
            name,
            TypeKind::Record(RecordType {
                declared: false,
                ..candidate
            }),
        ))
    }

    /// Register a declared record by name. Re-declaring an existing name
    /// returns the first registration.
    pub fn declare_record(&mut self, name: &str, record: RecordType) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.register(TypeDesc::new(
            name,
            TypeKind::Record(RecordType {
                declared: true,
                ..record
            }),
        ));
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Register a named alias of `target`.
    pub fn declare_alias(&mut self, name: &str, target: TypeId) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.register(TypeDesc::new(name, TypeKind::Alias(target)));
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// The interned `T[]` type.
    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        if let Some(&id) = self.arrays.get(&elem) {
            return id;
        }
        let name = format!("{}[]", self.name(elem));
        let id = self.register(TypeDesc::new(name, TypeKind::Array(elem)));
        self.arrays.insert(elem, id);
        id
    }

    /// The interned `ref<T>` type.
    pub fn ref_to(&mut self, target: TypeId, mutable: bool) -> TypeId {
        if let Some(&id) = self.refs.get(&(target, mutable)) {
            return id;
        }
        let name = format!("ref<{}>", self.name(target));
        let id = self.register(TypeDesc::new(name, TypeKind::Ref { target, mutable }));
        self.refs.insert((target, mutable), id);
        id
    }

    /// Register a function under its declared name. Declaring a name twice
    /// returns the first function.
    pub fn declare_function(&mut self, name: &str, func: FunctionType) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            if self.get(id).as_function().is_some() {
                return id;
            }
        }
        let id = self.register(TypeDesc::new(name, TypeKind::Function(func)));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn find_function(&self, name: &str) -> Option<TypeId> {
        self.by_name
            .get(name)
            .copied()
            .filter(|&id| self.get(id).as_function().is_some())
    }

    pub fn function(&self, id: TypeId) -> Option<&FunctionType> {
        self.get(id).as_function()
    }

    pub fn function_mut(&mut self, id: TypeId) -> Option<&mut FunctionType> {
        match &mut self.get_mut(id)?.kind {
            TypeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    // ── equality ────────────────────────────────────────────────────────

    /// Structural equality: identity after alias resolution for scalars,
    /// field-by-field for records, element-wise for arrays and references.
    pub fn structurally_equal(&self, a: TypeId, b: TypeId) -> bool {
        let a = self.resolve_alias(a);
        let b = self.resolve_alias(b);
        if a == b {
            return true;
        }
        match (&self.get(a).kind, &self.get(b).kind) {
            (TypeKind::Record(ra), TypeKind::Record(rb)) => self.records_equal(ra, rb),
            (TypeKind::Array(ea), TypeKind::Array(eb)) => self.structurally_equal(*ea, *eb),
            (
                TypeKind::Ref {
                    target: ta,
                    mutable: ma,
                },
                TypeKind::Ref {
                    target: tb,
                    mutable: mb,
                },
            ) => ma == mb && self.structurally_equal(*ta, *tb),
            _ => false,
        }
    }

    fn records_equal(&self, a: &RecordType, b: &RecordType) -> bool {
        a.fields.len() == b.fields.len()
            && a
                .fields
                .iter()
                .zip(&b.fields)
                .all(|(fa, fb)| fa.name == fb.name && self.structurally_equal(fa.ty, fb.ty))
    }

    /// Whether an argument tuple matches a specialization's parameter
    /// tuple. Aliases are resolved on both sides, at any depth, and a
    /// top-level `ref<T>` matches `T`.
    pub fn type_args_match(&self, params: &[TypeId], args: &[TypeId]) -> bool {
        params.len() == args.len()
            && params
                .iter()
                .zip(args)
                .all(|(&p, &a)| self.same_argument(self.ref_target(p), self.ref_target(a)))
    }

    /// Identity after alias resolution, looking through array elements and
    /// reference targets. Distinct records never match, even when their
    /// fields agree.
    fn same_argument(&self, a: TypeId, b: TypeId) -> bool {
        let a = self.resolve_alias(a);
        let b = self.resolve_alias(b);
        if a == b {
            return true;
        }
        match (&self.get(a).kind, &self.get(b).kind) {
            (TypeKind::Array(ea), TypeKind::Array(eb)) => self.same_argument(*ea, *eb),
            (
                TypeKind::Ref {
                    target: ta,
                    mutable: ma,
                },
                TypeKind::Ref {
                    target: tb,
                    mutable: mb,
                },
            ) => ma == mb && self.same_argument(*ta, *tb),
            _ => false,
        }
    }

    // ── specializations ─────────────────────────────────────────────────

    /// Total number of specializations created in this module.
    pub fn specialization_count(&self) -> usize {
        self.specialization_count
    }

    pub fn specialization(&self, id: SpecId) -> Option<&Specialization> {
        self.function(id.function)?
            .specializations
            .get(id.index as usize)
    }

    pub fn specialization_mut(&mut self, id: SpecId) -> Option<&mut Specialization> {
        self.function_mut(id.function)?
            .specializations
            .get_mut(id.index as usize)
    }

    pub fn find_specialization(&self, function: TypeId, args: &[TypeId]) -> Option<SpecId> {
        let func = self.function(function)?;
        func.specializations
            .iter()
            .position(|s| self.type_args_match(&s.params, args))
            .map(|index| SpecId {
                function,
                index: index as u32,
            })
    }

    /// Mangled name for a specialization of `function` over `args`:
    /// `[prefix__]name_T1_T2`. Generic brackets are not valid in symbol
    /// names, so `<`/`>` become `_` and `[]` becomes `_arr`.
    pub fn mangle(&self, function: TypeId, args: &[TypeId]) -> String {
        let mut name = String::new();
        if let Some(prefix) = &self.module_prefix {
            name.push_str(prefix);
            name.push_str("__");
        }
        name.push_str(self.name(function));
        for &arg in args {
            name.push('_');
            let sanitized = self
                .name(arg)
                .replace("[]", "_arr")
                .replace(['<', '>'], "_");
            name.push_str(&sanitized);
        }
        name
    }

    /// Request a specialization of `function` for `args`. Idempotent per
    /// tuple: a second request for the same tuple returns the first.
    pub fn add_specialization(&mut self, function: TypeId, args: &[TypeId]) -> Option<SpecOutcome> {
        if let Some(existing) = self.find_specialization(function, args) {
            return Some(SpecOutcome::Existing(existing));
        }
        let name = self.mangle(function, args);
        self.push_specialization(function, name, args.to_vec(), TypeId::UNKNOWN)
            .map(SpecOutcome::Created)
    }

    /// Append a specialization with a caller-chosen name and return type.
    pub(crate) fn push_specialization(
        &mut self,
        function: TypeId,
        name: String,
        params: Vec<TypeId>,
        return_type: TypeId,
    ) -> Option<SpecId> {
        let func = self.function_mut(function)?;
        let index = func.specializations.len() as u32;
        trace!(%name, "specialization requested");
        func.specializations.push(Specialization {
            name,
            params,
            return_type,
            body: None,
        });
        self.specialization_count += 1;
        Some(SpecId { function, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ScopeId;
    use crate::ty::{Field, Param};

    fn record(fields: &[(&str, TypeId)]) -> RecordType {
        RecordType {
            fields: fields.iter().map(|&(n, t)| Field::new(n, t)).collect(),
            declared: false,
        }
    }

    fn generic_fn(params: &[&str]) -> FunctionType {
        FunctionType {
            params: params
                .iter()
                .map(|p| Param {
                    name: p.to_string(),
                    hint: None,
                })
                .collect(),
            return_hint: None,
            variadic: false,
            fully_typed: false,
            template: None,
            scope: ScopeId::from_index(0),
            specializations: Vec::new(),
        }
    }

    // ── primitives ──────────────────────────────────────────────────────

    #[test]
    fn primitives_are_shared_between_registries() {
        let a = TypeRegistry::new();
        let b = TypeRegistry::new();
        assert!(std::ptr::eq(a.get(TypeId::I32), b.get(TypeId::I32)));
        assert_eq!(a.find_by_name("i32"), Some(TypeId::I32));
    }

    #[test]
    fn registering_a_primitive_returns_its_global_id() {
        let mut reg = TypeRegistry::new();
        let desc = global_types()[TypeId::BOOL.index()].clone();
        assert_eq!(reg.register(desc), TypeId::BOOL);
        assert!(reg.is_empty());
    }

    #[test]
    fn aliases_resolve_transitively() {
        let mut reg = TypeRegistry::new();
        let meters = reg.declare_alias("Meters", TypeId::INT);
        assert_eq!(reg.resolve_alias(meters), TypeId::I32);
        assert_eq!(reg.resolve_alias(TypeId::F64), TypeId::DOUBLE);
        assert!(reg.is_integer(meters));
    }

    // ── records ─────────────────────────────────────────────────────────

    #[test]
    fn identical_anonymous_records_intern_to_one_id() {
        let mut reg = TypeRegistry::new();
        let a = reg.intern_record(record(&[("x", TypeId::I32), ("y", TypeId::I32)]));
        let b = reg.intern_record(record(&[("x", TypeId::I32), ("y", TypeId::I32)]));
        assert_eq!(a, b);
        assert_eq!(reg.name(a), "Object_0");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn field_order_name_or_type_changes_identity() {
        let mut reg = TypeRegistry::new();
        let base = reg.intern_record(record(&[("x", TypeId::I32), ("y", TypeId::I32)]));
        let swapped = reg.intern_record(record(&[("y", TypeId::I32), ("x", TypeId::I32)]));
        let renamed = reg.intern_record(record(&[("x", TypeId::I32), ("z", TypeId::I32)]));
        let retyped = reg.intern_record(record(&[("x", TypeId::I32), ("y", TypeId::DOUBLE)]));
        assert_ne!(base, swapped);
        assert_ne!(base, renamed);
        assert_ne!(base, retyped);
        assert_eq!(reg.name(retyped), "Object_3");
    }

    #[test]
    fn declared_records_bypass_interning() {
        let mut reg = TypeRegistry::new();
        let point = reg.declare_record("Point", record(&[("x", TypeId::I32)]));
        let anon = reg.intern_record(record(&[("x", TypeId::I32)]));
        assert_ne!(point, anon);
        assert_eq!(reg.declare_record("Point", record(&[])), point);
        assert_eq!(reg.find_by_name("Point"), Some(point));
    }

    #[test]
    fn nested_records_compare_structurally() {
        let mut reg = TypeRegistry::new();
        let inner = reg.intern_record(record(&[("v", TypeId::U8)]));
        let arr = reg.array_of(inner);
        let outer = record(&[("items", arr)]);
        let a = reg.intern_record(outer.clone());
        let b = reg.intern_record(outer);
        assert_eq!(a, b);
    }

    // ── arrays and references ───────────────────────────────────────────

    #[test]
    fn arrays_and_refs_are_interned_and_named() {
        let mut reg = TypeRegistry::new();
        let a = reg.array_of(TypeId::DOUBLE);
        assert_eq!(reg.array_of(TypeId::DOUBLE), a);
        assert_eq!(reg.name(a), "double[]");
        let r = reg.ref_to(TypeId::U8, true);
        assert_eq!(reg.ref_to(TypeId::U8, true), r);
        assert_eq!(reg.name(r), "ref<u8>");
        assert_eq!(reg.ref_target(r), TypeId::U8);
        assert_eq!(reg.find_by_name("double[]"), Some(a));
    }

    #[test]
    fn concreteness_looks_through_containers() {
        let mut reg = TypeRegistry::new();
        let unknown_arr = reg.array_of(TypeId::UNKNOWN);
        let known_arr = reg.array_of(TypeId::I64);
        assert!(!reg.is_concrete(unknown_arr));
        assert!(reg.is_concrete(known_arr));
        assert!(!reg.is_concrete(TypeId::UNKNOWN));
    }

    // ── specializations ─────────────────────────────────────────────────

    #[test]
    fn specialization_requests_are_deduplicated() {
        let mut reg = TypeRegistry::new();
        let f = reg.declare_function("f", generic_fn(&["a", "b"]));

        let first = reg.add_specialization(f, &[TypeId::I32, TypeId::F64]).unwrap();
        let again = reg.add_specialization(f, &[TypeId::I32, TypeId::DOUBLE]).unwrap();
        let flipped = reg.add_specialization(f, &[TypeId::DOUBLE, TypeId::I32]).unwrap();

        assert!(first.is_created());
        assert_eq!(again, SpecOutcome::Existing(first.id()));
        assert!(flipped.is_created());
        assert_ne!(first.id(), flipped.id());
        assert_eq!(reg.specialization_count(), 2);
    }

    #[test]
    fn ref_argument_matches_its_target() {
        let mut reg = TypeRegistry::new();
        let f = reg.declare_function("f", generic_fn(&["a"]));
        let r = reg.ref_to(TypeId::I32, true);
        let created = reg.add_specialization(f, &[TypeId::I32]).unwrap();
        assert_eq!(
            reg.add_specialization(f, &[r]),
            Some(SpecOutcome::Existing(created.id()))
        );
    }

    #[test]
    fn aliased_array_elements_share_a_specialization() {
        let mut reg = TypeRegistry::new();
        let f = reg.declare_function("f", generic_fn(&["xs"]));
        let ints = reg.array_of(TypeId::INT);
        let i32s = reg.array_of(TypeId::I32);
        assert_ne!(ints, i32s);

        let created = reg.add_specialization(f, &[ints]).unwrap();
        assert_eq!(
            reg.add_specialization(f, &[i32s]),
            Some(SpecOutcome::Existing(created.id()))
        );
        let nested = reg.array_of(ints);
        let nested_i32 = reg.array_of(i32s);
        let outer = reg.add_specialization(f, &[nested]).unwrap();
        assert!(outer.is_created());
        assert_eq!(reg.add_specialization(f, &[nested_i32]), Some(SpecOutcome::Existing(outer.id())));
    }

    #[test]
    fn distinct_records_with_equal_fields_do_not_share() {
        let mut reg = TypeRegistry::new();
        let f = reg.declare_function("f", generic_fn(&["p"]));
        let a = reg.declare_record("A", record(&[("x", TypeId::I32)]));
        let b = reg.declare_record("B", record(&[("x", TypeId::I32)]));
        let first = reg.add_specialization(f, &[a]).unwrap();
        let second = reg.add_specialization(f, &[b]).unwrap();
        assert!(first.is_created() && second.is_created());
        assert_eq!(reg.specialization_count(), 2);
    }

    #[test]
    fn mangled_names_are_identifier_safe() {
        let mut reg = TypeRegistry::with_module_prefix(Some("math".into()));
        let f = reg.declare_function("sum", generic_fn(&["xs", "p"]));
        let arr = reg.array_of(TypeId::I32);
        let r = reg.ref_to(TypeId::U8, true);
        assert_eq!(reg.mangle(f, &[arr, r]), "math__sum_i32_arr_ref_u8_");

        let mut plain = TypeRegistry::new();
        let g = plain.declare_function("add", generic_fn(&["a", "b"]));
        assert_eq!(plain.mangle(g, &[TypeId::I32, TypeId::I32]), "add_i32_i32");
    }
}
