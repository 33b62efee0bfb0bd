//! Type descriptors and the handles that refer to them.
//!
//! Every type the checker knows about is a [`TypeDesc`] stored in an arena
//! and addressed by a copyable [`TypeId`]. The primitive types (and the
//! builtin aliases such as `int`) live in a process-wide table that is
//! built once and never mutated afterwards; their ids are the same in every
//! [`TypeRegistry`](crate::registry::TypeRegistry). Everything else is owned
//! by exactly one registry.

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::ast::{Block, Expr};
use crate::env::ScopeId;

/// Handle to a type descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// The explicit "not inferred yet" placeholder.
    pub const UNKNOWN: TypeId = TypeId(0);
    pub const I8: TypeId = TypeId(1);
    pub const I16: TypeId = TypeId(2);
    pub const I32: TypeId = TypeId(3);
    pub const I64: TypeId = TypeId(4);
    pub const U8: TypeId = TypeId(5);
    pub const U16: TypeId = TypeId(6);
    pub const U32: TypeId = TypeId(7);
    pub const U64: TypeId = TypeId(8);
    pub const DOUBLE: TypeId = TypeId(9);
    pub const STRING: TypeId = TypeId(10);
    pub const BOOL: TypeId = TypeId(11);
    pub const VOID: TypeId = TypeId(12);

    // ── builtin aliases ───────────────────────────────────────────────
    pub const INT: TypeId = TypeId(13);
    pub const F64: TypeId = TypeId(14);
    pub const USIZE: TypeId = TypeId(15);
    pub const NINT: TypeId = TypeId(16);
    pub const UINT: TypeId = TypeId(17);

    /// The eight sized integer types, signed first.
    pub const INTEGERS: [TypeId; 8] = [
        TypeId::I8,
        TypeId::I16,
        TypeId::I32,
        TypeId::I64,
        TypeId::U8,
        TypeId::U16,
        TypeId::U32,
        TypeId::U64,
    ];

    pub(crate) fn from_index(index: usize) -> Self {
        TypeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this id names one of the process-wide descriptors.
    pub fn is_global(self) -> bool {
        self.index() < GLOBAL_TYPE_COUNT
    }
}

/// Number of reserved process-wide ids. Module-local ids start here.
pub const GLOBAL_TYPE_COUNT: usize = 18;

/// The scalar types built into the language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Double,
    String,
    Bool,
    Void,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::Double => "double",
            Primitive::String => "string",
            Primitive::Bool => "bool",
            Primitive::Void => "void",
        }
    }

    pub fn is_integer(self) -> bool {
        self.bit_width().is_some()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64
        )
    }

    /// Width in bits for integer types, `None` for everything else.
    pub fn bit_width(self) -> Option<u32> {
        match self {
            Primitive::I8 | Primitive::U8 => Some(8),
            Primitive::I16 | Primitive::U16 => Some(16),
            Primitive::I32 | Primitive::U32 => Some(32),
            Primitive::I64 | Primitive::U64 => Some(64),
            _ => None,
        }
    }
}

/// A field of a record type.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    /// Fixed extent when the field is a fixed-size array.
    pub array_size: Option<u32>,
    /// Default value expression, only present on declared records.
    pub default: Option<Expr>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Field {
            name: name.into(),
            ty,
            array_size: None,
            default: None,
        }
    }
}

/// A record (struct or object literal) type.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordType {
    pub fields: Vec<Field>,
    /// `true` for records introduced by a declaration. Declared records are
    /// looked up by name and never structurally interned.
    pub declared: bool,
}

impl RecordType {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A declared parameter of a function.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    /// Declared type; `None` means the parameter is generic.
    pub hint: Option<TypeId>,
}

/// A function type: the signature, the body template cloned for every
/// specialization, and the specializations created so far.
#[derive(Clone, Debug)]
pub struct FunctionType {
    pub params: Vec<Param>,
    pub return_hint: Option<TypeId>,
    pub variadic: bool,
    /// Every parameter and the return type are declared, or the function is
    /// external. Such functions get exactly one specialization, eagerly.
    pub fully_typed: bool,
    /// The original body; `None` for externally declared functions.
    pub template: Option<Block>,
    /// Scope the function was declared in. Specialization scopes hang off it.
    pub scope: ScopeId,
    pub specializations: Vec<Specialization>,
}

impl FunctionType {
    pub fn is_external(&self) -> bool {
        self.template.is_none()
    }
}

/// One concrete instantiation of a function.
#[derive(Clone, Debug)]
pub struct Specialization {
    pub name: String,
    pub params: Vec<TypeId>,
    /// `TypeId::UNKNOWN` until the body has been inferred.
    pub return_type: TypeId,
    pub body: Option<SpecializedBody>,
}

/// A cloned, fully inferred function body and the scope binding its
/// parameters. The scope outlives the body: both live until the check
/// result is dropped.
#[derive(Clone, Debug)]
pub struct SpecializedBody {
    pub block: Block,
    pub scope: ScopeId,
}

/// Address of a specialization: the function type plus its position in the
/// append-only specialization list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SpecId {
    pub function: TypeId,
    pub index: u32,
}

/// The shape of a type.
#[derive(Clone, Debug)]
pub enum TypeKind {
    Unknown,
    Primitive(Primitive),
    Record(RecordType),
    Array(TypeId),
    Function(FunctionType),
    Ref { target: TypeId, mutable: bool },
    Alias(TypeId),
}

/// A named type descriptor.
#[derive(Clone, Debug)]
pub struct TypeDesc {
    pub name: String,
    pub kind: TypeKind,
}

impl TypeDesc {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        TypeDesc {
            name: name.into(),
            kind,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordType> {
        match &self.kind {
            TypeKind::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match &self.kind {
            TypeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.as_primitive().is_some_and(Primitive::is_integer)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ── process-wide primitives ─────────────────────────────────────────────

static PRIMITIVES: OnceLock<Vec<TypeDesc>> = OnceLock::new();

/// The process-wide descriptors, indexed by [`TypeId`]. Built on first use.
pub fn global_types() -> &'static [TypeDesc] {
    PRIMITIVES.get_or_init(build_global_types)
}

fn build_global_types() -> Vec<TypeDesc> {
    let prim = |p: Primitive| TypeDesc::new(p.name(), TypeKind::Primitive(p));
    let alias = |name: &str, target: TypeId| TypeDesc::new(name, TypeKind::Alias(target));

    let (usize_target, nint_target) = if cfg!(target_pointer_width = "64") {
        (TypeId::U64, TypeId::I64)
    } else {
        (TypeId::U32, TypeId::I32)
    };

    let types = vec![
        TypeDesc::new("unknown", TypeKind::Unknown),
        prim(Primitive::I8),
        prim(Primitive::I16),
        prim(Primitive::I32),
        prim(Primitive::I64),
        prim(Primitive::U8),
        prim(Primitive::U16),
        prim(Primitive::U32),
        prim(Primitive::U64),
        prim(Primitive::Double),
        prim(Primitive::String),
        prim(Primitive::Bool),
        prim(Primitive::Void),
        alias("int", TypeId::I32),
        alias("f64", TypeId::DOUBLE),
        alias("usize", usize_target),
        alias("nint", nint_target),
        alias("uint", usize_target),
    ];
    debug_assert_eq!(types.len(), GLOBAL_TYPE_COUNT);
    types
}

/// The id of the global type named `name`, aliases included.
pub fn global_type_by_name(name: &str) -> Option<TypeId> {
    global_types()
        .iter()
        .position(|t| t.name == name)
        .map(TypeId::from_index)
}
