//! Lexical scopes.
//!
//! Scopes form a tree stored in an arena. Each scope maps names to
//! [`Symbol`]s and points at its parent; lookups walk outward until the root.
//! Scopes are never freed during a check, so an AST node can remember the
//! scope it was walked in and the next walk finds the same bindings.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ast::Expr;
use crate::ty::TypeId;

/// Handle to a scope in a [`SymbolTables`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(u32);

impl ScopeId {
    pub(crate) fn from_index(index: usize) -> Self {
        ScopeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a name is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    /// A declared function; the payload is its function type.
    Function(TypeId),
}

/// A named binding.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub is_const: bool,
    pub ty: TypeId,
    pub kind: SymbolKind,
    /// Initializer of a `const`, kept so constant expressions can be folded
    /// through it.
    pub const_init: Option<Expr>,
    /// Fixed extent of an array variable.
    pub array_size: Option<u32>,
}

impl Symbol {
    pub fn variable(name: impl Into<String>, ty: TypeId) -> Self {
        Symbol {
            name: name.into(),
            is_const: false,
            ty,
            kind: SymbolKind::Variable,
            const_init: None,
            array_size: None,
        }
    }

    pub fn constant(name: impl Into<String>, ty: TypeId, init: Option<Expr>) -> Self {
        Symbol {
            is_const: true,
            const_init: init,
            ..Symbol::variable(name, ty)
        }
    }

    pub fn parameter(name: impl Into<String>, ty: TypeId) -> Self {
        Symbol {
            kind: SymbolKind::Parameter,
            ..Symbol::variable(name, ty)
        }
    }

    pub fn function(name: impl Into<String>, fn_type: TypeId) -> Self {
        Symbol {
            kind: SymbolKind::Function(fn_type),
            ..Symbol::variable(name, fn_type)
        }
    }

    /// The function type this symbol refers to, directly or through a
    /// variable that was initialized with a function.
    pub fn function_type(&self) -> Option<TypeId> {
        match self.kind {
            SymbolKind::Function(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    symbols: FxHashMap<String, Symbol>,
}

/// Arena of every scope created during a check. Index 0 is the module scope.
#[derive(Debug)]
pub struct SymbolTables {
    scopes: Vec<Scope>,
}

impl SymbolTables {
    pub fn new() -> Self {
        SymbolTables {
            scopes: vec![Scope::default()],
        }
    }

    /// The module-level scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Create an empty scope whose lookups fall back to `parent`.
    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId::from_index(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            symbols: FxHashMap::default(),
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.index()].parent
    }

    /// Bind a symbol in `scope`, replacing any earlier binding of the same
    /// name in that scope.
    pub fn insert(&mut self, scope: ScopeId, symbol: Symbol) {
        self.scopes[scope.index()]
            .symbols
            .insert(symbol.name.clone(), symbol);
    }

    /// Look a name up in `scope` and then its ancestors.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.lookup_with_scope(scope, name).map(|(_, sym)| sym)
    }

    /// Like [`lookup`](Self::lookup), but also returns the scope that holds
    /// the binding.
    pub fn lookup_with_scope(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &Symbol)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = &self.scopes[id.index()];
            if let Some(sym) = s.symbols.get(name) {
                return Some((id, sym));
            }
            current = s.parent;
        }
        None
    }

    /// Look a name up in `scope` only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.scopes[scope.index()].symbols.get(name)
    }

    pub fn lookup_local_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut Symbol> {
        self.scopes[scope.index()].symbols.get_mut(name)
    }

    /// Number of scopes allocated so far.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl Default for SymbolTables {
    fn default() -> Self {
        Self::new()
    }
}
