//! The syntax tree the checker consumes and annotates.
//!
//! Parsing happens elsewhere; this crate only needs the shapes. Every
//! [`Expr`] carries a `ty` slot that starts as [`TypeId::UNKNOWN`] and is
//! filled in by inference. Calls and operators get their resolved
//! specialization or trait impl recorded in place so the backend never has
//! to redo a lookup.

use jsasta_common::Span;

use crate::env::ScopeId;
use crate::traits::ImplId;
use crate::ty::{SpecId, TypeId};

/// A type annotation as written in source.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    /// `i32`, `Point`, `usize`.
    Named(String),
    /// `T[]`.
    Array(Box<TypeExpr>),
    /// `ref<T>`.
    Ref { target: Box<TypeExpr>, mutable: bool },
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }

    pub fn array(elem: TypeExpr) -> Self {
        TypeExpr::Array(Box::new(elem))
    }

    pub fn reference(target: TypeExpr) -> Self {
        TypeExpr::Ref {
            target: Box::new(target),
            mutable: true,
        }
    }
}

/// A whole module: its top-level statements.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub items: Vec<Stmt>,
}

impl Module {
    pub fn new(items: Vec<Stmt>) -> Self {
        Module { items }
    }
}

/// A braced statement list. `scope` is assigned the first time the block is
/// walked and reused on every later walk.
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub scope: Option<ScopeId>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Block { stmts, scope: None }
    }

    /// Deep copy with every scope slot cleared, so the copy can be bound to
    /// fresh scopes.
    pub fn fresh_copy(&self) -> Block {
        let mut block = self.clone();
        block.clear_scopes();
        block
    }

    fn clear_scopes(&mut self) {
        self.scope = None;
        for stmt in &mut self.stmts {
            stmt.clear_scopes();
        }
    }
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Var(VarDecl),
    Fn(FnDecl),
    Struct(StructDecl),
    Return(Option<Expr>),
    Break,
    Continue,
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    For(ForLoop),
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Expr(Expr),
    Block(Block),
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            kind,
            span: Span::DUMMY,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn var(decl: VarDecl) -> Self {
        Stmt::new(StmtKind::Var(decl))
    }

    pub fn func(decl: FnDecl) -> Self {
        Stmt::new(StmtKind::Fn(decl))
    }

    pub fn structure(decl: StructDecl) -> Self {
        Stmt::new(StmtKind::Struct(decl))
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::new(StmtKind::Return(value))
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::new(StmtKind::Expr(expr))
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Stmt::new(StmtKind::Block(Block::new(stmts)))
    }

    pub fn if_else(cond: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Self {
        Stmt::new(StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn while_loop(cond: Expr, body: Stmt) -> Self {
        Stmt::new(StmtKind::While {
            cond,
            body: Box::new(body),
        })
    }

    pub fn for_loop(
        init: Option<Stmt>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Stmt,
    ) -> Self {
        Stmt::new(StmtKind::For(ForLoop {
            init: init.map(Box::new),
            cond,
            update,
            body: Box::new(body),
            scope: None,
        }))
    }

    fn clear_scopes(&mut self) {
        match &mut self.kind {
            StmtKind::Block(block) => block.clear_scopes(),
            StmtKind::For(f) => {
                f.scope = None;
                if let Some(init) = &mut f.init {
                    init.clear_scopes();
                }
                f.body.clear_scopes();
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.clear_scopes();
                if let Some(e) = else_branch {
                    e.clear_scopes();
                }
            }
            StmtKind::While { body, .. } => body.clear_scopes(),
            StmtKind::Fn(decl) => {
                if let Some(body) = &mut decl.body {
                    body.clear_scopes();
                }
            }
            _ => {}
        }
    }
}

/// `let`/`const` declaration.
#[derive(Clone, Debug)]
pub struct VarDecl {
    pub name: String,
    pub is_const: bool,
    pub hint: Option<TypeExpr>,
    pub init: Option<Expr>,
    /// Fixed array extent as written, e.g. the `N * 2` in `let a: i32[N * 2]`.
    pub array_size_expr: Option<Expr>,
    /// Evaluated extent, filled in by inference.
    pub array_size: Option<u32>,
    /// The variable's resolved type.
    pub ty: TypeId,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, init: Option<Expr>) -> Self {
        VarDecl {
            name: name.into(),
            is_const: false,
            hint: None,
            init,
            array_size_expr: None,
            array_size: None,
            ty: TypeId::UNKNOWN,
        }
    }

    pub fn constant(name: impl Into<String>, init: Expr) -> Self {
        VarDecl {
            is_const: true,
            ..VarDecl::new(name, Some(init))
        }
    }

    pub fn hint(mut self, hint: TypeExpr) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn sized(mut self, size: Expr) -> Self {
        self.array_size_expr = Some(size);
        self
    }
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: String,
    pub hint: Option<TypeExpr>,
}

/// A function declaration. A function whose body is `None` is external.
#[derive(Clone, Debug)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub return_hint: Option<TypeExpr>,
    pub body: Option<Block>,
    pub variadic: bool,
}

impl FnDecl {
    pub fn new(name: impl Into<String>) -> Self {
        FnDecl {
            name: name.into(),
            params: Vec::new(),
            return_hint: None,
            body: None,
            variadic: false,
        }
    }

    pub fn param(mut self, name: impl Into<String>, hint: Option<TypeExpr>) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            hint,
        });
        self
    }

    pub fn returns(mut self, hint: TypeExpr) -> Self {
        self.return_hint = Some(hint);
        self
    }

    pub fn body(mut self, stmts: Vec<Stmt>) -> Self {
        self.body = Some(Block::new(stmts));
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: String,
    pub hint: TypeExpr,
    pub default: Option<Expr>,
    pub array_size_expr: Option<Expr>,
    pub array_size: Option<u32>,
}

/// A named record declaration with its methods. Methods are registered as
/// ordinary functions named `Struct.method`.
#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FnDecl>,
}

impl StructDecl {
    pub fn new(name: impl Into<String>) -> Self {
        StructDecl {
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, hint: TypeExpr, default: Option<Expr>) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            hint,
            default,
            array_size_expr: None,
            array_size: None,
        });
        self
    }

    pub fn sized_field(mut self, name: impl Into<String>, elem: TypeExpr, size: Expr) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            hint: TypeExpr::array(elem),
            default: None,
            array_size_expr: Some(size),
            array_size: None,
        });
        self
    }

    pub fn method(mut self, decl: FnDecl) -> Self {
        self.methods.push(decl);
        self
    }
}

#[derive(Clone, Debug)]
pub struct ForLoop {
    pub init: Option<Box<Stmt>>,
    pub cond: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Stmt>,
    pub scope: Option<ScopeId>,
}

// ── expressions ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Inferred type; [`TypeId::UNKNOWN`] until inference reaches the node.
    pub ty: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Ref,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOp {
    Inc,
    Dec,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectField {
    pub key: String,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        /// Impl chosen for the operator, `None` for built-in `&&`, `||` and
        /// string concatenation.
        impl_id: Option<ImplId>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        target: Option<SpecId>,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        is_static: bool,
        target: Option<SpecId>,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
    CompoundAssign {
        op: String,
        target: Box<Expr>,
        value: Box<Expr>,
        impl_id: Option<ImplId>,
    },
    Member {
        object: Box<Expr>,
        field: String,
        field_index: Option<usize>,
    },
    MemberAssign {
        object: Box<Expr>,
        field: String,
        value: Box<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        impl_id: Option<ImplId>,
    },
    IndexAssign {
        object: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
        impl_id: Option<ImplId>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<ObjectField>),
    Prefix {
        op: StepOp,
        target: Box<Expr>,
    },
    Postfix {
        op: StepOp,
        target: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            kind,
            span: Span::DUMMY,
            ty: TypeId::UNKNOWN,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn int(value: i64) -> Self {
        Expr::new(ExprKind::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::new(ExprKind::Float(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::new(ExprKind::Str(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Expr::new(ExprKind::Bool(value))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::Ident(name.into()))
    }

    pub fn binary(op: impl Into<String>, lhs: Expr, rhs: Expr) -> Self {
        Expr::new(ExprKind::Binary {
            op: op.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            impl_id: None,
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Call {
            callee: Box::new(Expr::ident(callee)),
            args,
            target: None,
        })
    }

    pub fn method_call(object: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::MethodCall {
            object: Box::new(object),
            method: method.into(),
            args,
            is_static: false,
            target: None,
        })
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Expr::new(ExprKind::Assign {
            name: name.into(),
            value: Box::new(value),
        })
    }

    pub fn compound_assign(op: impl Into<String>, target: Expr, value: Expr) -> Self {
        Expr::new(ExprKind::CompoundAssign {
            op: op.into(),
            target: Box::new(target),
            value: Box::new(value),
            impl_id: None,
        })
    }

    pub fn member(object: Expr, field: impl Into<String>) -> Self {
        Expr::new(ExprKind::Member {
            object: Box::new(object),
            field: field.into(),
            field_index: None,
        })
    }

    pub fn member_assign(object: Expr, field: impl Into<String>, value: Expr) -> Self {
        Expr::new(ExprKind::MemberAssign {
            object: Box::new(object),
            field: field.into(),
            value: Box::new(value),
        })
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Expr::new(ExprKind::Index {
            object: Box::new(object),
            index: Box::new(index),
            impl_id: None,
        })
    }

    pub fn index_assign(object: Expr, index: Expr, value: Expr) -> Self {
        Expr::new(ExprKind::IndexAssign {
            object: Box::new(object),
            index: Box::new(index),
            value: Box::new(value),
            impl_id: None,
        })
    }

    pub fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::new(ExprKind::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    pub fn array(elems: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Array(elems))
    }

    pub fn object(fields: Vec<(&str, Expr)>) -> Self {
        Expr::new(ExprKind::Object(
            fields
                .into_iter()
                .map(|(key, value)| ObjectField {
                    key: key.to_string(),
                    value,
                })
                .collect(),
        ))
    }

    pub fn postfix(op: StepOp, target: Expr) -> Self {
        Expr::new(ExprKind::Postfix {
            op,
            target: Box::new(target),
        })
    }

    pub fn prefix(op: StepOp, target: Expr) -> Self {
        Expr::new(ExprKind::Prefix {
            op,
            target: Box::new(target),
        })
    }

    /// Call `f` on this expression and then on every expression nested in
    /// it, outermost first.
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        match &self.kind {
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Ident(_) => {}
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            ExprKind::Unary { operand, .. } => operand.visit(f),
            ExprKind::Call { callee, args, .. } => {
                callee.visit(f);
                args.iter().for_each(|a| a.visit(f));
            }
            ExprKind::MethodCall { object, args, .. } => {
                object.visit(f);
                args.iter().for_each(|a| a.visit(f));
            }
            ExprKind::Assign { value, .. } => value.visit(f),
            ExprKind::CompoundAssign { target, value, .. } => {
                target.visit(f);
                value.visit(f);
            }
            ExprKind::Member { object, .. } => object.visit(f),
            ExprKind::MemberAssign { object, value, .. } => {
                object.visit(f);
                value.visit(f);
            }
            ExprKind::Index { object, index, .. } => {
                object.visit(f);
                index.visit(f);
            }
            ExprKind::IndexAssign {
                object,
                index,
                value,
                ..
            } => {
                object.visit(f);
                index.visit(f);
                value.visit(f);
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.visit(f);
                then_expr.visit(f);
                else_expr.visit(f);
            }
            ExprKind::Array(elems) => elems.iter().for_each(|e| e.visit(f)),
            ExprKind::Object(fields) => fields.iter().for_each(|field| field.value.visit(f)),
            ExprKind::Prefix { target, .. } | ExprKind::Postfix { target, .. } => target.visit(f),
        }
    }

    /// Whether a call or method call appears anywhere inside.
    pub fn contains_call(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            found |= matches!(e.kind, ExprKind::Call { .. } | ExprKind::MethodCall { .. });
        });
        found
    }
}
