//! Multi-pass type inference over one module.
//!
//! Pass order:
//!
//! 0. top-level consts and record declarations, retried until no progress
//!    so that array extents may refer to consts declared further down
//! 2. every top-level variable pre-declared with an Unknown placeholder
//! 3. function signatures, plus the single eager specialization of every
//!    fully typed function
//! 4. a bottom-up walk assigning a type to every expression
//! 5-7. specialization discovery (see [`crate::specialize`])
//!
//! The walk never touches a function's template body. Bodies are only
//! inferred as specialized clones, each with its parameters bound to
//! concrete types. Every scope-introducing node remembers the scope it got
//! on its first walk, so repeated walks refine types in place without
//! allocating new scopes.

use jsasta_common::Span;
use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use crate::ast::{
    Block, Expr, ExprKind, FnDecl, Module, ObjectField, StepOp, Stmt, StmtKind, StructDecl,
    TypeExpr, UnaryOp, VarDecl,
};
use crate::builtins::{ensure_cstr_impl, ensure_index_impl, ensure_length_impl, ensure_ref_index_impl};
use crate::config::InferConfig;
use crate::const_eval::{eval_const_int, ConstEvalError, EvalStatus};
use crate::env::{ScopeId, Symbol, SymbolTables};
use crate::error::TypeError;
use crate::ops;
use crate::registry::TypeRegistry;
use crate::specialize;
use crate::traits::{ImplId, TraitId, TraitRegistry};
use crate::ty::{Field, FunctionType, Param, RecordType, SpecId, TypeId};

/// Mutable state shared by every pass.
pub(crate) struct InferCtx {
    pub(crate) config: InferConfig,
    pub(crate) types: TypeRegistry,
    pub(crate) traits: TraitRegistry,
    pub(crate) scopes: SymbolTables,
    pub(crate) errors: Vec<TypeError>,
    /// (code, span, message) of every error recorded so far. Passes revisit
    /// the same nodes, so without this each walk would repeat its errors.
    reported: FxHashSet<(&'static str, Span, String)>,
    /// Specializations whose materialization was deferred to the next
    /// discovery round.
    pub(crate) pending: Vec<SpecId>,
    /// Functions whose specializations are being materialized, innermost
    /// last.
    pub(crate) active: Vec<TypeId>,
    /// Discovery iterations run so far.
    pub(crate) iterations: usize,
}

impl InferCtx {
    pub(crate) fn new(config: &InferConfig) -> Self {
        InferCtx {
            types: TypeRegistry::with_module_prefix(config.module_prefix.clone()),
            traits: TraitRegistry::new(),
            scopes: SymbolTables::new(),
            errors: Vec::new(),
            reported: FxHashSet::default(),
            pending: Vec::new(),
            active: Vec::new(),
            iterations: 0,
            config: config.clone(),
        }
    }

    /// Record an error unless the identical error was already recorded.
    pub(crate) fn report(&mut self, error: TypeError) {
        let key = (error.code(), error.span(), error.to_string());
        if self.reported.insert(key) {
            trace!(code = error.code(), message = %error, "type error");
            self.errors.push(error);
        }
    }

    fn type_name(&self, id: TypeId) -> String {
        self.types.name(id).to_string()
    }

    fn is_unknown(&self, id: TypeId) -> bool {
        self.types.is_unknown(id)
    }

    /// `i32` flowing into a `double` slot, the one implicit widening.
    pub(crate) fn widens_to_double(&self, expected: TypeId, found: TypeId) -> bool {
        self.types.is_double(expected) && self.types.resolve_alias(found) == TypeId::I32
    }

    /// Record fields accept any integer for an integer field as well as the
    /// double widening.
    fn fits_field(&self, expected: TypeId, found: TypeId) -> bool {
        self.is_unknown(found)
            || self.types.structurally_equal(expected, found)
            || (self.types.is_double(expected) && self.types.is_integer(found))
            || (self.types.is_integer(expected) && self.types.is_integer(found))
    }

    /// Whether an argument fits a declared parameter type. Strings are
    /// accepted for `ref<u8>` through `ToCStr`.
    fn fits_param(&mut self, param: TypeId, arg: TypeId) -> bool {
        if self.is_unknown(arg)
            || self.types.structurally_equal(param, arg)
            || self.widens_to_double(param, arg)
        {
            return true;
        }
        if self.types.resolve_alias(arg) != TypeId::STRING {
            return false;
        }
        ensure_cstr_impl(&mut self.traits, &mut self.types, TypeId::STRING);
        self.traits
            .get_associated_type(&self.types, TraitId::TO_CSTR, TypeId::STRING, &[], "Output")
            .is_some_and(|out| self.types.structurally_equal(out, param))
    }
}

/// Which walk is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Walk {
    /// Assign types. Calls pick up specializations that already exist.
    Infer,
    /// Assign types and request a specialization for every call site whose
    /// argument types are all concrete.
    Discover,
}

/// Run every pass over `module`.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn infer_module(ctx: &mut InferCtx, module: &mut Module) {
    let root = ctx.scopes.root();
    collect_consts_and_records(ctx, &mut module.items, root);
    predeclare_globals(ctx, &module.items, root);
    collect_function_signatures(ctx, &module.items, root);
    walk_module(ctx, module, Walk::Infer);
    specialize::discover(ctx, module);
}

pub(crate) fn walk_module(ctx: &mut InferCtx, module: &mut Module, walk: Walk) {
    let root = ctx.scopes.root();
    for item in &mut module.items {
        infer_stmt(ctx, item, root, walk);
    }
}

// ── Pass 0: consts and records ──────────────────────────────────────────

#[tracing::instrument(level = "debug", skip_all)]
fn collect_consts_and_records(ctx: &mut InferCtx, items: &mut [Stmt], scope: ScopeId) {
    let mut done: Vec<bool> = items
        .iter()
        .map(|item| match &item.kind {
            StmtKind::Var(decl) => !decl.is_const,
            StmtKind::Struct(_) => false,
            _ => true,
        })
        .collect();

    let limit = ctx.config.max_iterations;
    let mut iteration = 0;
    let mut progress = true;
    while progress && iteration < limit {
        progress = false;
        iteration += 1;

        let waiting_records: Vec<String> = items
            .iter()
            .zip(&done)
            .filter_map(|(item, &d)| match &item.kind {
                StmtKind::Struct(decl) if !d => Some(decl.name.clone()),
                _ => None,
            })
            .collect();

        for (item, done) in items.iter_mut().zip(done.iter_mut()) {
            if *done {
                continue;
            }
            let span = item.span;
            let ready = match &mut item.kind {
                StmtKind::Var(decl) => collect_const(ctx, decl, span, scope),
                StmtKind::Struct(decl) => {
                    let ready = collect_record(ctx, decl, span, scope, &waiting_records, false);
                    if ready {
                        register_methods(ctx, decl, span, scope);
                    }
                    ready
                }
                _ => true,
            };
            if ready {
                *done = true;
                progress = true;
            }
        }
    }

    if progress && done.iter().any(|d| !d) {
        warn!(limit, "const and record collection hit the iteration limit");
        ctx.report(TypeError::IterationLimit {
            pass: "Const and record collection".to_string(),
            limit,
        });
    }

    for (item, done) in items.iter_mut().zip(&done) {
        if *done {
            continue;
        }
        let span = item.span;
        match &mut item.kind {
            StmtKind::Var(decl) => {
                ctx.report(TypeError::UnresolvedConst {
                    name: decl.name.clone(),
                    span,
                });
                decl.array_size = Some(0);
            }
            StmtKind::Struct(decl) => {
                collect_record(ctx, decl, span, scope, &[], true);
                register_methods(ctx, decl, span, scope);
            }
            _ => {}
        }
    }
    debug!(iterations = iteration, "consts and records collected");
}

/// Evaluate an array extent expression to a `u32`.
fn eval_extent(ctx: &InferCtx, expr: &Expr, scope: ScopeId) -> Result<u32, ConstEvalError> {
    let value = eval_const_int(expr, scope, &ctx.scopes, ctx.config.max_const_depth)?;
    u32::try_from(value).map_err(|_| ConstEvalError {
        status: EvalStatus::Error,
        message: format!("Array size {value} is too large"),
        span: expr.span,
    })
}

/// Bind a top-level const once its extent and initializer only refer to
/// names already bound. Returns `false` while either still waits.
fn collect_const(ctx: &mut InferCtx, decl: &mut VarDecl, span: Span, scope: ScopeId) -> bool {
    if decl.array_size.is_none() {
        if let Some(size) = &decl.array_size_expr {
            match eval_extent(ctx, size, scope) {
                Ok(n) => decl.array_size = Some(n),
                Err(e) if e.is_waiting() => return false,
                Err(e) => {
                    ctx.report(TypeError::ConstEval {
                        message: e.message,
                        help: None,
                        span: e.span,
                    });
                    decl.array_size = Some(0);
                    return true;
                }
            }
        }
    }

    let ty = match (&mut decl.init, &decl.hint) {
        (Some(init), _) => {
            // Calls have to wait for the signature pass; the main walk
            // types them.
            if !init.contains_call() {
                if mentions_unbound(ctx, init, scope) {
                    return false;
                }
                infer_expr(ctx, init, scope, Walk::Infer);
            }
            init.ty
        }
        (None, Some(hint)) => resolve_type_expr(ctx, hint, span),
        (None, None) => TypeId::UNKNOWN,
    };
    let mut symbol = Symbol::constant(&decl.name, ty, decl.init.clone());
    symbol.array_size = decl.array_size;
    ctx.scopes.insert(scope, symbol);
    trace!(name = %decl.name, ty = %ctx.types.name(ty), "collected const");
    true
}

/// Whether `expr` names anything not yet bound in `scope`.
fn mentions_unbound(ctx: &InferCtx, expr: &Expr, scope: ScopeId) -> bool {
    let mut unbound = false;
    expr.visit(&mut |e| {
        if let ExprKind::Ident(name) = &e.kind {
            unbound |= ctx.scopes.lookup(scope, name).is_none();
        }
    });
    unbound
}

/// The type name a hint is built around.
fn base_type_name(hint: &TypeExpr) -> &str {
    match hint {
        TypeExpr::Named(name) => name,
        TypeExpr::Array(elem) => base_type_name(elem),
        TypeExpr::Ref { target, .. } => base_type_name(target),
    }
}

/// Register a declared record. Without `force`, a record whose field
/// extents wait on undeclared consts, or whose fields name a record in
/// `waiting_records`, is left for a later round and `false` comes back.
fn collect_record(
    ctx: &mut InferCtx,
    decl: &mut StructDecl,
    span: Span,
    scope: ScopeId,
    waiting_records: &[String],
    force: bool,
) -> bool {
    for field in &mut decl.fields {
        if field.array_size.is_some() {
            continue;
        }
        let Some(size) = &field.array_size_expr else {
            continue;
        };
        match eval_extent(ctx, size, scope) {
            Ok(n) => field.array_size = Some(n),
            Err(e) if e.is_waiting() && !force => return false,
            Err(e) => {
                ctx.report(TypeError::ConstEval {
                    message: e.message,
                    help: Some(format!(
                        "field '{}' of '{}' needs a positive compile-time extent",
                        field.name, decl.name
                    )),
                    span: e.span,
                });
                field.array_size = Some(0);
            }
        }
    }
    if !force {
        let waits = decl.fields.iter().any(|f| {
            let base = base_type_name(&f.hint);
            base != decl.name && waiting_records.iter().any(|r| r == base)
        });
        if waits {
            return false;
        }
    }

    let mut fields = Vec::with_capacity(decl.fields.len());
    for f in &mut decl.fields {
        let ty = resolve_type_expr(ctx, &f.hint, span);
        if let Some(default) = &mut f.default {
            expect_type(ctx, default, ty);
            if !default.contains_call() {
                infer_expr(ctx, default, scope, Walk::Infer);
            }
            let found = default.ty;
            if !ctx.is_unknown(ty)
                && !ctx.is_unknown(found)
                && !ctx.types.structurally_equal(ty, found)
                && !ctx.widens_to_double(ty, found)
            {
                ctx.report(TypeError::DefaultValueMismatch {
                    record: decl.name.clone(),
                    field: f.name.clone(),
                    expected: ctx.type_name(ty),
                    found: ctx.type_name(found),
                    span: default.span,
                });
            }
        }
        fields.push(Field {
            name: f.name.clone(),
            ty,
            array_size: f.array_size,
            default: f.default.clone(),
        });
    }
    let id = ctx.types.declare_record(
        &decl.name,
        RecordType {
            fields,
            declared: true,
        },
    );
    debug!(record = %decl.name, id = id.index(), "collected record");
    true
}

// ── Pass 2: global pre-declaration ──────────────────────────────────────

#[tracing::instrument(level = "debug", skip_all)]
fn predeclare_globals(ctx: &mut InferCtx, items: &[Stmt], scope: ScopeId) {
    for item in items {
        if let StmtKind::Var(decl) = &item.kind {
            if ctx.scopes.lookup_local(scope, &decl.name).is_none() {
                ctx.scopes
                    .insert(scope, Symbol::variable(&decl.name, TypeId::UNKNOWN));
            }
        }
    }
}

// ── Pass 3: function signatures ─────────────────────────────────────────

#[tracing::instrument(level = "debug", skip_all)]
fn collect_function_signatures(ctx: &mut InferCtx, items: &[Stmt], scope: ScopeId) {
    let mut eager = Vec::new();
    for item in items {
        if let StmtKind::Fn(decl) = &item.kind {
            eager.extend(register_function(ctx, decl, decl.name.clone(), scope, item.span));
        }
    }
    // Record methods were registered with their records; pick up their
    // eager bodies too.
    for item in items {
        if let StmtKind::Struct(decl) = &item.kind {
            for method in &decl.methods {
                let name = method_name(&decl.name, &method.name);
                if let Some(fid) = ctx.types.find_function(&name) {
                    eager.extend(eager_body(ctx, fid));
                }
            }
        }
    }
    // Bodies may call functions declared below them, so they are only
    // inferred once every signature is known.
    for id in eager {
        specialize::materialize(ctx, id);
    }
}

fn method_name(record: &str, method: &str) -> String {
    format!("{record}.{method}")
}

/// Register every method of a record as a free function `Record.method`.
fn register_methods(ctx: &mut InferCtx, decl: &StructDecl, span: Span, scope: ScopeId) {
    for method in &decl.methods {
        register_function(ctx, method, method_name(&decl.name, &method.name), scope, span);
    }
}

/// Register a function under `name` and bind it in `scope`. A fully typed
/// function gets its single specialization right away; the id comes back
/// when that specialization still needs its body inferred.
fn register_function(
    ctx: &mut InferCtx,
    decl: &FnDecl,
    name: String,
    scope: ScopeId,
    span: Span,
) -> Option<SpecId> {
    if let Some(existing) = ctx.types.find_function(&name) {
        ctx.scopes.insert(scope, Symbol::function(&name, existing));
        return None;
    }

    let mut params = Vec::with_capacity(decl.params.len());
    for p in &decl.params {
        let hint = match &p.hint {
            Some(h) => Some(resolve_type_expr(ctx, h, span)).filter(|&t| !ctx.is_unknown(t)),
            None => None,
        };
        params.push(Param {
            name: p.name.clone(),
            hint,
        });
    }
    let return_hint = match &decl.return_hint {
        Some(h) => Some(resolve_type_expr(ctx, h, span)).filter(|&t| !ctx.is_unknown(t)),
        None => None,
    };
    let external = decl.body.is_none();
    let fully_typed = external || (return_hint.is_some() && params.iter().all(|p| p.hint.is_some()));
    let param_types: Vec<TypeId> = params
        .iter()
        .map(|p| p.hint.unwrap_or(TypeId::UNKNOWN))
        .collect();

    let fid = ctx.types.declare_function(
        &name,
        FunctionType {
            params,
            return_hint,
            variadic: decl.variadic,
            fully_typed,
            template: decl.body.clone(),
            scope,
            specializations: Vec::new(),
        },
    );
    ctx.scopes.insert(scope, Symbol::function(&name, fid));
    debug!(function = %name, fully_typed, external, "registered function");

    if !fully_typed {
        return None;
    }
    // Eager specializations keep the declared name.
    let id = ctx.types.push_specialization(
        fid,
        name,
        param_types,
        return_hint.unwrap_or(TypeId::VOID),
    )?;
    (!external).then_some(id)
}

/// The eager specialization of `fid`, if it still has no body.
fn eager_body(ctx: &InferCtx, fid: TypeId) -> Option<SpecId> {
    let func = ctx.types.function(fid)?;
    if !func.fully_typed || func.is_external() {
        return None;
    }
    let id = SpecId {
        function: fid,
        index: 0,
    };
    ctx.types
        .specialization(id)
        .filter(|s| s.body.is_none())
        .map(|_| id)
}

/// Resolve a written type. Unknown names report T316 and give Unknown.
fn resolve_type_expr(ctx: &mut InferCtx, hint: &TypeExpr, span: Span) -> TypeId {
    match hint {
        TypeExpr::Named(name) => match ctx.types.find_by_name(name) {
            Some(id) => id,
            None => {
                ctx.report(TypeError::UnknownType {
                    name: name.clone(),
                    span,
                });
                TypeId::UNKNOWN
            }
        },
        TypeExpr::Array(elem) => {
            let elem = resolve_type_expr(ctx, elem, span);
            if ctx.is_unknown(elem) {
                TypeId::UNKNOWN
            } else {
                ctx.types.array_of(elem)
            }
        }
        TypeExpr::Ref { target, mutable } => {
            let target = resolve_type_expr(ctx, target, span);
            if ctx.is_unknown(target) {
                TypeId::UNKNOWN
            } else {
                ctx.types.ref_to(target, *mutable)
            }
        }
    }
}

// ── Pass 4: statements ──────────────────────────────────────────────────

pub(crate) fn infer_block(ctx: &mut InferCtx, block: &mut Block, parent: ScopeId, walk: Walk) {
    let scope = *block.scope.get_or_insert_with(|| ctx.scopes.push(parent));
    for stmt in &mut block.stmts {
        infer_stmt(ctx, stmt, scope, walk);
    }
}

fn infer_stmt(ctx: &mut InferCtx, stmt: &mut Stmt, scope: ScopeId, walk: Walk) {
    let span = stmt.span;
    match &mut stmt.kind {
        StmtKind::Var(decl) => infer_var_decl(ctx, decl, span, scope, walk),
        StmtKind::Fn(decl) => {
            let known = ctx
                .scopes
                .lookup_local(scope, &decl.name)
                .and_then(Symbol::function_type)
                .is_some();
            if !known {
                if let Some(id) = register_function(ctx, decl, decl.name.clone(), scope, span) {
                    specialize::materialize(ctx, id);
                }
            }
        }
        StmtKind::Struct(decl) => {
            if ctx.types.find_by_name(&decl.name).is_none() {
                collect_record(ctx, decl, span, scope, &[], true);
                register_methods(ctx, decl, span, scope);
                for method in &decl.methods {
                    let name = method_name(&decl.name, &method.name);
                    if let Some(id) = ctx.types.find_function(&name).and_then(|f| eager_body(ctx, f)) {
                        specialize::materialize(ctx, id);
                    }
                }
            }
        }
        StmtKind::Return(Some(value)) => infer_expr(ctx, value, scope, walk),
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            infer_expr(ctx, cond, scope, walk);
            infer_stmt(ctx, then_branch, scope, walk);
            if let Some(else_branch) = else_branch {
                infer_stmt(ctx, else_branch, scope, walk);
            }
        }
        StmtKind::While { cond, body } => {
            infer_expr(ctx, cond, scope, walk);
            infer_stmt(ctx, body, scope, walk);
        }
        StmtKind::For(for_loop) => {
            let inner = *for_loop.scope.get_or_insert_with(|| ctx.scopes.push(scope));
            if let Some(init) = &mut for_loop.init {
                infer_stmt(ctx, init, inner, walk);
            }
            if let Some(cond) = &mut for_loop.cond {
                infer_expr(ctx, cond, inner, walk);
            }
            if let Some(update) = &mut for_loop.update {
                infer_expr(ctx, update, inner, walk);
            }
            infer_stmt(ctx, &mut for_loop.body, inner, walk);
        }
        StmtKind::Expr(expr) => infer_expr(ctx, expr, scope, walk),
        StmtKind::Block(block) => infer_block(ctx, block, scope, walk),
    }
}

fn infer_var_decl(ctx: &mut InferCtx, decl: &mut VarDecl, span: Span, scope: ScopeId, walk: Walk) {
    let declared = match &decl.hint {
        Some(hint) => Some(resolve_type_expr(ctx, hint, span)),
        None => None,
    };

    if decl.array_size.is_none() {
        if let Some(size) = &decl.array_size_expr {
            match eval_extent(ctx, size, scope) {
                Ok(n) => decl.array_size = Some(n),
                Err(e) => {
                    ctx.report(TypeError::InvalidArraySize {
                        message: e.message,
                        span: e.span,
                    });
                    decl.array_size = Some(0);
                }
            }
        }
    }

    if let Some(init) = &mut decl.init {
        let named_record = declared.filter(|&t| {
            ctx.types.record(t).is_some_and(|r| r.declared) && matches!(init.kind, ExprKind::Object(_))
        });
        match (named_record, declared) {
            (Some(record), _) => infer_record_literal(ctx, init, record, scope, walk),
            (None, Some(ty)) => {
                expect_type(ctx, init, ty);
                infer_expr(ctx, init, scope, walk);
            }
            (None, None) => infer_expr(ctx, init, scope, walk),
        }
        if let ExprKind::Array(elems) = &init.kind {
            if decl.array_size.is_none() {
                decl.array_size = Some(elems.len() as u32);
            }
        }
    }

    let init_ty = decl.init.as_ref().map_or(TypeId::UNKNOWN, |e| e.ty);
    let ty = match declared {
        Some(declared) if !ctx.is_unknown(declared) => {
            if decl.init.is_some()
                && !ctx.is_unknown(init_ty)
                && !ctx.types.structurally_equal(declared, init_ty)
                && !ctx.widens_to_double(declared, init_ty)
            {
                ctx.report(TypeError::DeclarationMismatch {
                    name: decl.name.clone(),
                    declared: ctx.type_name(declared),
                    found: ctx.type_name(init_ty),
                    span,
                });
            }
            declared
        }
        _ => init_ty,
    };

    // `let g = f;` makes `g(...)` a call of `f`.
    let aliased_fn = decl.init.as_ref().and_then(|init| match &init.kind {
        ExprKind::Ident(name) => ctx.scopes.lookup(scope, name).and_then(Symbol::function_type),
        _ => None,
    });
    let mut symbol = match aliased_fn {
        Some(fid) => Symbol::function(&decl.name, fid),
        None if decl.is_const => Symbol::constant(&decl.name, ty, decl.init.clone()),
        None => Symbol::variable(&decl.name, ty),
    };
    symbol.array_size = decl.array_size;
    ctx.scopes.insert(scope, symbol);
    decl.ty = ty;
}

/// Type a record literal against a declared record: check every provided
/// field, put the fields in declaration order and fill the missing ones
/// from their defaults.
fn infer_record_literal(ctx: &mut InferCtx, expr: &mut Expr, record_id: TypeId, scope: ScopeId, walk: Walk) {
    let Some(record) = ctx.types.record(record_id).cloned() else {
        infer_expr(ctx, expr, scope, walk);
        return;
    };
    let record_name = ctx.type_name(record_id);
    let span = expr.span;
    let ExprKind::Object(fields) = &mut expr.kind else {
        return;
    };

    let mut provided = std::mem::take(fields);
    for f in &mut provided {
        match record.field(&f.key) {
            Some(decl) => {
                expect_type(ctx, &mut f.value, decl.ty);
                infer_expr(ctx, &mut f.value, scope, walk);
                if !ctx.fits_field(decl.ty, f.value.ty) {
                    ctx.report(TypeError::PropertyMismatch {
                        field: f.key.clone(),
                        expected: ctx.type_name(decl.ty),
                        found: ctx.type_name(f.value.ty),
                        span: f.value.span,
                    });
                }
            }
            None => {
                infer_expr(ctx, &mut f.value, scope, walk);
                ctx.report(TypeError::UnknownProperty {
                    field: f.key.clone(),
                    record: record_name.clone(),
                    span: f.value.span,
                });
            }
        }
    }

    let mut ordered = Vec::with_capacity(record.fields.len());
    for decl in &record.fields {
        if let Some(pos) = provided.iter().position(|f| f.key == decl.name) {
            ordered.push(provided.swap_remove(pos));
        } else if let Some(default) = &decl.default {
            ordered.push(ObjectField {
                key: decl.name.clone(),
                value: default.clone(),
            });
        } else {
            ctx.report(TypeError::MissingProperty {
                field: decl.name.clone(),
                record: record_name.clone(),
                span,
            });
        }
    }
    *fields = ordered;
    expr.ty = record_id;
}

/// Push an expected type into literals: integer literals take an integer
/// type, array literals pass the element type on.
fn expect_type(ctx: &InferCtx, expr: &mut Expr, expected: TypeId) {
    let expected = ctx.types.resolve_alias(expected);
    match &mut expr.kind {
        ExprKind::Int(_) if ctx.types.is_integer(expected) => expr.ty = expected,
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => expect_type(ctx, operand, expected),
        ExprKind::Array(elems) => {
            if let Some(elem) = ctx.types.array_element(expected) {
                for e in elems {
                    expect_type(ctx, e, elem);
                }
            }
        }
        _ => {}
    }
}

// ── Pass 4: expressions ─────────────────────────────────────────────────

pub(crate) fn infer_expr(ctx: &mut InferCtx, expr: &mut Expr, scope: ScopeId, walk: Walk) {
    let span = expr.span;
    let current = expr.ty;
    let ty = match &mut expr.kind {
        ExprKind::Int(_) => {
            if ctx.types.is_integer(current) {
                current
            } else {
                TypeId::I32
            }
        }
        ExprKind::Float(_) => TypeId::DOUBLE,
        ExprKind::Str(_) => TypeId::STRING,
        ExprKind::Bool(_) => TypeId::BOOL,
        ExprKind::Ident(name) => match ctx.scopes.lookup(scope, name) {
            Some(symbol) => symbol.ty,
            None => {
                ctx.report(TypeError::UndefinedVariable {
                    name: name.clone(),
                    span,
                });
                TypeId::UNKNOWN
            }
        },
        ExprKind::Binary {
            op,
            lhs,
            rhs,
            impl_id,
        } => {
            infer_expr(ctx, lhs, scope, walk);
            infer_expr(ctx, rhs, scope, walk);
            infer_binary(ctx, op, lhs.ty, rhs.ty, impl_id, span)
        }
        ExprKind::Unary { op, operand } => {
            infer_expr(ctx, operand, scope, walk);
            infer_unary(ctx, *op, operand.ty, span)
        }
        ExprKind::Call {
            callee,
            args,
            target,
        } => infer_call(ctx, callee, args, target, span, scope, walk),
        ExprKind::MethodCall {
            object,
            method,
            args,
            is_static,
            target,
        } => infer_method_call(ctx, object, method, args, is_static, target, span, scope, walk),
        ExprKind::Assign { name, value } => infer_assign(ctx, name, value, span, scope, walk),
        ExprKind::CompoundAssign {
            op,
            target,
            value,
            impl_id,
        } => {
            infer_expr(ctx, target, scope, walk);
            expect_type(ctx, value, target.ty);
            infer_expr(ctx, value, scope, walk);
            infer_compound_assign(ctx, op, target.ty, value.ty, impl_id, span)
        }
        ExprKind::Member {
            object,
            field,
            field_index,
        } => {
            infer_expr(ctx, object, scope, walk);
            infer_member(ctx, object.ty, field, field_index, span)
        }
        ExprKind::MemberAssign {
            object,
            field,
            value,
        } => {
            infer_expr(ctx, object, scope, walk);
            let record = ctx.types.ref_target(object.ty);
            let field_ty = ctx
                .types
                .record(record)
                .and_then(|r| r.field(field.as_str()))
                .map(|f| f.ty);
            if let Some(field_ty) = field_ty {
                expect_type(ctx, value, field_ty);
            }
            infer_expr(ctx, value, scope, walk);
            match field_ty {
                Some(expected) if !ctx.fits_field(expected, value.ty) => {
                    ctx.report(TypeError::AssignmentMismatch {
                        field: field.clone(),
                        expected: ctx.type_name(expected),
                        found: ctx.type_name(value.ty),
                        span,
                    });
                }
                Some(_) => {}
                None if !ctx.is_unknown(record) => {
                    ctx.report(TypeError::UnknownPropertyAccess {
                        field: field.clone(),
                        ty: ctx.type_name(record),
                        span,
                    });
                }
                None => {}
            }
            value.ty
        }
        ExprKind::Index {
            object,
            index,
            impl_id,
        } => {
            infer_expr(ctx, object, scope, walk);
            infer_expr(ctx, index, scope, walk);
            infer_index(ctx, object.ty, index.ty, impl_id, span)
        }
        ExprKind::IndexAssign {
            object,
            index,
            value,
            impl_id,
        } => {
            infer_expr(ctx, object, scope, walk);
            infer_expr(ctx, index, scope, walk);
            let container = ctx.types.ref_target(object.ty);
            if let Some(elem) = ctx.types.array_element(container) {
                expect_type(ctx, value, elem);
            }
            infer_expr(ctx, value, scope, walk);
            infer_index_assign(ctx, container, index.ty, impl_id, span);
            value.ty
        }
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            infer_expr(ctx, cond, scope, walk);
            infer_expr(ctx, then_expr, scope, walk);
            infer_expr(ctx, else_expr, scope, walk);
            ternary_type(ctx, then_expr.ty, else_expr.ty)
        }
        ExprKind::Array(elems) => {
            for e in elems.iter_mut() {
                infer_expr(ctx, e, scope, walk);
            }
            match elems.first() {
                None => ctx.types.array_of(TypeId::I32),
                Some(first) if ctx.is_unknown(first.ty) => TypeId::UNKNOWN,
                Some(first) => ctx.types.array_of(first.ty),
            }
        }
        ExprKind::Object(fields) => {
            for f in fields.iter_mut() {
                infer_expr(ctx, &mut f.value, scope, walk);
            }
            if fields.iter().any(|f| ctx.is_unknown(f.value.ty)) {
                TypeId::UNKNOWN
            } else {
                let fields = fields.iter().map(|f| Field::new(&f.key, f.value.ty)).collect();
                ctx.types.intern_record(RecordType {
                    fields,
                    declared: false,
                })
            }
        }
        ExprKind::Prefix { op, target } | ExprKind::Postfix { op, target } => {
            infer_expr(ctx, target, scope, walk);
            infer_step(ctx, *op, target.ty, span)
        }
    };
    expr.ty = ty;
}

fn infer_binary(
    ctx: &mut InferCtx,
    op: &str,
    lhs: TypeId,
    rhs: TypeId,
    impl_id: &mut Option<ImplId>,
    span: Span,
) -> TypeId {
    if ops::is_logical(op) {
        return TypeId::BOOL;
    }
    let lhs = ctx.types.ref_target(lhs);
    let rhs = ctx.types.ref_target(rhs);
    if ctx.is_unknown(lhs) || ctx.is_unknown(rhs) {
        return TypeId::UNKNOWN;
    }
    if op == "+" && lhs == TypeId::STRING && rhs == TypeId::STRING {
        return TypeId::STRING;
    }
    let found = ops::operator_trait(op)
        .and_then(|(trait_id, _)| ctx.traits.binary_output(&ctx.types, trait_id, lhs, rhs));
    match found {
        Some((id, output)) => {
            *impl_id = Some(id);
            output
        }
        None => {
            ctx.report(TypeError::OperatorNotImplemented {
                op: op.to_string(),
                lhs: ctx.type_name(lhs),
                rhs: Some(ctx.type_name(rhs)),
                span,
            });
            TypeId::UNKNOWN
        }
    }
}

fn infer_unary(ctx: &mut InferCtx, op: UnaryOp, operand: TypeId, span: Span) -> TypeId {
    match op {
        UnaryOp::Not => TypeId::BOOL,
        UnaryOp::Ref => {
            if ctx.is_unknown(operand) {
                TypeId::UNKNOWN
            } else {
                ctx.types.ref_to(operand, true)
            }
        }
        UnaryOp::Neg => {
            let operand = ctx.types.ref_target(operand);
            if ctx.is_unknown(operand) {
                return TypeId::UNKNOWN;
            }
            match ctx
                .traits
                .get_associated_type(&ctx.types, TraitId::NEG, operand, &[], "Output")
            {
                Some(output) => output,
                None => {
                    ctx.report(TypeError::OperatorNotImplemented {
                        op: "-".to_string(),
                        lhs: ctx.type_name(operand),
                        rhs: None,
                        span,
                    });
                    TypeId::UNKNOWN
                }
            }
        }
    }
}

fn infer_assign(
    ctx: &mut InferCtx,
    name: &str,
    value: &mut Expr,
    span: Span,
    scope: ScopeId,
    walk: Walk,
) -> TypeId {
    let target = ctx
        .scopes
        .lookup_with_scope(scope, name)
        .map(|(def_scope, symbol)| (def_scope, symbol.ty));
    if let Some((_, ty)) = target {
        expect_type(ctx, value, ty);
    }
    infer_expr(ctx, value, scope, walk);
    match target {
        // `let x; x = 5;` gives `x` its type at the first assignment.
        Some((def_scope, ty)) if ctx.is_unknown(ty) => {
            if let Some(symbol) = ctx.scopes.lookup_local_mut(def_scope, name) {
                symbol.ty = value.ty;
            }
        }
        Some(_) => {}
        None => ctx.report(TypeError::UndefinedVariable {
            name: name.to_string(),
            span,
        }),
    }
    value.ty
}

fn infer_compound_assign(
    ctx: &mut InferCtx,
    op: &str,
    target: TypeId,
    value: TypeId,
    impl_id: &mut Option<ImplId>,
    span: Span,
) -> TypeId {
    let lhs = ctx.types.ref_target(target);
    let rhs = ctx.types.ref_target(value);
    if ctx.is_unknown(lhs) || ctx.is_unknown(rhs) {
        return target;
    }
    if op == "+=" && lhs == TypeId::STRING && rhs == TypeId::STRING {
        return target;
    }
    let found = ops::operator_trait(op)
        .filter(|_| ops::is_compound_assign(op))
        .and_then(|(trait_id, _)| ctx.traits.find_impl(&ctx.types, trait_id, lhs, &[rhs]));
    match found {
        Some(id) => *impl_id = Some(id),
        None => ctx.report(TypeError::OperatorNotImplemented {
            op: op.to_string(),
            lhs: ctx.type_name(lhs),
            rhs: Some(ctx.type_name(rhs)),
            span,
        }),
    }
    target
}

/// `++`/`--` go through `AddAssign<i32>`/`SubAssign<i32>`.
fn infer_step(ctx: &mut InferCtx, op: StepOp, target: TypeId, span: Span) -> TypeId {
    let operand = ctx.types.ref_target(target);
    if ctx.is_unknown(operand) {
        return TypeId::UNKNOWN;
    }
    let assign = ops::step_operator(op == StepOp::Inc);
    let found = ops::operator_trait(assign)
        .and_then(|(trait_id, _)| ctx.traits.find_impl(&ctx.types, trait_id, operand, &[TypeId::I32]));
    if found.is_none() {
        let symbol = match op {
            StepOp::Inc => "++",
            StepOp::Dec => "--",
        };
        ctx.report(TypeError::OperatorNotImplemented {
            op: symbol.to_string(),
            lhs: ctx.type_name(operand),
            rhs: None,
            span,
        });
    }
    target
}

fn infer_member(
    ctx: &mut InferCtx,
    object: TypeId,
    field: &str,
    field_index: &mut Option<usize>,
    span: Span,
) -> TypeId {
    let ty = ctx.types.ref_target(object);
    if ctx.is_unknown(ty) {
        return TypeId::UNKNOWN;
    }
    if field == "length" {
        ensure_length_impl(&mut ctx.traits, &ctx.types, ty);
        if let Some(output) = ctx
            .traits
            .get_associated_type(&ctx.types, TraitId::LENGTH, ty, &[], "Output")
        {
            return output;
        }
    }
    let found = ctx
        .types
        .record(ty)
        .and_then(|r| r.field_index(field).map(|i| (i, r.fields[i].ty)));
    match found {
        Some((index, field_ty)) => {
            *field_index = Some(index);
            field_ty
        }
        None => {
            ctx.report(TypeError::UnknownPropertyAccess {
                field: field.to_string(),
                ty: ctx.type_name(ty),
                span,
            });
            TypeId::UNKNOWN
        }
    }
}

fn infer_index(
    ctx: &mut InferCtx,
    object: TypeId,
    index: TypeId,
    impl_id: &mut Option<ImplId>,
    span: Span,
) -> TypeId {
    let container = ctx.types.ref_target(object);
    let index = ctx.types.ref_target(index);
    if ctx.is_unknown(container) || ctx.is_unknown(index) {
        return TypeId::UNKNOWN;
    }
    ensure_index_impl(&mut ctx.traits, &ctx.types, container);
    let found = ctx
        .traits
        .find_impl(&ctx.types, TraitId::INDEX, container, &[index])
        .and_then(|id| {
            let output = ctx.traits.get_impl(id)?.associated_type("Output")?;
            Some((id, output))
        });
    match found {
        Some((id, output)) => {
            *impl_id = Some(id);
            output
        }
        None => {
            ctx.report(TypeError::IndexNotImplemented {
                ty: ctx.type_name(container),
                index: ctx.type_name(index),
                span,
            });
            TypeId::UNKNOWN
        }
    }
}

fn infer_index_assign(
    ctx: &mut InferCtx,
    container: TypeId,
    index: TypeId,
    impl_id: &mut Option<ImplId>,
    span: Span,
) {
    let index = ctx.types.ref_target(index);
    if ctx.is_unknown(container) || ctx.is_unknown(index) {
        return;
    }
    ensure_ref_index_impl(&mut ctx.traits, &ctx.types, container);
    match ctx
        .traits
        .find_impl(&ctx.types, TraitId::REF_INDEX, container, &[index])
    {
        Some(id) => *impl_id = Some(id),
        None => ctx.report(TypeError::RefIndexNotImplemented {
            ty: ctx.type_name(container),
            index: ctx.type_name(index),
            span,
        }),
    }
}

fn ternary_type(ctx: &InferCtx, then_ty: TypeId, else_ty: TypeId) -> TypeId {
    let a = ctx.types.resolve_alias(then_ty);
    let b = ctx.types.resolve_alias(else_ty);
    if ctx.is_unknown(a) || ctx.is_unknown(b) {
        return TypeId::UNKNOWN;
    }
    if ctx.types.structurally_equal(a, b) {
        return a;
    }
    match (a, b) {
        (TypeId::I32, TypeId::DOUBLE) | (TypeId::DOUBLE, TypeId::I32) => TypeId::DOUBLE,
        _ => TypeId::UNKNOWN,
    }
}

// ── Calls ───────────────────────────────────────────────────────────────

fn infer_args(ctx: &mut InferCtx, args: &mut [Expr], scope: ScopeId, walk: Walk) {
    for arg in args {
        infer_expr(ctx, arg, scope, walk);
    }
}

/// Declared parameter types of `fid`, by position.
fn param_hints(ctx: &InferCtx, fid: TypeId) -> Vec<Option<TypeId>> {
    ctx.types
        .function(fid)
        .map(|f| f.params.iter().map(|p| p.hint).collect())
        .unwrap_or_default()
}

fn runtime_call(ctx: &InferCtx, name: &str) -> Option<TypeId> {
    let ret = ctx.config.runtime_return_type(name)?;
    Some(ctx.types.find_by_name(ret).unwrap_or(TypeId::UNKNOWN))
}

fn infer_call(
    ctx: &mut InferCtx,
    callee: &mut Expr,
    args: &mut [Expr],
    target: &mut Option<SpecId>,
    span: Span,
    scope: ScopeId,
    walk: Walk,
) -> TypeId {
    let name = match &callee.kind {
        ExprKind::Ident(name) => Some(name.clone()),
        _ => None,
    };
    let Some(name) = name else {
        infer_expr(ctx, callee, scope, walk);
        infer_args(ctx, args, scope, walk);
        return TypeId::UNKNOWN;
    };

    let function = ctx.scopes.lookup(scope, &name).and_then(Symbol::function_type);
    let Some(fid) = function else {
        infer_args(ctx, args, scope, walk);
        if name == "Array" && args.len() == 1 {
            return ctx.types.array_of(TypeId::I32);
        }
        if let Some(ret) = runtime_call(ctx, &name) {
            return ret;
        }
        ctx.report(TypeError::UndefinedFunction { name, span });
        return TypeId::VOID;
    };

    callee.ty = fid;
    for (arg, hint) in args.iter_mut().zip(param_hints(ctx, fid)) {
        if let Some(hint) = hint {
            expect_type(ctx, arg, hint);
        }
    }
    infer_args(ctx, args, scope, walk);
    let arg_types: Vec<TypeId> = args.iter().map(|a| a.ty).collect();
    let display = ctx.type_name(fid);
    resolve_call(ctx, fid, &display, &arg_types, target, span, walk)
}

#[allow(clippy::too_many_arguments)]
fn infer_method_call(
    ctx: &mut InferCtx,
    object: &mut Expr,
    method: &str,
    args: &mut [Expr],
    is_static: &mut bool,
    target: &mut Option<SpecId>,
    span: Span,
    scope: ScopeId,
    walk: Walk,
) -> TypeId {
    // `Point.origin()` names the record itself; `console.log(x)` names a
    // runtime routine.
    if let ExprKind::Ident(name) = &object.kind {
        if ctx.scopes.lookup(scope, name).is_none() {
            let qualified = method_name(name, method);
            let record = ctx
                .types
                .find_by_name(name)
                .filter(|&t| ctx.types.is_record(t));
            if let Some(record) = record {
                *is_static = true;
                object.ty = record;
                return call_method(ctx, &qualified, None, args, target, span, scope, walk);
            }
            if let Some(ret) = runtime_call(ctx, &qualified) {
                infer_args(ctx, args, scope, walk);
                return ret;
            }
        }
    }

    infer_expr(ctx, object, scope, walk);
    let receiver = ctx.types.ref_target(object.ty);
    if ctx.is_unknown(receiver) {
        infer_args(ctx, args, scope, walk);
        return TypeId::UNKNOWN;
    }
    if !ctx.types.is_record(receiver) {
        infer_args(ctx, args, scope, walk);
        ctx.report(TypeError::MethodCallOnNonRecord { span });
        return TypeId::UNKNOWN;
    }
    let qualified = method_name(ctx.types.name(receiver), method);
    call_method(ctx, &qualified, Some(object.ty), args, target, span, scope, walk)
}

/// Call the method function `name`. An instance call passes the receiver
/// type as the first argument.
#[allow(clippy::too_many_arguments)]
fn call_method(
    ctx: &mut InferCtx,
    name: &str,
    receiver: Option<TypeId>,
    args: &mut [Expr],
    target: &mut Option<SpecId>,
    span: Span,
    scope: ScopeId,
    walk: Walk,
) -> TypeId {
    let Some(fid) = ctx.types.find_function(name) else {
        infer_args(ctx, args, scope, walk);
        ctx.report(TypeError::UnknownMethod {
            name: name.to_string(),
            span,
        });
        return TypeId::UNKNOWN;
    };

    let skip = usize::from(receiver.is_some());
    let hints = param_hints(ctx, fid);
    for (arg, hint) in args.iter_mut().zip(hints.into_iter().skip(skip)) {
        if let Some(hint) = hint {
            expect_type(ctx, arg, hint);
        }
    }
    infer_args(ctx, args, scope, walk);
    let arg_types: Vec<TypeId> = receiver
        .into_iter()
        .chain(args.iter().map(|a| a.ty))
        .collect();
    resolve_call(ctx, fid, name, &arg_types, target, span, walk)
}

/// Check the arguments against declared parameter types and find (or, in
/// a discovery walk, request) the specialization the call runs. Returns
/// the call's type: the specialization's return type, or Unknown while
/// there is none.
fn resolve_call(
    ctx: &mut InferCtx,
    fid: TypeId,
    display: &str,
    arg_types: &[TypeId],
    target: &mut Option<SpecId>,
    span: Span,
    walk: Walk,
) -> TypeId {
    let hints = param_hints(ctx, fid);
    let mut tuple = Vec::with_capacity(arg_types.len());
    for (i, &arg) in arg_types.iter().enumerate() {
        match hints.get(i).copied().flatten() {
            Some(hint) => {
                if !ctx.fits_param(hint, arg) {
                    ctx.report(TypeError::ArgumentMismatch {
                        function: display.to_string(),
                        position: i + 1,
                        expected: ctx.type_name(hint),
                        found: ctx.type_name(arg),
                        span,
                    });
                }
                tuple.push(hint);
            }
            None => tuple.push(arg),
        }
    }

    let fully_typed = ctx.types.function(fid).is_some_and(|f| f.fully_typed);
    let id = if fully_typed {
        let id = SpecId {
            function: fid,
            index: 0,
        };
        ctx.types.specialization(id).map(|_| id)
    } else if !tuple.iter().all(|&t| ctx.types.is_concrete(t)) {
        None
    } else {
        match walk {
            Walk::Discover => specialize::request(ctx, fid, &tuple),
            Walk::Infer => ctx.types.find_specialization(fid, &tuple),
        }
    };

    *target = id;
    id.and_then(|id| ctx.types.specialization(id))
        .map_or(TypeId::UNKNOWN, |s| s.return_type)
}
