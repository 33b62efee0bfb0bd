//! Monomorphization: one inferred body clone per distinct argument tuple.
//!
//! A call whose argument types are all concrete requests a specialization
//! of its callee. A new one is materialized immediately: the template body
//! is cloned with fresh scopes, the parameters are bound to the argument
//! types and the clone is inferred, which may in turn request more
//! specializations. Two kinds of request are queued for the next discovery
//! round instead: those nested deeper than the cap, and those for a
//! function that is already being materialized. A recursive function whose
//! argument types grow therefore gains one level per round.
//!
//! Discovery repeats walk-and-refine rounds over the module and every body
//! until a round creates nothing new and refines no return type.

use jsasta_common::Span;
use tracing::{debug, trace, warn};

use crate::ast::{Block, Expr, Module, Stmt, StmtKind};
use crate::env::Symbol;
use crate::error::TypeError;
use crate::infer::{infer_block, walk_module, InferCtx, Walk};
use crate::registry::{SpecOutcome, TypeRegistry};
use crate::ty::{SpecId, SpecializedBody, TypeId};

/// Find or create the specialization of `function` for `args`.
pub(crate) fn request(ctx: &mut InferCtx, function: TypeId, args: &[TypeId]) -> Option<SpecId> {
    let outcome = ctx.types.add_specialization(function, args)?;
    if let SpecOutcome::Created(id) = outcome {
        materialize(ctx, id);
    }
    Some(outcome.id())
}

/// Clone the template of `id`'s function, infer it against the
/// specialization's parameter types and store the result.
pub(crate) fn materialize(ctx: &mut InferCtx, id: SpecId) {
    if ctx.active.len() >= ctx.config.max_specialization_depth || ctx.active.contains(&id.function) {
        trace!(function = id.function.index(), index = id.index, "deferring specialization");
        ctx.pending.push(id);
        return;
    }

    let Some(func) = ctx.types.function(id.function) else {
        return;
    };
    let Some(template) = &func.template else {
        return;
    };
    let mut block = template.fresh_copy();
    let decl_scope = func.scope;
    let return_hint = func.return_hint;
    let param_names: Vec<String> = func.params.iter().map(|p| p.name.clone()).collect();
    let Some(spec) = ctx.types.specialization(id) else {
        return;
    };
    if spec.body.is_some() {
        return;
    }
    let name = spec.name.clone();
    let arg_types = spec.params.clone();

    let scope = ctx.scopes.push(decl_scope);
    for (i, param) in param_names.iter().enumerate() {
        let ty = arg_types.get(i).copied().unwrap_or(TypeId::UNKNOWN);
        ctx.scopes.insert(scope, Symbol::parameter(param, ty));
    }
    block.scope = Some(scope);

    debug!(specialization = %name, depth = ctx.active.len(), "materializing");
    ctx.active.push(id.function);
    infer_block(ctx, &mut block, decl_scope, Walk::Infer);
    for _ in 0..ctx.config.max_iterations {
        let before = ctx.types.specialization_count();
        infer_block(ctx, &mut block, decl_scope, Walk::Discover);
        infer_block(ctx, &mut block, decl_scope, Walk::Infer);
        if ctx.types.specialization_count() == before {
            break;
        }
    }
    ctx.active.pop();

    let (inferred, span) = infer_return_type(&ctx.types, &block);
    let return_type = match return_hint {
        Some(declared) => {
            let fits = ctx.types.structurally_equal(declared, inferred)
                || ctx.widens_to_double(declared, inferred);
            if !fits && !ctx.types.is_unknown(inferred) && inferred != TypeId::VOID {
                ctx.report(TypeError::ReturnTypeMismatch {
                    function: name.clone(),
                    declared: ctx.types.name(declared).to_string(),
                    inferred: ctx.types.name(inferred).to_string(),
                    span,
                });
            }
            declared
        }
        None => inferred,
    };

    if let Some(spec) = ctx.types.specialization_mut(id) {
        spec.return_type = return_type;
        spec.body = Some(SpecializedBody { block, scope });
    }
    trace!(specialization = %name, return_type = %ctx.types.name(return_type), "materialized");
}

/// Run discovery rounds until nothing changes or the iteration bound is
/// hit. Hitting the bound is reported as a warning.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn discover(ctx: &mut InferCtx, module: &mut Module) {
    let limit = ctx.config.max_iterations;
    let mut converged = false;
    while ctx.iterations < limit {
        ctx.iterations += 1;
        let before = ctx.types.specialization_count();

        let pending = std::mem::take(&mut ctx.pending);
        let had_pending = !pending.is_empty();
        for id in pending {
            materialize(ctx, id);
        }

        walk_module(ctx, module, Walk::Discover);
        walk_bodies(ctx, Walk::Discover);
        let refined = refine_return_types(ctx);
        walk_module(ctx, module, Walk::Infer);
        walk_bodies(ctx, Walk::Infer);

        let created = ctx.types.specialization_count() - before;
        debug!(iteration = ctx.iterations, created, refined, "discovery round");
        if created == 0 && !refined && !had_pending && ctx.pending.is_empty() {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(limit, "specialization discovery hit the iteration limit");
        ctx.report(TypeError::IterationLimit {
            pass: "Specialization discovery".to_string(),
            limit,
        });
    }
}

fn all_specializations(types: &TypeRegistry) -> Vec<SpecId> {
    types
        .ids()
        .filter_map(|fid| types.function(fid).map(|f| (fid, f.specializations.len())))
        .flat_map(|(function, count)| {
            (0..count as u32).map(move |index| SpecId { function, index })
        })
        .collect()
}

/// Re-walk every materialized body. Each body is taken out of the registry
/// for the walk and put back afterwards.
fn walk_bodies(ctx: &mut InferCtx, walk: Walk) {
    for id in all_specializations(&ctx.types) {
        let Some(mut body) = ctx.types.specialization_mut(id).and_then(|s| s.body.take()) else {
            continue;
        };
        infer_block(ctx, &mut body.block, body.scope, walk);
        if let Some(spec) = ctx.types.specialization_mut(id) {
            spec.body = Some(body);
        }
    }
}

/// Fill in the return type of unannotated specializations whose return
/// expressions only became known in a later round. Returns whether any
/// changed.
fn refine_return_types(ctx: &mut InferCtx) -> bool {
    let mut updates = Vec::new();
    for id in all_specializations(&ctx.types) {
        let hinted = ctx
            .types
            .function(id.function)
            .is_some_and(|f| f.return_hint.is_some());
        let Some(spec) = ctx.types.specialization(id) else {
            continue;
        };
        if hinted || !ctx.types.is_unknown(spec.return_type) {
            continue;
        }
        let Some(body) = &spec.body else {
            continue;
        };
        let (ty, _) = infer_return_type(&ctx.types, &body.block);
        if !ctx.types.is_unknown(ty) {
            updates.push((id, ty));
        }
    }

    let refined = !updates.is_empty();
    for (id, ty) in updates {
        if let Some(spec) = ctx.types.specialization_mut(id) {
            trace!(specialization = %spec.name, "return type refined");
            spec.return_type = ty;
        }
    }
    refined
}

fn collect_returns<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a Expr>) {
    for stmt in stmts {
        collect_returns_in(stmt, out);
    }
}

fn collect_returns_in<'a>(stmt: &'a Stmt, out: &mut Vec<&'a Expr>) {
    match &stmt.kind {
        StmtKind::Return(Some(value)) => out.push(value),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_returns_in(then_branch, out);
            if let Some(else_branch) = else_branch {
                collect_returns_in(else_branch, out);
            }
        }
        StmtKind::While { body, .. } => collect_returns_in(body, out),
        StmtKind::For(for_loop) => collect_returns_in(&for_loop.body, out),
        StmtKind::Block(block) => collect_returns(&block.stmts, out),
        // Nested functions return from themselves.
        StmtKind::Fn(_)
        | StmtKind::Return(None)
        | StmtKind::Var(_)
        | StmtKind::Struct(_)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Expr(_) => {}
    }
}

/// Return type of a body: the type of the first return value that is
/// known and not void, Unknown when every return value is still unknown,
/// and void when nothing is returned. The span is that of the chosen
/// return value.
pub(crate) fn infer_return_type(types: &TypeRegistry, block: &Block) -> (TypeId, Span) {
    let mut values = Vec::new();
    collect_returns(&block.stmts, &mut values);
    if values.is_empty() {
        return (TypeId::VOID, Span::DUMMY);
    }
    values
        .iter()
        .find(|e| !types.is_unknown(e.ty) && e.ty != TypeId::VOID)
        .map_or((TypeId::UNKNOWN, Span::DUMMY), |e| (e.ty, e.span))
}
