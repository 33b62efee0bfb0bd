//! Jsasta type checker: multi-pass inference with monomorphization.
//!
//! Takes a parsed module and returns it with every expression typed, every
//! operator bound to a trait impl and every call bound to a concrete
//! specialization of its callee. Functions are generic over their
//! unannotated parameters; each distinct argument-type tuple a call site
//! uses gets its own inferred clone of the body.
//!
//! Checking never stops at the first problem. Errors are collected, the
//! offending node gets `unknown` (or its declared type) and inference
//! continues, so one run reports every independent error.
//!
//! # Architecture
//!
//! - [`ast`]: The module tree, plus the annotation slots inference fills in
//! - [`ty`]: Type ids, descriptors, records, function types and specializations
//! - [`registry`]: Type registry with structural interning and name mangling
//! - [`env`]: Lexical scopes and symbols
//! - [`traits`]: Trait registry and impl lookup
//! - [`builtins`]: Built-in operator traits and on-demand container impls
//! - [`ops`]: Operator to trait table
//! - [`const_eval`]: Compile-time integer evaluation for array extents
//! - [`infer`]: The inference passes
//! - [`specialize`]: Specialization materialization and discovery
//! - [`config`]: Checker configuration
//! - [`error`]: Type error types
//! - [`diagnostics`]: Ariadne rendering of type errors

pub mod ast;
pub mod builtins;
pub mod config;
pub mod const_eval;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod infer;
pub mod ops;
pub mod registry;
pub mod specialize;
pub mod traits;
pub mod ty;

use jsasta_common::{Diagnostic, DiagnosticSink};
use serde::Serialize;
use tracing::info;

use crate::ast::Module;
use crate::config::InferConfig;
use crate::env::SymbolTables;
use crate::error::TypeError;
use crate::registry::TypeRegistry;
use crate::traits::TraitRegistry;
use crate::ty::TypeId;

/// The result of checking one module.
///
/// Owns everything the backend needs: the annotated module, the registries
/// its annotations point into and the scopes its symbols live in.
pub struct TypeckResult {
    /// The module, with types, impls and call targets filled in.
    pub module: Module,
    pub types: TypeRegistry,
    pub traits: TraitRegistry,
    pub scopes: SymbolTables,
    /// Errors and warnings, in the order they were found.
    pub errors: Vec<TypeError>,
    /// Specialization discovery rounds that ran.
    pub iterations: usize,
}

/// One specialization, as shown by [`TypeckResult::specialization_report`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpecializationReport {
    pub function: String,
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
}

impl TypeckResult {
    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_error()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().map(TypeError::to_diagnostic).collect()
    }

    /// Every specialization in registration order, with type names
    /// resolved.
    pub fn specialization_report(&self) -> Vec<SpecializationReport> {
        let mut out = Vec::new();
        for id in self.types.ids() {
            let Some(func) = self.types.function(id) else {
                continue;
            };
            for spec in &func.specializations {
                out.push(SpecializationReport {
                    function: self.types.name(id).to_string(),
                    name: spec.name.clone(),
                    params: spec
                        .params
                        .iter()
                        .map(|&t| self.types.name(t).to_string())
                        .collect(),
                    return_type: self.types.name(spec.return_type).to_string(),
                });
            }
        }
        out
    }

    /// Return type of the specialization called `name`, if there is one.
    pub fn specialization_return(&self, name: &str) -> Option<TypeId> {
        self.types
            .ids()
            .filter_map(|id| self.types.function(id))
            .flat_map(|f| f.specializations.iter())
            .find(|s| s.name == name)
            .map(|s| s.return_type)
    }

    /// Render every error against the module's source text.
    pub fn render(&self, source: &str, filename: &str) -> String {
        diagnostics::render_all(&self.errors, source, filename)
    }
}

/// Type-check a module.
///
/// This is the main entry point. It runs every inference pass, discovers
/// and infers every specialization reachable from the module's top level,
/// and returns the annotated module together with the errors found.
pub fn check(mut module: Module, config: &InferConfig) -> TypeckResult {
    let mut ctx = infer::InferCtx::new(config);
    infer::infer_module(&mut ctx, &mut module);
    info!(
        specializations = ctx.types.specialization_count(),
        errors = ctx.errors.len(),
        iterations = ctx.iterations,
        "type check finished"
    );
    TypeckResult {
        module,
        types: ctx.types,
        traits: ctx.traits,
        scopes: ctx.scopes,
        errors: ctx.errors,
        iterations: ctx.iterations,
    }
}

/// Like [`check`], also forwarding every error to `sink`.
pub fn check_with_sink(module: Module, config: &InferConfig, sink: &mut impl DiagnosticSink) -> TypeckResult {
    let result = check(module, config);
    for error in &result.errors {
        sink.report(error.to_diagnostic());
    }
    result
}
