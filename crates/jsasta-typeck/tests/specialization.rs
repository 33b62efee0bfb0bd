//! Integration tests for function specialization.
//!
//! These tests exercise:
//! - One specialization per distinct argument-type tuple, named by mangling
//! - Eager single specializations for fully typed and external functions
//! - Recursive, nested and method specializations
//! - Return type inference and refinement across discovery rounds
//! - Bounded discovery for unbounded generic recursion

use jsasta_common::Span;
use jsasta_typeck::ast::{Expr, ExprKind, FnDecl, Module, Stmt, StmtKind, StructDecl, TypeExpr, VarDecl};
use jsasta_typeck::config::InferConfig;
use jsasta_typeck::ty::TypeId;
use jsasta_typeck::TypeckResult;
use serde_json::json;

// ── Helpers ────────────────────────────────────────────────────────────

fn check_module(items: Vec<Stmt>) -> TypeckResult {
    jsasta_typeck::check(Module::new(items), &InferConfig::default())
}

fn named(name: &str) -> TypeExpr {
    TypeExpr::named(name)
}

fn let_(name: &str, init: Expr) -> Stmt {
    Stmt::var(VarDecl::new(name, Some(init)))
}

/// `fn name(params...) { body }` with every parameter unannotated.
fn generic_fn(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    let decl = params
        .iter()
        .fold(FnDecl::new(name), |decl, p| decl.param(*p, None));
    Stmt::func(decl.body(body))
}

/// `fn add(a, b) { return a + b; }`
fn add_fn() -> Stmt {
    generic_fn(
        "add",
        &["a", "b"],
        vec![Stmt::ret(Some(Expr::binary(
            "+",
            Expr::ident("a"),
            Expr::ident("b"),
        )))],
    )
}

fn var_type<'a>(result: &'a TypeckResult, name: &str) -> &'a str {
    let ty = result
        .module
        .items
        .iter()
        .find_map(|item| match &item.kind {
            StmtKind::Var(decl) if decl.name == name => Some(decl.ty),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no declaration of `{name}`"));
    result.types.name(ty)
}

fn assert_no_errors(result: &TypeckResult) {
    assert!(
        result.errors.is_empty(),
        "expected no errors, got: {:?}",
        result.errors
    );
}

/// One line per specialization: `name(params) -> return`.
fn listing(result: &TypeckResult) -> String {
    result
        .specialization_report()
        .iter()
        .map(|s| format!("{}({}) -> {}", s.name, s.params.join(", "), s.return_type))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Generic functions ──────────────────────────────────────────────────

#[test]
fn test_one_specialization_per_argument_tuple() {
    let result = check_module(vec![
        add_fn(),
        let_("x", Expr::call("add", vec![Expr::int(1), Expr::int(2)])),
        let_("y", Expr::call("add", vec![Expr::float(1.5), Expr::float(2.5)])),
        let_("z", Expr::call("add", vec![Expr::int(3), Expr::int(4)])),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "x"), "i32");
    assert_eq!(var_type(&result, "y"), "double");
    assert_eq!(var_type(&result, "z"), "i32");

    insta::assert_snapshot!(listing(&result), @r"
    add_i32_i32(i32, i32) -> i32
    add_double_double(double, double) -> double
    ");
}

#[test]
fn test_specialization_report_serializes() {
    let result = check_module(vec![
        add_fn(),
        Stmt::expr(Expr::call("add", vec![Expr::int(1), Expr::int(2)])),
    ]);
    let value = serde_json::to_value(result.specialization_report()).unwrap();
    assert_eq!(
        value,
        json!([{
            "function": "add",
            "name": "add_i32_i32",
            "params": ["i32", "i32"],
            "return_type": "i32",
        }])
    );
}

#[test]
fn test_call_sites_are_bound() {
    let result = check_module(vec![
        add_fn(),
        let_("x", Expr::call("add", vec![Expr::int(1), Expr::int(2)])),
    ]);
    let add = result.types.find_function("add").unwrap();
    let StmtKind::Var(decl) = &result.module.items[1].kind else {
        panic!("expected a declaration");
    };
    let call = decl.init.as_ref().unwrap();
    let ExprKind::Call { callee, target, .. } = &call.kind else {
        panic!("expected a call");
    };
    assert_eq!(callee.ty, add);
    let target = target.expect("call was not bound to a specialization");
    assert_eq!(target.function, add);
    assert_eq!(
        result.types.specialization(target).unwrap().name,
        "add_i32_i32"
    );
    assert_eq!(call.ty, TypeId::I32);
}

#[test]
fn test_bodies_are_inferred_per_specialization() {
    let result = check_module(vec![
        add_fn(),
        Stmt::expr(Expr::call("add", vec![Expr::int(1), Expr::int(2)])),
        Stmt::expr(Expr::call("add", vec![Expr::float(1.0), Expr::float(2.0)])),
    ]);
    let add = result.types.find_function("add").unwrap();
    let func = result.types.function(add).unwrap();

    let returned = |block: &jsasta_typeck::ast::Block| match &block.stmts[0].kind {
        StmtKind::Return(Some(value)) => value.ty,
        other => panic!("expected a return, got {other:?}"),
    };
    let bodies: Vec<TypeId> = func
        .specializations
        .iter()
        .map(|s| returned(&s.body.as_ref().unwrap().block))
        .collect();
    assert_eq!(bodies, vec![TypeId::I32, TypeId::DOUBLE]);

    // The template itself is never inferred.
    assert_eq!(returned(func.template.as_ref().unwrap()), TypeId::UNKNOWN);
}

#[test]
fn test_hinted_parameters_fix_their_slot() {
    let result = check_module(vec![
        Stmt::func(
            FnDecl::new("pair")
                .param("a", Some(named("double")))
                .param("b", None)
                .body(vec![Stmt::ret(Some(Expr::ident("b")))]),
        ),
        let_("p", Expr::call("pair", vec![Expr::int(1), Expr::str("x")])),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "p"), "string");
    insta::assert_snapshot!(listing(&result), @"pair_double_string(double, string) -> string");
}

#[test]
fn test_function_alias_calls_the_original() {
    let result = check_module(vec![
        add_fn(),
        let_("g", Expr::ident("add")),
        let_("r", Expr::call("g", vec![Expr::int(1), Expr::int(2)])),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "r"), "i32");
    insta::assert_snapshot!(listing(&result), @"add_i32_i32(i32, i32) -> i32");
}

#[test]
fn test_module_prefix_in_mangled_names() {
    let config = InferConfig::default().with_module_prefix("math");
    let result = jsasta_typeck::check(
        Module::new(vec![
            add_fn(),
            Stmt::expr(Expr::call("add", vec![Expr::int(1), Expr::int(2)])),
        ]),
        &config,
    );
    assert!(result.specialization_return("math__add_i32_i32").is_some());
}

#[test]
fn test_void_function() {
    let result = check_module(vec![
        generic_fn(
            "log",
            &["x"],
            vec![Stmt::expr(Expr::call("print", vec![Expr::ident("x")]))],
        ),
        Stmt::expr(Expr::call("log", vec![Expr::int(1)])),
    ]);
    assert_no_errors(&result);
    insta::assert_snapshot!(listing(&result), @"log_i32(i32) -> void");
}

// ── Aliases ────────────────────────────────────────────────────────────

fn typed_let(name: &str, hint: TypeExpr, init: Expr) -> Stmt {
    Stmt::var(VarDecl::new(name, Some(init)).hint(hint))
}

/// `fn id(x) { return x; }`
fn id_fn() -> Stmt {
    generic_fn("id", &["x"], vec![Stmt::ret(Some(Expr::ident("x")))])
}

#[test]
fn test_alias_arguments_share_a_specialization() {
    let result = check_module(vec![
        id_fn(),
        typed_let("a", named("int"), Expr::int(1)),
        typed_let("b", named("i32"), Expr::int(2)),
        let_("ra", Expr::call("id", vec![Expr::ident("a")])),
        let_("rb", Expr::call("id", vec![Expr::ident("b")])),
    ]);
    assert_no_errors(&result);
    assert_eq!(result.types.specialization_count(), 1);
    insta::assert_snapshot!(listing(&result), @"id_int(int) -> int");
    assert_eq!(var_type(&result, "rb"), "int");
}

#[test]
fn test_alias_array_arguments_share_a_specialization() {
    let result = check_module(vec![
        id_fn(),
        typed_let("a", TypeExpr::array(named("int")), Expr::array(vec![Expr::int(1)])),
        typed_let("b", TypeExpr::array(named("i32")), Expr::array(vec![Expr::int(2)])),
        Stmt::expr(Expr::call("id", vec![Expr::ident("a")])),
        Stmt::expr(Expr::call("id", vec![Expr::ident("b")])),
    ]);
    assert_no_errors(&result);
    assert_eq!(result.types.specialization_count(), 1);
    insta::assert_snapshot!(listing(&result), @"id_int_arr(int[]) -> int[]");
}

#[test]
fn test_alias_typed_index_finds_the_array_impl() {
    let result = check_module(vec![
        typed_let("i", named("int"), Expr::int(0)),
        typed_let("xs", TypeExpr::array(named("i32")), Expr::array(vec![Expr::int(1)])),
        typed_let("ys", TypeExpr::array(named("int")), Expr::array(vec![Expr::int(2)])),
        let_("v", Expr::index(Expr::ident("xs"), Expr::ident("i"))),
        let_("w", Expr::index(Expr::ident("ys"), Expr::ident("i"))),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "v"), "i32");
    assert_eq!(var_type(&result, "w"), "int");
}

// ── Fully typed and external functions ─────────────────────────────────

fn scale_fn() -> Stmt {
    Stmt::func(
        FnDecl::new("scale")
            .param("v", Some(named("double")))
            .param("k", Some(named("double")))
            .returns(named("double"))
            .body(vec![Stmt::ret(Some(Expr::binary(
                "*",
                Expr::ident("v"),
                Expr::ident("k"),
            )))]),
    )
}

#[test]
fn test_fully_typed_function_has_one_eager_specialization() {
    let result = check_module(vec![
        scale_fn(),
        let_("a", Expr::call("scale", vec![Expr::int(2), Expr::float(0.5)])),
        let_("b", Expr::call("scale", vec![Expr::float(1.0), Expr::float(3.0)])),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "a"), "double");
    insta::assert_snapshot!(listing(&result), @"scale(double, double) -> double");
}

#[test]
fn test_argument_mismatch_on_declared_parameter() {
    let result = check_module(vec![
        scale_fn(),
        Stmt::expr(Expr::call("scale", vec![Expr::int(2), Expr::str("s")]).at(Span::new(20, 35))),
    ]);
    assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
    assert_eq!(result.errors[0].code(), "T312");
    assert_eq!(
        result.errors[0].to_string(),
        "Type mismatch in call to 'scale': parameter 2 expects double but got string"
    );
    assert_eq!(result.errors[0].span(), Span::new(20, 35));
}

#[test]
fn test_return_type_mismatch() {
    let result = check_module(vec![Stmt::func(
        FnDecl::new("f")
            .returns(named("i32"))
            .body(vec![Stmt::ret(Some(Expr::str("s")))]),
    )]);
    assert_eq!(
        result.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        vec!["Return type mismatch in function 'f': declared i32 but body returns string"]
    );
    // The declared type stands.
    assert_eq!(result.specialization_return("f"), Some(TypeId::I32));
}

#[test]
fn test_external_variadic_function() {
    let result = check_module(vec![
        Stmt::func(
            FnDecl::new("printf")
                .param("fmt", Some(named("string")))
                .returns(named("i32"))
                .variadic(),
        ),
        let_(
            "rc",
            Expr::call("printf", vec![Expr::str("%d %f"), Expr::int(1), Expr::float(2.0)]),
        ),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "rc"), "i32");
    let printf = result.types.find_function("printf").unwrap();
    let func = result.types.function(printf).unwrap();
    assert!(func.is_external());
    assert_eq!(func.specializations.len(), 1);
    assert!(func.specializations[0].body.is_none());
}

// ── Recursion and nesting ──────────────────────────────────────────────

#[test]
fn test_recursive_function_return_type() {
    let result = check_module(vec![
        generic_fn(
            "fact",
            &["n"],
            vec![
                Stmt::if_else(
                    Expr::binary("<", Expr::ident("n"), Expr::int(2)),
                    Stmt::ret(Some(Expr::int(1))),
                    None,
                ),
                Stmt::ret(Some(Expr::binary(
                    "*",
                    Expr::ident("n"),
                    Expr::call(
                        "fact",
                        vec![Expr::binary("-", Expr::ident("n"), Expr::int(1))],
                    ),
                ))),
            ],
        ),
        let_("r", Expr::call("fact", vec![Expr::int(5)])),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "r"), "i32");
    insta::assert_snapshot!(listing(&result), @"fact_i32(i32) -> i32");
}

#[test]
fn test_nested_function_is_specialized() {
    let result = check_module(vec![
        generic_fn(
            "outer",
            &["a"],
            vec![
                generic_fn(
                    "inner",
                    &["b"],
                    vec![Stmt::ret(Some(Expr::binary(
                        "*",
                        Expr::ident("b"),
                        Expr::int(2),
                    )))],
                ),
                Stmt::ret(Some(Expr::call("inner", vec![Expr::ident("a")]))),
            ],
        ),
        let_("v", Expr::call("outer", vec![Expr::float(1.5)])),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "v"), "double");
    insta::assert_snapshot!(listing(&result), @r"
    outer_double(double) -> double
    inner_double(double) -> double
    ");
}

#[test]
fn test_unbounded_recursion_hits_the_iteration_limit() {
    let config = InferConfig {
        max_iterations: 3,
        max_specialization_depth: 4,
        ..InferConfig::default()
    };
    // fn grow(x) { return grow([x]); }
    let module = Module::new(vec![
        generic_fn(
            "grow",
            &["x"],
            vec![Stmt::ret(Some(Expr::call(
                "grow",
                vec![Expr::array(vec![Expr::ident("x")])],
            )))],
        ),
        Stmt::expr(Expr::call("grow", vec![Expr::int(1)])),
    ]);
    let result = jsasta_typeck::check(module, &config);

    assert!(!result.has_errors(), "{:?}", result.errors);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code(), "W001");
    assert_eq!(
        result.errors[0].to_string(),
        "Specialization discovery did not converge after 3 iterations"
    );
    assert_eq!(result.iterations, 3);
    // The partial result is still there.
    assert!(result.specialization_return("grow_i32").is_some());
}

#[test]
fn test_growing_recursion_adds_one_level_per_round() {
    // fn grow(x) { return grow([x]); }
    let config = InferConfig::default();
    let module = Module::new(vec![
        generic_fn(
            "grow",
            &["x"],
            vec![Stmt::ret(Some(Expr::call(
                "grow",
                vec![Expr::array(vec![Expr::ident("x")])],
            )))],
        ),
        Stmt::expr(Expr::call("grow", vec![Expr::int(1)])),
    ]);
    let result = jsasta_typeck::check(module, &config);

    assert_eq!(result.iterations, config.max_iterations);
    let codes: Vec<_> = result.errors.iter().map(|e| e.code()).collect();
    assert_eq!(codes, vec!["W001"]);
    // grow_i32 plus one deeper level per round; the last one is queued
    // but never materialized.
    assert_eq!(result.types.specialization_count(), config.max_iterations + 1);
    assert!(result.specialization_return("grow_i32_arr_arr").is_some());
}

#[test]
fn test_errors_in_generic_bodies_are_reported_once() {
    let result = check_module(vec![
        generic_fn(
            "f",
            &["a"],
            vec![Stmt::ret(Some(Expr::binary(
                "+",
                Expr::ident("a"),
                Expr::ident("missing").at(Span::new(30, 37)),
            )))],
        ),
        Stmt::expr(Expr::call("f", vec![Expr::int(1)])),
        Stmt::expr(Expr::call("f", vec![Expr::float(2.5)])),
    ]);
    assert_eq!(result.types.specialization_count(), 2);
    assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
    assert_eq!(result.errors[0].to_string(), "Undefined variable: missing");
    assert_eq!(result.errors[0].span(), Span::new(30, 37));
}

// ── Methods ────────────────────────────────────────────────────────────

fn counter_decl() -> Stmt {
    Stmt::structure(
        StructDecl::new("Counter")
            .field("n", named("i32"), None)
            .method(
                FnDecl::new("get")
                    .param("self", None)
                    .body(vec![Stmt::ret(Some(Expr::member(Expr::ident("self"), "n")))]),
            )
            .method(
                FnDecl::new("zero")
                    .returns(named("i32"))
                    .body(vec![Stmt::ret(Some(Expr::int(0)))]),
            ),
    )
}

#[test]
fn test_instance_and_static_methods() {
    let result = check_module(vec![
        counter_decl(),
        Stmt::var(
            VarDecl::new("c", Some(Expr::object(vec![("n", Expr::int(1))]))).hint(named("Counter")),
        ),
        let_("v", Expr::method_call(Expr::ident("c"), "get", vec![])),
        let_("w", Expr::method_call(Expr::ident("Counter"), "zero", vec![])),
    ]);
    assert_no_errors(&result);
    assert_eq!(var_type(&result, "v"), "i32");
    assert_eq!(var_type(&result, "w"), "i32");
    insta::assert_snapshot!(listing(&result), @r"
    Counter.get_Counter(Counter) -> i32
    Counter.zero() -> i32
    ");

    let StmtKind::Var(decl) = &result.module.items[3].kind else {
        panic!("expected a declaration");
    };
    let ExprKind::MethodCall { is_static, target, .. } = &decl.init.as_ref().unwrap().kind else {
        panic!("expected a method call");
    };
    assert!(*is_static);
    assert!(target.is_some());
}

#[test]
fn test_unknown_method() {
    let result = check_module(vec![
        counter_decl(),
        Stmt::var(
            VarDecl::new("c", Some(Expr::object(vec![("n", Expr::int(1))]))).hint(named("Counter")),
        ),
        Stmt::expr(Expr::method_call(Expr::ident("c"), "nope", vec![])),
    ]);
    assert_eq!(
        result.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        vec!["Method 'Counter.nope' not found"]
    );
}
