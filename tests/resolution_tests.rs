use std::sync::Arc;
use std::time::{Duration, Instant};

use chainql::{
    BinOp, ChainOptions, ClauseGenerationContext, ElementType, Expr, Lambda, LookupFailure,
    MethodArgument, NodeId, NodeTypeRegistry, Parameter, ParseInfo, QueryChain, QueryModelError,
    chain::ResolutionCache,
    replace::free_parameters,
};
use test_case::test_case;

fn student() -> ElementType {
    ElementType::Object("Student".into())
}

fn start_students(chain: &mut QueryChain) -> NodeId {
    chain
        .start(Expr::data_source("Students", student()), student(), "s")
        .unwrap()
}

fn member(p: &Parameter, name: &str, ty: ElementType) -> Expr {
    p.to_expr().member(name, ty)
}

fn adults() -> MethodArgument {
    let s = Parameter::new("s", student());
    MethodArgument::Lambda(Lambda::unary(
        s.clone(),
        Expr::binary(
            BinOp::GreaterThan,
            member(&s, "age", ElementType::Integer),
            Expr::constant(18i64),
        ),
    ))
}

fn names() -> MethodArgument {
    let s = Parameter::new("s", student());
    MethodArgument::Lambda(Lambda::unary(s.clone(), member(&s, "name", ElementType::String)))
}

fn call(chain: &mut QueryChain, op: &str, source: NodeId, args: Vec<MethodArgument>) -> NodeId {
    chain
        .append_call(NodeTypeRegistry::global(), ParseInfo::new(op, source), args)
        .unwrap()
}

#[test]
fn test_resolution_is_idempotent() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let filtered = call(&mut chain, "where", head, vec![adults()]);
    let projected = call(&mut chain, "select", filtered, vec![names()]);

    let mut ctx = ClauseGenerationContext::new();
    let model = chain.build_with_context(projected, &mut ctx).unwrap();

    let first = chain.resolved_selector(projected, &ctx).unwrap();
    let second = chain.resolved_selector(projected, &ctx).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, model.select().selector()));

    let predicate = chain.resolved_predicate(filtered, &ctx).unwrap();
    assert!(Arc::ptr_eq(
        &predicate,
        &chain.resolved_predicate(filtered, &ctx).unwrap()
    ));
}

#[test]
fn test_no_dangling_parameters_along_the_chain() {
    let record = ElementType::Record(vec![
        ("name".into(), ElementType::String),
        ("age".into(), ElementType::Integer),
    ]);

    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let filtered = call(&mut chain, "where", head, vec![adults()]);

    let s = Parameter::new("s", student());
    let to_record = Lambda::unary(
        s.clone(),
        Expr::record([
            ("name", member(&s, "name", ElementType::String)),
            ("age", member(&s, "age", ElementType::Integer)),
        ]),
    );
    let projected = call(&mut chain, "select", filtered, vec![MethodArgument::Lambda(to_record)]);

    let r = Parameter::new("r", record.clone());
    let older = Lambda::unary(
        r.clone(),
        Expr::binary(
            BinOp::GreaterThan,
            member(&r, "age", ElementType::Integer),
            Expr::constant(20i64),
        ),
    );
    let refiltered = call(&mut chain, "where", projected, vec![MethodArgument::Lambda(older)]);

    let r2 = Parameter::new("r", record);
    let name_of = Lambda::unary(r2.clone(), member(&r2, "name", ElementType::String));
    let tail = call(&mut chain, "select", refiltered, vec![MethodArgument::Lambda(name_of)]);

    let mut ctx = ClauseGenerationContext::new();
    chain.build_with_context(tail, &mut ctx).unwrap();

    for node in [head, filtered, projected, refiltered, tail] {
        let output = chain.create_parameter_for_output(node).unwrap();
        let resolved = chain.resolve(node, &output, &output.to_expr(), &ctx).unwrap();
        assert!(
            free_parameters(&resolved).is_empty(),
            "dangling parameters after resolving {node}: {resolved}"
        );
    }

    let predicate = chain.resolved_predicate(refiltered, &ctx).unwrap();
    assert_eq!(predicate.to_string(), "({name: [s].name, age: [s].age}.age > 20)");
}

#[test]
fn test_default_element_selector_is_identity_of_key_parameter() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);

    let s = Parameter::new("s", student());
    let by_city = Lambda::unary(s.clone(), member(&s, "city", ElementType::String));
    let grouped = call(&mut chain, "group_by", head, vec![MethodArgument::Lambda(by_city)]);

    let mut ctx = ClauseGenerationContext::new();
    let model = chain.build_with_context(grouped, &mut ctx).unwrap();

    let implicit = chain.resolved_element_selector(grouped, &ctx).unwrap();
    let explicit = chain.resolve(head, &s, &s.to_expr(), &ctx).unwrap();
    assert_eq!(*implicit, explicit);

    let operator = ctx.result_operator(chain.node(grouped).unwrap()).unwrap();
    assert_eq!(operator.to_string(), "GroupBy([s].city, [s])");
    assert_eq!(model.result_operators().len(), 1);
}

#[test]
fn test_explicit_element_selector_is_resolved() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);

    let s = Parameter::new("s", student());
    let by_city = Lambda::unary(s.clone(), member(&s, "city", ElementType::String));
    let grouped = call(
        &mut chain,
        "group_by",
        head,
        vec![MethodArgument::Lambda(by_city), names()],
    );

    let model = chain.build(grouped).unwrap();
    assert_eq!(
        model.to_string(),
        "from Student s in Students select [s] => GroupBy([s].city, [s].name)"
    );
    assert_eq!(
        model.output_type().unwrap(),
        ElementType::sequence_of(ElementType::group_of(ElementType::String, ElementType::String))
    );
}

#[test_case("all", vec![adults()] ; "all")]
#[test_case("any", vec![adults()] ; "any with predicate")]
#[test_case("any", vec![] ; "any without predicate")]
#[test_case("count", vec![] ; "count")]
#[test_case("union", vec![MethodArgument::Expression(Expr::data_source("Alumni", student()))] ; "union")]
fn test_terminal_nodes_do_not_resolve(op: &str, args: Vec<MethodArgument>) {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let terminal = call(&mut chain, op, head, args);

    let mut ctx = ClauseGenerationContext::new();
    chain.build_with_context(terminal, &mut ctx).unwrap();

    let x = Parameter::new("x", student());
    let err = chain.resolve(terminal, &x, &x.to_expr(), &ctx).unwrap_err();
    assert!(
        matches!(err, QueryModelError::UnsupportedOperation { ref operation, .. } if operation == "resolve"),
        "unexpected error: {err}"
    );
}

#[test]
fn test_partitions_pass_resolution_through() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let taken = call(
        &mut chain,
        "take",
        head,
        vec![MethodArgument::Expression(Expr::constant(3i64))],
    );

    let mut ctx = ClauseGenerationContext::new();
    chain.build_with_context(taken, &mut ctx).unwrap();

    let output = chain.create_parameter_for_output(taken).unwrap();
    assert_eq!(output.ty(), &student());
    let resolved = chain.resolve(taken, &output, &output.to_expr(), &ctx).unwrap();
    assert_eq!(resolved.to_string(), "[s]");
}

#[test]
fn test_long_filter_chains_resolve_in_one_step() {
    const FILTERS: usize = 5_000;

    let mut chain =
        QueryChain::with_options(ChainOptions::default().with_max_chain_length(FILTERS + 2));
    let head = start_students(&mut chain);
    let mut tail = head;
    for _ in 0..FILTERS {
        tail = call(&mut chain, "where", tail, vec![adults()]);
    }
    let projected = call(&mut chain, "select", tail, vec![names()]);

    // Every filter forwards the head's items
    assert_eq!(chain.node(tail).unwrap().producer(), head);
    assert_eq!(chain.node(projected).unwrap().producer(), projected);

    let started = Instant::now();
    let mut ctx = ClauseGenerationContext::new();
    let model = chain.build_with_context(projected, &mut ctx).unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "build took {:?}",
        started.elapsed()
    );

    assert_eq!(model.body_clauses().len(), FILTERS);
    assert_eq!(
        chain.resolved_predicate(tail, &ctx).unwrap().to_string(),
        "([s].age > 18)"
    );
    assert_eq!(model.select().selector().to_string(), "[s].name");
}

#[test]
fn test_resolution_cache_keeps_the_first_fill() {
    let cache = ResolutionCache::new();
    let ctx = ClauseGenerationContext::new();
    assert!(!cache.is_filled());

    let first = cache
        .get_or_resolve("Where", ctx.id(), || Ok(Expr::constant(1i64)))
        .unwrap();
    let second = cache
        .get_or_resolve("Where", ctx.id(), || panic!("resolved twice"))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.owner(), Some(ctx.id()));

    let other = ClauseGenerationContext::new();
    assert_eq!(
        cache
            .get_or_resolve("Where", other.id(), || Ok(Expr::constant(2i64)))
            .unwrap_err(),
        QueryModelError::AmbiguousResolution { node_type: "Where" }
    );
    assert_eq!(cache.owner(), Some(ctx.id()));
}

#[test]
fn test_type_mismatch_on_resolve() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);

    let mut ctx = ClauseGenerationContext::new();
    chain.build_with_context(head, &mut ctx).unwrap();

    let wrong = Parameter::new("n", ElementType::Integer);
    let err = chain.resolve(head, &wrong, &wrong.to_expr(), &ctx).unwrap_err();
    assert_eq!(
        err,
        QueryModelError::TypeMismatch {
            operation: "resolve through MainSource producing Student".into(),
            element_type: ElementType::Integer,
        }
    );
}

#[test]
fn test_lookup_before_creation() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let filtered = call(&mut chain, "where", head, vec![adults()]);
    let counted = call(&mut chain, "count", filtered, vec![]);

    let ctx = ClauseGenerationContext::new();

    let err = ctx.clause(chain.node(head).unwrap()).unwrap_err();
    assert_eq!(
        err,
        QueryModelError::Lookup(LookupFailure::NotYetCreated {
            node_type: "MainSource",
            what: "clause",
            required: "create_clause",
        })
    );
    assert!(err.to_string().contains("call create_clause"));

    // Resolving the predicate needs the head's from-clause
    let err = chain.resolved_predicate(filtered, &ctx).unwrap_err();
    assert!(matches!(
        err,
        QueryModelError::Lookup(LookupFailure::NotYetCreated { node_type: "MainSource", .. })
    ));

    let err = ctx.result_operator(chain.node(counted).unwrap()).unwrap_err();
    assert!(matches!(
        err,
        QueryModelError::Lookup(LookupFailure::NotYetCreated {
            required: "create_result_operator",
            ..
        })
    ));

    let err = ctx.clause(chain.node(counted).unwrap()).unwrap_err();
    assert_eq!(
        err,
        QueryModelError::Lookup(LookupFailure::NeverCreated {
            node_type: "Count",
            what: "clause",
        })
    );

    let err = ctx.result_operator(chain.node(filtered).unwrap()).unwrap_err();
    assert!(matches!(
        err,
        QueryModelError::Lookup(LookupFailure::NeverCreated { node_type: "Where", .. })
    ));
}

#[test]
fn test_resolving_under_a_second_context_fails() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let filtered = call(&mut chain, "where", head, vec![adults()]);

    let mut first = ClauseGenerationContext::new();
    chain.build_with_context(filtered, &mut first).unwrap();

    let mut second = ClauseGenerationContext::new();
    let err = chain.build_with_context(filtered, &mut second).unwrap_err();
    assert_eq!(err, QueryModelError::AmbiguousResolution { node_type: "Where" });
}

#[test]
fn test_building_twice_into_one_context_fails() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);

    let mut ctx = ClauseGenerationContext::new();
    chain.build_with_context(head, &mut ctx).unwrap();
    let err = chain.build_with_context(head, &mut ctx).unwrap_err();
    assert!(matches!(
        err,
        QueryModelError::Lookup(LookupFailure::AlreadyRegistered { .. })
    ));
}

fn shaped(shapes: &[&str]) -> Vec<MethodArgument> {
    shapes
        .iter()
        .map(|shape| match *shape {
            "lambda" => adults(),
            "lambda2" => {
                let a = Parameter::new("a", student());
                let b = Parameter::new("b", student());
                MethodArgument::Lambda(Lambda::new(vec![a.clone(), b], a.to_expr()))
            }
            _ => MethodArgument::Expression(Expr::constant(1i64)),
        })
        .collect()
}

#[test_case("where", &[], "Where" ; "where without predicate")]
#[test_case("where", &["lambda2"], "Where" ; "where with binary lambda")]
#[test_case("where", &["lambda", "lambda"], "Where" ; "where with extra lambda")]
#[test_case("select", &["expr"], "Select" ; "select with expression")]
#[test_case("select_many", &["lambda", "lambda"], "SelectMany" ; "select many with unary result selector")]
#[test_case("order_by_descending", &["lambda2"], "OrderBy" ; "order by with binary key")]
#[test_case("take", &["lambda"], "Take" ; "take with lambda")]
#[test_case("distinct", &["expr"], "Distinct" ; "distinct with argument")]
#[test_case("union", &[], "Union" ; "union without second source")]
#[test_case("first_or_default", &["lambda2"], "FirstOrDefault" ; "first or default with binary predicate")]
#[test_case("element_at", &["lambda"], "ElementAt" ; "element at with lambda")]
#[test_case("fold", &["expr", "lambda"], "Fold" ; "fold with unary accumulator")]
fn test_argument_validation(op: &str, shapes: &[&str], expected: &str) {
    let err = NodeTypeRegistry::global()
        .create(op, shaped(shapes))
        .unwrap_err();
    match err {
        QueryModelError::ArgumentValidation { node_type, .. } => assert_eq!(node_type, expected),
        other => panic!("expected argument validation, got {other}"),
    }
}

#[test]
fn test_rejected_call_leaves_chain_untouched() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let result = chain.append_call(
        NodeTypeRegistry::global(),
        ParseInfo::new("where", head),
        shaped(&["lambda2"]),
    );
    assert!(result.is_err());
    assert_eq!(chain.len(), 1);
}

#[test]
fn test_unknown_operation_and_aliases() {
    let registry = NodeTypeRegistry::global();
    assert!(matches!(
        registry.create("zip", vec![]),
        Err(QueryModelError::UnsupportedOperation { .. })
    ));

    assert_eq!(registry.create("filter", vec![adults()]).unwrap().type_name(), "Where");
    assert_eq!(registry.create("map", vec![names()]).unwrap().type_name(), "Select");
    assert!(registry.names().contains(&"flat_map"));
}

#[test]
fn test_output_parameters() {
    let mut chain = QueryChain::new();
    let head = start_students(&mut chain);
    let projected = chain
        .append_call(
            NodeTypeRegistry::global(),
            ParseInfo::new("select", head).with_identifier("n"),
            vec![names()],
        )
        .unwrap();
    let derived = call(&mut chain, "where", head, vec![adults()]);
    let generated = call(&mut chain, "distinct", head, vec![]);

    let output = chain.create_parameter_for_output(projected).unwrap();
    assert_eq!(output.name(), "n");
    assert_eq!(output.ty(), &ElementType::String);

    let output = chain.create_parameter_for_output(derived).unwrap();
    assert_eq!(output.name(), "s");
    assert_eq!(output.ty(), &student());

    assert_eq!(chain.node(generated).unwrap().identifier(), "_3");

    // Each call yields a distinct symbol
    let again = chain.create_parameter_for_output(derived).unwrap();
    assert_ne!(again.id(), output.id());
}

#[test]
fn test_chain_shape_is_validated() {
    let mut chain = QueryChain::with_options(ChainOptions::default().with_max_chain_length(2));
    let head = start_students(&mut chain);

    let second_head = chain.start(Expr::data_source("Teachers", student()), student(), "t");
    assert!(matches!(
        second_head,
        Err(QueryModelError::ArgumentValidation { node_type: "MainSource", .. })
    ));

    let mut other = QueryChain::new();
    let foreign = start_students(&mut other);
    assert!(
        chain
            .append_call(NodeTypeRegistry::global(), ParseInfo::new("where", foreign), vec![adults()])
            .is_err()
    );

    call(&mut chain, "where", head, vec![adults()]);
    let err = chain
        .append_call(NodeTypeRegistry::global(), ParseInfo::new("distinct", head), vec![])
        .unwrap_err();
    assert!(err.to_string().contains("limited to 2 nodes"));
}
