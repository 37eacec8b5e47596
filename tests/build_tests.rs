use chainql::{
    BinOp, BodyClause, ClauseGenerationContext, ElementType, Expr, FromKind, Lambda,
    MethodArgument, NodeId, NodeTypeRegistry, Parameter, ParseInfo, QueryChain, QueryModelError,
    clauses::{Clause, ClauseRef},
};

fn student() -> ElementType {
    ElementType::Object("Student".into())
}

fn course() -> ElementType {
    ElementType::Object("Course".into())
}

fn call(chain: &mut QueryChain, op: &str, source: NodeId, args: Vec<MethodArgument>) -> NodeId {
    chain
        .append_call(NodeTypeRegistry::global(), ParseInfo::new(op, source), args)
        .unwrap()
}

fn lambda(param: &str, ty: ElementType, body: impl FnOnce(&Parameter) -> Expr) -> MethodArgument {
    let p = Parameter::new(param, ty);
    let body = body(&p);
    MethodArgument::Lambda(Lambda::unary(p, body))
}

fn students() -> (QueryChain, NodeId) {
    let mut chain = QueryChain::new();
    let head = chain
        .start(Expr::data_source("Students", student()), student(), "s")
        .unwrap();
    (chain, head)
}

fn age_over(p: &Parameter, n: i64) -> Expr {
    Expr::binary(
        BinOp::GreaterThan,
        p.to_expr().member("age", ElementType::Integer),
        Expr::constant(n),
    )
}

#[test]
fn test_students_end_to_end() {
    let (mut chain, head) = students();
    let filtered = call(
        &mut chain,
        "where",
        head,
        vec![lambda("s", student(), |s| age_over(s, 18))],
    );
    let projected = call(
        &mut chain,
        "select",
        filtered,
        vec![lambda("s", student(), |s| {
            s.to_expr().member("name", ElementType::String)
        })],
    );

    let model = chain.build(projected).unwrap();

    assert_eq!(model.main_from().kind(), FromKind::Main);
    assert_eq!(model.body_clauses().len(), 1);
    assert!(matches!(model.body_clauses()[0], BodyClause::Where(_)));
    assert!(model.result_operators().is_empty());

    let clauses = model.clauses();
    assert_eq!(clauses.len(), 3);
    assert!(matches!(clauses[0], ClauseRef::MainFrom(_)));
    assert!(matches!(clauses[2], ClauseRef::Select(_)));

    match model.select().selector().as_ref() {
        Expr::Member { object, member, .. } => {
            assert_eq!(member, "name");
            match object.as_ref() {
                Expr::SourceRef(source) => assert_eq!(source.clause(), model.main_from().id()),
                other => panic!("expected a clause reference, got {other}"),
            }
        }
        other => panic!("expected a member access, got {other}"),
    }

    assert_eq!(
        model.to_string(),
        "from Student s in Students where ([s].age > 18) select [s].name"
    );
    assert_eq!(model.output_type().unwrap(), ElementType::sequence_of(ElementType::String));
}

#[test]
fn test_interim_select_is_folded_into_later_clauses() {
    let (mut chain, head) = students();
    let names = call(
        &mut chain,
        "select",
        head,
        vec![lambda("s", student(), |s| {
            s.to_expr().member("name", ElementType::String)
        })],
    );
    let long = call(
        &mut chain,
        "where",
        names,
        vec![lambda("n", ElementType::String, |n| {
            Expr::binary(
                BinOp::GreaterThan,
                n.to_expr().call("length", vec![]),
                Expr::constant(3i64),
            )
        })],
    );

    let model = chain.build(long).unwrap();
    assert_eq!(
        model.to_string(),
        "from Student s in Students where ([s].name.length() > 3) select [s].name"
    );
}

#[test]
fn test_select_many_over_member_is_a_member_from() {
    let (mut chain, head) = students();
    let courses = ElementType::sequence_of(course());

    let s = Parameter::new("s", student());
    let collection = Lambda::unary(s.clone(), s.to_expr().member("courses", courses));
    let outer = Parameter::new("s", student());
    let inner = Parameter::new("c", course());
    let result = Lambda::new(
        vec![outer.clone(), inner.clone()],
        Expr::record([
            ("student", outer.to_expr().member("name", ElementType::String)),
            ("course", inner.to_expr().member("title", ElementType::String)),
        ]),
    );
    let flattened = call(
        &mut chain,
        "select_many",
        head,
        vec![MethodArgument::Lambda(collection), MethodArgument::Lambda(result)],
    );

    let model = chain.build(flattened).unwrap();
    let BodyClause::AdditionalFrom(from) = &model.body_clauses()[0] else {
        panic!("expected an additional from clause");
    };
    assert_eq!(from.kind(), FromKind::Member);
    assert_eq!(from.item_name(), "c");
    assert_eq!(from.item_type(), &course());
    assert_eq!(
        model.to_string(),
        "from Student s in Students from Course c in [s].courses \
         select {student: [s].name, course: [c].title}"
    );
}

#[test]
fn test_select_many_over_correlated_sub_query() {
    let (mut chain, head) = students();
    let s = Parameter::new("s", student());

    // Courses of the outer student, built as a chain of its own
    let mut inner_chain = QueryChain::new();
    let inner_head = inner_chain
        .start(Expr::data_source("Courses", course()), course(), "c")
        .unwrap();
    let outer_student = s.clone();
    let enrolled = call(
        &mut inner_chain,
        "where",
        inner_head,
        vec![lambda("c", course(), move |c| {
            Expr::binary(
                BinOp::Equal,
                c.to_expr().member("student_id", ElementType::Integer),
                outer_student.to_expr().member("id", ElementType::Integer),
            )
        })],
    );
    let inner_model = inner_chain.build(enrolled).unwrap();
    assert_eq!(
        inner_model.to_string(),
        "from Course c in Courses where ([c].student_id == s.id) select [c]"
    );

    let collection = Lambda::unary(s.clone(), Expr::sub_query(inner_model));
    let flattened = call(
        &mut chain,
        "select_many",
        head,
        vec![MethodArgument::Lambda(collection)],
    );

    let mut ctx = ClauseGenerationContext::new();
    let model = chain.build_with_context(flattened, &mut ctx).unwrap();
    let BodyClause::AdditionalFrom(from) = &model.body_clauses()[0] else {
        panic!("expected an additional from clause");
    };
    assert_eq!(from.kind(), FromKind::SubQuery);
    assert_eq!(from.item_type(), &course());
    assert_eq!(
        from.from_expression().to_string(),
        "{from Course c in Courses where ([c].student_id == [s].id) select [c]}"
    );

    // Without a result selector the items are the flattened courses
    let output = chain.create_parameter_for_output(flattened).unwrap();
    assert_eq!(output.ty(), &course());
    assert!(matches!(
        ctx.clause(chain.node(flattened).unwrap()).unwrap(),
        Clause::Body(BodyClause::AdditionalFrom(_))
    ));
}

#[test]
fn test_select_many_over_other_source_is_additional_from() {
    let (mut chain, head) = students();
    let flattened = call(
        &mut chain,
        "flat_map",
        head,
        vec![lambda("s", student(), |_| Expr::data_source("Courses", course()))],
    );

    let model = chain.build(flattened).unwrap();
    let BodyClause::AdditionalFrom(from) = &model.body_clauses()[0] else {
        panic!("expected an additional from clause");
    };
    assert_eq!(from.kind(), FromKind::Additional);
    assert_eq!(model.select().selector().to_string(), "[_1]");
}

#[test]
fn test_then_by_extends_order_by() {
    let (mut chain, head) = students();
    let ordered = call(
        &mut chain,
        "order_by",
        head,
        vec![lambda("s", student(), |s| {
            s.to_expr().member("last_name", ElementType::String)
        })],
    );
    let then = call(
        &mut chain,
        "then_by_descending",
        ordered,
        vec![lambda("s", student(), |s| s.to_expr().member("age", ElementType::Integer))],
    );

    let mut ctx = ClauseGenerationContext::new();
    let model = chain.build_with_context(then, &mut ctx).unwrap();
    assert_eq!(model.body_clauses().len(), 1);
    assert_eq!(
        model.to_string(),
        "from Student s in Students orderby [s].last_name asc, [s].age desc select [s]"
    );

    // Both nodes map to the same order-by clause
    let first = ctx.clause(chain.node(ordered).unwrap()).unwrap();
    let second = ctx.clause(chain.node(then).unwrap()).unwrap();
    match (first, second) {
        (Clause::Body(a), Clause::Body(b)) => assert_eq!(a.id(), b.id()),
        _ => panic!("expected body clauses"),
    }
}

#[test]
fn test_then_by_requires_order_by() {
    let (mut chain, head) = students();
    let filtered = call(
        &mut chain,
        "where",
        head,
        vec![lambda("s", student(), |s| age_over(s, 18))],
    );
    let then = call(
        &mut chain,
        "then_by",
        filtered,
        vec![lambda("s", student(), |s| s.to_expr().member("age", ElementType::Integer))],
    );

    let err = chain.build(then).unwrap_err();
    assert!(matches!(
        err,
        QueryModelError::ArgumentValidation { node_type: "ThenBy", .. }
    ));
}

#[test]
fn test_clause_after_result_operator_is_rejected() {
    let (mut chain, head) = students();
    let taken = call(
        &mut chain,
        "take",
        head,
        vec![MethodArgument::Expression(Expr::constant(3i64))],
    );
    let filtered = call(
        &mut chain,
        "where",
        taken,
        vec![lambda("s", student(), |s| age_over(s, 18))],
    );

    let err = chain.build(filtered).unwrap_err();
    assert_eq!(
        err,
        QueryModelError::UnsupportedOperation {
            node_type: "Where",
            operation: "a clause after the result operator Take".into(),
        }
    );
}

#[test]
fn test_result_operators_are_recorded_in_context() {
    let (mut chain, head) = students();
    let filtered = call(
        &mut chain,
        "where",
        head,
        vec![lambda("s", student(), |s| age_over(s, 18))],
    );
    let distinct = call(&mut chain, "distinct", filtered, vec![]);
    let counted = call(
        &mut chain,
        "count",
        distinct,
        vec![lambda("x", student(), |x| age_over(x, 30))],
    );

    let mut ctx = ClauseGenerationContext::new();
    let model = chain.build_with_context(counted, &mut ctx).unwrap();

    assert_eq!(ctx.clause_count(), 2);
    assert_eq!(ctx.operator_count(), 2);
    let count = ctx.result_operator(chain.node(counted).unwrap()).unwrap();
    assert_eq!(count.name(), "Count");
    assert_eq!(count.to_string(), "Count(([s].age > 30))");
    assert_eq!(
        model.to_string(),
        "from Student s in Students where ([s].age > 18) select [s] => Distinct() => Count(([s].age > 30))"
    );
    assert_eq!(model.output_type().unwrap(), ElementType::Integer);
}

#[test]
fn test_fold_builds_but_reports_unsupported() {
    let (mut chain, head) = students();
    let acc = Parameter::new("acc", ElementType::Integer);
    let s = Parameter::new("s", student());
    let func = Lambda::new(
        vec![acc.clone(), s.clone()],
        Expr::binary(
            BinOp::Add,
            acc.to_expr(),
            s.to_expr().member("age", ElementType::Integer),
        ),
    );
    let folded = call(
        &mut chain,
        "fold",
        head,
        vec![
            MethodArgument::Expression(Expr::constant(0i64)),
            MethodArgument::Lambda(func),
        ],
    );

    let model = chain.build(folded).unwrap();
    assert_eq!(
        model.to_string(),
        "from Student s in Students select [s] => Fold(0, (acc, s) => (acc + s.age))"
    );
    assert!(matches!(
        model.output_type(),
        Err(QueryModelError::UnsupportedOperation { node_type: "Fold", .. })
    ));
}
