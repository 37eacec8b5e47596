use std::sync::Arc;

use chainql::{
    BinOp, CloneContext, ElementType, Environment, EvalError, Evaluator, ExecutionStrategy, Expr,
    InMemoryOutput, InMemorySequence, Lambda, Parameter, QueryModelError, ResultOperator, Value,
    operators::{
        AggregateKind, AggregateResultOperator, ChoiceKind, ChoiceResultOperator,
        FoldResultOperator, GroupResultOperator, OperatorLambda, PartitionResultOperator,
        QuantifierResultOperator, SetOperationKind, SetResultOperator,
    },
};
use test_case::test_case;

fn ints(values: &[i64]) -> InMemorySequence {
    InMemorySequence::new(
        ElementType::Integer,
        values.iter().map(|n| Value::Integer(*n)).collect(),
    )
}

fn run(op: &dyn ResultOperator, input: InMemorySequence) -> Result<InMemoryOutput, QueryModelError> {
    op.execute_in_memory(input, &Evaluator::new(), &Environment::new())
}

/// `x => x <op> n` over integers
fn compare(op: BinOp, n: i64) -> OperatorLambda {
    let x = Parameter::new("x", ElementType::Integer);
    let body = Arc::new(Expr::binary(op, x.to_expr(), Expr::constant(n)));
    OperatorLambda::new(x, Arc::clone(&body), body)
}

fn scalar(output: InMemoryOutput) -> Value {
    match output {
        InMemoryOutput::Scalar(v) => v,
        other => panic!("expected a scalar, got {other:?}"),
    }
}

fn items(output: InMemoryOutput) -> Vec<Value> {
    match output {
        InMemoryOutput::Sequence(seq) => seq.items,
        other => panic!("expected a sequence, got {other:?}"),
    }
}

#[test]
fn test_sum_of_empty_integers_is_zero() {
    let sum = AggregateResultOperator::new(AggregateKind::Sum, None);
    assert_eq!(scalar(run(&sum, ints(&[])).unwrap()), Value::Integer(0));

    let floats = InMemorySequence::new(ElementType::Float, vec![]);
    assert_eq!(scalar(run(&sum, floats).unwrap()), Value::Float(0.0));
}

#[test]
fn test_sum_over_strings_is_a_type_mismatch() {
    let sum = AggregateResultOperator::new(AggregateKind::Sum, None);

    // Checked from the element type, before looking at any item
    let empty = InMemorySequence::new(ElementType::String, vec![]);
    let err = run(&sum, empty).unwrap_err();
    assert_eq!(
        err,
        QueryModelError::TypeMismatch {
            operation: "Sum".into(),
            element_type: ElementType::String,
        }
    );
    assert!(err.to_string().contains("string"));

    assert!(matches!(
        sum.result_type(&ElementType::String),
        Err(QueryModelError::TypeMismatch { .. })
    ));
}

#[test_case(AggregateKind::Sum, "Sum" ; "sum")]
#[test_case(AggregateKind::Average, "Average" ; "average")]
fn test_untyped_strings_are_a_type_mismatch(kind: AggregateKind, operation: &str) {
    let op = AggregateResultOperator::new(kind, None);
    let untyped = InMemorySequence::new(
        ElementType::Any,
        vec![Value::Null, Value::from("a"), Value::from("b")],
    );

    assert_eq!(
        run(&op, untyped).unwrap_err(),
        QueryModelError::TypeMismatch {
            operation: operation.into(),
            element_type: ElementType::String,
        }
    );
}

#[test]
fn test_sum_over_untyped_rows_through_a_selector() {
    let row = Parameter::new("r", ElementType::Any);
    let body = Arc::new(row.to_expr().member("name", ElementType::Any));
    let sum = AggregateResultOperator::new(
        AggregateKind::Sum,
        Some(OperatorLambda::new(row, Arc::clone(&body), body)),
    );
    let rows = InMemorySequence::new(
        ElementType::Any,
        chainql::convert::json_rows(serde_json::json!([{"name": "Ada"}, {"name": "Eve"}])),
    );

    assert!(matches!(
        run(&sum, rows),
        Err(QueryModelError::TypeMismatch { element_type: ElementType::String, .. })
    ));
}

#[test]
fn test_sum_and_average_mixed_numbers() {
    let values = InMemorySequence::new(
        ElementType::Any,
        vec![Value::Integer(1), Value::Float(2.5), Value::Null],
    );
    let sum = AggregateResultOperator::new(AggregateKind::Sum, None);
    assert_eq!(scalar(run(&sum, values.clone()).unwrap()), Value::Float(3.5));

    let average = AggregateResultOperator::new(AggregateKind::Average, None);
    assert_eq!(scalar(run(&average, values).unwrap()), Value::Float(1.75));
    assert_eq!(scalar(run(&average, ints(&[])).unwrap()), Value::Null);
}

#[test_case(AggregateKind::Count, Value::Integer(4) ; "count")]
#[test_case(AggregateKind::Sum, Value::Integer(10) ; "sum")]
#[test_case(AggregateKind::Min, Value::Integer(1) ; "min")]
#[test_case(AggregateKind::Max, Value::Integer(4) ; "max")]
#[test_case(AggregateKind::Average, Value::Float(2.5) ; "average")]
fn test_aggregates(kind: AggregateKind, expected: Value) {
    let op = AggregateResultOperator::new(kind, None);
    assert_eq!(op.execution_strategy().unwrap(), ExecutionStrategy::Scalar);
    assert_eq!(scalar(run(&op, ints(&[3, 1, 4, 2])).unwrap()), expected);
}

#[test]
fn test_count_with_predicate_and_string_extremes() {
    let count = AggregateResultOperator::new(AggregateKind::Count, Some(compare(BinOp::GreaterThan, 2)));
    assert_eq!(scalar(run(&count, ints(&[3, 1, 4, 2])).unwrap()), Value::Integer(2));

    let words = InMemorySequence::new(
        ElementType::String,
        vec!["pear".into(), "apple".into(), "fig".into()],
    );
    let min = AggregateResultOperator::new(AggregateKind::Min, None);
    assert_eq!(scalar(run(&min, words.clone()).unwrap()), Value::from("apple"));
    let max = AggregateResultOperator::new(AggregateKind::Max, None);
    assert_eq!(scalar(run(&max, words).unwrap()), Value::from("pear"));

    let average = AggregateResultOperator::new(AggregateKind::Average, None);
    assert!(matches!(
        average.result_type(&ElementType::Boolean),
        Err(QueryModelError::TypeMismatch { element_type: ElementType::Boolean, .. })
    ));
}

#[test]
fn test_quantifiers() {
    let all = QuantifierResultOperator::all(compare(BinOp::GreaterThan, 0));
    assert_eq!(scalar(run(&all, ints(&[1, 2])).unwrap()), Value::Boolean(true));
    assert_eq!(scalar(run(&all, ints(&[1, -2])).unwrap()), Value::Boolean(false));
    assert_eq!(scalar(run(&all, ints(&[])).unwrap()), Value::Boolean(true));

    let any = QuantifierResultOperator::any(None);
    assert_eq!(scalar(run(&any, ints(&[])).unwrap()), Value::Boolean(false));
    assert_eq!(scalar(run(&any, ints(&[7])).unwrap()), Value::Boolean(true));

    assert_eq!(any.result_type(&ElementType::Integer).unwrap(), ElementType::Boolean);
    assert_eq!(all.execution_strategy().unwrap(), ExecutionStrategy::Scalar);
}

#[test]
fn test_set_operators() {
    let other = Arc::new(Expr::constant(Value::Array(vec![
        Value::Integer(2),
        Value::Integer(5),
    ])));

    let union = SetResultOperator::new(SetOperationKind::Union, Arc::clone(&other));
    assert_eq!(
        items(run(&union, ints(&[1, 2, 2])).unwrap()),
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(5)]
    );

    let intersect = SetResultOperator::new(SetOperationKind::Intersect, Arc::clone(&other));
    assert_eq!(items(run(&intersect, ints(&[1, 2, 2])).unwrap()), vec![Value::Integer(2)]);

    let except = SetResultOperator::new(SetOperationKind::Except, other);
    assert_eq!(items(run(&except, ints(&[1, 2, 1])).unwrap()), vec![Value::Integer(1)]);
    assert_eq!(except.execution_strategy().unwrap(), ExecutionStrategy::Collection);
    assert_eq!(
        except.result_type(&ElementType::Integer).unwrap(),
        ElementType::sequence_of(ElementType::Integer)
    );
}

#[test]
fn test_partitions() {
    let take = PartitionResultOperator::take(Arc::new(Expr::constant(2i64)));
    assert_eq!(
        items(run(&take, ints(&[5, 6, 7])).unwrap()),
        vec![Value::Integer(5), Value::Integer(6)]
    );

    let skip = PartitionResultOperator::skip(Arc::new(Expr::constant(5i64)));
    assert!(items(run(&skip, ints(&[5, 6, 7])).unwrap()).is_empty());

    let negative = PartitionResultOperator::take(Arc::new(Expr::constant(-1i64)));
    assert!(items(run(&negative, ints(&[5])).unwrap()).is_empty());

    let distinct = PartitionResultOperator::distinct();
    assert_eq!(
        items(run(&distinct, ints(&[3, 3, 1, 3])).unwrap()),
        vec![Value::Integer(3), Value::Integer(1)]
    );

    let bad = PartitionResultOperator::take(Arc::new(Expr::constant("two")));
    assert!(matches!(
        run(&bad, ints(&[1])),
        Err(QueryModelError::Evaluation(EvalError::TypeError(_)))
    ));
}

#[test]
fn test_group_keeps_first_key_order() {
    let x = Parameter::new("x", ElementType::Integer);
    let parity = Arc::new(Expr::binary(BinOp::Modulo, x.to_expr(), Expr::constant(2i64)));
    let key = OperatorLambda::new(x.clone(), Arc::clone(&parity), parity);
    let identity = Arc::new(x.to_expr());
    let element = OperatorLambda::new(x, Arc::clone(&identity), identity);
    let group = GroupResultOperator::new("x", key, element);

    let groups = items(run(&group, ints(&[3, 2, 5, 4])).unwrap());
    assert_eq!(
        groups,
        vec![
            Value::Group {
                key: Box::new(Value::Integer(1)),
                elements: vec![Value::Integer(3), Value::Integer(5)],
            },
            Value::Group {
                key: Box::new(Value::Integer(0)),
                elements: vec![Value::Integer(2), Value::Integer(4)],
            },
        ]
    );
    assert_eq!(
        group.result_type(&ElementType::Integer).unwrap(),
        ElementType::sequence_of(ElementType::group_of(ElementType::Integer, ElementType::Integer))
    );
}

#[test]
fn test_choice_operators() {
    let first = ChoiceResultOperator::new(ChoiceKind::First, Some(compare(BinOp::GreaterThan, 1)), false);
    assert_eq!(first.execution_strategy().unwrap(), ExecutionStrategy::Single);
    assert_eq!(
        run(&first, ints(&[1, 2, 3])).unwrap(),
        InMemoryOutput::Single(Value::Integer(2))
    );
    assert_eq!(
        run(&first, ints(&[])).unwrap_err(),
        QueryModelError::Evaluation(EvalError::EmptySequence("First"))
    );

    let last = ChoiceResultOperator::new(ChoiceKind::Last, None, false);
    assert_eq!(
        run(&last, ints(&[1, 2, 3])).unwrap(),
        InMemoryOutput::Single(Value::Integer(3))
    );

    let single = ChoiceResultOperator::new(ChoiceKind::Single, None, true);
    assert_eq!(single.name(), "SingleOrDefault");
    assert_eq!(
        run(&single, ints(&[1, 2])).unwrap_err(),
        QueryModelError::Evaluation(EvalError::MultipleElements("SingleOrDefault"))
    );
    assert_eq!(
        run(&single, ints(&[])).unwrap(),
        InMemoryOutput::Single(Value::Null)
    );

    let at = ChoiceResultOperator::element_at(Arc::new(Expr::constant(1i64)), false);
    assert_eq!(
        run(&at, ints(&[7, 8])).unwrap(),
        InMemoryOutput::Single(Value::Integer(8))
    );
    let beyond = ChoiceResultOperator::element_at(Arc::new(Expr::constant(9i64)), true);
    assert_eq!(run(&beyond, ints(&[7])).unwrap(), InMemoryOutput::Single(Value::Null));
}

#[test]
fn test_fold_is_unsupported_on_every_capability() {
    let acc = Parameter::new("acc", ElementType::Integer);
    let x = Parameter::new("x", ElementType::Integer);
    let func = Lambda::new(
        vec![acc.clone(), x.clone()],
        Expr::binary(BinOp::Add, acc.to_expr(), x.to_expr()),
    );
    let fold = FoldResultOperator::new(Arc::new(Expr::constant(0i64)), func);

    let is_unsupported =
        |err: QueryModelError| matches!(err, QueryModelError::UnsupportedOperation { node_type: "Fold", .. });

    assert!(is_unsupported(fold.execution_strategy().unwrap_err()));
    assert!(is_unsupported(run(&fold, ints(&[1, 2])).unwrap_err()));
    assert!(is_unsupported(fold.result_type(&ElementType::Integer).unwrap_err()));
    assert!(is_unsupported(fold.clone_operator(&mut CloneContext::new()).unwrap_err()));
    assert!(is_unsupported(
        fold.transform_expressions(&mut |e: &Arc<Expr>| Ok(Arc::clone(e)))
            .unwrap_err()
    ));
}

#[test]
fn test_operator_clone_shares_expressions_without_clause_references() {
    let sum = AggregateResultOperator::new(AggregateKind::Sum, Some(compare(BinOp::Multiply, 2)));
    let clone = sum.clone_operator(&mut CloneContext::new()).unwrap();

    assert_eq!(clone.to_string(), sum.to_string());
    assert!(Arc::ptr_eq(clone.expressions()[0], sum.expressions()[0]));
    assert_eq!(scalar(run(clone.as_ref(), ints(&[1, 2])).unwrap()), Value::Integer(6));
}
