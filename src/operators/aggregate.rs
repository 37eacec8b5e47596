use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::{
    ast::{ElementType, Expr},
    clauses::ExprTransform,
    clone::CloneContext,
    error::{EvalError, QueryModelError, Result},
    evaluator::{Environment, Evaluator, compare_values},
    value::Value,
};

use super::{
    ExecutionStrategy, InMemoryOutput, InMemorySequence, OperatorLambda, ResultOperator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
    Average,
}

/// Scalar aggregates.
///
/// The optional lambda is a predicate for `Count` and a selector for the other
/// kinds.
#[derive(Debug, Clone)]
pub struct AggregateResultOperator {
    kind: AggregateKind,
    lambda: Option<OperatorLambda>,
}

impl AggregateResultOperator {
    pub fn new(kind: AggregateKind, lambda: Option<OperatorLambda>) -> Self {
        AggregateResultOperator { kind, lambda }
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn lambda(&self) -> Option<&OperatorLambda> {
        self.lambda.as_ref()
    }

    /// Type of the values actually folded.
    fn folded_type(&self, input_element: &ElementType) -> ElementType {
        match (&self.lambda, self.kind) {
            (Some(selector), kind) if kind != AggregateKind::Count => selector.result_type(),
            _ => input_element.clone(),
        }
    }

    fn check_inferred(&self, values: &[Value]) -> Result<()> {
        match values.iter().find(|v| **v != Value::Null) {
            Some(first) if !first.element_type().is_numeric() => {
                Err(self.mismatch(first.element_type()))
            }
            _ => Ok(()),
        }
    }

    fn mismatch(&self, element_type: ElementType) -> QueryModelError {
        QueryModelError::TypeMismatch {
            operation: self.name().to_string(),
            element_type,
        }
    }
}

impl ResultOperator for AggregateResultOperator {
    fn name(&self) -> &'static str {
        match self.kind {
            AggregateKind::Count => "Count",
            AggregateKind::Sum => "Sum",
            AggregateKind::Min => "Min",
            AggregateKind::Max => "Max",
            AggregateKind::Average => "Average",
        }
    }

    fn execution_strategy(&self) -> Result<ExecutionStrategy> {
        Ok(ExecutionStrategy::Scalar)
    }

    fn execute_in_memory(
        &self,
        input: InMemorySequence,
        evaluator: &Evaluator,
        env: &Environment,
    ) -> Result<InMemoryOutput> {
        // Type rules are checked up front so an unsupported element type fails
        // even on an empty sequence.
        let result_type = self.result_type(&input.element_type)?;

        if self.kind == AggregateKind::Count {
            let count = match &self.lambda {
                Some(predicate) => {
                    let mut n = 0i64;
                    for item in &input.items {
                        if predicate.apply(item, evaluator, env)?.as_bool() {
                            n += 1;
                        }
                    }
                    n
                }
                None => input.items.len() as i64,
            };
            return Ok(InMemoryOutput::Scalar(Value::Integer(count)));
        }

        let values = match &self.lambda {
            Some(selector) => {
                let mut projected = Vec::with_capacity(input.items.len());
                for item in &input.items {
                    projected.push(selector.apply(item, evaluator, env)?);
                }
                projected
            }
            None => input.items,
        };

        // Untyped input (JSON rows, untyped flattening) is typed from its
        // first non-null value before folding
        if matches!(self.kind, AggregateKind::Sum | AggregateKind::Average)
            && self.folded_type(&input.element_type) == ElementType::Any
        {
            self.check_inferred(&values)?;
        }

        let value = match self.kind {
            AggregateKind::Sum => sum(self.name(), &values, &result_type)?,
            AggregateKind::Average => average(self.name(), &values)?,
            AggregateKind::Min => extremum(&values, Ordering::Less),
            AggregateKind::Max => extremum(&values, Ordering::Greater),
            AggregateKind::Count => Value::Integer(values.len() as i64),
        };
        Ok(InMemoryOutput::Scalar(value))
    }

    fn result_type(&self, input_element: &ElementType) -> Result<ElementType> {
        let folded = self.folded_type(input_element);
        match self.kind {
            AggregateKind::Count => Ok(ElementType::Integer),
            AggregateKind::Sum if folded.is_numeric() || folded == ElementType::Any => Ok(folded),
            AggregateKind::Average if folded.is_numeric() || folded == ElementType::Any => {
                Ok(ElementType::Float)
            }
            AggregateKind::Min | AggregateKind::Max if folded.is_comparable() => Ok(folded),
            _ => Err(self.mismatch(folded)),
        }
    }

    fn clone_operator(&self, ctx: &mut CloneContext) -> Result<Arc<dyn ResultOperator>> {
        let lambda = match &self.lambda {
            Some(l) => Some(l.clone_with(ctx)?),
            None => None,
        };
        Ok(Arc::new(AggregateResultOperator::new(self.kind, lambda)))
    }

    fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>> {
        let lambda = match &self.lambda {
            Some(l) => Some(l.transform(f)?),
            None => None,
        };
        Ok(Arc::new(AggregateResultOperator::new(self.kind, lambda)))
    }

    fn expressions(&self) -> Vec<&Arc<Expr>> {
        self.lambda.iter().map(OperatorLambda::resolved).collect()
    }
}

impl fmt::Display for AggregateResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lambda {
            Some(l) => write!(f, "{}({l})", self.name()),
            None => write!(f, "{}()", self.name()),
        }
    }
}

fn to_decimal(name: &str, value: &Value) -> Result<Option<Decimal>> {
    match value {
        Value::Integer(n) => Ok(Some(Decimal::from(*n))),
        Value::Float(n) => Decimal::from_f64(*n).map(Some).ok_or_else(|| {
            EvalError::TypeError(format!("{name} cannot fold non-finite value {n}")).into()
        }),
        Value::Null => Ok(None),
        other => Err(EvalError::TypeError(format!(
            "{name} requires numeric values, got {}",
            other.type_name()
        ))
        .into()),
    }
}

/// Sum of an empty sequence is the additive identity of the element type.
fn sum(name: &str, values: &[Value], result_type: &ElementType) -> Result<Value> {
    let mut total = Decimal::ZERO;
    let mut has_float = *result_type == ElementType::Float;

    for value in values {
        if matches!(value, Value::Float(_)) {
            has_float = true;
        }
        if let Some(d) = to_decimal(name, value)? {
            total = total
                .checked_add(d)
                .ok_or_else(|| EvalError::TypeError(format!("{name} overflowed")))?;
        }
    }

    if has_float {
        Ok(Value::Float(total.to_f64().unwrap_or(f64::NAN)))
    } else {
        total
            .to_i64()
            .map(Value::Integer)
            .ok_or_else(|| EvalError::TypeError(format!("{name} overflowed")).into())
    }
}

fn average(name: &str, values: &[Value]) -> Result<Value> {
    let mut total = Decimal::ZERO;
    let mut count = 0u32;

    for value in values {
        if let Some(d) = to_decimal(name, value)? {
            total = total
                .checked_add(d)
                .ok_or_else(|| EvalError::TypeError(format!("{name} overflowed")))?;
            count += 1;
        }
    }

    if count == 0 {
        return Ok(Value::Null);
    }

    let mean = total / Decimal::from(count);
    Ok(Value::Float(mean.to_f64().unwrap_or(f64::NAN)))
}

/// Smallest (`Less`) or largest (`Greater`) non-null value; null when empty.
fn extremum(values: &[Value], wanted: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in values.iter().filter(|v| **v != Value::Null) {
        best = match best {
            Some(current) if compare_values(value, current) != wanted => Some(current),
            _ => Some(value),
        };
    }
    best.cloned().unwrap_or(Value::Null)
}
