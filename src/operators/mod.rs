//! Result operators: terminal transforms applied after the clause list.
//!
//! Every operator implements [`ResultOperator`]. The set is open: a backend may
//! add its own operators and hand them to a model through the same trait.
//!
//! | family | operators | strategy |
//! |---|---|---|
//! | quantifier | All, Any | scalar |
//! | aggregate | Count, Sum, Min, Max, Average | scalar |
//! | set | Union, Intersect, Except | collection |
//! | partition | Take, Skip, Distinct | collection |
//! | grouping | GroupBy | collection |
//! | choice | First, Single, Last, ElementAt | single |
//! | fold | Fold | declared, unimplemented |

mod aggregate;
mod choice;
mod fold;
mod grouping;
mod partition;
mod quantifier;
mod set;

pub use aggregate::{AggregateKind, AggregateResultOperator};
pub use choice::{ChoiceKind, ChoiceResultOperator};
pub use fold::FoldResultOperator;
pub use grouping::GroupResultOperator;
pub use partition::{PartitionKind, PartitionResultOperator};
pub use quantifier::{QuantifierKind, QuantifierResultOperator};
pub use set::{SetOperationKind, SetResultOperator};

use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr, Parameter},
    clauses::ExprTransform,
    clone::CloneContext,
    error::{QueryModelError, Result},
    evaluator::{Environment, Evaluator},
    value::Value,
};

/// Tells an executor what shape of result to expect from an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One computed value (aggregates, quantifiers)
    Scalar,
    /// One element of the input sequence
    Single,
    /// A sequence
    Collection,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Scalar => write!(f, "scalar"),
            ExecutionStrategy::Single => write!(f, "single"),
            ExecutionStrategy::Collection => write!(f, "collection"),
        }
    }
}

/// A materialised sequence with its static element type.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemorySequence {
    pub element_type: ElementType,
    pub items: Vec<Value>,
}

impl InMemorySequence {
    pub fn new(element_type: ElementType, items: Vec<Value>) -> Self {
        InMemorySequence {
            element_type,
            items,
        }
    }
}

/// Result of executing a model or a single operator in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum InMemoryOutput {
    Scalar(Value),
    Single(Value),
    Sequence(InMemorySequence),
}

impl InMemoryOutput {
    pub fn strategy(&self) -> ExecutionStrategy {
        match self {
            InMemoryOutput::Scalar(_) => ExecutionStrategy::Scalar,
            InMemoryOutput::Single(_) => ExecutionStrategy::Single,
            InMemoryOutput::Sequence(_) => ExecutionStrategy::Collection,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            InMemoryOutput::Scalar(v) | InMemoryOutput::Single(v) => v,
            InMemoryOutput::Sequence(seq) => Value::Array(seq.items),
        }
    }
}

/// Capability set shared by all result operators.
pub trait ResultOperator: fmt::Debug + fmt::Display + Send + Sync {
    /// Operator name as it appears in diagnostics, e.g. `Sum`.
    fn name(&self) -> &'static str;

    fn execution_strategy(&self) -> Result<ExecutionStrategy>;

    /// Apply the operator to `input`. `env` carries the bindings of enclosing
    /// queries for correlated lambdas.
    fn execute_in_memory(
        &self,
        input: InMemorySequence,
        evaluator: &Evaluator,
        env: &Environment,
    ) -> Result<InMemoryOutput>;

    /// Output type given the input element type. Collection operators return a
    /// sequence type.
    fn result_type(&self, input_element: &ElementType) -> Result<ElementType>;

    fn clone_operator(&self, ctx: &mut CloneContext) -> Result<Arc<dyn ResultOperator>>;

    /// Rebuild the operator with every expression slot passed through `f`.
    fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>>;

    /// Resolved expressions held by the operator.
    fn expressions(&self) -> Vec<&Arc<Expr>>;
}

/// A lambda carried by an operator in both forms.
///
/// `body` is the lambda as written, over `parameter`; in-memory execution binds
/// the parameter to each input item. `resolved` is the same lambda with its
/// parameter resolved through the chain, for backends that translate the
/// clause graph.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorLambda {
    parameter: Parameter,
    body: Arc<Expr>,
    resolved: Arc<Expr>,
}

impl OperatorLambda {
    pub fn new(parameter: Parameter, body: Arc<Expr>, resolved: Arc<Expr>) -> Self {
        OperatorLambda {
            parameter,
            body,
            resolved,
        }
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    pub fn body(&self) -> &Arc<Expr> {
        &self.body
    }

    pub fn resolved(&self) -> &Arc<Expr> {
        &self.resolved
    }

    pub fn result_type(&self) -> ElementType {
        self.body.ty()
    }

    pub fn apply(&self, item: &Value, evaluator: &Evaluator, env: &Environment) -> Result<Value> {
        let scope = env.with_parameter(&self.parameter, item.clone());
        evaluator.eval(&self.body, &scope)
    }

    pub fn clone_with(&self, ctx: &mut CloneContext) -> Result<Self> {
        Ok(OperatorLambda {
            parameter: self.parameter.clone(),
            body: ctx.remap_expr(&self.body)?,
            resolved: ctx.remap_expr(&self.resolved)?,
        })
    }

    pub fn transform(&self, f: &mut ExprTransform<'_>) -> Result<Self> {
        Ok(OperatorLambda {
            parameter: self.parameter.clone(),
            body: f(&self.body)?,
            resolved: f(&self.resolved)?,
        })
    }
}

impl fmt::Display for OperatorLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolved)
    }
}

fn unsupported(node_type: &'static str, operation: &str) -> QueryModelError {
    QueryModelError::UnsupportedOperation {
        node_type,
        operation: operation.to_string(),
    }
}

fn require_sequence(name: &'static str, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(crate::EvalError::TypeError(format!(
            "{name} requires a sequence argument, got {}",
            other.type_name()
        ))
        .into()),
    }
}

fn distinct(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();
    for item in items {
        if !result.contains(&item) {
            result.push(item);
        }
    }
    result
}
