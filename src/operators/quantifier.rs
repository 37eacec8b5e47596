use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr},
    clauses::ExprTransform,
    clone::CloneContext,
    error::Result,
    evaluator::{Environment, Evaluator},
    value::Value,
};

use super::{
    ExecutionStrategy, InMemoryOutput, InMemorySequence, OperatorLambda, ResultOperator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantifierKind {
    All,
    Any,
}

/// `All(predicate)` and `Any(predicate?)`.
#[derive(Debug, Clone)]
pub struct QuantifierResultOperator {
    kind: QuantifierKind,
    predicate: Option<OperatorLambda>,
}

impl QuantifierResultOperator {
    pub fn all(predicate: OperatorLambda) -> Self {
        QuantifierResultOperator {
            kind: QuantifierKind::All,
            predicate: Some(predicate),
        }
    }

    pub fn any(predicate: Option<OperatorLambda>) -> Self {
        QuantifierResultOperator {
            kind: QuantifierKind::Any,
            predicate,
        }
    }

    pub fn kind(&self) -> QuantifierKind {
        self.kind
    }

    pub fn predicate(&self) -> Option<&OperatorLambda> {
        self.predicate.as_ref()
    }

    fn test(&self, item: &Value, evaluator: &Evaluator, env: &Environment) -> Result<bool> {
        match &self.predicate {
            Some(predicate) => Ok(predicate.apply(item, evaluator, env)?.as_bool()),
            None => Ok(true),
        }
    }
}

impl ResultOperator for QuantifierResultOperator {
    fn name(&self) -> &'static str {
        match self.kind {
            QuantifierKind::All => "All",
            QuantifierKind::Any => "Any",
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
        let result = match self.kind {
            QuantifierKind::All => {
                let mut all = true;
                for item in &input.items {
                    if !self.test(item, evaluator, env)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            QuantifierKind::Any => {
                let mut any = false;
                for item in &input.items {
                    if self.test(item, evaluator, env)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        };
        Ok(InMemoryOutput::Scalar(Value::Boolean(result)))
    }

    fn result_type(&self, _input_element: &ElementType) -> Result<ElementType> {
        Ok(ElementType::Boolean)
    }

    fn clone_operator(&self, ctx: &mut CloneContext) -> Result<Arc<dyn ResultOperator>> {
        let predicate = match &self.predicate {
            Some(p) => Some(p.clone_with(ctx)?),
            None => None,
        };
        Ok(Arc::new(QuantifierResultOperator {
            kind: self.kind,
            predicate,
        }))
    }

    fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>> {
        let predicate = match &self.predicate {
            Some(p) => Some(p.transform(f)?),
            None => None,
        };
        Ok(Arc::new(QuantifierResultOperator {
            kind: self.kind,
            predicate,
        }))
    }

    fn expressions(&self) -> Vec<&Arc<Expr>> {
        self.predicate.iter().map(OperatorLambda::resolved).collect()
    }
}

impl fmt::Display for QuantifierResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Some(p) => write!(f, "{}({p})", self.name()),
            None => write!(f, "{}()", self.name()),
        }
    }
}
