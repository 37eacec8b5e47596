use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr},
    clauses::ExprTransform,
    clone::CloneContext,
    error::{EvalError, Result},
    evaluator::{Environment, Evaluator},
};

use super::{ExecutionStrategy, InMemoryOutput, InMemorySequence, ResultOperator, distinct};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Take,
    Skip,
    Distinct,
}

/// `Take(n)`, `Skip(n)` and `Distinct()`; the element type passes through.
#[derive(Debug, Clone)]
pub struct PartitionResultOperator {
    kind: PartitionKind,
    count: Option<Arc<Expr>>,
}

impl PartitionResultOperator {
    pub fn take(count: Arc<Expr>) -> Self {
        PartitionResultOperator {
            kind: PartitionKind::Take,
            count: Some(count),
        }
    }

    pub fn skip(count: Arc<Expr>) -> Self {
        PartitionResultOperator {
            kind: PartitionKind::Skip,
            count: Some(count),
        }
    }

    pub fn distinct() -> Self {
        PartitionResultOperator {
            kind: PartitionKind::Distinct,
            count: None,
        }
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    pub fn count(&self) -> Option<&Arc<Expr>> {
        self.count.as_ref()
    }

    fn eval_count(&self, evaluator: &Evaluator, env: &Environment) -> Result<usize> {
        let Some(count) = &self.count else {
            return Ok(0);
        };
        match evaluator.eval(count, env)? {
            crate::Value::Integer(n) => Ok(n.max(0) as usize),
            other => Err(EvalError::TypeError(format!(
                "{} count must be an integer, got {}",
                self.name(),
                other.type_name()
            ))
            .into()),
        }
    }
}

impl ResultOperator for PartitionResultOperator {
    fn name(&self) -> &'static str {
        match self.kind {
            PartitionKind::Take => "Take",
            PartitionKind::Skip => "Skip",
            PartitionKind::Distinct => "Distinct",
        }
    }

    fn execution_strategy(&self) -> Result<ExecutionStrategy> {
        Ok(ExecutionStrategy::Collection)
    }

    fn execute_in_memory(
        &self,
        input: InMemorySequence,
        evaluator: &Evaluator,
        env: &Environment,
    ) -> Result<InMemoryOutput> {
        let items = match self.kind {
            PartitionKind::Take => {
                let n = self.eval_count(evaluator, env)?;
                input.items.into_iter().take(n).collect()
            }
            PartitionKind::Skip => {
                let n = self.eval_count(evaluator, env)?;
                input.items.into_iter().skip(n).collect()
            }
            PartitionKind::Distinct => distinct(input.items),
        };
        Ok(InMemoryOutput::Sequence(InMemorySequence::new(
            input.element_type,
            items,
        )))
    }

    fn result_type(&self, input_element: &ElementType) -> Result<ElementType> {
        Ok(ElementType::sequence_of(input_element.clone()))
    }

    fn clone_operator(&self, ctx: &mut CloneContext) -> Result<Arc<dyn ResultOperator>> {
        let count = match &self.count {
            Some(c) => Some(ctx.remap_expr(c)?),
            None => None,
        };
        Ok(Arc::new(PartitionResultOperator {
            kind: self.kind,
            count,
        }))
    }

    fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>> {
        let count = match &self.count {
            Some(c) => Some(f(c)?),
            None => None,
        };
        Ok(Arc::new(PartitionResultOperator {
            kind: self.kind,
            count,
        }))
    }

    fn expressions(&self) -> Vec<&Arc<Expr>> {
        self.count.iter().collect()
    }
}

impl fmt::Display for PartitionResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.count {
            Some(c) => write!(f, "{}({c})", self.name()),
            None => write!(f, "{}()", self.name()),
        }
    }
}
