use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr},
    clauses::ExprTransform,
    clone::CloneContext,
    error::Result,
    evaluator::{Environment, Evaluator},
};

use super::{
    ExecutionStrategy, InMemoryOutput, InMemorySequence, ResultOperator, distinct,
    require_sequence,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperationKind {
    Union,
    Intersect,
    Except,
}

/// Combines the query's sequence with a second sequence expression.
///
/// All three operations yield distinct elements in first-seen order.
#[derive(Debug, Clone)]
pub struct SetResultOperator {
    kind: SetOperationKind,
    source2: Arc<Expr>,
}

impl SetResultOperator {
    pub fn new(kind: SetOperationKind, source2: Arc<Expr>) -> Self {
        SetResultOperator { kind, source2 }
    }

    pub fn kind(&self) -> SetOperationKind {
        self.kind
    }

    pub fn source2(&self) -> &Arc<Expr> {
        &self.source2
    }
}

impl ResultOperator for SetResultOperator {
    fn name(&self) -> &'static str {
        match self.kind {
            SetOperationKind::Union => "Union",
            SetOperationKind::Intersect => "Intersect",
            SetOperationKind::Except => "Except",
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
        let second = require_sequence(self.name(), evaluator.eval(&self.source2, env)?)?;

        let items = match self.kind {
            SetOperationKind::Union => distinct(input.items.into_iter().chain(second)),
            SetOperationKind::Intersect => {
                distinct(input.items.into_iter().filter(|item| second.contains(item)))
            }
            SetOperationKind::Except => {
                distinct(input.items.into_iter().filter(|item| !second.contains(item)))
            }
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
        Ok(Arc::new(SetResultOperator::new(
            self.kind,
            ctx.remap_expr(&self.source2)?,
        )))
    }

    fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>> {
        Ok(Arc::new(SetResultOperator::new(self.kind, f(&self.source2)?)))
    }

    fn expressions(&self) -> Vec<&Arc<Expr>> {
        vec![&self.source2]
    }
}

impl fmt::Display for SetResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.source2)
    }
}
