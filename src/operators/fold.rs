use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr, Lambda},
    clauses::ExprTransform,
    clone::CloneContext,
    error::Result,
    evaluator::{Environment, Evaluator},
};

use super::{ExecutionStrategy, InMemoryOutput, InMemorySequence, ResultOperator, unsupported};

/// Seeded fold `Fold(seed, (acc, x) => ...)`.
///
/// Recognised so that chains using it build and report cleanly, but no
/// capability is implemented: every call fails with `UnsupportedOperation`.
#[derive(Debug, Clone)]
pub struct FoldResultOperator {
    seed: Arc<Expr>,
    func: Lambda,
}

impl FoldResultOperator {
    pub fn new(seed: Arc<Expr>, func: Lambda) -> Self {
        FoldResultOperator { seed, func }
    }

    pub fn seed(&self) -> &Arc<Expr> {
        &self.seed
    }

    pub fn func(&self) -> &Lambda {
        &self.func
    }
}

impl ResultOperator for FoldResultOperator {
    fn name(&self) -> &'static str {
        "Fold"
    }

    fn execution_strategy(&self) -> Result<ExecutionStrategy> {
        Err(unsupported(self.name(), "execution strategy"))
    }

    fn execute_in_memory(
        &self,
        _input: InMemorySequence,
        _evaluator: &Evaluator,
        _env: &Environment,
    ) -> Result<InMemoryOutput> {
        Err(unsupported(self.name(), "in-memory execution"))
    }

    fn result_type(&self, _input_element: &ElementType) -> Result<ElementType> {
        Err(unsupported(self.name(), "result type inference"))
    }

    fn clone_operator(&self, _ctx: &mut CloneContext) -> Result<Arc<dyn ResultOperator>> {
        Err(unsupported(self.name(), "cloning"))
    }

    fn transform_expressions(&self, _f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>> {
        Err(unsupported(self.name(), "expression transformation"))
    }

    fn expressions(&self) -> Vec<&Arc<Expr>> {
        vec![&self.seed]
    }
}

impl fmt::Display for FoldResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fold({}, {})", self.seed, self.func)
    }
}
