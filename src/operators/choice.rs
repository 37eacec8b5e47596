use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr},
    clauses::ExprTransform,
    clone::CloneContext,
    error::{EvalError, Result},
    evaluator::{Environment, Evaluator},
    value::Value,
};

use super::{
    ExecutionStrategy, InMemoryOutput, InMemorySequence, OperatorLambda, ResultOperator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceKind {
    First,
    Single,
    Last,
    ElementAt,
}

/// Picks one element of the sequence.
///
/// The `or_default` variants yield null instead of failing when nothing
/// matches.
#[derive(Debug, Clone)]
pub struct ChoiceResultOperator {
    kind: ChoiceKind,
    predicate: Option<OperatorLambda>,
    index: Option<Arc<Expr>>,
    or_default: bool,
}

impl ChoiceResultOperator {
    pub fn new(kind: ChoiceKind, predicate: Option<OperatorLambda>, or_default: bool) -> Self {
        ChoiceResultOperator {
            kind,
            predicate,
            index: None,
            or_default,
        }
    }

    pub fn element_at(index: Arc<Expr>, or_default: bool) -> Self {
        ChoiceResultOperator {
            kind: ChoiceKind::ElementAt,
            predicate: None,
            index: Some(index),
            or_default,
        }
    }

    pub fn kind(&self) -> ChoiceKind {
        self.kind
    }

    pub fn or_default(&self) -> bool {
        self.or_default
    }

    fn missing(&self) -> Result<InMemoryOutput> {
        if self.or_default {
            Ok(InMemoryOutput::Single(Value::Null))
        } else {
            Err(EvalError::EmptySequence(self.name()).into())
        }
    }
}

impl ResultOperator for ChoiceResultOperator {
    fn name(&self) -> &'static str {
        match (self.kind, self.or_default) {
            (ChoiceKind::First, false) => "First",
            (ChoiceKind::First, true) => "FirstOrDefault",
            (ChoiceKind::Single, false) => "Single",
            (ChoiceKind::Single, true) => "SingleOrDefault",
            (ChoiceKind::Last, false) => "Last",
            (ChoiceKind::Last, true) => "LastOrDefault",
            (ChoiceKind::ElementAt, false) => "ElementAt",
            (ChoiceKind::ElementAt, true) => "ElementAtOrDefault",
        }
    }

    fn execution_strategy(&self) -> Result<ExecutionStrategy> {
        Ok(ExecutionStrategy::Single)
    }

    fn execute_in_memory(
        &self,
        input: InMemorySequence,
        evaluator: &Evaluator,
        env: &Environment,
    ) -> Result<InMemoryOutput> {
        let candidates = match &self.predicate {
            Some(predicate) => {
                let mut kept = Vec::new();
                for item in input.items {
                    if predicate.apply(&item, evaluator, env)?.as_bool() {
                        kept.push(item);
                    }
                }
                kept
            }
            None => input.items,
        };

        let chosen = match self.kind {
            ChoiceKind::First => candidates.into_iter().next(),
            ChoiceKind::Last => candidates.into_iter().last(),
            ChoiceKind::Single => {
                if candidates.len() > 1 {
                    return Err(EvalError::MultipleElements(self.name()).into());
                }
                candidates.into_iter().next()
            }
            ChoiceKind::ElementAt => {
                let index = match &self.index {
                    Some(expr) => evaluator.eval(expr, env)?,
                    None => Value::Integer(0),
                };
                match index {
                    Value::Integer(n) if n >= 0 => candidates.into_iter().nth(n as usize),
                    Value::Integer(_) => None,
                    other => {
                        return Err(EvalError::TypeError(format!(
                            "{} index must be an integer, got {}",
                            self.name(),
                            other.type_name()
                        ))
                        .into());
                    }
                }
            }
        };

        match chosen {
            Some(value) => Ok(InMemoryOutput::Single(value)),
            None => self.missing(),
        }
    }

    fn result_type(&self, input_element: &ElementType) -> Result<ElementType> {
        Ok(input_element.clone())
    }

    fn clone_operator(&self, ctx: &mut CloneContext) -> Result<Arc<dyn ResultOperator>> {
        let predicate = match &self.predicate {
            Some(p) => Some(p.clone_with(ctx)?),
            None => None,
        };
        let index = match &self.index {
            Some(i) => Some(ctx.remap_expr(i)?),
            None => None,
        };
        Ok(Arc::new(ChoiceResultOperator {
            kind: self.kind,
            predicate,
            index,
            or_default: self.or_default,
        }))
    }

    fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>> {
        let predicate = match &self.predicate {
            Some(p) => Some(p.transform(f)?),
            None => None,
        };
        let index = match &self.index {
            Some(i) => Some(f(i)?),
            None => None,
        };
        Ok(Arc::new(ChoiceResultOperator {
            kind: self.kind,
            predicate,
            index,
            or_default: self.or_default,
        }))
    }

    fn expressions(&self) -> Vec<&Arc<Expr>> {
        self.predicate
            .iter()
            .map(OperatorLambda::resolved)
            .chain(self.index.iter())
            .collect()
    }
}

impl fmt::Display for ChoiceResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.predicate, &self.index) {
            (Some(p), _) => write!(f, "{}({p})", self.name()),
            (None, Some(i)) => write!(f, "{}({i})", self.name()),
            (None, None) => write!(f, "{}()", self.name()),
        }
    }
}
