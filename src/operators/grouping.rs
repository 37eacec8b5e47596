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

/// `GroupBy(key, element)`: groups keep the order in which keys first appear.
#[derive(Debug, Clone)]
pub struct GroupResultOperator {
    item_name: String,
    key: OperatorLambda,
    element: OperatorLambda,
}

impl GroupResultOperator {
    pub fn new(item_name: impl Into<String>, key: OperatorLambda, element: OperatorLambda) -> Self {
        GroupResultOperator {
            item_name: item_name.into(),
            key,
            element,
        }
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn key_selector(&self) -> &OperatorLambda {
        &self.key
    }

    pub fn element_selector(&self) -> &OperatorLambda {
        &self.element
    }
}

impl ResultOperator for GroupResultOperator {
    fn name(&self) -> &'static str {
        "GroupBy"
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
        let element_type = self.result_type(&input.element_type)?;
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

        for item in &input.items {
            let key = self.key.apply(item, evaluator, env)?;
            let element = self.element.apply(item, evaluator, env)?;
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, elements)) => elements.push(element),
                None => groups.push((key, vec![element])),
            }
        }

        let items = groups
            .into_iter()
            .map(|(key, elements)| Value::Group {
                key: Box::new(key),
                elements,
            })
            .collect();

        Ok(InMemoryOutput::Sequence(InMemorySequence::new(
            element_type.element().unwrap_or(ElementType::Any),
            items,
        )))
    }

    fn result_type(&self, _input_element: &ElementType) -> Result<ElementType> {
        Ok(ElementType::sequence_of(ElementType::group_of(
            self.key.result_type(),
            self.element.result_type(),
        )))
    }

    fn clone_operator(&self, ctx: &mut CloneContext) -> Result<Arc<dyn ResultOperator>> {
        Ok(Arc::new(GroupResultOperator {
            item_name: self.item_name.clone(),
            key: self.key.clone_with(ctx)?,
            element: self.element.clone_with(ctx)?,
        }))
    }

    fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<Arc<dyn ResultOperator>> {
        Ok(Arc::new(GroupResultOperator {
            item_name: self.item_name.clone(),
            key: self.key.transform(f)?,
            element: self.element.transform(f)?,
        }))
    }

    fn expressions(&self) -> Vec<&Arc<Expr>> {
        vec![self.key.resolved(), self.element.resolved()]
    }
}

impl fmt::Display for GroupResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupBy({}, {})", self.key, self.element)
    }
}
