use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    ast::{ElementType, Expr},
    clauses::{
        BodyClause, Clause, FromClause, FromKind, OrderByClause, Ordering, SelectClause,
        WhereClause,
    },
    context::ClauseGenerationContext,
    error::{QueryModelError, Result},
    operators::{
        AggregateResultOperator, ChoiceResultOperator, FoldResultOperator, GroupResultOperator,
        OperatorLambda, PartitionResultOperator, QuantifierResultOperator, ResultOperator,
        SetResultOperator,
    },
};

use super::{LambdaRole, LambdaSlot, NodeId, NodeKind, QueryChain, resolve::aggregate_role};

impl QueryChain {
    /// Create the clause for a clause-producing node and register it in `ctx`.
    ///
    /// `previous` is the clause produced by the preceding clause node; `ThenBy`
    /// extends it and fails unless it is an order-by clause.
    pub fn create_clause(
        &self,
        node: NodeId,
        previous: Option<&Clause>,
        ctx: &mut ClauseGenerationContext,
    ) -> Result<Clause> {
        let n = self.node(node)?;
        let clause = match n.kind() {
            NodeKind::MainSource {
                expression,
                item_type,
            } => Clause::MainFrom(FromClause::new(
                FromKind::Main,
                n.identifier(),
                item_type.clone(),
                Arc::clone(expression),
            )),
            NodeKind::Where { .. } => Clause::Body(BodyClause::Where(WhereClause::new(
                self.resolved_predicate(node, ctx)?,
            ))),
            NodeKind::OrderBy { direction, .. } => {
                Clause::Body(BodyClause::OrderBy(OrderByClause::new(Ordering {
                    expression: self.resolved_key_selector(node, ctx)?,
                    direction: *direction,
                })))
            }
            NodeKind::ThenBy { direction, .. } => {
                let Some(Clause::Body(BodyClause::OrderBy(order))) = previous else {
                    return Err(QueryModelError::ArgumentValidation {
                        node_type: n.type_name(),
                        message: "must directly follow OrderBy or ThenBy".to_string(),
                    });
                };
                let mut order = order.clone();
                order.push(Ordering {
                    expression: self.resolved_key_selector(node, ctx)?,
                    direction: *direction,
                });
                Clause::Body(BodyClause::OrderBy(order))
            }
            NodeKind::Select { .. } => {
                Clause::Select(SelectClause::new(self.resolved_selector(node, ctx)?))
            }
            NodeKind::SelectMany { result, .. } => {
                let from_expression = self.resolved_collection_selector(node, ctx)?;
                let kind = match from_expression.as_ref() {
                    Expr::Member { .. } => FromKind::Member,
                    Expr::SubQuery(_) => FromKind::SubQuery,
                    _ => FromKind::Additional,
                };
                let item_name = result
                    .as_ref()
                    .and_then(|slot| slot.lambda().parameter(1))
                    .map_or(n.identifier(), |p| p.name());
                let item_type = from_expression.ty().element().unwrap_or(ElementType::Any);
                Clause::Body(BodyClause::AdditionalFrom(FromClause::new(
                    kind,
                    item_name,
                    item_type,
                    from_expression,
                )))
            }
            _ => {
                return Err(QueryModelError::UnsupportedOperation {
                    node_type: n.type_name(),
                    operation: "clause creation".to_string(),
                });
            }
        };

        trace!(node = %node, node_type = n.type_name(), "created clause");
        ctx.add_clause(n, clause.clone())?;
        Ok(clause)
    }

    /// Create the result operator for a terminal node and record it in `ctx`.
    pub fn create_result_operator(
        &self,
        node: NodeId,
        ctx: &mut ClauseGenerationContext,
    ) -> Result<Arc<dyn ResultOperator>> {
        let n = self.node(node)?;
        let operator: Arc<dyn ResultOperator> = match n.kind() {
            NodeKind::Take { count } => Arc::new(PartitionResultOperator::take(Arc::clone(count))),
            NodeKind::Skip { count } => Arc::new(PartitionResultOperator::skip(Arc::clone(count))),
            NodeKind::Distinct => Arc::new(PartitionResultOperator::distinct()),
            NodeKind::All { predicate } => Arc::new(QuantifierResultOperator::all(
                self.operator_lambda(node, predicate, LambdaRole::Predicate, ctx)?,
            )),
            NodeKind::Any { predicate } => Arc::new(QuantifierResultOperator::any(
                self.optional_operator_lambda(node, predicate.as_ref(), LambdaRole::Predicate, ctx)?,
            )),
            NodeKind::Aggregate { kind, selector } => {
                let role = aggregate_role(*kind);
                Arc::new(AggregateResultOperator::new(
                    *kind,
                    self.optional_operator_lambda(node, selector.as_ref(), role, ctx)?,
                ))
            }
            NodeKind::SetOperation { kind, other } => {
                Arc::new(SetResultOperator::new(*kind, Arc::clone(other)))
            }
            NodeKind::GroupBy { key, element, .. } => {
                let key_lambda = self.operator_lambda(node, key, LambdaRole::KeySelector, ctx)?;
                let element_lambda = match element {
                    Some(slot) => {
                        self.operator_lambda(node, slot, LambdaRole::ElementSelector, ctx)?
                    }
                    None => {
                        let parameter = key_lambda.parameter().clone();
                        let body = Arc::new(parameter.to_expr());
                        OperatorLambda::new(
                            parameter,
                            body,
                            self.resolved_element_selector(node, ctx)?,
                        )
                    }
                };
                Arc::new(GroupResultOperator::new(
                    n.identifier(),
                    key_lambda,
                    element_lambda,
                ))
            }
            NodeKind::Choice {
                kind,
                predicate,
                or_default,
            } => Arc::new(ChoiceResultOperator::new(
                *kind,
                self.optional_operator_lambda(node, predicate.as_ref(), LambdaRole::Predicate, ctx)?,
                *or_default,
            )),
            NodeKind::ElementAt { index, or_default } => Arc::new(
                ChoiceResultOperator::element_at(Arc::clone(index), *or_default),
            ),
            NodeKind::Fold { seed, func } => {
                Arc::new(FoldResultOperator::new(Arc::clone(seed), func.clone()))
            }
            _ => {
                return Err(QueryModelError::UnsupportedOperation {
                    node_type: n.type_name(),
                    operation: "result operator creation".to_string(),
                });
            }
        };

        debug!(node = %node, operator = %operator, "created result operator");
        ctx.add_result_operator(n, Arc::clone(&operator))?;
        Ok(operator)
    }

    fn operator_lambda(
        &self,
        node: NodeId,
        slot: &LambdaSlot,
        role: LambdaRole,
        ctx: &ClauseGenerationContext,
    ) -> Result<OperatorLambda> {
        let lambda = slot.lambda();
        let parameter = lambda
            .parameter(0)
            .cloned()
            .ok_or_else(|| QueryModelError::ArgumentValidation {
                node_type: self.node(node).map_or("node", |n| n.type_name()),
                message: "lambda has no parameter".to_string(),
            })?;
        Ok(OperatorLambda::new(
            parameter,
            Arc::new(lambda.body().clone()),
            self.resolved_lambda(node, role, ctx)?,
        ))
    }

    fn optional_operator_lambda(
        &self,
        node: NodeId,
        slot: Option<&LambdaSlot>,
        role: LambdaRole,
        ctx: &ClauseGenerationContext,
    ) -> Result<Option<OperatorLambda>> {
        slot.map(|slot| self.operator_lambda(node, slot, role, ctx))
            .transpose()
    }
}
