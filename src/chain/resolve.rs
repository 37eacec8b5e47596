use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr, Lambda, Parameter},
    clauses::{BodyClause, Clause, SourceRef},
    context::ClauseGenerationContext,
    error::{LookupFailure, QueryModelError, Result},
    operators::AggregateKind,
    replace::replace_parameter,
};

use super::{ChainNode, LambdaSlot, NodeId, NodeKind, QueryChain};

/// Which lambda of a node to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaRole {
    Predicate,
    Selector,
    KeySelector,
    ElementSelector,
    CollectionSelector,
    ResultSelector,
}

impl LambdaRole {
    fn describe(self) -> &'static str {
        match self {
            LambdaRole::Predicate => "predicate",
            LambdaRole::Selector => "selector",
            LambdaRole::KeySelector => "key selector",
            LambdaRole::ElementSelector => "element selector",
            LambdaRole::CollectionSelector => "collection selector",
            LambdaRole::ResultSelector => "result selector",
        }
    }
}

impl QueryChain {
    /// Substitute `input` in `expr` with the expression producing the items
    /// at `node`.
    ///
    /// Pass-through nodes are skipped in one step via their recorded producer,
    /// so an uncached call does constant work besides the substitution. The
    /// result references no parameter bound by `node` or any node before it.
    /// Only clause-producing nodes and the pass-through partitions support
    /// this.
    pub fn resolve(
        &self,
        node: NodeId,
        input: &Parameter,
        expr: &Expr,
        ctx: &ClauseGenerationContext,
    ) -> Result<Expr> {
        let n = self.node(node)?;
        if !n.kind().produces_clause() && !n.kind().passes_through() {
            return Err(QueryModelError::UnsupportedOperation {
                node_type: n.type_name(),
                operation: "resolve".to_string(),
            });
        }

        let output = self.output_type(node)?;
        if !input.ty().is_compatible(&output) {
            return Err(QueryModelError::TypeMismatch {
                operation: format!("resolve through {} producing {output}", n.type_name()),
                element_type: input.ty().clone(),
            });
        }

        let producer = self.node(n.producer())?;
        match producer.kind() {
            NodeKind::MainSource { .. } | NodeKind::SelectMany { result: None, .. } => {
                let item = Expr::SourceRef(own_source_ref(producer, ctx)?);
                replace_parameter(input, &item, expr)
            }
            NodeKind::Select { .. } => {
                let selector = self.resolved_selector(producer.id(), ctx)?;
                replace_parameter(input, &selector, expr)
            }
            NodeKind::SelectMany { result: Some(_), .. } => {
                let result = self.resolved_result_selector(producer.id(), ctx)?;
                replace_parameter(input, &result, expr)
            }
            _ => Err(QueryModelError::UnsupportedOperation {
                node_type: producer.type_name(),
                operation: "resolve".to_string(),
            }),
        }
    }

    /// Resolved form of one of `node`'s lambdas, memoized per node.
    pub fn resolved_lambda(
        &self,
        node: NodeId,
        role: LambdaRole,
        ctx: &ClauseGenerationContext,
    ) -> Result<Arc<Expr>> {
        let n = self.node(node)?;
        let never = || -> QueryModelError {
            LookupFailure::NeverCreated {
                node_type: n.type_name(),
                what: role.describe(),
            }
            .into()
        };

        match (n.kind(), role) {
            (NodeKind::Where { predicate }, LambdaRole::Predicate)
            | (NodeKind::All { predicate }, LambdaRole::Predicate)
            | (NodeKind::Select { selector: predicate }, LambdaRole::Selector)
            | (NodeKind::OrderBy { key: predicate, .. }, LambdaRole::KeySelector)
            | (NodeKind::ThenBy { key: predicate, .. }, LambdaRole::KeySelector)
            | (NodeKind::GroupBy { key: predicate, .. }, LambdaRole::KeySelector)
            | (NodeKind::SelectMany { collection: predicate, .. }, LambdaRole::CollectionSelector) => {
                self.resolve_unary(n, predicate, ctx)
            }
            (NodeKind::Any { predicate }, LambdaRole::Predicate)
            | (NodeKind::Choice { predicate, .. }, LambdaRole::Predicate) => {
                let slot = predicate.as_ref().ok_or_else(never)?;
                self.resolve_unary(n, slot, ctx)
            }
            (NodeKind::Aggregate { kind, selector }, role)
                if role == aggregate_role(*kind) =>
            {
                let slot = selector.as_ref().ok_or_else(never)?;
                self.resolve_unary(n, slot, ctx)
            }
            (
                NodeKind::GroupBy {
                    key,
                    element,
                    default_element,
                },
                LambdaRole::ElementSelector,
            ) => match element {
                Some(slot) => self.resolve_unary(n, slot, ctx),
                // Identity of the key selector's own parameter
                None => default_element.get_or_resolve(n.type_name(), ctx.id(), || {
                    let parameter = first_parameter(n, key.lambda())?;
                    self.resolve(self.source_of(n)?, parameter, &parameter.to_expr(), ctx)
                }),
            },
            (NodeKind::SelectMany { result, .. }, LambdaRole::ResultSelector) => {
                let slot = result.as_ref().ok_or_else(never)?;
                slot.cache().get_or_resolve(n.type_name(), ctx.id(), || {
                    let lambda = slot.lambda();
                    let (outer, inner) = match lambda.parameters() {
                        [outer, inner] => (outer, inner),
                        _ => {
                            return Err(QueryModelError::ArgumentValidation {
                                node_type: n.type_name(),
                                message: "result selector must take exactly 2 parameters"
                                    .to_string(),
                            });
                        }
                    };
                    let own = Expr::SourceRef(own_source_ref(n, ctx)?);
                    let body = replace_parameter(inner, &own, lambda.body())?;
                    self.resolve(self.source_of(n)?, outer, &body, ctx)
                })
            }
            _ => Err(never()),
        }
    }

    pub fn resolved_predicate(&self, node: NodeId, ctx: &ClauseGenerationContext) -> Result<Arc<Expr>> {
        self.resolved_lambda(node, LambdaRole::Predicate, ctx)
    }

    pub fn resolved_selector(&self, node: NodeId, ctx: &ClauseGenerationContext) -> Result<Arc<Expr>> {
        self.resolved_lambda(node, LambdaRole::Selector, ctx)
    }

    pub fn resolved_key_selector(
        &self,
        node: NodeId,
        ctx: &ClauseGenerationContext,
    ) -> Result<Arc<Expr>> {
        self.resolved_lambda(node, LambdaRole::KeySelector, ctx)
    }

    pub fn resolved_element_selector(
        &self,
        node: NodeId,
        ctx: &ClauseGenerationContext,
    ) -> Result<Arc<Expr>> {
        self.resolved_lambda(node, LambdaRole::ElementSelector, ctx)
    }

    pub fn resolved_collection_selector(
        &self,
        node: NodeId,
        ctx: &ClauseGenerationContext,
    ) -> Result<Arc<Expr>> {
        self.resolved_lambda(node, LambdaRole::CollectionSelector, ctx)
    }

    pub fn resolved_result_selector(
        &self,
        node: NodeId,
        ctx: &ClauseGenerationContext,
    ) -> Result<Arc<Expr>> {
        self.resolved_lambda(node, LambdaRole::ResultSelector, ctx)
    }

    /// Element type of the items flowing out of `node`.
    pub fn output_type(&self, node: NodeId) -> Result<ElementType> {
        let producer = self.node(self.node(node)?.producer())?;
        match producer.kind() {
            NodeKind::MainSource { item_type, .. } => Ok(item_type.clone()),
            NodeKind::Select { selector } => Ok(selector.lambda().body().ty()),
            NodeKind::SelectMany {
                result: Some(result),
                ..
            } => Ok(result.lambda().body().ty()),
            NodeKind::SelectMany {
                collection,
                result: None,
            } => Ok(collection
                .lambda()
                .body()
                .ty()
                .element()
                .unwrap_or(ElementType::Any)),
            _ => Err(QueryModelError::UnsupportedOperation {
                node_type: producer.type_name(),
                operation: "output type".to_string(),
            }),
        }
    }

    /// A fresh parameter standing for the items flowing out of `node`, named
    /// after the node's identifier.
    pub fn create_parameter_for_output(&self, node: NodeId) -> Result<Parameter> {
        let ty = self.output_type(node)?;
        Ok(Parameter::new(self.node(node)?.identifier(), ty))
    }

    fn resolve_unary(
        &self,
        node: &ChainNode,
        slot: &LambdaSlot,
        ctx: &ClauseGenerationContext,
    ) -> Result<Arc<Expr>> {
        slot.cache().get_or_resolve(node.type_name(), ctx.id(), || {
            let lambda = slot.lambda();
            let parameter = first_parameter(node, lambda)?;
            self.resolve(self.source_of(node)?, parameter, lambda.body(), ctx)
        })
    }
}

/// Count takes a predicate, the other aggregates a selector.
pub(super) fn aggregate_role(kind: AggregateKind) -> LambdaRole {
    match kind {
        AggregateKind::Count => LambdaRole::Predicate,
        _ => LambdaRole::Selector,
    }
}

fn first_parameter<'a>(node: &ChainNode, lambda: &'a Lambda) -> Result<&'a Parameter> {
    lambda
        .parameter(0)
        .ok_or_else(|| QueryModelError::ArgumentValidation {
            node_type: node.type_name(),
            message: "lambda has no parameter".to_string(),
        })
}

/// Reference to the from-clause `node` registered in `ctx`.
fn own_source_ref(node: &ChainNode, ctx: &ClauseGenerationContext) -> Result<SourceRef> {
    match ctx.clause(node)? {
        Clause::MainFrom(from) | Clause::Body(BodyClause::AdditionalFrom(from)) => {
            Ok(from.source_ref())
        }
        _ => Err(LookupFailure::NeverCreated {
            node_type: node.type_name(),
            what: "from clause",
        }
        .into()),
    }
}
