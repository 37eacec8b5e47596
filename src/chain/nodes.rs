use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr, Lambda},
    clauses::OrderingDirection,
    error::{QueryModelError, Result},
    operators::{AggregateKind, ChoiceKind, SetOperationKind},
};

use super::{NodeId, cache::ResolutionCache};

/// A lambda owned by a node together with the cache of its resolved form.
#[derive(Debug)]
pub struct LambdaSlot {
    lambda: Lambda,
    cache: ResolutionCache,
}

impl LambdaSlot {
    fn new(lambda: Lambda) -> Self {
        LambdaSlot {
            lambda,
            cache: ResolutionCache::new(),
        }
    }

    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }
}

/// What a chain node does, with the lambdas and expressions it owns.
#[derive(Debug)]
pub enum NodeKind {
    /// Head of the chain: the initial data source
    MainSource {
        expression: Arc<Expr>,
        item_type: ElementType,
    },
    Where {
        predicate: LambdaSlot,
    },
    Select {
        selector: LambdaSlot,
    },
    /// Flattening `SelectMany(x => collection, (x, y) => result)`
    SelectMany {
        collection: LambdaSlot,
        result: Option<LambdaSlot>,
    },
    OrderBy {
        key: LambdaSlot,
        direction: OrderingDirection,
    },
    ThenBy {
        key: LambdaSlot,
        direction: OrderingDirection,
    },
    GroupBy {
        key: LambdaSlot,
        element: Option<LambdaSlot>,
        /// Resolved identity of the key parameter, used when `element` is absent
        default_element: ResolutionCache,
    },
    Take {
        count: Arc<Expr>,
    },
    Skip {
        count: Arc<Expr>,
    },
    Distinct,
    All {
        predicate: LambdaSlot,
    },
    Any {
        predicate: Option<LambdaSlot>,
    },
    Aggregate {
        kind: AggregateKind,
        selector: Option<LambdaSlot>,
    },
    SetOperation {
        kind: SetOperationKind,
        other: Arc<Expr>,
    },
    Choice {
        kind: ChoiceKind,
        predicate: Option<LambdaSlot>,
        or_default: bool,
    },
    ElementAt {
        index: Arc<Expr>,
        or_default: bool,
    },
    Fold {
        seed: Arc<Expr>,
        func: Lambda,
    },
}

fn unary(node_type: &'static str, role: &str, lambda: Lambda) -> Result<LambdaSlot> {
    expect_arity(node_type, role, &lambda, 1)?;
    Ok(LambdaSlot::new(lambda))
}

fn expect_arity(node_type: &'static str, role: &str, lambda: &Lambda, arity: usize) -> Result<()> {
    if lambda.arity() != arity {
        return Err(QueryModelError::ArgumentValidation {
            node_type,
            message: format!(
                "{role} must take exactly {arity} parameter(s), got {}",
                lambda.arity()
            ),
        });
    }
    Ok(())
}

impl NodeKind {
    pub fn main_source(expression: Expr, item_type: ElementType) -> Self {
        NodeKind::MainSource {
            expression: Arc::new(expression),
            item_type,
        }
    }

    pub fn filter(predicate: Lambda) -> Result<Self> {
        Ok(NodeKind::Where {
            predicate: unary("Where", "predicate", predicate)?,
        })
    }

    pub fn select(selector: Lambda) -> Result<Self> {
        Ok(NodeKind::Select {
            selector: unary("Select", "selector", selector)?,
        })
    }

    pub fn select_many(collection: Lambda, result: Option<Lambda>) -> Result<Self> {
        let collection = unary("SelectMany", "collection selector", collection)?;
        let result = match result {
            Some(result) => {
                expect_arity("SelectMany", "result selector", &result, 2)?;
                Some(LambdaSlot::new(result))
            }
            None => None,
        };
        Ok(NodeKind::SelectMany { collection, result })
    }

    pub fn order_by(key: Lambda, direction: OrderingDirection) -> Result<Self> {
        Ok(NodeKind::OrderBy {
            key: unary("OrderBy", "key selector", key)?,
            direction,
        })
    }

    pub fn then_by(key: Lambda, direction: OrderingDirection) -> Result<Self> {
        Ok(NodeKind::ThenBy {
            key: unary("ThenBy", "key selector", key)?,
            direction,
        })
    }

    pub fn group_by(key: Lambda, element: Option<Lambda>) -> Result<Self> {
        let key = unary("GroupBy", "key selector", key)?;
        let element = element
            .map(|e| unary("GroupBy", "element selector", e))
            .transpose()?;
        Ok(NodeKind::GroupBy {
            key,
            element,
            default_element: ResolutionCache::new(),
        })
    }

    pub fn take(count: Expr) -> Self {
        NodeKind::Take {
            count: Arc::new(count),
        }
    }

    pub fn skip(count: Expr) -> Self {
        NodeKind::Skip {
            count: Arc::new(count),
        }
    }

    pub fn distinct() -> Self {
        NodeKind::Distinct
    }

    pub fn all(predicate: Lambda) -> Result<Self> {
        Ok(NodeKind::All {
            predicate: unary("All", "predicate", predicate)?,
        })
    }

    pub fn any(predicate: Option<Lambda>) -> Result<Self> {
        Ok(NodeKind::Any {
            predicate: predicate.map(|p| unary("Any", "predicate", p)).transpose()?,
        })
    }

    pub fn aggregate(kind: AggregateKind, selector: Option<Lambda>) -> Result<Self> {
        let node_type = aggregate_name(kind);
        let role = match kind {
            AggregateKind::Count => "predicate",
            _ => "selector",
        };
        Ok(NodeKind::Aggregate {
            kind,
            selector: selector.map(|s| unary(node_type, role, s)).transpose()?,
        })
    }

    pub fn set_operation(kind: SetOperationKind, other: Expr) -> Self {
        NodeKind::SetOperation {
            kind,
            other: Arc::new(other),
        }
    }

    pub fn choice(kind: ChoiceKind, predicate: Option<Lambda>, or_default: bool) -> Result<Self> {
        let node_type = choice_name(kind, or_default);
        if kind == ChoiceKind::ElementAt {
            return Err(QueryModelError::ArgumentValidation {
                node_type,
                message: "takes an index, not a predicate".to_string(),
            });
        }
        Ok(NodeKind::Choice {
            kind,
            predicate: predicate
                .map(|p| unary(node_type, "predicate", p))
                .transpose()?,
            or_default,
        })
    }

    pub fn element_at(index: Expr, or_default: bool) -> Self {
        NodeKind::ElementAt {
            index: Arc::new(index),
            or_default,
        }
    }

    pub fn fold(seed: Expr, func: Lambda) -> Result<Self> {
        expect_arity("Fold", "accumulator", &func, 2)?;
        Ok(NodeKind::Fold {
            seed: Arc::new(seed),
            func,
        })
    }

    /// Name used in diagnostics, e.g. `SelectMany` or `FirstOrDefault`.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::MainSource { .. } => "MainSource",
            NodeKind::Where { .. } => "Where",
            NodeKind::Select { .. } => "Select",
            NodeKind::SelectMany { .. } => "SelectMany",
            NodeKind::OrderBy { .. } => "OrderBy",
            NodeKind::ThenBy { .. } => "ThenBy",
            NodeKind::GroupBy { .. } => "GroupBy",
            NodeKind::Take { .. } => "Take",
            NodeKind::Skip { .. } => "Skip",
            NodeKind::Distinct => "Distinct",
            NodeKind::All { .. } => "All",
            NodeKind::Any { .. } => "Any",
            NodeKind::Aggregate { kind, .. } => aggregate_name(*kind),
            NodeKind::SetOperation { kind, .. } => match kind {
                SetOperationKind::Union => "Union",
                SetOperationKind::Intersect => "Intersect",
                SetOperationKind::Except => "Except",
            },
            NodeKind::Choice {
                kind, or_default, ..
            } => choice_name(*kind, *or_default),
            NodeKind::ElementAt { or_default, .. } => {
                choice_name(ChoiceKind::ElementAt, *or_default)
            }
            NodeKind::Fold { .. } => "Fold",
        }
    }

    /// Clause-producing nodes continue the stream; all others become result
    /// operators.
    pub fn produces_clause(&self) -> bool {
        matches!(
            self,
            NodeKind::MainSource { .. }
                | NodeKind::Where { .. }
                | NodeKind::Select { .. }
                | NodeKind::SelectMany { .. }
                | NodeKind::OrderBy { .. }
                | NodeKind::ThenBy { .. }
        )
    }

    /// Nodes that keep their input items and type, so resolution looks
    /// straight through them to the source.
    pub fn passes_through(&self) -> bool {
        matches!(
            self,
            NodeKind::Where { .. }
                | NodeKind::OrderBy { .. }
                | NodeKind::ThenBy { .. }
                | NodeKind::Take { .. }
                | NodeKind::Skip { .. }
                | NodeKind::Distinct
        )
    }

    /// Name a node takes when the caller gave no hint: the name of the
    /// parameter that stands for the node's output items.
    pub(crate) fn default_identifier(&self) -> Option<&str> {
        let lambda = match self {
            NodeKind::SelectMany {
                result: Some(result),
                ..
            } => return result.lambda().parameter(1).map(|p| p.name()),
            NodeKind::SelectMany { result: None, .. } | NodeKind::MainSource { .. } => {
                return None;
            }
            NodeKind::Where { predicate } | NodeKind::All { predicate } => predicate.lambda(),
            NodeKind::Select { selector } => selector.lambda(),
            NodeKind::OrderBy { key, .. }
            | NodeKind::ThenBy { key, .. }
            | NodeKind::GroupBy { key, .. } => key.lambda(),
            NodeKind::Any { predicate } | NodeKind::Choice { predicate, .. } => {
                predicate.as_ref()?.lambda()
            }
            NodeKind::Aggregate { selector, .. } => selector.as_ref()?.lambda(),
            NodeKind::Fold { func, .. } => func,
            NodeKind::Take { .. }
            | NodeKind::Skip { .. }
            | NodeKind::Distinct
            | NodeKind::SetOperation { .. }
            | NodeKind::ElementAt { .. } => return None,
        };
        lambda.parameter(0).map(|p| p.name())
    }
}

fn aggregate_name(kind: AggregateKind) -> &'static str {
    match kind {
        AggregateKind::Count => "Count",
        AggregateKind::Sum => "Sum",
        AggregateKind::Min => "Min",
        AggregateKind::Max => "Max",
        AggregateKind::Average => "Average",
    }
}

fn choice_name(kind: ChoiceKind, or_default: bool) -> &'static str {
    match (kind, or_default) {
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

/// One parsed operation in a [`QueryChain`](super::QueryChain).
#[derive(Debug)]
pub struct ChainNode {
    id: NodeId,
    source: Option<NodeId>,
    producer: NodeId,
    identifier: String,
    operation: String,
    kind: NodeKind,
}

impl ChainNode {
    pub(super) fn new(
        id: NodeId,
        source: Option<NodeId>,
        producer: NodeId,
        identifier: String,
        operation: String,
        kind: NodeKind,
    ) -> Self {
        ChainNode {
            id,
            source,
            producer,
            identifier,
            operation,
            kind,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The previous node; `None` only for the head.
    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// Nearest node at or before this one that does not just forward its
    /// source's items. Pass-through nodes resolve through it directly.
    pub fn producer(&self) -> NodeId {
        self.producer
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Operation name as the front-end reported it, e.g. `filter`.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}
