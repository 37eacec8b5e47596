//! Structural elements of a query model.
//!
//! From-clauses introduce items that later expressions reference through
//! [`SourceRef`]. Where, order-by and select clauses only transform.

use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr},
    clone::CloneContext,
    error::Result,
    ids::ClauseId,
};

/// Rewrites one expression slot; used for cloning and correlated substitution.
pub type ExprTransform<'a> = dyn FnMut(&Arc<Expr>) -> Result<Arc<Expr>> + 'a;

/// Reference to the current item of a from-clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRef {
    clause: ClauseId,
    item_name: Arc<str>,
    item_type: ElementType,
}

impl SourceRef {
    pub fn clause(&self) -> ClauseId {
        self.clause
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn item_type(&self) -> &ElementType {
        &self.item_type
    }
}

/// How a from-clause obtains its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromKind {
    /// The head of the query
    Main,
    /// A flattened collection computed by an arbitrary expression
    Additional,
    /// A flattened collection read from a member of an outer item
    Member,
    /// A flattened collection produced by a nested query model
    SubQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    id: ClauseId,
    kind: FromKind,
    item_name: String,
    item_type: ElementType,
    from_expression: Arc<Expr>,
}

impl FromClause {
    pub fn new(
        kind: FromKind,
        item_name: impl Into<String>,
        item_type: ElementType,
        from_expression: Arc<Expr>,
    ) -> Self {
        FromClause {
            id: ClauseId::fresh(),
            kind,
            item_name: item_name.into(),
            item_type,
            from_expression,
        }
    }

    pub fn id(&self) -> ClauseId {
        self.id
    }

    pub fn kind(&self) -> FromKind {
        self.kind
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn item_type(&self) -> &ElementType {
        &self.item_type
    }

    pub fn from_expression(&self) -> &Arc<Expr> {
        &self.from_expression
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            clause: self.id,
            item_name: Arc::from(self.item_name.as_str()),
            item_type: self.item_type.clone(),
        }
    }

    /// Duplicate under a fresh id and register the mapping in `ctx`.
    pub fn clone_with(&self, ctx: &mut CloneContext) -> Result<FromClause> {
        let from_expression = ctx.remap_expr(&self.from_expression)?;
        let clone = FromClause {
            id: ClauseId::fresh(),
            kind: self.kind,
            item_name: self.item_name.clone(),
            item_type: self.item_type.clone(),
            from_expression,
        };
        ctx.register(self.id, clone.source_ref());
        Ok(clone)
    }

    pub fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<FromClause> {
        Ok(FromClause {
            from_expression: f(&self.from_expression)?,
            ..self.clone()
        })
    }
}

impl fmt::Display for FromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "from {} {} in {}",
            self.item_type, self.item_name, self.from_expression
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    id: ClauseId,
    predicate: Arc<Expr>,
}

impl WhereClause {
    pub fn new(predicate: Arc<Expr>) -> Self {
        WhereClause {
            id: ClauseId::fresh(),
            predicate,
        }
    }

    pub fn id(&self) -> ClauseId {
        self.id
    }

    pub fn predicate(&self) -> &Arc<Expr> {
        &self.predicate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub expression: Arc<Expr>,
    pub direction: OrderingDirection,
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            OrderingDirection::Ascending => write!(f, "{} asc", self.expression),
            OrderingDirection::Descending => write!(f, "{} desc", self.expression),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    id: ClauseId,
    orderings: Vec<Ordering>,
}

impl OrderByClause {
    pub fn new(first: Ordering) -> Self {
        OrderByClause {
            id: ClauseId::fresh(),
            orderings: vec![first],
        }
    }

    pub fn id(&self) -> ClauseId {
        self.id
    }

    pub fn orderings(&self) -> &[Ordering] {
        &self.orderings
    }

    pub(crate) fn push(&mut self, ordering: Ordering) {
        self.orderings.push(ordering);
    }
}

/// The projection closing the clause list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    id: ClauseId,
    selector: Arc<Expr>,
}

impl SelectClause {
    pub fn new(selector: Arc<Expr>) -> Self {
        SelectClause {
            id: ClauseId::fresh(),
            selector,
        }
    }

    pub fn id(&self) -> ClauseId {
        self.id
    }

    pub fn selector(&self) -> &Arc<Expr> {
        &self.selector
    }

    pub fn clone_with(&self, ctx: &mut CloneContext) -> Result<SelectClause> {
        Ok(SelectClause {
            id: ClauseId::fresh(),
            selector: ctx.remap_expr(&self.selector)?,
        })
    }

    pub fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<SelectClause> {
        Ok(SelectClause {
            id: self.id,
            selector: f(&self.selector)?,
        })
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select {}", self.selector)
    }
}

/// Clauses between the main from-clause and the select clause.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyClause {
    AdditionalFrom(FromClause),
    Where(WhereClause),
    OrderBy(OrderByClause),
}

impl BodyClause {
    pub fn id(&self) -> ClauseId {
        match self {
            BodyClause::AdditionalFrom(c) => c.id(),
            BodyClause::Where(c) => c.id(),
            BodyClause::OrderBy(c) => c.id(),
        }
    }

    pub fn clone_with(&self, ctx: &mut CloneContext) -> Result<BodyClause> {
        Ok(match self {
            BodyClause::AdditionalFrom(c) => BodyClause::AdditionalFrom(c.clone_with(ctx)?),
            BodyClause::Where(c) => BodyClause::Where(WhereClause {
                id: ClauseId::fresh(),
                predicate: ctx.remap_expr(&c.predicate)?,
            }),
            BodyClause::OrderBy(c) => {
                let mut orderings = Vec::with_capacity(c.orderings.len());
                for o in &c.orderings {
                    orderings.push(Ordering {
                        expression: ctx.remap_expr(&o.expression)?,
                        direction: o.direction,
                    });
                }
                BodyClause::OrderBy(OrderByClause {
                    id: ClauseId::fresh(),
                    orderings,
                })
            }
        })
    }

    pub fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<BodyClause> {
        Ok(match self {
            BodyClause::AdditionalFrom(c) => BodyClause::AdditionalFrom(c.transform_expressions(f)?),
            BodyClause::Where(c) => BodyClause::Where(WhereClause {
                id: c.id,
                predicate: f(&c.predicate)?,
            }),
            BodyClause::OrderBy(c) => {
                let mut orderings = Vec::with_capacity(c.orderings.len());
                for o in &c.orderings {
                    orderings.push(Ordering {
                        expression: f(&o.expression)?,
                        direction: o.direction,
                    });
                }
                BodyClause::OrderBy(OrderByClause { id: c.id, orderings })
            }
        })
    }
}

impl fmt::Display for BodyClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyClause::AdditionalFrom(c) => write!(f, "{c}"),
            BodyClause::Where(c) => write!(f, "where {}", c.predicate),
            BodyClause::OrderBy(c) => {
                write!(f, "orderby ")?;
                for (i, o) in c.orderings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{o}")?;
                }
                Ok(())
            }
        }
    }
}

/// A clause as produced by one chain node.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    MainFrom(FromClause),
    Body(BodyClause),
    Select(SelectClause),
}

/// Borrowed view of a model's clauses in build order.
#[derive(Debug, Clone, Copy)]
pub enum ClauseRef<'a> {
    MainFrom(&'a FromClause),
    Body(&'a BodyClause),
    Select(&'a SelectClause),
}

impl ClauseRef<'_> {
    pub fn id(&self) -> ClauseId {
        match self {
            ClauseRef::MainFrom(c) => c.id(),
            ClauseRef::Body(c) => c.id(),
            ClauseRef::Select(c) => c.id(),
        }
    }
}
