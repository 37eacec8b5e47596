//! The built query: one main from-clause, body clauses, a select clause and
//! trailing result operators.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{ElementType, Expr},
    clauses::{BodyClause, ClauseRef, ExprTransform, FromClause, SelectClause},
    clone::CloneContext,
    error::Result,
    ids::ClauseId,
    operators::{ExecutionStrategy, ResultOperator},
};

/// Fully resolved query.
///
/// Immutable once built; [`QueryModel::clone_with`] and
/// [`QueryModel::transform_expressions`] produce new models.
#[derive(Debug, Clone)]
pub struct QueryModel {
    main_from: FromClause,
    body: Vec<BodyClause>,
    select: SelectClause,
    result_operators: Vec<Arc<dyn ResultOperator>>,
}

impl QueryModel {
    pub fn new(
        main_from: FromClause,
        body: Vec<BodyClause>,
        select: SelectClause,
        result_operators: Vec<Arc<dyn ResultOperator>>,
    ) -> Self {
        QueryModel {
            main_from,
            body,
            select,
            result_operators,
        }
    }

    pub fn main_from(&self) -> &FromClause {
        &self.main_from
    }

    pub fn body_clauses(&self) -> &[BodyClause] {
        &self.body
    }

    pub fn select(&self) -> &SelectClause {
        &self.select
    }

    pub fn result_operators(&self) -> &[Arc<dyn ResultOperator>] {
        &self.result_operators
    }

    /// Clauses in build order: main from, body clauses, select.
    pub fn clauses(&self) -> Vec<ClauseRef<'_>> {
        let mut clauses = Vec::with_capacity(self.body.len() + 2);
        clauses.push(ClauseRef::MainFrom(&self.main_from));
        clauses.extend(self.body.iter().map(ClauseRef::Body));
        clauses.push(ClauseRef::Select(&self.select));
        clauses
    }

    /// Static type of the query result.
    ///
    /// Starts from a sequence of the select type and feeds the element type
    /// through every result operator. An operator following a scalar or
    /// single-element result sees that result as its input element.
    pub fn output_type(&self) -> Result<ElementType> {
        let mut current = ElementType::sequence_of(self.select.selector().ty());
        for op in &self.result_operators {
            let element = current.element().unwrap_or_else(|| current.clone());
            current = op.result_type(&element)?;
        }
        Ok(current)
    }

    /// Strategy of the last result operator; a plain query is a collection.
    pub fn execution_strategy(&self) -> Result<ExecutionStrategy> {
        match self.result_operators.last() {
            Some(op) => op.execution_strategy(),
            None => Ok(ExecutionStrategy::Collection),
        }
    }

    /// Every expression slot of the model, in build order.
    pub fn expressions(&self) -> Vec<&Arc<Expr>> {
        let mut exprs = vec![self.main_from.from_expression()];
        for clause in &self.body {
            match clause {
                BodyClause::AdditionalFrom(from) => exprs.push(from.from_expression()),
                BodyClause::Where(w) => exprs.push(w.predicate()),
                BodyClause::OrderBy(order) => {
                    exprs.extend(order.orderings().iter().map(|o| &o.expression))
                }
            }
        }
        exprs.push(self.select.selector());
        for op in &self.result_operators {
            exprs.extend(op.expressions());
        }
        exprs
    }

    /// Rebuild the model with every expression slot passed through `f`.
    ///
    /// Clause ids are kept, so references into the model stay valid.
    pub fn transform_expressions(&self, f: &mut ExprTransform<'_>) -> Result<QueryModel> {
        let main_from = self.main_from.transform_expressions(f)?;
        let body = self
            .body
            .iter()
            .map(|clause| clause.transform_expressions(f))
            .collect::<Result<Vec<_>>>()?;
        let select = self.select.transform_expressions(f)?;
        let result_operators = self
            .result_operators
            .iter()
            .map(|op| op.transform_expressions(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryModel::new(main_from, body, select, result_operators))
    }

    /// Structural copy with fresh clause ids, registered in `ctx`.
    ///
    /// Clauses are cloned in build order so that each expression only
    /// references clauses whose clones are already registered.
    pub fn clone_with(&self, ctx: &mut CloneContext) -> Result<QueryModel> {
        let main_from = self.main_from.clone_with(ctx)?;
        let mut body = Vec::with_capacity(self.body.len());
        for clause in &self.body {
            body.push(clause.clone_with(ctx)?);
        }
        let select = self.select.clone_with(ctx)?;
        let mut result_operators = Vec::with_capacity(self.result_operators.len());
        for op in &self.result_operators {
            result_operators.push(op.clone_operator(ctx)?);
        }
        Ok(QueryModel::new(main_from, body, select, result_operators))
    }

    /// Clone under a new, private [`CloneContext`].
    pub fn clone_model(&self) -> Result<QueryModel> {
        self.clone_with(&mut CloneContext::new())
    }

    /// Equal shape and content, ignoring clause identities.
    ///
    /// From-clauses are paired in build order; a clause reference matches when
    /// it points at the paired clause on the other side. References to clauses
    /// outside both models (correlated outer items) must be identical. A
    /// freshly cloned model is structurally equal to its source. This is also
    /// what `==` compares.
    pub fn structurally_eq(&self, other: &QueryModel) -> bool {
        Correspondence::default().models(self, other)
    }
}

impl PartialEq for QueryModel {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_eq(other)
    }
}

/// Pairs the from-clauses of two models while they are compared.
#[derive(Default)]
struct Correspondence {
    clauses: HashMap<ClauseId, ClauseId>,
}

impl Correspondence {
    fn models(&mut self, a: &QueryModel, b: &QueryModel) -> bool {
        if !self.from(&a.main_from, &b.main_from) || a.body.len() != b.body.len() {
            return false;
        }
        for (x, y) in a.body.iter().zip(&b.body) {
            let same = match (x, y) {
                (BodyClause::AdditionalFrom(x), BodyClause::AdditionalFrom(y)) => self.from(x, y),
                (BodyClause::Where(x), BodyClause::Where(y)) => {
                    self.expr(x.predicate(), y.predicate())
                }
                (BodyClause::OrderBy(x), BodyClause::OrderBy(y)) => {
                    x.orderings().len() == y.orderings().len()
                        && x.orderings().iter().zip(y.orderings()).all(|(p, q)| {
                            p.direction == q.direction && self.expr(&p.expression, &q.expression)
                        })
                }
                _ => false,
            };
            if !same {
                return false;
            }
        }
        if !self.expr(a.select.selector(), b.select.selector())
            || a.result_operators.len() != b.result_operators.len()
        {
            return false;
        }
        a.result_operators
            .iter()
            .zip(&b.result_operators)
            .all(|(x, y)| {
                let (xs, ys) = (x.expressions(), y.expressions());
                x.name() == y.name()
                    && xs.len() == ys.len()
                    && xs.iter().zip(&ys).all(|(p, q)| self.expr(p, q))
            })
    }

    /// Compares two from-clauses and, if they match, pairs their ids.
    fn from(&mut self, a: &FromClause, b: &FromClause) -> bool {
        let same = a.kind() == b.kind()
            && a.item_name() == b.item_name()
            && a.item_type() == b.item_type()
            && self.expr(a.from_expression(), b.from_expression());
        if same {
            self.clauses.insert(a.id(), b.id());
        }
        same
    }

    fn expr(&mut self, a: &Expr, b: &Expr) -> bool {
        match (a, b) {
            (Expr::SourceRef(x), Expr::SourceRef(y)) => {
                // Unpaired clauses lie outside both models and must be shared
                let target = self.clauses.get(&x.clause()).copied().unwrap_or(x.clause());
                target == y.clause() && x.item_name() == y.item_name()
            }
            (Expr::SubQuery(x), Expr::SubQuery(y)) => Arc::ptr_eq(x, y) || self.models(x, y),
            (
                Expr::Member {
                    object: xo,
                    member: xm,
                    ty: xt,
                },
                Expr::Member {
                    object: yo,
                    member: ym,
                    ty: yt,
                },
            ) => xm == ym && xt == yt && self.expr(xo, yo),
            (
                Expr::Binary {
                    op: xop,
                    left: xl,
                    right: xr,
                },
                Expr::Binary {
                    op: yop,
                    left: yl,
                    right: yr,
                },
            ) => xop == yop && self.expr(xl, yl) && self.expr(xr, yr),
            (Expr::Not(x), Expr::Not(y)) => self.expr(x, y),
            (
                Expr::Call {
                    object: xo,
                    method: xm,
                    args: xa,
                },
                Expr::Call {
                    object: yo,
                    method: ym,
                    args: ya,
                },
            ) => {
                xm == ym
                    && xa.len() == ya.len()
                    && self.expr(xo, yo)
                    && xa.iter().zip(ya).all(|(p, q)| self.expr(p, q))
            }
            (Expr::Record(xs), Expr::Record(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|((xn, xe), (yn, ye))| xn == yn && self.expr(xe, ye))
            }
            (Expr::Constant(_), Expr::Constant(_))
            | (Expr::DataSource { .. }, Expr::DataSource { .. })
            | (Expr::Parameter(_), Expr::Parameter(_)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for QueryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.main_from)?;
        for clause in &self.body {
            write!(f, " {clause}")?;
        }
        write!(f, " {}", self.select)?;
        for op in &self.result_operators {
            write!(f, " => {op}")?;
        }
        Ok(())
    }
}
