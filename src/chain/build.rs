use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    clauses::{BodyClause, Clause, SelectClause},
    context::ClauseGenerationContext,
    error::{QueryModelError, Result},
    model::QueryModel,
};

use super::{NodeId, NodeKind, QueryChain};

impl QueryChain {
    /// Build the query model for the chain ending at `tail`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chainql::{BinOp, ElementType, Expr, Lambda, NodeKind, Parameter, ParseInfo, QueryChain};
    ///
    /// let student = ElementType::Object("Student".into());
    /// let mut chain = QueryChain::new();
    /// let head = chain
    ///     .start(Expr::data_source("Students", student.clone()), student.clone(), "s")
    ///     .unwrap();
    ///
    /// let s = Parameter::new("s", student.clone());
    /// let adult = Lambda::unary(
    ///     s.clone(),
    ///     Expr::binary(
    ///         BinOp::GreaterThan,
    ///         s.to_expr().member("age", ElementType::Integer),
    ///         Expr::constant(18i64),
    ///     ),
    /// );
    /// let tail = chain
    ///     .push(ParseInfo::new("where", head), NodeKind::filter(adult).unwrap())
    ///     .unwrap();
    ///
    /// let model = chain.build(tail).unwrap();
    /// assert_eq!(
    ///     model.to_string(),
    ///     "from Student s in Students where ([s].age > 18) select [s]"
    /// );
    /// ```
    pub fn build(&self, tail: NodeId) -> Result<QueryModel> {
        let mut ctx = ClauseGenerationContext::new();
        self.build_with_context(tail, &mut ctx)
    }

    /// Like [`QueryChain::build`], leaving the produced clauses and result
    /// operators readable in `ctx`.
    ///
    /// A chain must always be built with the same context: lambdas resolved
    /// under one context refuse to be reused under another.
    #[tracing::instrument(level = "debug", skip(self, ctx), fields(chain = %self.id(), context = %ctx.id()))]
    pub fn build_with_context(
        &self,
        tail: NodeId,
        ctx: &mut ClauseGenerationContext,
    ) -> Result<QueryModel> {
        let path = self.path(tail)?;
        debug!(nodes = path.len(), "building query model");

        let Some((head, rest)) = path.split_first() else {
            return Err(QueryModelError::ArgumentValidation {
                node_type: "QueryChain",
                message: "cannot build an empty chain".to_string(),
            });
        };
        let main_from = match self.create_clause(head.id(), None, ctx)? {
            Clause::MainFrom(from) => from,
            _ => {
                return Err(QueryModelError::ArgumentValidation {
                    node_type: head.type_name(),
                    message: "a chain must start with its data source".to_string(),
                });
            }
        };

        let mut body: Vec<BodyClause> = Vec::new();
        let mut operators = Vec::new();
        let mut last_clause = Clause::MainFrom(main_from.clone());
        let mut last_clause_node = head.id();

        for node in rest {
            if !node.kind().produces_clause() {
                operators.push(self.create_result_operator(node.id(), ctx)?);
                continue;
            }
            if let Some(op) = operators.last() {
                return Err(QueryModelError::UnsupportedOperation {
                    node_type: node.type_name(),
                    operation: format!("a clause after the result operator {}", op.name()),
                });
            }

            let clause = self.create_clause(node.id(), Some(&last_clause), ctx)?;
            trace!(node = %node.id(), node_type = node.type_name(), "added clause");
            if let Clause::Body(b) = &clause {
                // ThenBy hands back the extended order-by clause under its old id
                match body.last_mut() {
                    Some(last) if last.id() == b.id() => *last = b.clone(),
                    _ => body.push(b.clone()),
                }
            }
            last_clause = clause;
            last_clause_node = node.id();
        }

        // Interim selects are folded into later expressions by resolution; the
        // model only needs the projection of the last clause node.
        let select = match (&last_clause, self.node(last_clause_node)?.kind()) {
            (Clause::Select(select), NodeKind::Select { .. }) => select.clone(),
            _ => {
                let output = self.create_parameter_for_output(last_clause_node)?;
                let selector = self.resolve(last_clause_node, &output, &output.to_expr(), ctx)?;
                SelectClause::new(Arc::new(selector))
            }
        };

        let model = QueryModel::new(main_from, body, select, operators);
        debug!(query = %model, "built query model");
        Ok(model)
    }
}
