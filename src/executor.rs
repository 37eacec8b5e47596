//! Runs a [`QueryModel`] against in-memory data.
//!
//! Each row of the clause pipeline is an [`Environment`] binding every
//! from-clause in scope to its current item. The select clause turns rows
//! into values, and the result operators run over those values in order.

use std::cmp::Ordering as CmpOrdering;

use tracing::trace;

use crate::{
    clauses::{BodyClause, FromClause, OrderingDirection},
    error::{EvalError, QueryModelError, Result},
    evaluator::{Environment, Evaluator, compare_values},
    model::QueryModel,
    operators::{InMemoryOutput, InMemorySequence},
    value::Value,
};

impl Evaluator {
    /// Execute `model` with no outer bindings.
    ///
    /// # Examples
    ///
    /// ```
    /// use chainql::{ElementType, Evaluator, Expr, ParseInfo, QueryChain, Value};
    /// use chainql::chain::NodeTypeRegistry;
    ///
    /// let mut chain = QueryChain::new();
    /// let head = chain
    ///     .start(Expr::data_source("numbers", ElementType::Integer), ElementType::Integer, "n")
    ///     .unwrap();
    /// let count = chain
    ///     .append_call(NodeTypeRegistry::global(), ParseInfo::new("count", head), vec![])
    ///     .unwrap();
    /// let model = chain.build(count).unwrap();
    ///
    /// let evaluator = Evaluator::new().with_table("numbers", vec![Value::Integer(1), Value::Integer(2)]);
    /// assert_eq!(evaluator.execute(&model).unwrap().into_value(), Value::Integer(2));
    /// ```
    pub fn execute(&self, model: &QueryModel) -> Result<InMemoryOutput> {
        self.execute_in(model, &Environment::new())
    }

    /// Execute `model` with `outer` in scope, as needed by correlated sub-queries.
    #[tracing::instrument(level = "debug", skip_all, fields(query = %model))]
    pub(crate) fn execute_in(&self, model: &QueryModel, outer: &Environment) -> Result<InMemoryOutput> {
        let mut rows = self.expand(model.main_from(), vec![outer.clone()])?;
        trace!(rows = rows.len(), "main from");

        for clause in model.body_clauses() {
            rows = match clause {
                BodyClause::AdditionalFrom(from) => self.expand(from, rows)?,
                BodyClause::Where(w) => {
                    let mut kept = Vec::with_capacity(rows.len());
                    for row in rows {
                        if self.eval(w.predicate(), &row)?.as_bool() {
                            kept.push(row);
                        }
                    }
                    kept
                }
                BodyClause::OrderBy(order) => {
                    let mut keyed = Vec::with_capacity(rows.len());
                    for row in rows {
                        let keys = order
                            .orderings()
                            .iter()
                            .map(|o| self.eval(&o.expression, &row))
                            .collect::<Result<Vec<_>>>()?;
                        keyed.push((keys, row));
                    }
                    // Stable, so equal keys keep their incoming order
                    keyed.sort_by(|(a, _), (b, _)| {
                        for ((ka, kb), ordering) in a.iter().zip(b).zip(order.orderings()) {
                            let cmp = match ordering.direction {
                                OrderingDirection::Ascending => compare_values(ka, kb),
                                OrderingDirection::Descending => compare_values(kb, ka),
                            };
                            if cmp != CmpOrdering::Equal {
                                return cmp;
                            }
                        }
                        CmpOrdering::Equal
                    });
                    keyed.into_iter().map(|(_, row)| row).collect()
                }
            };
            trace!(clause = %clause, rows = rows.len(), "body clause");
        }

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(self.eval(model.select().selector(), row)?);
        }

        let mut output = InMemoryOutput::Sequence(InMemorySequence::new(
            model.select().selector().ty(),
            items,
        ));
        for op in model.result_operators() {
            let input = match output {
                InMemoryOutput::Sequence(seq) => seq,
                _ => {
                    return Err(QueryModelError::UnsupportedOperation {
                        node_type: op.name(),
                        operation: "execution after a scalar or single-element result".into(),
                    });
                }
            };
            output = op.execute_in_memory(input, self, outer)?;
            trace!(operator = op.name(), strategy = %output.strategy(), "result operator");
        }
        Ok(output)
    }

    /// Cross every row with the items of `from`.
    fn expand(&self, from: &FromClause, rows: Vec<Environment>) -> Result<Vec<Environment>> {
        let mut expanded = Vec::new();
        for row in rows {
            let items = match self.eval(from.from_expression(), &row)? {
                Value::Array(items) => items,
                Value::Group { elements, .. } => elements,
                Value::Null => Vec::new(),
                other => {
                    return Err(EvalError::TypeError(format!(
                        "from {} requires a sequence, got {}",
                        from.item_name(),
                        other.type_name()
                    ))
                    .into());
                }
            };
            for item in items {
                expanded.push(row.with_source(from.id(), item));
            }
        }
        Ok(expanded)
    }
}
