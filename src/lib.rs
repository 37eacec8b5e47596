//! Resolve fluent chains of sequence operations into query models.
//!
//! A front-end records each chained call (`where`, `select`, `group_by`, ...)
//! as a node of a [`QueryChain`], with its lambdas still unresolved. Building
//! the chain substitutes every lambda parameter with the expression that
//! produces the data at that point and yields a [`QueryModel`]: a main
//! from-clause, body clauses, a select clause and trailing result operators.
//! The model can be executed in memory by an [`Evaluator`] or walked by any
//! other backend.
pub mod ast;
pub mod chain;
pub mod clauses;
pub mod clone;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod evaluator;
mod executor;
pub mod ids;
pub mod model;
pub mod operators;
pub mod output;
pub mod replace;
pub mod value;

pub use ast::{BinOp, ElementType, Expr, Lambda, Parameter};
pub use chain::{ChainNode, MethodArgument, NodeId, NodeKind, NodeTypeRegistry, ParseInfo, QueryChain};
pub use clauses::{BodyClause, Clause, FromClause, FromKind, OrderingDirection, SelectClause};
pub use clone::CloneContext;
pub use config::ChainOptions;
pub use context::ClauseGenerationContext;
pub use error::{EvalError, LookupFailure, QueryModelError};
pub use evaluator::{Environment, Evaluator};
pub use model::QueryModel;
pub use operators::{ExecutionStrategy, InMemoryOutput, InMemorySequence, ResultOperator};
pub use output::{to_json, to_json_pretty};
pub use value::Value;
