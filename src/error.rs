//! Error types for chain resolution, model building and in-memory execution.

use thiserror::Error;

use crate::ast::ElementType;

/// Errors raised while building, resolving, cloning or executing a query model.
///
/// None of these are retried internally. A failed build never yields a
/// partially constructed [`QueryModel`](crate::QueryModel).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryModelError {
    /// Malformed lambda shapes or arguments when a node is constructed.
    #[error("invalid arguments for {node_type}: {message}")]
    ArgumentValidation {
        node_type: &'static str,
        message: String,
    },

    /// The node or operator does not implement the requested capability.
    #[error("{node_type} does not support {operation}")]
    UnsupportedOperation {
        node_type: &'static str,
        operation: String,
    },

    /// A clause or result operator was requested out of order.
    #[error(transparent)]
    Lookup(#[from] LookupFailure),

    /// An element type is incompatible with an operator's semantics.
    #[error("type mismatch in {operation}: cannot operate on elements of type {element_type}")]
    TypeMismatch {
        operation: String,
        element_type: ElementType,
    },

    /// A resolution cache was filled under one generation context and then
    /// queried under another.
    #[error(
        "{node_type} was already resolved under a different clause generation context; \
         a chain must be built with a single context"
    )]
    AmbiguousResolution { node_type: &'static str },

    /// Value-level failure while evaluating an expression in memory.
    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

/// Out-of-order access to a [`ClauseGenerationContext`](crate::ClauseGenerationContext).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupFailure {
    #[error("no {what} has been created for {node_type} yet; call {required} for it first")]
    NotYetCreated {
        node_type: &'static str,
        what: &'static str,
        required: &'static str,
    },

    #[error("{node_type} never produces a {what}")]
    NeverCreated {
        node_type: &'static str,
        what: &'static str,
    },

    #[error("a {what} is already registered for {node_type}")]
    AlreadyRegistered {
        node_type: &'static str,
        what: &'static str,
    },
}

/// Errors that can occur while evaluating expressions against values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Type mismatch or invalid operation for the given type
    #[error("Type error: {0}")]
    TypeError(String),

    /// Invalid field access or array index
    #[error("Access error: {0}")]
    AccessError(String),

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Method name not known to the evaluator
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Named data source without registered rows
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Parameter reference without a binding in the environment
    #[error("Unbound parameter: {0}")]
    UnboundParameter(String),

    /// Source reference to a clause that is not in scope
    #[error("Unbound source: [{0}]")]
    UnboundSource(String),

    /// First/Single/Last/ElementAt over an empty sequence
    #[error("{0}: sequence contains no matching element")]
    EmptySequence(&'static str),

    /// Single over more than one match
    #[error("{0}: sequence contains more than one matching element")]
    MultipleElements(&'static str),
}

pub type Result<T, E = QueryModelError> = std::result::Result<T, E>;
