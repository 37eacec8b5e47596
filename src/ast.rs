//! # Lambda Expression Trees
//!
//! This module defines the expression trees that chain nodes carry and that the
//! resolution engine rewrites.
//!
//! ## Architecture Overview
//!
//! - **[expressions]** - Expression nodes, parameters and lambdas
//! - **[operators]** - Binary operators (comparison, arithmetic, logical)
//! - **[types]** - Element types used for inference and operator checks
//!
//! ## Core Concepts
//!
//! A front-end hands every chained operation its lambdas unresolved:
//!
//! ```text
//! students.where(s => s.age > 18).select(s => s.name)
//! ```
//!
//! Here both `s` parameters are free. Resolution replaces each of them with the
//! expression that actually produces the data at that point of the chain, so
//! the projection above becomes `[s].name`, a member access on a reference to
//! the main from-clause.
//!
//! Two expression variants only appear after resolution or model building:
//!
//! - `SourceRef` - reference to the current item of a from-clause
//! - `SubQuery` - a nested, fully built query model (correlated sub-query)
pub mod expressions;
pub mod operators;
pub mod types;

pub use expressions::{Expr, Lambda, Parameter};
pub use operators::BinOp;
pub use types::ElementType;
