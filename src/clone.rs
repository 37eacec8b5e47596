//! Structural duplication of built query models.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    ast::Expr,
    clauses::SourceRef,
    error::Result,
    ids::ClauseId,
    replace::references_clauses,
};

/// Bookkeeping for one clone operation.
///
/// Every from-clause that gets cloned registers `original id → clone`, so that
/// expressions cloned afterwards (including correlated sub-queries pointing at
/// an outer clause) are rewritten to reference the clones. References to
/// clauses outside the cloned graph are left untouched.
#[derive(Debug, Default)]
pub struct CloneContext {
    clause_mapping: HashMap<ClauseId, SourceRef>,
}

impl CloneContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, original: ClauseId, clone: SourceRef) {
        self.clause_mapping.insert(original, clone);
    }

    pub fn lookup(&self, original: ClauseId) -> Option<&SourceRef> {
        self.clause_mapping.get(&original)
    }

    pub fn len(&self) -> usize {
        self.clause_mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clause_mapping.is_empty()
    }

    /// Rewrite clause references in `expr` through the mapping.
    ///
    /// Expressions without clause references are shared, not copied.
    pub fn remap_expr(&mut self, expr: &Arc<Expr>) -> Result<Arc<Expr>> {
        if !references_clauses(expr) {
            return Ok(Arc::clone(expr));
        }
        Ok(Arc::new(self.remap(expr)?))
    }

    fn remap(&mut self, expr: &Expr) -> Result<Expr> {
        Ok(match expr {
            Expr::SourceRef(source) => match self.lookup(source.clause()) {
                Some(mapped) => Expr::SourceRef(mapped.clone()),
                None => expr.clone(),
            },
            Expr::SubQuery(model) => Expr::SubQuery(Arc::new(model.clone_with(self)?)),
            Expr::Member { object, member, ty } => Expr::Member {
                object: Box::new(self.remap(object)?),
                member: member.clone(),
                ty: ty.clone(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(self.remap(left)?),
                right: Box::new(self.remap(right)?),
            },
            Expr::Not(inner) => Expr::Not(Box::new(self.remap(inner)?)),
            Expr::Call {
                object,
                method,
                args,
            } => {
                let mut remapped = Vec::with_capacity(args.len());
                for arg in args {
                    remapped.push(self.remap(arg)?);
                }
                Expr::Call {
                    object: Box::new(self.remap(object)?),
                    method: method.clone(),
                    args: remapped,
                }
            }
            Expr::Record(fields) => {
                let mut remapped = Vec::with_capacity(fields.len());
                for (name, e) in fields {
                    remapped.push((name.clone(), self.remap(e)?));
                }
                Expr::Record(remapped)
            }
            Expr::Constant(_) | Expr::DataSource { .. } | Expr::Parameter(_) => expr.clone(),
        })
    }
}
