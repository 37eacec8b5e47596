use std::cell::OnceCell;
use std::sync::Arc;

use tracing::trace;

use crate::{
    ast::Expr,
    error::{QueryModelError, Result},
    ids::ContextId,
};

/// Set-once memo for one resolved lambda slot.
///
/// The first fill records the generation context it happened under. Asking
/// again under the same context returns the identical `Arc`; asking under a
/// different one is an error, since the cached expression may reference
/// clauses of the other build.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    cell: OnceCell<(ContextId, Arc<Expr>)>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_filled(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Context of the first fill, if any.
    pub fn owner(&self) -> Option<ContextId> {
        self.cell.get().map(|(owner, _)| *owner)
    }

    pub fn get_or_resolve(
        &self,
        node_type: &'static str,
        context: ContextId,
        resolve: impl FnOnce() -> Result<Expr>,
    ) -> Result<Arc<Expr>> {
        if let Some(cached) = self.cached(node_type, context) {
            return cached;
        }

        let expr = Arc::new(resolve()?);
        trace!(node_type, %context, resolved = %expr, "resolution cache filled");
        // Resolution only recurses upstream, so the cell is still empty here.
        // Should that ever break, the first fill wins.
        match self.cell.set((context, Arc::clone(&expr))) {
            Ok(()) => Ok(expr),
            Err(_) => self
                .cached(node_type, context)
                .unwrap_or(Err(QueryModelError::AmbiguousResolution { node_type })),
        }
    }

    fn cached(&self, node_type: &'static str, context: ContextId) -> Option<Result<Arc<Expr>>> {
        let (owner, expr) = self.cell.get()?;
        if *owner != context {
            return Some(Err(QueryModelError::AmbiguousResolution { node_type }));
        }
        Some(Ok(Arc::clone(expr)))
    }
}
