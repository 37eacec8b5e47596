//! Parameter substitution and free-variable analysis over expression trees.
//!
//! [`replace_parameter`] is the single rewriting primitive the resolution engine
//! relies on. It descends into nested sub-query models so that correlated
//! references to outer parameters are rewritten as well.

use std::sync::Arc;

use crate::{
    ast::{Expr, Parameter},
    error::Result,
    ids::ParamId,
};

/// Replace every reference to `target` in `expr` with `replacement`.
///
/// # Examples
/// ```text
/// replace(s, [s], s.age > 18)      →  [s].age > 18
/// replace(n, [s].name, n.upper())  →  [s].name.upper()
/// ```
pub fn replace_parameter(target: &Parameter, replacement: &Expr, expr: &Expr) -> Result<Expr> {
    if !uses_parameter(expr, target) {
        return Ok(expr.clone());
    }

    let recurse = |e: &Expr| replace_parameter(target, replacement, e);

    Ok(match expr {
        Expr::Parameter(p) if p.id() == target.id() => replacement.clone(),

        Expr::Member { object, member, ty } => Expr::Member {
            object: Box::new(recurse(object)?),
            member: member.clone(),
            ty: ty.clone(),
        },

        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(recurse(left)?),
            right: Box::new(recurse(right)?),
        },

        Expr::Not(inner) => Expr::Not(Box::new(recurse(inner)?)),

        Expr::Call {
            object,
            method,
            args,
        } => Expr::Call {
            object: Box::new(recurse(object)?),
            method: method.clone(),
            args: args.iter().map(recurse).collect::<Result<_>>()?,
        },

        Expr::Record(fields) => Expr::Record(
            fields
                .iter()
                .map(|(name, e)| Ok((name.clone(), recurse(e)?)))
                .collect::<Result<_>>()?,
        ),

        Expr::SubQuery(model) => {
            let rewritten = model.transform_expressions(&mut |slot: &Arc<Expr>| {
                if uses_parameter(slot, target) {
                    Ok(Arc::new(replace_parameter(target, replacement, slot)?))
                } else {
                    Ok(Arc::clone(slot))
                }
            })?;
            Expr::SubQuery(Arc::new(rewritten))
        }

        // Leaves that do not mention `target`
        other => other.clone(),
    })
}

/// Check whether `expr` references `param`, including inside sub-queries.
pub fn uses_parameter(expr: &Expr, param: &Parameter) -> bool {
    any_node(expr, &mut |e| matches!(e, Expr::Parameter(p) if p.id() == param.id()))
}

/// Check whether `expr` references any clause (directly or via a sub-query).
pub fn references_clauses(expr: &Expr) -> bool {
    any_node(expr, &mut |e| matches!(e, Expr::SourceRef(_) | Expr::SubQuery(_)))
}

/// All distinct parameters referenced by `expr`, in first-seen order.
pub fn free_parameters(expr: &Expr) -> Vec<Parameter> {
    let mut found: Vec<Parameter> = Vec::new();
    let mut seen: Vec<ParamId> = Vec::new();
    any_node(expr, &mut |e| {
        if let Expr::Parameter(p) = e
            && !seen.contains(&p.id())
        {
            seen.push(p.id());
            found.push(p.clone());
        }
        false
    });
    found
}

/// Pre-order walk that stops as soon as `pred` returns true.
fn any_node(expr: &Expr, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
    if pred(expr) {
        return true;
    }

    match expr {
        Expr::Member { object, .. } => any_node(object, pred),
        Expr::Binary { left, right, .. } => any_node(left, pred) || any_node(right, pred),
        Expr::Not(inner) => any_node(inner, pred),
        Expr::Call { object, args, .. } => {
            any_node(object, pred) || args.iter().any(|arg| any_node(arg, pred))
        }
        Expr::Record(fields) => fields.iter().any(|(_, e)| any_node(e, pred)),
        Expr::SubQuery(model) => model.expressions().iter().any(|e| any_node(e, pred)),

        // These never contain nested expressions
        Expr::Constant(_) | Expr::DataSource { .. } | Expr::Parameter(_) | Expr::SourceRef(_) => {
            false
        }
    }
}
