//! Per-build bookkeeping of what each chain node produced.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::{
    chain::{ChainNode, NodeId},
    clauses::Clause,
    error::{LookupFailure, Result},
    ids::ContextId,
    operators::ResultOperator,
};

/// Clauses and result operators produced during one build pass, keyed by the
/// node that produced them.
///
/// Node identity is the arena position inside a specific chain, so two
/// structurally equal nodes never share an entry.
#[derive(Debug)]
pub struct ClauseGenerationContext {
    id: ContextId,
    clauses: HashMap<NodeId, Clause>,
    operators: HashMap<NodeId, Arc<dyn ResultOperator>>,
}

impl Default for ClauseGenerationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ClauseGenerationContext {
    pub fn new() -> Self {
        ClauseGenerationContext {
            id: ContextId::fresh(),
            clauses: HashMap::new(),
            operators: HashMap::new(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    pub fn add_clause(&mut self, node: &ChainNode, clause: Clause) -> Result<()> {
        if !node.kind().produces_clause() {
            return Err(LookupFailure::NeverCreated {
                node_type: node.type_name(),
                what: "clause",
            }
            .into());
        }
        match self.clauses.entry(node.id()) {
            Entry::Occupied(_) => Err(LookupFailure::AlreadyRegistered {
                node_type: node.type_name(),
                what: "clause",
            }
            .into()),
            Entry::Vacant(slot) => {
                slot.insert(clause);
                Ok(())
            }
        }
    }

    /// The clause `node` produced in this pass.
    pub fn clause(&self, node: &ChainNode) -> Result<&Clause> {
        if !node.kind().produces_clause() {
            return Err(LookupFailure::NeverCreated {
                node_type: node.type_name(),
                what: "clause",
            }
            .into());
        }
        self.clauses.get(&node.id()).ok_or_else(|| {
            LookupFailure::NotYetCreated {
                node_type: node.type_name(),
                what: "clause",
                required: "create_clause",
            }
            .into()
        })
    }

    pub fn add_result_operator(
        &mut self,
        node: &ChainNode,
        operator: Arc<dyn ResultOperator>,
    ) -> Result<()> {
        if node.kind().produces_clause() {
            return Err(LookupFailure::NeverCreated {
                node_type: node.type_name(),
                what: "result operator",
            }
            .into());
        }
        match self.operators.entry(node.id()) {
            Entry::Occupied(_) => Err(LookupFailure::AlreadyRegistered {
                node_type: node.type_name(),
                what: "result operator",
            }
            .into()),
            Entry::Vacant(slot) => {
                slot.insert(operator);
                Ok(())
            }
        }
    }

    /// The result operator `node` produced in this pass.
    pub fn result_operator(&self, node: &ChainNode) -> Result<&Arc<dyn ResultOperator>> {
        if node.kind().produces_clause() {
            return Err(LookupFailure::NeverCreated {
                node_type: node.type_name(),
                what: "result operator",
            }
            .into());
        }
        self.operators.get(&node.id()).ok_or_else(|| {
            LookupFailure::NotYetCreated {
                node_type: node.type_name(),
                what: "result operator",
                required: "create_result_operator",
            }
            .into()
        })
    }
}
