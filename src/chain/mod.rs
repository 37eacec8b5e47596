//! # Query chains
//!
//! A [`QueryChain`] is an arena of [`ChainNode`]s. Each node records one
//! chained operation together with its unresolved lambdas and the index of the
//! node it was called on. The head is the only node without a source.
//!
//! ```text
//! students                       MainSource   (head)
//!   .where(s => s.age > 18)      Where        source = head
//!   .select(s => s.name)         Select       source = Where
//! ```
//!
//! Building a chain walks it from head to tail once:
//!
//! - clause-producing nodes (main source, where, select, select-many,
//!   order-by, then-by) emit clauses
//! - every other node emits a result operator
//!
//! Lambdas are resolved on demand by substituting their parameter with the
//! expression that produces the data at the source node. Each resolved lambda
//! is memoized in its node, so a chain of N nodes resolves in O(N).

mod build;
mod cache;
mod generate;
mod nodes;
mod registry;
mod resolve;

pub use cache::ResolutionCache;
pub use nodes::{ChainNode, LambdaSlot, NodeKind};
pub use registry::{MethodArgument, NodeFactory, NodeTypeRegistry};
pub use resolve::LambdaRole;

use std::fmt;

use crate::{
    ast::{ElementType, Expr},
    config::ChainOptions,
    error::{QueryModelError, Result},
    ids::ChainId,
};

/// Identity of a node: the chain it lives in and its arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    chain: ChainId,
    index: usize,
}

impl NodeId {
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain, self.index)
    }
}

/// What the front-end knows about one chained call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseInfo {
    /// Operation name, looked up in a [`NodeTypeRegistry`]
    pub operation: String,
    /// Node the operation was called on; `None` for the head
    pub source: Option<NodeId>,
    /// Preferred name for the node's output items
    pub identifier_hint: Option<String>,
}

impl ParseInfo {
    pub fn new(operation: impl Into<String>, source: NodeId) -> Self {
        ParseInfo {
            operation: operation.into(),
            source: Some(source),
            identifier_hint: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier_hint = Some(identifier.into());
        self
    }
}

/// Arena owning every node of one chain.
#[derive(Debug)]
pub struct QueryChain {
    id: ChainId,
    options: ChainOptions,
    nodes: Vec<ChainNode>,
}

impl Default for QueryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryChain {
    pub fn new() -> Self {
        Self::with_options(ChainOptions::default())
    }

    pub fn with_options(options: ChainOptions) -> Self {
        QueryChain {
            id: ChainId::fresh(),
            options,
            nodes: Vec::new(),
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds the head node reading `source`, whose items are called `identifier`.
    pub fn start(
        &mut self,
        source: Expr,
        item_type: ElementType,
        identifier: impl Into<String>,
    ) -> Result<NodeId> {
        let info = ParseInfo {
            operation: "source".to_string(),
            source: None,
            identifier_hint: Some(identifier.into()),
        };
        self.push(info, NodeKind::main_source(source, item_type))
    }

    /// Adds a node for an already validated operation.
    pub fn push(&mut self, info: ParseInfo, kind: NodeKind) -> Result<NodeId> {
        let node_type = kind.type_name();
        let invalid = |message: String| QueryModelError::ArgumentValidation { node_type, message };

        if self.nodes.len() >= self.options.max_chain_length {
            return Err(invalid(format!(
                "chain is limited to {} nodes",
                self.options.max_chain_length
            )));
        }

        match (&kind, info.source) {
            (NodeKind::MainSource { .. }, None) if self.nodes.is_empty() => {}
            (NodeKind::MainSource { .. }, None) => {
                return Err(invalid("a chain has exactly one head".to_string()));
            }
            (NodeKind::MainSource { .. }, Some(_)) => {
                return Err(invalid("the head cannot have a source".to_string()));
            }
            (_, None) => {
                return Err(invalid("only the head may omit its source".to_string()));
            }
            (_, Some(source)) => {
                if source.chain != self.id || source.index >= self.nodes.len() {
                    return Err(invalid(format!("source {source} is not a node of {}", self.id)));
                }
            }
        }

        let index = self.nodes.len();
        let identifier = match info.identifier_hint {
            Some(hint) => hint,
            None => match kind.default_identifier() {
                Some(name) => name.to_string(),
                None => format!("{}{index}", self.options.identifier_prefix),
            },
        };
        let id = NodeId {
            chain: self.id,
            index,
        };
        let producer = match info.source {
            Some(source) if kind.passes_through() => self.nodes[source.index].producer(),
            _ => id,
        };
        self.nodes.push(ChainNode::new(
            id,
            info.source,
            producer,
            identifier,
            info.operation,
            kind,
        ));
        Ok(id)
    }

    /// Front-end entry: creates the node for `info.operation` through
    /// `registry` and appends it.
    pub fn append_call(
        &mut self,
        registry: &NodeTypeRegistry,
        info: ParseInfo,
        args: Vec<MethodArgument>,
    ) -> Result<NodeId> {
        let kind = registry.create(&info.operation, args)?;
        self.push(info, kind)
    }

    pub fn node(&self, id: NodeId) -> Result<&ChainNode> {
        if id.chain != self.id {
            return Err(QueryModelError::ArgumentValidation {
                node_type: "QueryChain",
                message: format!("node {id} belongs to another chain"),
            });
        }
        self.nodes
            .get(id.index)
            .ok_or_else(|| QueryModelError::ArgumentValidation {
                node_type: "QueryChain",
                message: format!("no node {id}"),
            })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ChainNode> {
        self.nodes.iter()
    }

    /// Nodes from the head to `tail`, in chain order.
    pub fn path(&self, tail: NodeId) -> Result<Vec<&ChainNode>> {
        let mut path = Vec::new();
        let mut current = Some(tail);
        while let Some(id) = current {
            let node = self.node(id)?;
            path.push(node);
            current = node.source();
        }
        path.reverse();
        Ok(path)
    }

    /// Source of `node`; fails for the head.
    fn source_of(&self, node: &ChainNode) -> Result<NodeId> {
        node.source()
            .ok_or_else(|| QueryModelError::UnsupportedOperation {
                node_type: node.type_name(),
                operation: "resolution through a source".to_string(),
            })
    }
}
