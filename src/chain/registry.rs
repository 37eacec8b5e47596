use std::collections::HashMap;
use std::sync::LazyLock;

use crate::{
    ast::{Expr, Lambda},
    clauses::OrderingDirection,
    error::{QueryModelError, Result},
    operators::{AggregateKind, ChoiceKind, SetOperationKind},
};

use super::NodeKind;

/// One argument of a chained call as the front-end captured it.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodArgument {
    Lambda(Lambda),
    Expression(Expr),
}

/// Builds a node from the arguments of a call, validating their shape.
pub type NodeFactory = fn(Vec<MethodArgument>) -> Result<NodeKind>;

static GLOBAL: LazyLock<NodeTypeRegistry> = LazyLock::new(NodeTypeRegistry::default);

/// Maps operation names to node factories.
///
/// The default registry knows every built-in operation plus the aliases
/// `filter`, `map` and `flat_map`. Names are case-sensitive.
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("where", |args| {
            let mut args = Args::new("Where", args);
            let predicate = args.lambda("predicate")?;
            args.finish()?;
            NodeKind::filter(predicate)
        });
        registry.register("select", |args| {
            let mut args = Args::new("Select", args);
            let selector = args.lambda("selector")?;
            args.finish()?;
            NodeKind::select(selector)
        });
        registry.register("select_many", |args| {
            let mut args = Args::new("SelectMany", args);
            let collection = args.lambda("collection selector")?;
            let result = args.optional_lambda("result selector")?;
            args.finish()?;
            NodeKind::select_many(collection, result)
        });
        registry.register("order_by", |args| ordering("OrderBy", args, false, false));
        registry.register("order_by_descending", |args| {
            ordering("OrderBy", args, false, true)
        });
        registry.register("then_by", |args| ordering("ThenBy", args, true, false));
        registry.register("then_by_descending", |args| ordering("ThenBy", args, true, true));
        registry.register("group_by", |args| {
            let mut args = Args::new("GroupBy", args);
            let key = args.lambda("key selector")?;
            let element = args.optional_lambda("element selector")?;
            args.finish()?;
            NodeKind::group_by(key, element)
        });
        registry.register("take", |args| {
            let mut args = Args::new("Take", args);
            let count = args.expression("count")?;
            args.finish()?;
            Ok(NodeKind::take(count))
        });
        registry.register("skip", |args| {
            let mut args = Args::new("Skip", args);
            let count = args.expression("count")?;
            args.finish()?;
            Ok(NodeKind::skip(count))
        });
        registry.register("distinct", |args| {
            Args::new("Distinct", args).finish()?;
            Ok(NodeKind::distinct())
        });
        registry.register("all", |args| {
            let mut args = Args::new("All", args);
            let predicate = args.lambda("predicate")?;
            args.finish()?;
            NodeKind::all(predicate)
        });
        registry.register("any", |args| {
            let mut args = Args::new("Any", args);
            let predicate = args.optional_lambda("predicate")?;
            args.finish()?;
            NodeKind::any(predicate)
        });
        registry.register("count", |args| aggregate("Count", AggregateKind::Count, args));
        registry.register("sum", |args| aggregate("Sum", AggregateKind::Sum, args));
        registry.register("min", |args| aggregate("Min", AggregateKind::Min, args));
        registry.register("max", |args| aggregate("Max", AggregateKind::Max, args));
        registry.register("average", |args| {
            aggregate("Average", AggregateKind::Average, args)
        });
        registry.register("union", |args| set_operation("Union", SetOperationKind::Union, args));
        registry.register("intersect", |args| {
            set_operation("Intersect", SetOperationKind::Intersect, args)
        });
        registry.register("except", |args| {
            set_operation("Except", SetOperationKind::Except, args)
        });
        registry.register("first", |args| choice("First", ChoiceKind::First, false, args));
        registry.register("first_or_default", |args| {
            choice("FirstOrDefault", ChoiceKind::First, true, args)
        });
        registry.register("single", |args| choice("Single", ChoiceKind::Single, false, args));
        registry.register("single_or_default", |args| {
            choice("SingleOrDefault", ChoiceKind::Single, true, args)
        });
        registry.register("last", |args| choice("Last", ChoiceKind::Last, false, args));
        registry.register("last_or_default", |args| {
            choice("LastOrDefault", ChoiceKind::Last, true, args)
        });
        registry.register("element_at", |args| element_at("ElementAt", false, args));
        registry.register("element_at_or_default", |args| {
            element_at("ElementAtOrDefault", true, args)
        });
        registry.register("fold", |args| {
            let mut args = Args::new("Fold", args);
            let seed = args.expression("seed")?;
            let func = args.lambda("accumulator")?;
            args.finish()?;
            NodeKind::fold(seed, func)
        });

        registry.alias("filter", "where");
        registry.alias("map", "select");
        registry.alias("flat_map", "select_many");
        registry
    }
}

impl NodeTypeRegistry {
    /// A registry without any operations.
    pub fn empty() -> Self {
        NodeTypeRegistry {
            factories: HashMap::new(),
        }
    }

    /// The process-wide default registry, built on first use.
    pub fn global() -> &'static NodeTypeRegistry {
        &GLOBAL
    }

    /// Register `factory` under `name`, returning the factory it replaces.
    pub fn register(&mut self, name: impl Into<String>, factory: NodeFactory) -> Option<NodeFactory> {
        self.factories.insert(name.into(), factory)
    }

    /// Make `alias` create the same nodes as `target`. Returns false if
    /// `target` is unknown.
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> bool {
        match self.factories.get(target).copied() {
            Some(factory) => {
                self.factories.insert(alias.into(), factory);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(&self, name: &str, args: Vec<MethodArgument>) -> Result<NodeKind> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| QueryModelError::UnsupportedOperation {
                node_type: "NodeTypeRegistry",
                operation: format!("unknown operation '{name}'"),
            })?;
        factory(args)
    }
}

/// Cursor over call arguments that reports shape errors against one node type.
struct Args {
    node_type: &'static str,
    args: std::vec::IntoIter<MethodArgument>,
    position: usize,
}

impl Args {
    fn new(node_type: &'static str, args: Vec<MethodArgument>) -> Self {
        Args {
            node_type,
            args: args.into_iter(),
            position: 0,
        }
    }

    fn invalid(&self, message: String) -> QueryModelError {
        QueryModelError::ArgumentValidation {
            node_type: self.node_type,
            message,
        }
    }

    fn next(&mut self) -> Option<MethodArgument> {
        self.position += 1;
        self.args.next()
    }

    fn lambda(&mut self, role: &str) -> Result<Lambda> {
        match self.next() {
            Some(MethodArgument::Lambda(lambda)) => Ok(lambda),
            Some(MethodArgument::Expression(_)) => Err(self.invalid(format!(
                "argument {} ({role}) must be a lambda",
                self.position
            ))),
            None => Err(self.invalid(format!("missing {role}"))),
        }
    }

    fn optional_lambda(&mut self, role: &str) -> Result<Option<Lambda>> {
        if self.args.as_slice().is_empty() {
            return Ok(None);
        }
        self.lambda(role).map(Some)
    }

    fn expression(&mut self, role: &str) -> Result<Expr> {
        match self.next() {
            Some(MethodArgument::Expression(expr)) => Ok(expr),
            Some(MethodArgument::Lambda(_)) => Err(self.invalid(format!(
                "argument {} ({role}) must be an expression",
                self.position
            ))),
            None => Err(self.invalid(format!("missing {role}"))),
        }
    }

    fn finish(self) -> Result<()> {
        let extra = self.args.len();
        if extra > 0 {
            return Err(self.invalid(format!("{extra} unexpected argument(s)")));
        }
        Ok(())
    }
}

fn ordering(
    node_type: &'static str,
    args: Vec<MethodArgument>,
    then: bool,
    descending: bool,
) -> Result<NodeKind> {
    let mut args = Args::new(node_type, args);
    let key = args.lambda("key selector")?;
    args.finish()?;
    let direction = if descending {
        OrderingDirection::Descending
    } else {
        OrderingDirection::Ascending
    };
    if then {
        NodeKind::then_by(key, direction)
    } else {
        NodeKind::order_by(key, direction)
    }
}

fn aggregate(
    node_type: &'static str,
    kind: AggregateKind,
    args: Vec<MethodArgument>,
) -> Result<NodeKind> {
    let role = match kind {
        AggregateKind::Count => "predicate",
        _ => "selector",
    };
    let mut args = Args::new(node_type, args);
    let selector = args.optional_lambda(role)?;
    args.finish()?;
    NodeKind::aggregate(kind, selector)
}

fn set_operation(
    node_type: &'static str,
    kind: SetOperationKind,
    args: Vec<MethodArgument>,
) -> Result<NodeKind> {
    let mut args = Args::new(node_type, args);
    let other = args.expression("second source")?;
    args.finish()?;
    Ok(NodeKind::set_operation(kind, other))
}

fn choice(
    node_type: &'static str,
    kind: ChoiceKind,
    or_default: bool,
    args: Vec<MethodArgument>,
) -> Result<NodeKind> {
    let mut args = Args::new(node_type, args);
    let predicate = args.optional_lambda("predicate")?;
    args.finish()?;
    NodeKind::choice(kind, predicate, or_default)
}

fn element_at(node_type: &'static str, or_default: bool, args: Vec<MethodArgument>) -> Result<NodeKind> {
    let mut args = Args::new(node_type, args);
    let index = args.expression("index")?;
    args.finish()?;
    Ok(NodeKind::element_at(index, or_default))
}
