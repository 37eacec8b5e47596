use std::fmt;
use std::sync::Arc;

use crate::{
    ast::{BinOp, ElementType},
    clauses::SourceRef,
    ids::ParamId,
    model::QueryModel,
    output::to_json,
    value::Value,
};

/// A bound lambda parameter.
///
/// Every call to [`Parameter::new`] creates a distinct symbol, so substitution
/// never confuses two parameters that merely share a name.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    id: ParamId,
    name: Arc<str>,
    ty: ElementType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: ElementType) -> Self {
        Parameter {
            id: ParamId::fresh(),
            name: Arc::from(name.into()),
            ty,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &ElementType {
        &self.ty
    }

    /// Reference to this parameter as an expression.
    pub fn to_expr(&self) -> Expr {
        Expr::Parameter(self.clone())
    }
}

/// Expression tree node.
///
/// Lambda bodies handed in by the front-end use every variant except
/// `SourceRef`, which only the resolution engine introduces.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    ///
    /// # Example
    /// ```text
    /// 18
    /// "active"
    /// ```
    Constant(Value),

    /// Named collection the query starts from
    ///
    /// # Example
    /// ```text
    /// Students
    /// ```
    DataSource {
        name: String,
        element_type: ElementType,
    },

    /// Reference to a lambda parameter
    Parameter(Parameter),

    /// Member access with the member's static type
    ///
    /// # Examples
    /// ```text
    /// s.name
    /// [s].address.city
    /// ```
    Member {
        object: Box<Expr>,
        member: String,
        ty: ElementType,
    },

    /// Binary operation (arithmetic, comparison, logical)
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Logical negation
    Not(Box<Expr>),

    /// Method call on a value
    ///
    /// # Examples
    /// ```text
    /// s.name.upper()
    /// s.email.endswith("@example.com")
    /// ```
    Call {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },

    /// Record construction (anonymous projection)
    ///
    /// # Example
    /// ```text
    /// {name: s.name, age: s.age}
    /// ```
    Record(Vec<(String, Expr)>),

    /// Current item of a from-clause
    SourceRef(SourceRef),

    /// Nested, fully built query model
    SubQuery(Arc<QueryModel>),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn data_source(name: impl Into<String>, element_type: ElementType) -> Self {
        Expr::DataSource {
            name: name.into(),
            element_type,
        }
    }

    pub fn member(self, member: impl Into<String>, ty: ElementType) -> Self {
        Expr::Member {
            object: Box::new(self),
            member: member.into(),
            ty,
        }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(self, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            object: Box::new(self),
            method: method.into(),
            args,
        }
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn sub_query(model: QueryModel) -> Self {
        Expr::SubQuery(Arc::new(model))
    }

    /// Statically inferred type of this expression.
    pub fn ty(&self) -> ElementType {
        match self {
            Expr::Constant(value) => value.element_type(),
            Expr::DataSource { element_type, .. } => ElementType::sequence_of(element_type.clone()),
            Expr::Parameter(p) => p.ty().clone(),
            Expr::Member { ty, .. } => ty.clone(),
            Expr::Binary { op, left, right } => op.result_type(&left.ty(), &right.ty()),
            Expr::Not(_) => ElementType::Boolean,
            Expr::Call { method, .. } => method_result_type(method),
            Expr::Record(fields) => ElementType::Record(
                fields
                    .iter()
                    .map(|(name, expr)| (name.clone(), expr.ty()))
                    .collect(),
            ),
            Expr::SourceRef(source) => source.item_type().clone(),
            Expr::SubQuery(model) => model.output_type().unwrap_or(ElementType::Any),
        }
    }
}

fn method_result_type(method: &str) -> ElementType {
    match method {
        "upper" | "lower" | "trim" => ElementType::String,
        "contains" | "startswith" | "endswith" | "matches" => ElementType::Boolean,
        "length" | "count" => ElementType::Integer,
        _ => ElementType::Any,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(value) => write!(f, "{}", to_json(value)),
            Expr::DataSource { name, .. } => write!(f, "{name}"),
            Expr::Parameter(p) => write!(f, "{}", p.name()),
            Expr::Member { object, member, .. } => write!(f, "{object}.{member}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Not(inner) => write!(f, "not({inner})"),
            Expr::Call {
                object,
                method,
                args,
            } => {
                write!(f, "{object}.{method}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, expr)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {expr}")?;
                }
                write!(f, "}}")
            }
            Expr::SourceRef(source) => write!(f, "[{}]", source.item_name()),
            Expr::SubQuery(model) => write!(f, "{{{model}}}"),
        }
    }
}

/// A lambda as written by the user: bound parameters plus an unresolved body.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    parameters: Vec<Parameter>,
    body: Expr,
}

impl Lambda {
    pub fn new(parameters: Vec<Parameter>, body: Expr) -> Self {
        Lambda { parameters, body }
    }

    /// Lambda with exactly one parameter.
    pub fn unary(parameter: Parameter, body: Expr) -> Self {
        Lambda::new(vec![parameter], body)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameters.as_slice() {
            [single] => write!(f, "{} => {}", single.name(), self.body),
            params => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.name())?;
                }
                write!(f, ") => {}", self.body)
            }
        }
    }
}
