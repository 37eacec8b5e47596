use std::cmp::Ordering;
use std::collections::HashMap;

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::{
    ast::{BinOp, Expr, Parameter},
    error::{EvalError, Result},
    ids::{ClauseId, ParamId},
    value::Value,
};

/// Bindings visible while evaluating one expression.
///
/// Parameters are bound by result-operator lambdas, sources by the from-clauses
/// of the query (and of enclosing queries, for correlated sub-queries).
#[derive(Debug, Clone, Default)]
pub struct Environment {
    parameters: HashMap<ParamId, Value>,
    sources: HashMap<ClauseId, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new environment with `parameter` bound to `value`
    pub fn with_parameter(&self, parameter: &Parameter, value: Value) -> Self {
        let mut env = self.clone();
        env.parameters.insert(parameter.id(), value);
        env
    }

    /// Create a new environment with the current item of `clause` bound
    pub fn with_source(&self, clause: ClauseId, value: Value) -> Self {
        let mut env = self.clone();
        env.sources.insert(clause, value);
        env
    }

    pub fn parameter(&self, id: ParamId) -> Option<&Value> {
        self.parameters.get(&id)
    }

    pub fn source(&self, clause: ClauseId) -> Option<&Value> {
        self.sources.get(&clause)
    }
}

/// In-memory evaluator for expressions and query models.
///
/// Holds the rows of named data sources; everything else comes from the
/// expression or the environment.
///
/// # Examples
///
/// ```
/// use chainql::{BinOp, Environment, Evaluator, Expr, Value};
///
/// let evaluator = Evaluator::new();
/// let expr = Expr::binary(BinOp::Add, Expr::constant(40i64), Expr::constant(2i64));
///
/// let result = evaluator.eval(&expr, &Environment::new()).unwrap();
/// assert_eq!(result, Value::Integer(42));
/// ```
#[derive(Debug, Default)]
pub struct Evaluator {
    tables: HashMap<String, Vec<Value>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the rows of a named data source.
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.add_table(name, rows);
        self
    }

    pub fn add_table(&mut self, name: impl Into<String>, rows: Vec<Value>) {
        self.tables.insert(name.into(), rows);
    }

    /// Evaluates `expr` under `env`.
    pub fn eval(&self, expr: &Expr, env: &Environment) -> Result<Value> {
        match expr {
            Expr::Constant(value) => Ok(value.clone()),
            Expr::DataSource { name, .. } => self
                .tables
                .get(name)
                .map(|rows| Value::Array(rows.clone()))
                .ok_or_else(|| EvalError::UnknownTable(name.clone()).into()),
            Expr::Parameter(p) => env
                .parameter(p.id())
                .cloned()
                .ok_or_else(|| EvalError::UnboundParameter(p.name().to_string()).into()),
            Expr::SourceRef(source) => env
                .source(source.clause())
                .cloned()
                .ok_or_else(|| EvalError::UnboundSource(source.item_name().to_string()).into()),
            Expr::Member { object, member, .. } => {
                let value = self.eval(object, env)?;
                Ok(apply_member(&value, member)?)
            }
            Expr::Binary { op, left, right } => {
                let left_val = self.eval(left, env)?;
                match op {
                    BinOp::NullCoalesce if left_val != Value::Null => Ok(left_val),
                    BinOp::NullCoalesce => self.eval(right, env),
                    BinOp::And if !left_val.as_bool() => Ok(Value::Boolean(false)),
                    BinOp::Or if left_val.as_bool() => Ok(Value::Boolean(true)),
                    _ => {
                        let right_val = self.eval(right, env)?;
                        Ok(apply_binop(*op, &left_val, &right_val)?)
                    }
                }
            }
            Expr::Not(inner) => Ok(Value::Boolean(!self.eval(inner, env)?.as_bool())),
            Expr::Call {
                object,
                method,
                args,
            } => {
                let target = self.eval(object, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                Ok(eval_method_call(&target, method, &values)?)
            }
            Expr::Record(fields) => {
                let mut map = HashMap::new();
                for (key, expr) in fields {
                    map.insert(key.clone(), self.eval(expr, env)?);
                }
                Ok(Value::Object(map))
            }
            Expr::SubQuery(model) => Ok(self.execute_in(model, env)?.into_value()),
        }
    }
}

fn apply_member(object: &Value, member: &str) -> Result<Value, EvalError> {
    match object {
        Value::Object(map) => Ok(map.get(member).cloned().unwrap_or(Value::Null)),
        Value::Group { key, elements } => match member {
            "key" => Ok(key.as_ref().clone()),
            "elements" => Ok(Value::Array(elements.clone())),
            "count" => Ok(Value::Integer(elements.len() as i64)),
            _ => Err(EvalError::AccessError(format!(
                "group has no member '{member}'; use key, elements or count"
            ))),
        },
        // Null propagates through member chains
        Value::Null => Ok(Value::Null),
        other => Err(EvalError::TypeError(format!(
            "Cannot access member '{member}' on {}",
            other.type_name()
        ))),
    }
}

/// Mixed integer/float arithmetic goes through `Decimal` so that whole results
/// stay integers (`2 * 1.5 == 3`).
fn decimal_arith(op: BinOp, a: Decimal, b: Decimal) -> Option<Decimal> {
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Subtract => a.checked_sub(b),
        BinOp::Multiply => a.checked_mul(b),
        BinOp::Divide => a.checked_div(b),
        BinOp::Modulo => a.checked_rem(b),
        _ => None,
    }
}

fn float_arith(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Subtract => a - b,
        BinOp::Multiply => a * b,
        BinOp::Divide => a / b,
        _ => a % b,
    }
}

fn mixed_arith(op: BinOp, a: f64, b: f64, ad: Option<Decimal>, bd: Option<Decimal>) -> Value {
    if let (Some(ad), Some(bd)) = (ad, bd)
        && let Some(rd) = decimal_arith(op, ad, bd)
    {
        if rd.is_integer()
            && let Some(r) = rd.to_i64()
        {
            return Value::Integer(r);
        } else if let Some(r) = rd.to_f64() {
            return Value::Float(r);
        }
    }
    Value::Float(float_arith(op, a, b))
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) if matches!(op, BinOp::Divide | BinOp::Modulo) => {
            Err(EvalError::DivisionByZero)
        }
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(*b),
                BinOp::Subtract => a.checked_sub(*b),
                BinOp::Multiply => a.checked_mul(*b),
                // Exact division stays integral, otherwise falls back to float
                BinOp::Divide if a % b == 0 => Some(a / b),
                BinOp::Divide => return Ok(Value::Float(*a as f64 / *b as f64)),
                _ => a.checked_rem(*b),
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| EvalError::TypeError(format!("integer overflow in {a} {op} {b}")))
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_arith(op, *a, *b))),
        (Value::Integer(a), Value::Float(b)) => Ok(mixed_arith(
            op,
            *a as f64,
            *b,
            Decimal::from_i64(*a),
            Decimal::from_f64(*b),
        )),
        (Value::Float(a), Value::Integer(b)) => Ok(mixed_arith(
            op,
            *a,
            *b as f64,
            Decimal::from_f64(*a),
            Decimal::from_i64(*b),
        )),
        (Value::String(a), Value::String(b)) if op == BinOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (a, b) => Err(EvalError::TypeError(format!(
            "Cannot apply {op} to {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn apply_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add | BinOp::Subtract | BinOp::Multiply | BinOp::Divide | BinOp::Modulo => {
            arithmetic(op, left, right)
        }
        BinOp::Equal => Ok(Value::Boolean(values_equal(left, right))),
        BinOp::NotEqual => Ok(Value::Boolean(!values_equal(left, right))),
        BinOp::LessThan | BinOp::GreaterThan | BinOp::LessEqual | BinOp::GreaterEqual => {
            let ordering = ordered(left, right).ok_or_else(|| {
                EvalError::TypeError(format!(
                    "Cannot compare {} {op} {} (comparison requires numeric or string types)",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            let result = match op {
                BinOp::LessThan => ordering == Ordering::Less,
                BinOp::GreaterThan => ordering == Ordering::Greater,
                BinOp::LessEqual => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Boolean(result))
        }
        BinOp::And => Ok(Value::Boolean(left.as_bool() && right.as_bool())),
        BinOp::Or => Ok(Value::Boolean(left.as_bool() || right.as_bool())),
        BinOp::NullCoalesce => Ok(if *left == Value::Null {
            right.clone()
        } else {
            left.clone()
        }),
    }
}

/// `1 == 1.0` holds; otherwise structural equality.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
            (*a as f64) == *b
        }
        _ => left == right,
    }
}

/// Ordering for comparable pairs, `None` for incomparable ones.
fn ordered(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Total order used for sorting and Min/Max; null sorts first and
/// incomparable pairs are treated as equal.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => ordered(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Dispatch method calls to their implementations
fn eval_method_call(object: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    match method {
        "upper" => string_method(object, method, |s| Value::String(s.to_uppercase())),
        "lower" => string_method(object, method, |s| Value::String(s.to_lowercase())),
        "trim" => string_method(object, method, |s| Value::String(s.trim().to_string())),
        "length" => match object {
            Value::Array(arr) => Ok(Value::Integer(arr.len() as i64)),
            Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
            _ => Err(EvalError::TypeError(format!(
                ".length() requires array or string, got {}",
                object.type_name()
            ))),
        },
        "count" => match object {
            Value::Array(arr) => Ok(Value::Integer(arr.len() as i64)),
            Value::Group { elements, .. } => Ok(Value::Integer(elements.len() as i64)),
            _ => Err(EvalError::TypeError(format!(
                ".count() requires array, got {}",
                object.type_name()
            ))),
        },
        "contains" => match object {
            Value::Array(arr) => {
                let needle = single_arg(method, args)?;
                Ok(Value::Boolean(arr.iter().any(|v| values_equal(v, needle))))
            }
            _ => string_predicate(object, method, args, |s, sub| s.contains(sub)),
        },
        "startswith" => string_predicate(object, method, args, |s, p| s.starts_with(p)),
        "endswith" => string_predicate(object, method, args, |s, p| s.ends_with(p)),
        "matches" => {
            let pattern = match single_arg(method, args)? {
                Value::String(s) => s,
                other => {
                    return Err(EvalError::TypeError(format!(
                        ".matches() argument must be string, got {}",
                        other.type_name()
                    )));
                }
            };
            let re = regex::Regex::new(pattern)
                .map_err(|e| EvalError::TypeError(format!("invalid regex: {e}")))?;
            match object {
                Value::String(s) => Ok(Value::Boolean(re.is_match(s))),
                _ => Ok(Value::Boolean(false)),
            }
        }
        _ => Err(EvalError::UnknownMethod(method.to_string())),
    }
}

fn single_arg<'a>(method: &str, args: &'a [Value]) -> Result<&'a Value, EvalError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(EvalError::TypeError(format!(
            ".{method}() requires exactly one argument"
        ))),
    }
}

fn string_method(
    object: &Value,
    method: &str,
    f: impl FnOnce(&str) -> Value,
) -> Result<Value, EvalError> {
    match object {
        Value::String(s) => Ok(f(s)),
        _ => Err(EvalError::TypeError(format!(
            ".{method}() requires string, got {}",
            object.type_name()
        ))),
    }
}

fn string_predicate(
    object: &Value,
    method: &str,
    args: &[Value],
    f: impl FnOnce(&str, &str) -> bool,
) -> Result<Value, EvalError> {
    let s = match object {
        Value::String(s) => s,
        _ => {
            return Err(EvalError::TypeError(format!(
                ".{method}() requires string, got {}",
                object.type_name()
            )));
        }
    };
    match single_arg(method, args)? {
        Value::String(arg) => Ok(Value::Boolean(f(s, arg))),
        other => Err(EvalError::TypeError(format!(
            ".{method}() argument must be string, got {}",
            other.type_name()
        ))),
    }
}
