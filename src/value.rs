use std::collections::HashMap;

use crate::ast::ElementType;

/// A runtime value flowing through in-memory execution.
///
/// This type represents all valid JSON types with a distinction between
/// integers and floats (unlike standard JSON which only has "number"), plus
/// the groups produced by a grouping operator.
///
/// # Examples
///
/// ```
/// use chainql::Value;
/// use std::collections::HashMap;
///
/// // Scalar values
/// let null = Value::Null;
/// let boolean = Value::Boolean(true);
/// let integer = Value::Integer(42);
/// let float = Value::Float(3.14);
/// let string = Value::String("hello".to_string());
///
/// // Collections
/// let array = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
///
/// let mut obj = HashMap::new();
/// obj.insert("key".to_string(), Value::String("value".to_string()));
/// let object = Value::Object(obj);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON null
    Null,

    /// JSON boolean (true/false)
    Boolean(bool),

    /// Floating-point number
    Float(f64),

    /// Integer number (preserved separately from floats)
    Integer(i64),

    /// UTF-8 string
    String(String),

    /// Array of values (homogeneous or heterogeneous)
    Array(Vec<Value>),

    /// Object with string keys and value values
    Object(HashMap<String, Value>),

    /// One group of a grouping result: its key and the grouped elements
    Group { key: Box<Value>, elements: Vec<Value> },
}

impl Value {
    /// Check if the value is truthy (for conditions)
    pub fn is_truthy(&self) -> bool {
        use Value::*;
        match self {
            Null => false,
            Boolean(b) => *b,
            Float(n) => *n > 0.0,
            Integer(n) => *n > 0,
            String(s) => !s.is_empty(),
            Array(arr) => !arr.is_empty(),
            Object(obj) => !obj.is_empty(),
            Group { elements, .. } => !elements.is_empty(),
        }
    }

    /// Convert to boolean for conditions
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            _ => self.is_truthy(),
        }
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(n) => Some(n.round() as i64),
            _ => None,
        }
    }

    /// Human-readable type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Group { .. } => "group",
        }
    }

    /// Element type inferred from the value itself.
    ///
    /// Arrays take the type of their first element; objects become records with
    /// fields in key order.
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Null => ElementType::Any,
            Value::Boolean(_) => ElementType::Boolean,
            Value::Integer(_) => ElementType::Integer,
            Value::Float(_) => ElementType::Float,
            Value::String(_) => ElementType::String,
            Value::Array(items) => ElementType::sequence_of(
                items.first().map_or(ElementType::Any, Value::element_type),
            ),
            Value::Object(map) => {
                let mut fields: Vec<_> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.element_type()))
                    .collect();
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                ElementType::Record(fields)
            }
            Value::Group { key, elements } => ElementType::group_of(
                key.element_type(),
                elements.first().map_or(ElementType::Any, Value::element_type),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
