use std::fmt;

/// Static element type of an expression or a sequence.
///
/// Types are attached by the front-end (parameters, member accesses, data
/// sources) and propagated structurally everywhere else. `Any` is a wildcard
/// that is compatible with every other type.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    /// Unknown or dynamic
    Any,
    Boolean,
    Integer,
    Float,
    String,
    /// Named entity type, e.g. `Student`
    Object(String),
    /// Anonymous record produced by a projection
    Record(Vec<(String, ElementType)>),
    /// Sequence of elements
    Sequence(Box<ElementType>),
    /// Output element of a grouping
    Group {
        key: Box<ElementType>,
        element: Box<ElementType>,
    },
}

impl ElementType {
    pub fn sequence_of(element: ElementType) -> Self {
        ElementType::Sequence(Box::new(element))
    }

    pub fn group_of(key: ElementType, element: ElementType) -> Self {
        ElementType::Group {
            key: Box::new(key),
            element: Box::new(element),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ElementType::Integer | ElementType::Float)
    }

    /// Types that Min/Max/OrderBy know how to compare.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            ElementType::Any | ElementType::Integer | ElementType::Float | ElementType::String
        )
    }

    /// Element type of a sequence type; `Any` yields `Any`.
    pub fn element(&self) -> Option<ElementType> {
        match self {
            ElementType::Sequence(inner) => Some(inner.as_ref().clone()),
            ElementType::Any => Some(ElementType::Any),
            _ => None,
        }
    }

    /// Structural compatibility with `Any` acting as a wildcard at any depth.
    pub fn is_compatible(&self, other: &ElementType) -> bool {
        match (self, other) {
            (ElementType::Any, _) | (_, ElementType::Any) => true,
            (ElementType::Sequence(a), ElementType::Sequence(b)) => a.is_compatible(b),
            (
                ElementType::Group { key: ka, element: ea },
                ElementType::Group { key: kb, element: eb },
            ) => ka.is_compatible(kb) && ea.is_compatible(eb),
            (ElementType::Record(a), ElementType::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((na, ta), (nb, tb))| na == nb && ta.is_compatible(tb))
            }
            (a, b) => a == b,
        }
    }

    /// Looks up a field of a record type.
    pub fn field(&self, name: &str) -> Option<&ElementType> {
        match self {
            ElementType::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, t)| t),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Any => write!(f, "any"),
            ElementType::Boolean => write!(f, "boolean"),
            ElementType::Integer => write!(f, "integer"),
            ElementType::Float => write!(f, "float"),
            ElementType::String => write!(f, "string"),
            ElementType::Object(name) => write!(f, "{name}"),
            ElementType::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            ElementType::Sequence(inner) => write!(f, "sequence<{inner}>"),
            ElementType::Group { key, element } => write!(f, "group<{key}, {element}>"),
        }
    }
}
