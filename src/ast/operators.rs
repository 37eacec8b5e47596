use std::fmt;

use crate::ast::ElementType;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Comparison
    /// Equal (`==`)
    Equal,
    /// Not equal (`!=`)
    NotEqual,
    /// Less than (`<`)
    LessThan,
    /// Greater than (`>`)
    GreaterThan,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than or equal (`>=`)
    GreaterEqual,

    // Arithmetic
    /// Addition or string concatenation (`+`)
    Add,
    /// Subtraction (`-`)
    Subtract,
    /// Multiplication (`*`)
    Multiply,
    /// Division (`/`)
    Divide,
    /// Modulo (`%`)
    Modulo,

    // Logical
    /// Logical AND (`and`)
    And,
    /// Logical OR (`or`)
    Or,

    // Null-coalescing
    /// Null-coalescing (`??`)
    NullCoalesce,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::LessThan => "<",
            BinOp::GreaterThan => ">",
            BinOp::LessEqual => "<=",
            BinOp::GreaterEqual => ">=",
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Modulo => "%",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::NullCoalesce => "??",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Equal
                | BinOp::NotEqual
                | BinOp::LessThan
                | BinOp::GreaterThan
                | BinOp::LessEqual
                | BinOp::GreaterEqual
        )
    }

    /// Static result type of `left op right`.
    pub fn result_type(self, left: &ElementType, right: &ElementType) -> ElementType {
        match self {
            op if op.is_comparison() => ElementType::Boolean,
            BinOp::And | BinOp::Or => ElementType::Boolean,
            BinOp::NullCoalesce => {
                if matches!(left, ElementType::Any) {
                    right.clone()
                } else {
                    left.clone()
                }
            }
            BinOp::Add if *left == ElementType::String && *right == ElementType::String => {
                ElementType::String
            }
            _ => match (left, right) {
                (ElementType::Integer, ElementType::Integer) => ElementType::Integer,
                (ElementType::Float, ElementType::Integer | ElementType::Float)
                | (ElementType::Integer, ElementType::Float) => ElementType::Float,
                _ => ElementType::Any,
            },
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
