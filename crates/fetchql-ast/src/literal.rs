//! Literal values that can appear in expressions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A literal value parsed directly from source text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Null,
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Decimal(v) => write!(f, "{v}"),
            Literal::String(v) => write!(f, "{v}"),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Literal::Null => write!(f, "NULL"),
        }
    }
}
