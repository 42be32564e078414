//! WHERE/HAVING predicates.

use crate::expr::{ColumnRef, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A predicate node with its source position attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub pos: usize,
    pub kind: CondKind,
}

impl Cond {
    pub fn new(pos: usize, kind: CondKind) -> Self {
        Self { pos, kind }
    }

    /// Returns every column referenced anywhere inside this condition tree.
    pub fn referenced_columns(&self, out: &mut Vec<ColumnRef>) {
        match &self.kind {
            CondKind::Comparison { left, right, .. } => {
                left.referenced_columns(out);
                right.referenced_columns(out);
            }
            CondKind::Like { column, .. } | CondKind::IsNull { column, .. } => {
                out.push(column.clone())
            }
            CondKind::In { column, values, .. } => {
                out.push(column.clone());
                for v in values {
                    v.referenced_columns(out);
                }
            }
            CondKind::Between { column, low, high, .. } => {
                out.push(column.clone());
                low.referenced_columns(out);
                high.referenced_columns(out);
            }
            CondKind::And(l, r) | CondKind::Or(l, r) => {
                l.referenced_columns(out);
                r.referenced_columns(out);
            }
            CondKind::Not(inner) => inner.referenced_columns(out),
            CondKind::Expression(expr) => expr.referenced_columns(out),
        }
    }

    /// True if this condition is a form the FetchXML generator can push
    /// down directly: a comparison, LIKE, IS [NOT] NULL, IN, or BETWEEN
    /// between a bare column and a literal/variable (not another column, not
    /// a computed expression), or an AND/OR/NOT combination of such.
    pub fn is_pushable(&self) -> bool {
        match &self.kind {
            CondKind::Comparison { left, right, .. } => {
                (left.as_column().is_some() && is_value_like(right))
                    || (right.as_column().is_some() && is_value_like(left))
            }
            CondKind::Like { .. } | CondKind::IsNull { .. } => true,
            CondKind::In { values, .. } => values.iter().all(is_value_like),
            CondKind::Between { low, high, .. } => is_value_like(low) && is_value_like(high),
            CondKind::And(l, r) | CondKind::Or(l, r) => l.is_pushable() && r.is_pushable(),
            CondKind::Not(inner) => inner.is_pushable(),
            CondKind::Expression(_) => false,
        }
    }
}

fn is_value_like(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        crate::expr::ExprKind::Literal(_) | crate::expr::ExprKind::Variable(_)
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondKind {
    Comparison {
        op: CompareOp,
        left: Expr,
        right: Expr,
    },
    Like {
        column: ColumnRef,
        pattern: String,
        negated: bool,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    In {
        column: ColumnRef,
        values: Vec<Expr>,
        negated: bool,
    },
    Between {
        column: ColumnRef,
        low: Expr,
        high: Expr,
        negated: bool,
    },
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
    /// A predicate that cannot be decomposed into a column/value comparison
    /// at all (column-to-column, or either side computed). Always a residual.
    Expression(Expr),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprKind;
    use crate::literal::Literal;

    fn lit(v: i64) -> Expr {
        Expr::literal(0, Literal::Int(v))
    }

    fn col(name: &str) -> Expr {
        Expr::column(0, ColumnRef::new(name))
    }

    #[test]
    fn column_literal_comparison_is_pushable() {
        let c = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: col("revenue"),
                right: lit(100),
            },
        );
        assert!(c.is_pushable());
    }

    #[test]
    fn column_to_column_comparison_is_not_pushable() {
        let c = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: col("revenue"),
                right: col("cost"),
            },
        );
        assert!(!c.is_pushable());
    }

    #[test]
    fn and_of_pushable_is_pushable() {
        let a = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Eq,
                left: col("status"),
                right: lit(1),
            },
        );
        let b = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: col("revenue"),
                right: col("cost"),
            },
        );
        let combo = Cond::new(0, CondKind::And(Box::new(a), Box::new(b)));
        assert!(!combo.is_pushable());
    }

    #[test]
    fn expression_variant_is_never_pushable() {
        let c = Cond::new(0, CondKind::Expression(col("flag")));
        assert!(matches!(c.kind, CondKind::Expression(_)));
        assert!(!c.is_pushable());
    }
}
