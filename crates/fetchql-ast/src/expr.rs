//! Scalar expressions.

use crate::literal::Literal;

/// A (optional qualifier, name) reference to a column, e.g. `a.name` or `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An expression node with its source position attached for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub pos: usize,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(pos: usize, kind: ExprKind) -> Self {
        Self { pos, kind }
    }

    pub fn literal(pos: usize, lit: Literal) -> Self {
        Self::new(pos, ExprKind::Literal(lit))
    }

    pub fn column(pos: usize, col: ColumnRef) -> Self {
        Self::new(pos, ExprKind::Column(col))
    }

    /// Returns every column referenced anywhere inside this expression tree.
    /// Used by the FetchXML generator to harvest the attribute set a
    /// residual condition or computed projection requires.
    pub fn referenced_columns(&self, out: &mut Vec<ColumnRef>) {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => {}
            ExprKind::Column(c) => out.push(c.clone()),
            ExprKind::FunctionCall { args, .. } => {
                for a in args {
                    a.referenced_columns(out);
                }
            }
            ExprKind::Unary { expr, .. } | ExprKind::Parenthesis(expr) | ExprKind::Cast { expr, .. } => {
                expr.referenced_columns(out)
            }
            ExprKind::Binary { left, right, .. } => {
                left.referenced_columns(out);
                right.referenced_columns(out);
            }
            ExprKind::Case { when_then, else_ } => {
                for (cond, expr) in when_then {
                    cond.referenced_columns(out);
                    expr.referenced_columns(out);
                }
                if let Some(e) = else_ {
                    e.referenced_columns(out);
                }
            }
            ExprKind::Iif { cond, then, els } => {
                cond.referenced_columns(out);
                then.referenced_columns(out);
                els.referenced_columns(out);
            }
        }
    }

    /// Whether this expression is a bare column reference (as opposed to a
    /// computed expression) — used by the generator to decide between an
    /// emitted `<attribute>` and a residual projection.
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match &self.kind {
            ExprKind::Column(c) => Some(c),
            ExprKind::Parenthesis(inner) => inner.as_column(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Column(ColumnRef),
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Case {
        when_then: Vec<(crate::condition::Cond, Expr)>,
        else_: Option<Box<Expr>>,
    },
    Iif {
        cond: Box<crate::condition::Cond>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        target_type: String,
    },
    Parenthesis(Box<Expr>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_columns_collects_both_sides_of_binary() {
        let expr = Expr::new(
            0,
            ExprKind::Binary {
                op: BinaryOp::Gt,
                left: Box::new(Expr::column(0, ColumnRef::new("revenue"))),
                right: Box::new(Expr::column(0, ColumnRef::new("cost"))),
            },
        );
        let mut cols = Vec::new();
        expr.referenced_columns(&mut cols);
        assert_eq!(cols, vec![ColumnRef::new("revenue"), ColumnRef::new("cost")]);
    }

    #[test]
    fn as_column_sees_through_parenthesis() {
        let expr = Expr::new(
            0,
            ExprKind::Parenthesis(Box::new(Expr::column(0, ColumnRef::new("name")))),
        );
        assert_eq!(expr.as_column(), Some(&ColumnRef::new("name")));
    }
}
