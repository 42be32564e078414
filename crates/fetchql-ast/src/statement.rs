//! Top-level statements.

use crate::condition::Cond;
use crate::expr::{ColumnRef, Expr};

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// The alias if present, else the table name — what column qualifiers
    /// resolve against.
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub pos: usize,
    pub table: TableRef,
    pub join_type: JoinType,
    pub left_col: ColumnRef,
    pub right_col: ColumnRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Quarter,
    Week,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupByItem {
    Column(ColumnRef),
    DatePart { part: DatePart, column: ColumnRef },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// Name of a SELECT-list alias or a plain column.
    pub name: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub distinct: bool,
    pub top: Option<u32>,
    pub columns: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Cond>,
    pub group_by: Vec<GroupByItem>,
    pub having: Option<Cond>,
    pub order_by: Vec<OrderByItem>,
}

impl SelectStatement {
    pub fn has_aggregate_columns(&self) -> bool {
        self.columns.iter().any(|c| matches!(
            &c.expr.kind,
            crate::expr::ExprKind::FunctionCall { name, .. }
                if is_aggregate_fn(name)
        ))
    }

    /// True for `SELECT COUNT(*) FROM t` with no joins, WHERE, GROUP BY, or
    /// DISTINCT — the shape eligible for the fast total-record-count path.
    pub fn is_bare_count_star(&self) -> bool {
        self.columns.len() == 1
            && self.joins.is_empty()
            && self.where_clause.is_none()
            && self.group_by.is_empty()
            && !self.distinct
            && matches!(
                &self.columns[0].expr.kind,
                crate::expr::ExprKind::FunctionCall { name, args }
                    if name.eq_ignore_ascii_case("count") && args.len() == 1
                        && matches!(&args[0].kind, crate::expr::ExprKind::Column(c) if c.name == "*")
            )
    }
}

pub fn is_aggregate_fn(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX"
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Select(Box<SelectStatement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub set: Vec<(String, Expr)>,
    pub where_clause: Option<Cond>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub where_clause: Option<Cond>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionStatement {
    pub left: Box<Statement>,
    pub right: Box<Statement>,
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclareStatement {
    pub name: String,
    pub sql_type: String,
    pub initial: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetStatement {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Union(UnionStatement),
    Declare(DeclareStatement),
    Set(SetStatement),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprKind;

    fn count_star() -> SelectStatement {
        SelectStatement {
            columns: vec![SelectItem {
                expr: Expr::new(
                    0,
                    ExprKind::FunctionCall {
                        name: "COUNT".into(),
                        args: vec![Expr::column(0, ColumnRef::new("*"))],
                    },
                ),
                alias: None,
            }],
            from: Some(TableRef::new("account")),
            ..Default::default()
        }
    }

    #[test]
    fn bare_count_star_detected() {
        assert!(count_star().is_bare_count_star());
    }

    #[test]
    fn count_star_with_where_is_not_bare() {
        let mut s = count_star();
        s.where_clause = Some(Cond::new(
            0,
            crate::condition::CondKind::IsNull {
                column: ColumnRef::new("revenue"),
                negated: false,
            },
        ));
        assert!(!s.is_bare_count_star());
    }

    #[test]
    fn effective_alias_falls_back_to_name() {
        let t = TableRef::new("account");
        assert_eq!(t.effective_alias(), "account");
    }
}
