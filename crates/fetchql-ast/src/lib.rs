//! Abstract syntax tree for the FetchQL SQL dialect.
//!
//! Every node is a closed tagged union with an exhaustive match at every
//! site that inspects it; there is no visitor base class to subclass. Each
//! [`Expr`](expr::Expr)/[`Cond`](condition::Cond) node carries its source
//! byte position so the parser's diagnostics and the planner's error
//! messages can point at the offending token.

pub mod condition;
pub mod expr;
pub mod literal;
pub mod statement;

pub use condition::{Cond, CondKind, CompareOp};
pub use expr::{BinaryOp, ColumnRef, Expr, ExprKind, UnaryOp};
pub use literal::Literal;
pub use statement::{
    is_aggregate_fn, DatePart, DeclareStatement, DeleteStatement, GroupByItem, InsertSource,
    InsertStatement, Join, JoinType, OrderByItem, SelectItem, SelectStatement, SetStatement,
    Statement, TableRef, UnionStatement, UpdateStatement,
};
