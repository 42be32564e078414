//! Per-row expression and condition evaluation for whatever the FetchXML
//! generator could not push down: residual WHERE/HAVING predicates,
//! computed SELECT projections, CASE/IIF, and the built-in scalar function
//! registry. SQL's three-valued logic is flattened to `bool` at condition
//! boundaries, as the spec directs: unknown (any null comparison) reads as
//! false, while `null` itself still propagates through plain expressions.

mod functions;
mod scope;

pub use scope::VariableScope;

use chrono::{DateTime, Utc};
use fetchql_ast::{BinaryOp, ColumnRef, CompareOp, Cond, CondKind, Expr, ExprKind, Literal, UnaryOp};
use fetchql_common::{Error, QueryRow, QueryValue, Result};

/// Evaluates expressions and conditions against one row, optionally with a
/// [`VariableScope`] for `@variable` resolution.
pub struct Evaluator<'a> {
    row: &'a QueryRow,
    scope: Option<&'a VariableScope>,
}

impl<'a> Evaluator<'a> {
    pub fn new(row: &'a QueryRow) -> Self {
        Self { row, scope: None }
    }

    pub fn with_scope(row: &'a QueryRow, scope: &'a VariableScope) -> Self {
        Self { row, scope: Some(scope) }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<QueryValue> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal_to_value(lit)),
            ExprKind::Column(col) => Ok(self.lookup_column(col)),
            ExprKind::Variable(name) => match self.scope {
                Some(scope) => scope.get(name),
                None => Err(Error::execution_failed(format!(
                    "variable '{name}' referenced without a configured scope"
                ))),
            },
            ExprKind::FunctionCall { name, args } => {
                let values = args
                    .iter()
                    .map(|a| self.evaluate(a))
                    .collect::<Result<Vec<_>>>()?;
                functions::call(name, &values)
            }
            ExprKind::Unary { op, expr } => {
                let v = self.evaluate(expr)?;
                match op {
                    UnaryOp::Neg => negate(&v),
                    UnaryOp::Not => {
                        if v.is_null() {
                            Ok(v)
                        } else {
                            Ok(QueryValue::Simple(Some(serde_json::Value::Bool(!as_bool(&v)?))))
                        }
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                evaluate_binary(*op, &l, &r)
            }
            ExprKind::Case { when_then, else_ } => {
                for (cond, then) in when_then {
                    if self.evaluate_condition(cond)? {
                        return self.evaluate(then);
                    }
                }
                match else_ {
                    Some(e) => self.evaluate(e),
                    None => Ok(QueryValue::null()),
                }
            }
            ExprKind::Iif { cond, then, els } => {
                if self.evaluate_condition(cond)? {
                    self.evaluate(then)
                } else {
                    self.evaluate(els)
                }
            }
            ExprKind::Cast { expr, target_type } => {
                let v = self.evaluate(expr)?;
                cast_value(&v, target_type)
            }
            ExprKind::Parenthesis(inner) => self.evaluate(inner),
        }
    }

    pub fn evaluate_condition(&self, cond: &Cond) -> Result<bool> {
        match &cond.kind {
            CondKind::Comparison { op, left, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                compare(*op, &l, &r)
            }
            CondKind::Like { column, pattern, negated } => {
                let v = self.lookup_column(column);
                match v.as_display_string() {
                    None => Ok(false),
                    Some(text) => Ok(sql_like(&text, pattern) != *negated),
                }
            }
            CondKind::IsNull { column, negated } => {
                let is_null = self.lookup_column(column).is_null();
                Ok(is_null != *negated)
            }
            CondKind::In { column, values, negated } => {
                let v = self.lookup_column(column);
                if v.is_null() {
                    return Ok(false);
                }
                let mut found = false;
                for value_expr in values {
                    let candidate = self.evaluate(value_expr)?;
                    if values_equal(&v, &candidate)? {
                        found = true;
                        break;
                    }
                }
                Ok(found != *negated)
            }
            CondKind::Between { column, low, high, negated } => {
                let v = self.lookup_column(column);
                if v.is_null() {
                    return Ok(false);
                }
                let lo = self.evaluate(low)?;
                let hi = self.evaluate(high)?;
                let in_range = compare(CompareOp::Ge, &v, &lo)? && compare(CompareOp::Le, &v, &hi)?;
                Ok(in_range != *negated)
            }
            CondKind::And(l, r) => Ok(self.evaluate_condition(l)? && self.evaluate_condition(r)?),
            CondKind::Or(l, r) => Ok(self.evaluate_condition(l)? || self.evaluate_condition(r)?),
            CondKind::Not(inner) => Ok(!self.evaluate_condition(inner)?),
            CondKind::Expression(expr) => {
                let v = self.evaluate(expr)?;
                if v.is_null() {
                    Ok(false)
                } else {
                    as_bool(&v)
                }
            }
        }
    }

    fn lookup_column(&self, col: &ColumnRef) -> QueryValue {
        if let Some(qualifier) = &col.qualifier {
            let qualified = format!("{qualifier}.{}", col.name);
            if let Some(v) = self.row.get(&qualified) {
                return v.clone();
            }
        }
        self.row.get(&col.name).cloned().unwrap_or_else(QueryValue::null)
    }
}

/// `Evaluate(expression, row) -> value`, with no variable scope.
pub fn evaluate(expr: &Expr, row: &QueryRow) -> Result<QueryValue> {
    Evaluator::new(row).evaluate(expr)
}

/// `EvaluateCondition(condition, row) -> bool`, with no variable scope.
pub fn evaluate_condition(cond: &Cond, row: &QueryRow) -> Result<bool> {
    Evaluator::new(row).evaluate_condition(cond)
}

fn literal_to_value(lit: &Literal) -> QueryValue {
    match lit {
        Literal::Int(v) => QueryValue::from_i64(*v),
        Literal::Float(v) => QueryValue::Simple(Some(serde_json::Value::from(*v))),
        Literal::Decimal(v) => QueryValue::Money(*v),
        Literal::String(v) => QueryValue::from_str(v.clone()),
        Literal::Bool(v) => QueryValue::Simple(Some(serde_json::Value::Bool(*v))),
        Literal::DateTime(v) => QueryValue::from_str(v.to_rfc3339()),
        Literal::Null => QueryValue::null(),
    }
}

fn as_number(v: &QueryValue) -> Option<f64> {
    match v {
        QueryValue::Simple(Some(serde_json::Value::Number(n))) => n.as_f64(),
        QueryValue::Simple(Some(serde_json::Value::Bool(b))) => Some(if *b { 1.0 } else { 0.0 }),
        QueryValue::Money(d) => d.to_string().parse().ok(),
        QueryValue::OptionSet { value, .. } => Some(*value as f64),
        _ => None,
    }
}

fn as_instant(v: &QueryValue) -> Option<DateTime<Utc>> {
    let text = v.as_display_string()?;
    DateTime::parse_from_rfc3339(&text).ok().map(|dt| dt.with_timezone(&Utc))
}

fn as_bool(v: &QueryValue) -> Result<bool> {
    match v {
        QueryValue::Simple(Some(serde_json::Value::Bool(b))) => Ok(*b),
        other => Err(Error::type_mismatch("boolean", format!("{other:?}"))),
    }
}

fn negate(v: &QueryValue) -> Result<QueryValue> {
    if v.is_null() {
        return Ok(QueryValue::null());
    }
    match as_number(v) {
        Some(n) => Ok(QueryValue::Simple(Some(serde_json::Value::from(-n)))),
        None => Err(Error::type_mismatch("numeric", format!("{v:?}"))),
    }
}

fn cast_value(v: &QueryValue, target_type: &str) -> Result<QueryValue> {
    if v.is_null() {
        return Ok(QueryValue::null());
    }
    match target_type.to_ascii_uppercase().as_str() {
        "INT" | "INT64" | "BIGINT" => match as_number(v) {
            Some(n) => Ok(QueryValue::from_i64(n as i64)),
            None => Err(Error::type_mismatch("numeric", format!("{v:?}"))),
        },
        "STRING" | "VARCHAR" | "NVARCHAR" | "TEXT" => Ok(QueryValue::from_str(
            v.as_display_string().unwrap_or_default(),
        )),
        "BOOL" | "BOOLEAN" | "BIT" => Ok(QueryValue::Simple(Some(serde_json::Value::Bool(as_bool(v)?)))),
        other => Err(Error::type_mismatch(format!("known cast target ({other})"), "unsupported CAST target")),
    }
}

fn evaluate_binary(op: BinaryOp, l: &QueryValue, r: &QueryValue) -> Result<QueryValue> {
    if matches!(
        op,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
    ) {
        let compare_op = match op {
            BinaryOp::Eq => CompareOp::Eq,
            BinaryOp::Ne => CompareOp::Ne,
            BinaryOp::Lt => CompareOp::Lt,
            BinaryOp::Le => CompareOp::Le,
            BinaryOp::Gt => CompareOp::Gt,
            BinaryOp::Ge => CompareOp::Ge,
            _ => unreachable!(),
        };
        return Ok(QueryValue::Simple(Some(serde_json::Value::Bool(compare(
            compare_op, l, r,
        )?))));
    }
    if l.is_null() || r.is_null() {
        return Ok(QueryValue::null());
    }
    let (a, b) = (
        as_number(l).ok_or_else(|| Error::type_mismatch("numeric", format!("{l:?}")))?,
        as_number(r).ok_or_else(|| Error::type_mismatch("numeric", format!("{r:?}")))?,
    );
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!(),
    };
    Ok(QueryValue::Simple(Some(serde_json::Value::from(result))))
}

/// Three-valued comparison collapsed to `bool`: a null operand on either
/// side makes the comparison unknown, which reads as `false`.
fn compare(op: CompareOp, l: &QueryValue, r: &QueryValue) -> Result<bool> {
    if l.is_null() || r.is_null() {
        return Ok(false);
    }
    if let (Some(a), Some(b)) = (as_number(l), as_number(r)) {
        return Ok(apply_ordering(op, a.partial_cmp(&b)));
    }
    if let (Some(a), Some(b)) = (as_instant(l), as_instant(r)) {
        return Ok(apply_ordering(op, a.partial_cmp(&b)));
    }
    if let (Some(a), Some(b)) = (l.as_display_string(), r.as_display_string()) {
        return Ok(match op {
            CompareOp::Eq => a.eq_ignore_ascii_case(&b),
            CompareOp::Ne => !a.eq_ignore_ascii_case(&b),
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        });
    }
    Err(Error::type_mismatch("comparable operands", "incompatible types"))
}

fn apply_ordering(op: CompareOp, ord: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match (op, ord) {
        (CompareOp::Eq, Some(Equal)) => true,
        (CompareOp::Ne, Some(o)) => o != Equal,
        (CompareOp::Lt, Some(Less)) => true,
        (CompareOp::Le, Some(Less | Equal)) => true,
        (CompareOp::Gt, Some(Greater)) => true,
        (CompareOp::Ge, Some(Greater | Equal)) => true,
        _ => false,
    }
}

fn values_equal(a: &QueryValue, b: &QueryValue) -> Result<bool> {
    compare(CompareOp::Eq, a, b)
}

/// A generic SQL `LIKE` matcher supporting `%` (any run) and `_` (single
/// char) wildcards, used for residual LIKE evaluation (patterns the
/// FetchXML generator could not fully push, or nested inside a
/// partially-residual OR).
fn sql_like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_match(&text, &pattern)
}

fn like_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('%') => {
            like_match(text, &pattern[1..])
                || (!text.is_empty() && like_match(&text[1..], pattern))
        }
        Some('_') => !text.is_empty() && like_match(&text[1..], &pattern[1..]),
        Some(c) => !text.is_empty() && text[0] == *c && like_match(&text[1..], &pattern[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchql_ast::ExprKind;

    fn row_with(col: &str, value: QueryValue) -> QueryRow {
        let mut row = QueryRow::new("account");
        row.set(col, value);
        row
    }

    #[test]
    fn column_comparison_against_literal() {
        let row = row_with("revenue", QueryValue::from_i64(500));
        let cond = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: Expr::column(0, ColumnRef::new("revenue")),
                right: Expr::literal(0, Literal::Int(100)),
            },
        );
        assert!(evaluate_condition(&cond, &row).unwrap());
    }

    #[test]
    fn null_comparison_is_false_not_error() {
        let row = row_with("revenue", QueryValue::null());
        let cond = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: Expr::column(0, ColumnRef::new("revenue")),
                right: Expr::literal(0, Literal::Int(100)),
            },
        );
        assert!(!evaluate_condition(&cond, &row).unwrap());
    }

    #[test]
    fn case_returns_first_matching_branch() {
        let row = row_with("status", QueryValue::from_i64(2));
        let cond_true = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Eq,
                left: Expr::column(0, ColumnRef::new("status")),
                right: Expr::literal(0, Literal::Int(2)),
            },
        );
        let expr = Expr::new(
            0,
            ExprKind::Case {
                when_then: vec![(cond_true, Expr::literal(0, Literal::String("open".into())))],
                else_: Some(Box::new(Expr::literal(0, Literal::String("closed".into())))),
            },
        );
        assert_eq!(evaluate(&expr, &row).unwrap(), QueryValue::from_str("open"));
    }

    #[test]
    fn iif_falls_back_to_else_branch() {
        let row = row_with("status", QueryValue::from_i64(0));
        let cond = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Eq,
                left: Expr::column(0, ColumnRef::new("status")),
                right: Expr::literal(0, Literal::Int(2)),
            },
        );
        let expr = Expr::new(
            0,
            ExprKind::Iif {
                cond: Box::new(cond),
                then: Box::new(Expr::literal(0, Literal::String("open".into()))),
                els: Box::new(Expr::literal(0, Literal::String("closed".into()))),
            },
        );
        assert_eq!(evaluate(&expr, &row).unwrap(), QueryValue::from_str("closed"));
    }

    #[test]
    fn variable_without_scope_fails() {
        let row = QueryRow::new("account");
        let expr = Expr::new(0, ExprKind::Variable("@x".into()));
        assert!(evaluate(&expr, &row).is_err());
    }

    #[test]
    fn variable_with_scope_resolves() {
        let row = QueryRow::new("account");
        let mut scope = VariableScope::new();
        scope.declare("@x", "INT", Some(QueryValue::from_i64(7))).unwrap();
        let expr = Expr::new(0, ExprKind::Variable("@x".into()));
        let value = Evaluator::with_scope(&row, &scope).evaluate(&expr).unwrap();
        assert_eq!(value, QueryValue::from_i64(7));
    }

    #[test]
    fn sql_like_matches_percent_and_underscore() {
        assert!(sql_like("contoso", "cont_so"));
        assert!(sql_like("contoso ltd", "%ltd"));
        assert!(!sql_like("contoso", "fabrikam"));
    }
}
