//! Translates a (pushable) [`Cond`] tree into `<filter>`/`<condition>` XML,
//! and decides which top-level conjuncts of a WHERE/HAVING clause are
//! pushable at all.

use fetchql_ast::{ColumnRef, CompareOp, Cond, CondKind, Expr, ExprKind, Literal};

use crate::xml::XmlElem;

/// Flattens the top-level AND chain of a condition into its conjuncts.
/// `a AND b AND c` yields `[a, b, c]`; anything else yields a single
/// one-element list.
pub fn flatten_and<'a>(cond: &'a Cond, out: &mut Vec<&'a Cond>) {
    match &cond.kind {
        CondKind::And(l, r) => {
            flatten_and(l, out);
            flatten_and(r, out);
        }
        _ => out.push(cond),
    }
}

/// The entity alias a condition's column(s) all resolve against, or `None`
/// if the condition mixes columns from more than one alias (in which case
/// it cannot be represented by a single FetchXML `<filter>` and must be
/// treated as a residual).
pub fn scope_of(cond: &Cond) -> Option<Option<String>> {
    match &cond.kind {
        CondKind::Comparison { left, right, .. } => {
            let col = left.as_column().or_else(|| right.as_column())?;
            Some(col.qualifier.clone())
        }
        CondKind::Like { column, .. }
        | CondKind::IsNull { column, .. }
        | CondKind::In { column, .. }
        | CondKind::Between { column, .. } => Some(column.qualifier.clone()),
        CondKind::And(l, r) | CondKind::Or(l, r) => {
            let a = scope_of(l)?;
            let b = scope_of(r)?;
            (a == b).then_some(a)
        }
        CondKind::Not(inner) => scope_of(inner),
        CondKind::Expression(_) => None,
    }
}

/// Renders a pushable condition tree as nested `<filter>`/`<condition>`
/// elements. Panics if given a non-pushable tree — callers must check
/// [`Cond::is_pushable`] first.
pub fn emit(cond: &Cond, negate: bool) -> XmlElem {
    match &cond.kind {
        CondKind::Not(inner) => emit(inner, !negate),
        CondKind::And(l, r) => {
            XmlElem::new("filter")
                .attr("type", if negate { "or" } else { "and" })
                .child(emit(l, negate))
                .child(emit(r, negate))
        }
        CondKind::Or(l, r) => {
            XmlElem::new("filter")
                .attr("type", if negate { "and" } else { "or" })
                .child(emit(l, negate))
                .child(emit(r, negate))
        }
        CondKind::Comparison { op, left, right } => {
            let (column, value_expr, effective_op) = if let Some(c) = left.as_column() {
                (c.clone(), right, *op)
            } else {
                (right.as_column().expect("pushable comparison has a column side").clone(), left, flip_direction(*op))
            };
            let op = if negate { negate_op(effective_op) } else { effective_op };
            condition(&column, compare_op_name(op), Some(literal_value(value_expr)))
        }
        CondKind::Like { column, pattern, negated } => {
            let (op, value) = like_operator(pattern, negated ^ negate);
            condition(column, op, Some(value))
        }
        CondKind::IsNull { column, negated } => {
            let op = if negated ^ negate { "not-null" } else { "null" };
            condition(column, op, None)
        }
        CondKind::In { column, values, negated } => {
            let op = if negated ^ negate { "not-in" } else { "in" };
            XmlElem::new("condition")
                .attr("attribute", column.name.to_ascii_lowercase())
                .attr("operator", op)
                .children(values.iter().map(|v| text_value(literal_value(v))))
        }
        CondKind::Between { column, low, high, negated } => {
            let op = if negated ^ negate { "not-between" } else { "between" };
            XmlElem::new("condition")
                .attr("attribute", column.name.to_ascii_lowercase())
                .attr("operator", op)
                .child(text_value(literal_value(low)))
                .child(text_value(literal_value(high)))
        }
        CondKind::Expression(_) => unreachable!("residual conditions are never passed to filter::emit"),
    }
}

fn condition(column: &ColumnRef, op: &str, value: Option<String>) -> XmlElem {
    XmlElem::new("condition")
        .attr("attribute", column.name.to_ascii_lowercase())
        .attr("operator", op)
        .maybe_attr("value", value)
}

fn text_value(v: String) -> XmlElem {
    XmlElem::with_text("value", v)
}

fn flip_direction(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Eq => CompareOp::Eq,
        CompareOp::Ne => CompareOp::Ne,
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
    }
}

fn negate_op(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Eq => CompareOp::Ne,
        CompareOp::Ne => CompareOp::Eq,
        CompareOp::Lt => CompareOp::Ge,
        CompareOp::Le => CompareOp::Gt,
        CompareOp::Gt => CompareOp::Le,
        CompareOp::Ge => CompareOp::Lt,
    }
}

fn compare_op_name(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Le => "le",
        CompareOp::Gt => "gt",
        CompareOp::Ge => "ge",
    }
}

/// Maps a LIKE pattern to its FetchXML operator + stripped value, per the
/// four recognized shapes: `%x%`, `x%`, `%x`, and bare `x`.
fn like_operator(pattern: &str, negated: bool) -> (&'static str, String) {
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%') && pattern.len() > 1;
    match (starts, ends) {
        (true, true) => (if negated { "not-like" } else { "like" }, pattern.to_string()),
        (false, true) => (
            if negated { "not-begin-with" } else { "begins-with" },
            pattern[..pattern.len() - 1].to_string(),
        ),
        (true, false) => (
            if negated { "not-end-with" } else { "ends-with" },
            pattern[1..].to_string(),
        ),
        (false, false) => (if negated { "not-like" } else { "like" }, pattern.to_string()),
    }
}

fn literal_value(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal(lit) => format_literal(lit),
        ExprKind::Variable(name) => format!("@{name}"),
        ExprKind::Parenthesis(inner) => literal_value(inner),
        ExprKind::Unary { op: fetchql_ast::UnaryOp::Neg, expr } => format!("-{}", literal_value(expr)),
        _ => unreachable!("only literal/variable expressions reach literal_value on a pushable tree"),
    }
}

fn format_literal(lit: &Literal) -> String {
    match lit {
        Literal::Int(v) => v.to_string(),
        Literal::Float(v) => v.to_string(),
        Literal::Decimal(v) => v.to_string(),
        Literal::String(s) => s.clone(),
        Literal::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Literal::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        Literal::Null => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchql_ast::{ColumnRef, Expr};

    fn col(name: &str) -> ColumnRef {
        ColumnRef::new(name)
    }

    fn int_expr(v: i64) -> Expr {
        Expr::literal(0, Literal::Int(v))
    }

    #[test]
    fn eq_comparison_emits_eq_operator() {
        let cond = Cond::new(
            0,
            CondKind::Comparison { op: CompareOp::Eq, left: Expr::column(0, col("status")), right: int_expr(1) },
        );
        let xml = emit(&cond, false).render();
        assert!(xml.contains(r#"attribute="status""#));
        assert!(xml.contains(r#"operator="eq""#));
    }

    #[test]
    fn literal_left_flips_direction() {
        let cond = Cond::new(
            0,
            CondKind::Comparison { op: CompareOp::Gt, left: int_expr(10), right: Expr::column(0, col("revenue")) },
        );
        let xml = emit(&cond, false).render();
        // `10 > revenue` means `revenue < 10`.
        assert!(xml.contains(r#"operator="lt""#));
    }

    #[test]
    fn like_begins_with() {
        let (op, val) = like_operator("foo%", false);
        assert_eq!(op, "begins-with");
        assert_eq!(val, "foo");
    }

    #[test]
    fn like_ends_with() {
        let (op, val) = like_operator("%foo", false);
        assert_eq!(op, "ends-with");
        assert_eq!(val, "foo");
    }

    #[test]
    fn negated_like_uses_not_variants() {
        assert_eq!(like_operator("foo%", true).0, "not-begin-with");
        assert_eq!(like_operator("%foo", true).0, "not-end-with");
        assert_eq!(like_operator("%foo%", true).0, "not-like");
    }

    #[test]
    fn scope_of_mixed_columns_is_none() {
        let cond = Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: Expr::column(0, ColumnRef::qualified("a", "revenue")),
                right: Expr::column(0, ColumnRef::qualified("b", "cost")),
            },
        );
        assert_eq!(scope_of(&cond), None);
    }
}
