//! The core AST-to-FetchXML translation: table/join resolution, virtual
//! column detection, aggregate detection, filter pushdown, and residual
//! column harvesting.

use std::collections::{HashMap, HashSet};

use fetchql_ast::{
    is_aggregate_fn, ColumnRef, Cond, CondKind, Expr, ExprKind, GroupByItem, Join, JoinType,
    SelectStatement,
};
use fetchql_common::{Error, Result};

use crate::filter;
use crate::virtual_column::{detect_virtual_base, VirtualColumnInfo};
use crate::xml::XmlElem;

/// Everything the planner needs beyond the literal FetchXML string: what
/// could not be pushed down, and what the executor must materialize after
/// retrieval.
#[derive(Debug, Clone)]
pub struct TranspileResult {
    pub fetch_xml: String,
    /// WHERE conjuncts that could not be expressed as FetchXML conditions,
    /// re-combined with AND. `None` if the whole WHERE clause was pushed.
    pub residual_filter: Option<Cond>,
    /// HAVING is always residual: FetchXML has no equivalent construct.
    pub having_filter: Option<Cond>,
    pub virtual_columns: Vec<VirtualColumnInfo>,
    pub is_aggregate: bool,
    pub primary_alias: String,
}

/// Root scope key for the attribute/filter buckets below; `Some(alias)`
/// identifies a joined entity instead.
type Scope = Option<String>;

#[derive(Default)]
struct Bucket {
    attrs: Vec<XmlElem>,
    index: HashMap<String, usize>,
}

impl Bucket {
    /// Returns the existing `<attribute>` element for `name` if one was
    /// already emitted (e.g. by SELECT), or inserts a fresh one built from
    /// `build`. Either way, the caller gets a handle to merge further
    /// attributes onto it — this is what lets a GROUP BY pass add
    /// `groupby="true"` to a column SELECT already emitted.
    fn push_attr(&mut self, name: &str, build: impl FnOnce() -> XmlElem) -> &mut XmlElem {
        let key = name.to_ascii_lowercase();
        let idx = *self.index.entry(key).or_insert_with(|| {
            self.attrs.push(build());
            self.attrs.len() - 1
        });
        &mut self.attrs[idx]
    }
}

pub fn generate(stmt: &SelectStatement) -> Result<TranspileResult> {
    let from = stmt
        .from
        .as_ref()
        .ok_or_else(|| Error::invalid_request("SELECT has no FROM table"))?;
    let primary_alias = from.effective_alias().to_string();

    let mut buckets: HashMap<Scope, Bucket> = HashMap::new();
    buckets.entry(None).or_default();

    let is_aggregate = stmt.has_aggregate_columns() || !stmt.group_by.is_empty();
    let mut virtual_columns = Vec::new();
    let mut residual_cols: Vec<ColumnRef> = Vec::new();

    let explicitly_selected: HashSet<String> = stmt
        .columns
        .iter()
        .filter_map(|c| c.expr.as_column())
        .map(|c| c.name.to_ascii_lowercase())
        .collect();

    let mut select_all = false;
    for item in &stmt.columns {
        match &item.expr.kind {
            ExprKind::Column(col) if col.name == "*" => select_all = true,
            ExprKind::Column(col) => {
                if let Some(base) = detect_virtual_base(&col.name) {
                    let explicitly_queried = explicitly_selected.contains(&base);
                    bucket_for(&mut buckets, &col.qualifier).push_attr(&base, || {
                        XmlElem::new("attribute").attr("name", base.clone())
                    });
                    virtual_columns.push(VirtualColumnInfo {
                        base_column_name: base,
                        base_column_explicitly_queried: explicitly_queried,
                        alias: item.alias.clone(),
                    });
                } else {
                    let name = col.name.clone();
                    let alias = item.alias.clone();
                    bucket_for(&mut buckets, &col.qualifier).push_attr(&name, || {
                        XmlElem::new("attribute")
                            .attr("name", name.clone())
                            .maybe_attr("alias", alias.clone())
                    });
                }
            }
            ExprKind::FunctionCall { name, args } if is_aggregate_fn(name) => {
                emit_aggregate_attribute(&mut buckets, &primary_alias, name, args, item.alias.as_deref())?;
            }
            _ => {
                item.expr.referenced_columns(&mut residual_cols);
            }
        }
    }

    for g in &stmt.group_by {
        match g {
            GroupByItem::Column(col) => {
                let name = col.name.clone();
                let elem = bucket_for(&mut buckets, &col.qualifier).push_attr(&name, || {
                    XmlElem::new("attribute").attr("name", name.clone())
                });
                elem.set_attr("groupby", "true");
            }
            GroupByItem::DatePart { part, column } => {
                let grouping = date_part_grouping(*part);
                let name = column.name.clone();
                bucket_for(&mut buckets, &column.qualifier).push_attr(
                    &format!("{name}__{grouping}"),
                    || {
                        XmlElem::new("attribute")
                            .attr("name", name.clone())
                            .attr("groupby", "true")
                            .attr("dategrouping", grouping)
                            .attr("alias", format!("{name}_{grouping}"))
                    },
                );
            }
        }
    }

    let mut residual_filter = None;
    if let Some(where_clause) = &stmt.where_clause {
        residual_filter = apply_where(&mut buckets, where_clause);
    }

    let having_filter = stmt.having.as_ref().map(|h| {
        h.referenced_columns(&mut residual_cols);
        h.clone()
    });

    for col in &residual_cols {
        let name = col.name.clone();
        bucket_for(&mut buckets, &col.qualifier).push_attr(&name, || {
            XmlElem::new("attribute").attr("name", name.clone())
        });
    }

    let mut entity = XmlElem::new("entity").attr("name", from.name.clone());
    let root = buckets.remove(&None).unwrap_or_default();
    if select_all && !is_aggregate {
        // `<all-attributes/>` subsumes the plain `<attribute>` elements, but
        // the root `<filter>` (and any aggregate/groupby attributes) must
        // still be emitted.
        entity = entity.child(XmlElem::new("all-attributes"));
        entity = entity.children(root.attrs.into_iter().filter(|e| e.name != "attribute"));
    } else {
        entity = entity.children(root.attrs);
    }

    for join in &stmt.joins {
        entity = entity.child(build_link_entity(join, &mut buckets)?);
    }

    for item in &stmt.order_by {
        entity = entity.child(XmlElem::new("order").maybe_attr(
            if is_aggregate { "alias" } else { "attribute" },
            Some(item.name.clone()),
        ).attr("descending", if item.descending { "true" } else { "false" }));
    }

    let mut fetch = XmlElem::new("fetch");
    if let Some(top) = stmt.top {
        fetch = fetch.attr("top", top.to_string());
    }
    if stmt.distinct {
        fetch = fetch.attr("distinct", "true");
    }
    if is_aggregate {
        fetch = fetch.attr("aggregate", "true");
    }
    fetch = fetch.child(entity);

    Ok(TranspileResult {
        fetch_xml: fetch.render(),
        residual_filter,
        having_filter,
        virtual_columns,
        is_aggregate,
        primary_alias,
    })
}

fn bucket_for<'a>(buckets: &'a mut HashMap<Scope, Bucket>, qualifier: &Option<String>) -> &'a mut Bucket {
    buckets.entry(qualifier.clone()).or_default()
}

fn date_part_grouping(part: fetchql_ast::DatePart) -> &'static str {
    match part {
        fetchql_ast::DatePart::Year => "year",
        fetchql_ast::DatePart::Month => "month",
        fetchql_ast::DatePart::Day => "day",
        fetchql_ast::DatePart::Quarter => "quarter",
        fetchql_ast::DatePart::Week => "week",
    }
}

fn emit_aggregate_attribute(
    buckets: &mut HashMap<Scope, Bucket>,
    primary_alias: &str,
    fn_name: &str,
    args: &[Expr],
    alias: Option<&str>,
) -> Result<()> {
    let upper = fn_name.to_ascii_uppercase();
    if upper == "COUNT" {
        let is_star = matches!(args.first().map(|a| &a.kind), Some(ExprKind::Column(c)) if c.name == "*");
        if is_star {
            let attr_name = format!("{primary_alias}id");
            let alias = alias.unwrap_or("count").to_string();
            buckets.entry(None).or_default().push_attr(&format!("__count_{alias}"), || {
                XmlElem::new("attribute")
                    .attr("name", attr_name.clone())
                    .attr("aggregate", "count")
                    .attr("alias", alias.clone())
            });
            return Ok(());
        }
        let col = args
            .first()
            .and_then(|a| a.as_column())
            .ok_or_else(|| Error::invalid_request("COUNT() requires a column or '*'"))?;
        let name = col.name.clone();
        let alias = alias.unwrap_or("count").to_string();
        bucket_for(buckets, &col.qualifier).push_attr(&format!("__count_{alias}"), || {
            XmlElem::new("attribute")
                .attr("name", name.clone())
                .attr("aggregate", "countcolumn")
                .attr("alias", alias.clone())
        });
        return Ok(());
    }

    let col = args
        .first()
        .and_then(|a| a.as_column())
        .ok_or_else(|| Error::invalid_request(format!("{upper}() requires a plain column argument")))?;
    let name = col.name.clone();
    let aggregate = fn_name.to_ascii_lowercase();
    let alias = alias.map(str::to_string).unwrap_or_else(|| format!("{name}_{aggregate}"));
    bucket_for(buckets, &col.qualifier).push_attr(&format!("__agg_{alias}"), || {
        XmlElem::new("attribute")
            .attr("name", name.clone())
            .attr("aggregate", aggregate.clone())
            .attr("alias", alias.clone())
    });
    Ok(())
}

/// Splits the WHERE clause's top-level AND conjuncts into those that can be
/// pushed into the emitted `<filter>` elements (grouped by the entity scope
/// they reference) and those that must be evaluated client-side. Returns the
/// residual conjuncts re-combined with AND, or `None` if everything pushed.
fn apply_where(buckets: &mut HashMap<Scope, Bucket>, where_clause: &Cond) -> Option<Cond> {
    let mut conjuncts = Vec::new();
    filter::flatten_and(where_clause, &mut conjuncts);

    let mut by_scope: HashMap<Scope, Vec<Cond>> = HashMap::new();
    let mut residual: Vec<Cond> = Vec::new();

    for c in conjuncts {
        if c.is_pushable() {
            if let Some(scope) = filter::scope_of(c) {
                by_scope.entry(scope).or_default().push(c.clone());
                continue;
            }
        }
        residual.push(c.clone());
    }

    for (scope, conds) in by_scope {
        let combined = conds
            .into_iter()
            .reduce(|a, b| Cond::new(a.pos, CondKind::And(Box::new(a), Box::new(b))))
            .expect("non-empty group");
        let xml = filter::emit(&combined, false);
        buckets.entry(scope).or_default().attrs.push(xml);
    }

    residual
        .into_iter()
        .reduce(|a, b| Cond::new(a.pos, CondKind::And(Box::new(a), Box::new(b))))
}

fn build_link_entity(join: &Join, buckets: &mut HashMap<Scope, Bucket>) -> Result<XmlElem> {
    let alias = join.table.effective_alias().to_string();
    let (from_attr, to_attr) = resolve_join_columns(join)?;

    let link_type = match join.join_type {
        JoinType::Inner => "inner",
        JoinType::Left | JoinType::Right | JoinType::Full => "outer",
    };

    let mut link = XmlElem::new("link-entity")
        .attr("name", join.table.name.clone())
        .attr("from", from_attr)
        .attr("to", to_attr)
        .attr("link-type", link_type);
    if join.table.alias.is_some() {
        link = link.attr("alias", alias.clone());
    }

    if let Some(bucket) = buckets.remove(&Some(alias)) {
        link = link.children(bucket.attrs);
    }

    Ok(link)
}

/// Decides which side of a join's ON-condition belongs to the newly joined
/// table (`from`) and which belongs to the already-bound side (`to`). Errors
/// if neither column is qualified with this join's own alias.
fn resolve_join_columns(join: &Join) -> Result<(String, String)> {
    let alias = join.table.effective_alias();
    let left_is_local = join.left_col.qualifier.as_deref() == Some(alias);
    let right_is_local = join.right_col.qualifier.as_deref() == Some(alias);
    match (left_is_local, right_is_local) {
        (true, false) => Ok((join.left_col.name.clone(), join.right_col.name.clone())),
        (false, true) => Ok((join.right_col.name.clone(), join.left_col.name.clone())),
        _ => Err(Error::invalid_request(format!(
            "join condition for '{alias}' does not unambiguously reference its own columns"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchql_ast::{CompareOp, Literal, SelectItem, TableRef};

    fn select_from(table: &str) -> SelectStatement {
        SelectStatement {
            from: Some(TableRef::new(table)),
            ..Default::default()
        }
    }

    #[test]
    fn missing_from_is_invalid_request() {
        let stmt = SelectStatement::default();
        let err = generate(&stmt).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn bare_select_emits_all_attributes() {
        let mut stmt = select_from("account");
        stmt.columns.push(SelectItem { expr: Expr::column(0, ColumnRef::new("*")), alias: None });
        let result = generate(&stmt).unwrap();
        assert!(result.fetch_xml.contains("<all-attributes"));
    }

    #[test]
    fn plain_column_emitted_as_attribute() {
        let mut stmt = select_from("account");
        stmt.columns.push(SelectItem { expr: Expr::column(0, ColumnRef::new("revenue")), alias: None });
        let result = generate(&stmt).unwrap();
        assert!(result.fetch_xml.contains(r#"name="revenue""#));
    }

    #[test]
    fn virtual_name_column_rewrites_to_base() {
        let mut stmt = select_from("account");
        stmt.columns.push(SelectItem { expr: Expr::column(0, ColumnRef::new("owneridname")), alias: None });
        let result = generate(&stmt).unwrap();
        assert!(result.fetch_xml.contains(r#"name="ownerid""#));
        assert_eq!(result.virtual_columns.len(), 1);
        assert_eq!(result.virtual_columns[0].base_column_name, "ownerid");
    }

    #[test]
    fn pushable_where_produces_filter_no_residual() {
        let mut stmt = select_from("account");
        stmt.where_clause = Some(Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: Expr::column(0, ColumnRef::new("revenue")),
                right: Expr::literal(0, Literal::Int(1000)),
            },
        ));
        let result = generate(&stmt).unwrap();
        assert!(result.fetch_xml.contains("<filter"));
        assert!(result.residual_filter.is_none());
    }

    #[test]
    fn column_to_column_where_is_residual() {
        let mut stmt = select_from("account");
        stmt.where_clause = Some(Cond::new(
            0,
            CondKind::Comparison {
                op: CompareOp::Gt,
                left: Expr::column(0, ColumnRef::new("revenue")),
                right: Expr::column(0, ColumnRef::new("cost")),
            },
        ));
        let result = generate(&stmt).unwrap();
        assert!(result.residual_filter.is_some());
        assert!(result.fetch_xml.contains(r#"name="revenue""#));
        assert!(result.fetch_xml.contains(r#"name="cost""#));
    }

    #[test]
    fn count_star_emits_count_aggregate() {
        let mut stmt = select_from("account");
        stmt.columns.push(SelectItem {
            expr: Expr::new(0, ExprKind::FunctionCall { name: "COUNT".into(), args: vec![Expr::column(0, ColumnRef::new("*"))] }),
            alias: Some("total".into()),
        });
        let result = generate(&stmt).unwrap();
        assert!(result.is_aggregate);
        assert!(result.fetch_xml.contains(r#"aggregate="count""#));
        assert!(result.fetch_xml.contains(r#"alias="total""#));
    }

    #[test]
    fn inner_join_emits_link_entity_with_resolved_columns() {
        let mut stmt = select_from("account");
        stmt.joins.push(Join {
            pos: 0,
            table: fetchql_ast::TableRef { name: "contact".into(), alias: Some("c".into()) },
            join_type: JoinType::Inner,
            left_col: ColumnRef::qualified("account", "accountid"),
            right_col: ColumnRef::qualified("c", "parentcustomerid"),
        });
        let result = generate(&stmt).unwrap();
        assert!(result.fetch_xml.contains(r#"<link-entity name="contact""#));
        assert!(result.fetch_xml.contains(r#"from="parentcustomerid""#));
        assert!(result.fetch_xml.contains(r#"to="accountid""#));
        assert!(result.fetch_xml.contains(r#"link-type="inner""#));
    }

    #[test]
    fn right_join_downgrades_to_outer_link_type() {
        let mut stmt = select_from("account");
        stmt.joins.push(Join {
            pos: 0,
            table: fetchql_ast::TableRef { name: "contact".into(), alias: Some("c".into()) },
            join_type: JoinType::Right,
            left_col: ColumnRef::qualified("account", "accountid"),
            right_col: ColumnRef::qualified("c", "parentcustomerid"),
        });
        let result = generate(&stmt).unwrap();
        assert!(result.fetch_xml.contains(r#"link-type="outer""#));
    }

    #[test]
    fn undecomposable_join_condition_is_invalid_request() {
        let mut stmt = select_from("account");
        stmt.joins.push(Join {
            pos: 0,
            table: fetchql_ast::TableRef { name: "contact".into(), alias: Some("c".into()) },
            join_type: JoinType::Inner,
            left_col: ColumnRef::qualified("account", "accountid"),
            right_col: ColumnRef::qualified("other", "parentcustomerid"),
        });
        let err = generate(&stmt).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
