//! Physical plan node types and the explain-tree renderer.
//!
//! A plan is a tree rooted at whatever strategy the planner picked: a bare
//! FetchXML scan, a passthrough, the fast count path, or a parallel
//! date-partitioned aggregate — with composite nodes layered on top for
//! whatever the FetchXML generator could not push down (residual filters,
//! computed projections, DISTINCT, client-side merge of partition results).
//! Nothing in this crate executes anything; it only describes the shape of
//! the work the executor crate will carry out.

use chrono::{DateTime, Utc};
use fetchql_ast::{Cond, DeleteStatement, Expr, GroupByItem, InsertStatement, OrderByItem, SelectItem, UpdateStatement};
use fetchql_fetchxml::VirtualColumnInfo;

/// Row count above which the planner splits a date-bucketable aggregate
/// query into parallel per-partition scans rather than running it as one
/// fetch. Kept at the same value across supported deployments.
pub const PARTITION_ROW_THRESHOLD: u64 = 40_000;

/// Maximum recursion depth for adaptively subdividing an overflowing
/// partition further (a partition whose own record count still exceeds
/// [`PARTITION_ROW_THRESHOLD`] after the first split).
pub const MAX_ADAPTIVE_SPLIT_DEPTH: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub struct FetchXmlScan {
    pub entity: String,
    pub fetch_xml: String,
    pub virtual_columns: Vec<VirtualColumnInfo>,
    /// Whether the executor should follow server-returned paging cookies
    /// until `max_rows` or exhaustion, rather than taking a single page.
    pub auto_page: bool,
    pub max_rows: Option<u32>,
}

/// A query that cannot be expressed in FetchXML at all and is sent to the
/// store's T-SQL passthrough endpoint verbatim (e.g. CTEs, window
/// functions — outside the translated dialect).
#[derive(Debug, Clone)]
pub struct TdsScan {
    pub sql: String,
}

/// The fast path for `SELECT COUNT(*) FROM t` with no WHERE/JOIN/GROUP BY:
/// uses the store's dedicated total-record-count API instead of paging
/// through a FetchXML aggregate. Falls back to `fallback` when the entity
/// has no cached total (e.g. a virtual entity).
#[derive(Debug, Clone)]
pub struct CountOptimized {
    pub entity: String,
    /// Output column name for the single row this node yields; mirrors the
    /// alias the SELECT list gave `COUNT(*)` (`"count"` when unaliased).
    pub alias: String,
    pub fallback: Box<PlanNode>,
}

/// A date-bucketable aggregate whose estimated record count exceeds
/// [`PARTITION_ROW_THRESHOLD`]: the executor runs one [`FetchXmlScan`] per
/// date window (built from `base_fetch_xml` via date-range injection) in
/// parallel, then feeds the results through a [`MergeAggregate`].
#[derive(Debug, Clone)]
pub struct AdaptiveAggregateScan {
    pub entity: String,
    pub base_fetch_xml: String,
    pub partition_attribute: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub estimated_record_count: u64,
    pub pool_capacity: usize,
    pub split_depth: u32,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub input: Box<PlanNode>,
    pub items: Vec<SelectItem>,
}

/// Evaluates a residual condition (one the generator could not push into
/// FetchML) against each row returned by `input`, dropping non-matches.
#[derive(Debug, Clone)]
pub struct ClientFilter {
    pub input: Box<PlanNode>,
    pub condition: Cond,
}

#[derive(Debug, Clone)]
pub struct Distinct {
    pub input: Box<PlanNode>,
}

/// UNION / UNION ALL: concatenates rows from each input, deduplicating
/// across all of them unless `all` is set.
#[derive(Debug, Clone)]
pub struct Concatenate {
    pub inputs: Vec<PlanNode>,
    pub all: bool,
}

/// Runs each partition scan concurrently, bounded by `pool_capacity`
/// in-flight requests at a time.
#[derive(Debug, Clone)]
pub struct ParallelPartition {
    pub partitions: Vec<PlanNode>,
    pub pool_capacity: usize,
}

/// One output column of a [`MergeAggregate`]: which running accumulator to
/// use, its output alias, and (for `Avg`) the alias of the companion count
/// column each partition emits alongside the sum.
#[derive(Debug, Clone)]
pub struct AggregateColumn {
    pub op: AggregateOp,
    pub alias: String,
    pub count_alias: Option<String>,
}

/// Combines the partial aggregate rows produced by a [`ParallelPartition`]
/// (or a plain [`AdaptiveAggregateScan`]) into the final grouped result.
/// AVG is carried as a running (sum, count) pair and divided at the end so
/// that merging never re-derives an average from averages.
#[derive(Debug, Clone)]
pub struct MergeAggregate {
    pub input: Box<PlanNode>,
    pub group_by: Vec<GroupByItem>,
    pub columns: Vec<AggregateColumn>,
    pub order_by: Vec<OrderByItem>,
}

#[derive(Debug, Clone)]
pub enum DmlKind {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

/// `INSERT`/`UPDATE`/`DELETE` driven through the remote client's bulk
/// primitive. `source` feeds rows in (an UPDATE/DELETE's own FetchXML scan,
/// or a planned `INSERT ... SELECT`); `insert_value_rows` holds literal
/// tuples for `INSERT ... VALUES` instead. `source_columns` records the
/// `INSERT ... SELECT` output column names, for ordinal mapping onto the
/// statement's own `insertColumns`.
#[derive(Debug, Clone)]
pub struct DmlExecute {
    pub kind: DmlKind,
    pub source: Option<Box<PlanNode>>,
    pub source_columns: Vec<String>,
    pub insert_value_rows: Vec<Vec<Expr>>,
    pub row_cap: u64,
}

/// Wraps `input` with a background task that keeps a bounded channel of
/// pages filled ahead of consumption, so the first row of a large scan is
/// available before the whole result set has been retrieved.
#[derive(Debug, Clone)]
pub struct PrefetchScan {
    pub input: Box<PlanNode>,
    pub buffer_size: usize,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    FetchXmlScan(FetchXmlScan),
    TdsScan(TdsScan),
    CountOptimized(CountOptimized),
    AdaptiveAggregateScan(AdaptiveAggregateScan),
    Project(Project),
    ClientFilter(ClientFilter),
    Distinct(Distinct),
    Concatenate(Concatenate),
    ParallelPartition(ParallelPartition),
    MergeAggregate(MergeAggregate),
    DmlExecute(DmlExecute),
    PrefetchScan(PrefetchScan),
}

impl PlanNode {
    fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::FetchXmlScan(_) | PlanNode::TdsScan(_) | PlanNode::AdaptiveAggregateScan(_) => Vec::new(),
            PlanNode::CountOptimized(s) => vec![&s.fallback],
            PlanNode::Project(p) => vec![&p.input],
            PlanNode::ClientFilter(f) => vec![&f.input],
            PlanNode::Distinct(d) => vec![&d.input],
            PlanNode::Concatenate(c) => c.inputs.iter().collect(),
            PlanNode::ParallelPartition(p) => p.partitions.iter().collect(),
            PlanNode::MergeAggregate(m) => vec![&m.input],
            PlanNode::DmlExecute(d) => d.source.as_deref().into_iter().collect(),
            PlanNode::PrefetchScan(p) => vec![&p.input],
        }
    }

    fn label(&self) -> String {
        match self {
            PlanNode::FetchXmlScan(s) => format!("FetchXmlScan(entity={})", s.entity),
            PlanNode::TdsScan(_) => "TdsScan(passthrough)".to_string(),
            PlanNode::CountOptimized(s) => format!("CountOptimized(entity={})", s.entity),
            PlanNode::AdaptiveAggregateScan(s) => format!(
                "AdaptiveAggregateScan(entity={}, est_rows={}, depth={})",
                s.entity, s.estimated_record_count, s.split_depth
            ),
            PlanNode::Project(p) => format!("Project(columns={})", p.items.len()),
            PlanNode::ClientFilter(_) => "ClientFilter(residual)".to_string(),
            PlanNode::Distinct(_) => "Distinct".to_string(),
            PlanNode::Concatenate(c) => format!("Concatenate(all={}, inputs={})", c.all, c.inputs.len()),
            PlanNode::ParallelPartition(p) => {
                format!("ParallelPartition(partitions={}, pool={})", p.partitions.len(), p.pool_capacity)
            }
            PlanNode::MergeAggregate(m) => format!("MergeAggregate(groups={}, columns={})", m.group_by.len(), m.columns.len()),
            PlanNode::DmlExecute(d) => match &d.kind {
                DmlKind::Insert(s) => format!("DmlExecute(insert into {})", s.table),
                DmlKind::Update(s) => format!("DmlExecute(update {})", s.table),
                DmlKind::Delete(s) => format!("DmlExecute(delete from {})", s.table),
            },
            PlanNode::PrefetchScan(p) => format!("PrefetchScan(buffer={})", p.buffer_size),
        }
    }
}

/// Renders a plan as an indented, box-drawing tree, one node per line.
/// Kept for callers that just want a quick tree dump; [`PlanFormatter`]
/// produces the header/footer-bearing form the explain output is specified
/// to have.
pub fn explain(node: &PlanNode) -> String {
    let mut out = String::new();
    render(node, "", "", &mut out);
    out
}

fn render(node: &PlanNode, prefix: &str, connector: &str, out: &mut String) {
    out.push_str(prefix);
    out.push_str(connector);
    out.push_str(&node.label());
    out.push('\n');

    let next_prefix = if connector.is_empty() {
        String::new()
    } else if connector == "└── " {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };

    let children = node.children();
    let n = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let is_last = i + 1 == n;
        render(child, &next_prefix, if is_last { "└── " } else { "├── " }, out);
    }
}

/// One line of an explain tree: the node's own description plus an
/// estimated row count where the planner could supply one. Built from a
/// [`PlanNode`] by [`QueryPlanDescription::from_node`].
#[derive(Debug, Clone)]
pub struct QueryPlanDescription {
    pub node_type: String,
    pub description: String,
    pub estimated_rows: Option<u64>,
    pub children: Vec<QueryPlanDescription>,
    pub pool_capacity: Option<usize>,
    pub effective_parallelism: Option<usize>,
}

impl QueryPlanDescription {
    pub fn from_node(node: &PlanNode) -> Self {
        let (node_type, description, estimated_rows, pool_capacity, effective_parallelism) = match node {
            PlanNode::FetchXmlScan(s) => ("FetchXmlScan".to_string(), s.entity.clone(), None, None, None),
            PlanNode::TdsScan(_) => ("TdsScan".to_string(), "passthrough".to_string(), None, None, None),
            PlanNode::CountOptimized(s) => ("CountOptimized".to_string(), s.entity.clone(), None, None, None),
            PlanNode::AdaptiveAggregateScan(s) => {
                ("AdaptiveAggregateScan".to_string(), s.entity.clone(), Some(s.estimated_record_count), None, None)
            }
            PlanNode::Project(_) => ("Project".to_string(), String::new(), None, None, None),
            PlanNode::ClientFilter(_) => ("ClientFilter".to_string(), "residual".to_string(), None, None, None),
            PlanNode::Distinct(_) => ("Distinct".to_string(), String::new(), None, None, None),
            PlanNode::Concatenate(c) => ("Concatenate".to_string(), format!("all={}", c.all), None, None, None),
            PlanNode::ParallelPartition(p) => (
                "ParallelPartition".to_string(),
                String::new(),
                None,
                Some(p.pool_capacity),
                Some(p.partitions.len().min(p.pool_capacity)),
            ),
            PlanNode::MergeAggregate(_) => ("MergeAggregate".to_string(), String::new(), None, None, None),
            PlanNode::DmlExecute(d) => match &d.kind {
                DmlKind::Insert(s) => ("DmlExecute".to_string(), format!("INSERT {}", s.table), None, None, None),
                DmlKind::Update(s) => ("DmlExecute".to_string(), format!("UPDATE {}", s.table), None, None, None),
                DmlKind::Delete(s) => ("DmlExecute".to_string(), format!("DELETE {}", s.table), None, None, None),
            },
            PlanNode::PrefetchScan(_) => ("PrefetchScan".to_string(), String::new(), None, None, None),
        };
        QueryPlanDescription {
            node_type,
            description,
            estimated_rows,
            children: node.children().into_iter().map(QueryPlanDescription::from_node).collect(),
            pool_capacity,
            effective_parallelism,
        }
    }
}

/// Renders a [`QueryPlanDescription`] tree into the `Execution Plan:`
/// text shown to callers who ask for the plan instead of running it.
pub struct PlanFormatter;

impl PlanFormatter {
    pub fn format(description: &QueryPlanDescription) -> String {
        let mut out = String::from("Execution Plan:\n");
        Self::render(description, "  ", "", &mut out);
        if let Some(capacity) = description.pool_capacity {
            out.push_str(&format!("Pool capacity: {capacity}"));
            if let Some(parallelism) = description.effective_parallelism {
                out.push_str(&format!(", effective parallelism: {parallelism}"));
            }
            out.push('\n');
        }
        out
    }

    fn render(description: &QueryPlanDescription, prefix: &str, connector: &str, out: &mut String) {
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(&description.node_type);
        if !description.description.is_empty() {
            out.push_str(": ");
            out.push_str(&description.description);
        }
        if let Some(rows) = description.estimated_rows {
            out.push_str(&format!(" (est. {} rows)", format_thousands(rows)));
        }
        out.push('\n');

        let next_prefix = if connector.is_empty() {
            prefix.to_string()
        } else if connector == "└── " {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };

        let n = description.children.len();
        for (i, child) in description.children.iter().enumerate() {
            let is_last = i + 1 == n;
            Self::render(child, &next_prefix, if is_last { "└── " } else { "├── " }, out);
        }
    }
}

fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.chars().rev().collect()
}

/// Splices a `[rangeStart, rangeEnd)` date filter into a FetchXML template's
/// last `<entity>` element, for use by [`AdaptiveAggregateScan`] when
/// executing (and, on adaptive subdivision, re-executing with a narrower
/// window). Re-exported from the FetchXML crate: the splice itself is a
/// string-level XML concern, not a plan-shape concern.
pub use fetchql_fetchxml::inject_date_range_filter;

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(entity: &str) -> PlanNode {
        PlanNode::FetchXmlScan(FetchXmlScan {
            entity: entity.to_string(),
            fetch_xml: String::new(),
            virtual_columns: Vec::new(),
            auto_page: true,
            max_rows: None,
        })
    }

    #[test]
    fn explains_single_leaf_with_no_connector() {
        let plan = leaf("account");
        assert_eq!(explain(&plan), "FetchXmlScan(entity=account)\n");
    }

    #[test]
    fn explains_nested_plan_with_box_drawing_connectors() {
        let plan = PlanNode::Distinct(Distinct {
            input: Box::new(PlanNode::ClientFilter(ClientFilter {
                input: Box::new(leaf("account")),
                condition: Cond::new(
                    0,
                    fetchql_ast::CondKind::IsNull { column: fetchql_ast::ColumnRef::new("revenue"), negated: false },
                ),
            })),
        });
        let rendered = explain(&plan);
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("Distinct"));
        assert_eq!(lines.next(), Some("└── ClientFilter(residual)"));
        assert_eq!(lines.next(), Some("    └── FetchXmlScan(entity=account)"));
    }

    #[test]
    fn explains_parallel_partition_with_siblings() {
        let plan = PlanNode::ParallelPartition(ParallelPartition {
            partitions: vec![leaf("account"), leaf("account")],
            pool_capacity: 4,
        });
        let rendered = explain(&plan);
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("ParallelPartition(partitions=2, pool=4)"));
        assert_eq!(lines.next(), Some("├── FetchXmlScan(entity=account)"));
        assert_eq!(lines.next(), Some("└── FetchXmlScan(entity=account)"));
    }

    #[test]
    fn plan_formatter_renders_thousands_separator_and_dml_header() {
        let plan = PlanNode::DmlExecute(DmlExecute {
            kind: DmlKind::Delete(DeleteStatement {
                table: "account".to_string(),
                where_clause: None,
            }),
            source: None,
            source_columns: Vec::new(),
            insert_value_rows: Vec::new(),
            row_cap: 0,
        });
        let description = QueryPlanDescription {
            estimated_rows: None,
            ..QueryPlanDescription::from_node(&plan)
        };
        let mut with_child = description;
        with_child.children.push(QueryPlanDescription {
            estimated_rows: Some(5000),
            ..QueryPlanDescription::from_node(&leaf("account"))
        });
        let rendered = PlanFormatter::format(&with_child);
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("Execution Plan:"));
        assert_eq!(lines.next(), Some("  DmlExecute: DELETE account"));
        assert_eq!(lines.next(), Some("  └── FetchXmlScan: account (est. 5,000 rows)"));
    }

    #[test]
    fn plan_formatter_prints_pool_footer_when_present() {
        let plan = PlanNode::ParallelPartition(ParallelPartition {
            partitions: vec![leaf("account")],
            pool_capacity: 4,
        });
        let description = QueryPlanDescription::from_node(&plan);
        let rendered = PlanFormatter::format(&description);
        assert!(rendered.contains("Pool capacity: 4, effective parallelism: 1"));
    }
}
