//! Node-by-node execution. Each function takes the node's own data (by
//! reference, borrowed from the caller's plan tree) and an owned
//! [`ExecutionContext`] and returns a lazy [`BoxStream`] of rows — nothing
//! here drains more of its input than its own semantics require.

use std::collections::HashSet;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};

use fetchql_client::{BulkRequest, DmlOperation, PassthroughRequest};
use fetchql_common::{Error, QueryRow, QueryValue, Result};
use fetchql_eval::Evaluator;
use fetchql_plan::{
    AdaptiveAggregateScan, ClientFilter, Concatenate, CountOptimized, Distinct, DmlExecute, DmlKind,
    FetchXmlScan, ParallelPartition, PlanNode, PrefetchScan, Project, TdsScan, MAX_ADAPTIVE_SPLIT_DEPTH,
};

use crate::ExecutionContext;

/// Dataverse truncates an aggregate FetchXML response at 5,000 contributing
/// records; a returned value sitting exactly on that boundary means the
/// aggregate is a partial answer, not the true one.
const AGGREGATE_PAGE_LIMIT: f64 = 5000.0;

pub(crate) fn execute_node<'a>(plan: &'a PlanNode, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    match plan {
        PlanNode::FetchXmlScan(s) => fetch_xml_scan(s, ctx),
        PlanNode::TdsScan(s) => tds_scan(s, ctx),
        PlanNode::CountOptimized(s) => count_optimized(s, ctx),
        PlanNode::AdaptiveAggregateScan(s) => adaptive_aggregate_scan(s, ctx),
        PlanNode::Project(p) => project(p, ctx),
        PlanNode::ClientFilter(f) => client_filter(f, ctx),
        PlanNode::Distinct(d) => distinct(&d.input, ctx),
        PlanNode::Concatenate(c) => concatenate(c, ctx),
        PlanNode::ParallelPartition(p) => parallel_partition(p, ctx),
        PlanNode::MergeAggregate(m) => merge_aggregate(m, ctx),
        PlanNode::DmlExecute(d) => dml_execute(d, ctx),
        PlanNode::PrefetchScan(p) => prefetch_scan(p, ctx),
    }
}

/// Walks down to the first leaf scan to recover the FetchXML (or passthrough
/// SQL) actually driving the query, for [`fetchql_common::QueryResult::executed_fetch_xml`].
pub(crate) fn executed_fetch_xml(plan: &PlanNode) -> Option<String> {
    match plan {
        PlanNode::FetchXmlScan(s) => Some(s.fetch_xml.clone()),
        PlanNode::TdsScan(s) => Some(s.sql.clone()),
        PlanNode::CountOptimized(s) => executed_fetch_xml(&s.fallback),
        PlanNode::AdaptiveAggregateScan(s) => Some(s.base_fetch_xml.clone()),
        PlanNode::Project(p) => executed_fetch_xml(&p.input),
        PlanNode::ClientFilter(f) => executed_fetch_xml(&f.input),
        PlanNode::Distinct(d) => executed_fetch_xml(&d.input),
        PlanNode::Concatenate(c) => c.inputs.first().and_then(executed_fetch_xml),
        PlanNode::ParallelPartition(p) => p.partitions.first().and_then(executed_fetch_xml),
        PlanNode::MergeAggregate(m) => executed_fetch_xml(&m.input),
        PlanNode::DmlExecute(d) => d.source.as_deref().and_then(executed_fetch_xml),
        PlanNode::PrefetchScan(p) => executed_fetch_xml(&p.input),
    }
}

fn fetch_xml_scan<'a>(s: &'a FetchXmlScan, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    struct State {
        cookie: Option<String>,
        done: bool,
        yielded: u32,
    }
    let initial = State { cookie: None, done: false, yielded: 0 };
    stream::unfold(initial, move |mut state| {
        let ctx = ctx.clone();
        async move {
            if state.done {
                return None;
            }
            if ctx.cancel.is_cancelled() {
                return Some((vec![Err(Error::Cancelled)], State { done: true, ..state }));
            }
            let remaining = s.max_rows.map(|max| max.saturating_sub(state.yielded));
            if remaining == Some(0) {
                return None;
            }
            let client = match ctx.pool.get_client(None, None, ctx.cancel.clone()).await {
                Ok(c) => c,
                Err(e) => return Some((vec![Err(e)], State { done: true, ..state })),
            };
            let page = match client.retrieve_multiple(&s.fetch_xml, state.cookie.as_deref(), remaining).await {
                Ok(p) => p,
                Err(e) => return Some((vec![Err(e)], State { done: true, ..state })),
            };
            let yielded = state.yielded + page.records.len() as u32;
            let keep_paging = s.auto_page && page.more_records && page.paging_cookie.is_some();
            let done = !keep_paging || s.max_rows.is_some_and(|max| yielded >= max);
            let next = State { cookie: page.paging_cookie, done, yielded };
            Some((page.records.into_iter().map(Ok).collect(), next))
        }
    })
    .flat_map(stream::iter)
    .boxed()
}

fn tds_scan<'a>(s: &'a TdsScan, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    stream::once(async move {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let client = ctx.pool.get_client(None, None, ctx.cancel.clone()).await?;
        let response = client.execute(PassthroughRequest { sql: s.sql.clone() }).await?;
        Ok(response.rows)
    })
    .flat_map(|result: Result<Vec<QueryRow>>| rows_or_error(result))
    .boxed()
}

fn count_optimized<'a>(s: &'a CountOptimized, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let fallback_ctx = ctx.clone();
    stream::once(async move {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let client = ctx.pool.get_client(None, None, ctx.cancel.clone()).await?;
        let counts = client.get_total_record_count(std::slice::from_ref(&s.entity)).await?;
        Ok(counts.get(&s.entity).copied())
    })
    .flat_map(move |result: Result<Option<i64>>| -> BoxStream<'a, Result<QueryRow>> {
        match result {
            Ok(Some(count)) => {
                let mut row = QueryRow::new(s.entity.clone());
                row.set(s.alias.clone(), QueryValue::from_i64(count));
                stream::iter(vec![Ok(row)]).boxed()
            }
            Ok(None) => execute_node(&s.fallback, fallback_ctx.clone()),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        }
    })
    .boxed()
}

fn adaptive_aggregate_scan<'a>(s: &'a AdaptiveAggregateScan, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    stream::once(run_adaptive(s.clone(), ctx))
        .flat_map(|result: Result<Vec<QueryRow>>| rows_or_error(result))
        .boxed()
}

fn run_adaptive(scan: AdaptiveAggregateScan, ctx: ExecutionContext) -> BoxFuture<'static, Result<Vec<QueryRow>>> {
    async move {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let fetch_xml = fetchql_plan::inject_date_range_filter(&scan.base_fetch_xml, &scan.partition_attribute, scan.range_start, scan.range_end);
        let client = ctx.pool.get_client(None, None, ctx.cancel.clone()).await?;
        let response = client.retrieve_multiple(&fetch_xml, None, None).await?;
        let truncated = response.records.len() == 1 && row_hits_aggregate_limit(&response.records[0]);
        if truncated && scan.split_depth < MAX_ADAPTIVE_SPLIT_DEPTH {
            let span = scan.range_end - scan.range_start;
            let mid = scan.range_start + span / 2;
            let left = AdaptiveAggregateScan { range_end: mid, split_depth: scan.split_depth + 1, ..scan.clone() };
            let right = AdaptiveAggregateScan { range_start: mid, split_depth: scan.split_depth + 1, ..scan };
            let (mut left_rows, right_rows) = tokio::try_join!(run_adaptive(left, ctx.clone()), run_adaptive(right, ctx))?;
            left_rows.extend(right_rows);
            Ok(left_rows)
        } else {
            Ok(response.records)
        }
    }
    .boxed()
}

fn row_hits_aggregate_limit(row: &QueryRow) -> bool {
    row.values.values().any(|v| match v {
        QueryValue::Simple(Some(serde_json::Value::Number(n))) => n.as_f64() == Some(AGGREGATE_PAGE_LIMIT),
        _ => false,
    })
}

fn project<'a>(p: &'a Project, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let variables = ctx.variables.clone();
    execute_node(&p.input, ctx)
        .map(move |row| {
            let row = row?;
            let mut out = QueryRow::new(row.entity_logical_name.clone());
            for item in &p.items {
                let evaluator = match &variables {
                    Some(scope) => Evaluator::with_scope(&row, scope),
                    None => Evaluator::new(&row),
                };
                let value = evaluator.evaluate(&item.expr)?;
                let name = item
                    .alias
                    .clone()
                    .or_else(|| item.expr.as_column().map(|c| c.name.clone()))
                    .unwrap_or_default();
                out.set(name, value);
            }
            Ok(out)
        })
        .boxed()
}

fn client_filter<'a>(f: &'a ClientFilter, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let variables = ctx.variables.clone();
    execute_node(&f.input, ctx)
        .filter_map(move |row| {
            let variables = variables.clone();
            async move {
                match row {
                    Err(e) => Some(Err(e)),
                    Ok(row) => {
                        let evaluator = match &variables {
                            Some(scope) => Evaluator::with_scope(&row, scope),
                            None => Evaluator::new(&row),
                        };
                        match evaluator.evaluate_condition(&f.condition) {
                            Ok(true) => Some(Ok(row)),
                            Ok(false) => None,
                            Err(e) => Some(Err(e)),
                        }
                    }
                }
            }
        })
        .boxed()
}

fn distinct<'a>(input: &'a PlanNode, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let seen = std::sync::Mutex::new(HashSet::new());
    execute_node(input, ctx)
        .filter_map(move |row| {
            let result = match row {
                Err(e) => Some(Err(e)),
                Ok(row) => {
                    let key = row_key(&row);
                    if seen.lock().unwrap().insert(key) {
                        Some(Ok(row))
                    } else {
                        None
                    }
                }
            };
            async move { result }
        })
        .boxed()
}

fn row_key(row: &QueryRow) -> String {
    row.values
        .iter()
        .map(|(k, v)| format!("{k}={}", v.as_display_string().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\u{1}")
}

fn concatenate<'a>(c: &'a Concatenate, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let streams: Vec<BoxStream<'a, Result<QueryRow>>> = c.inputs.iter().map(|input| execute_node(input, ctx.clone())).collect();
    if c.all {
        stream::iter(streams).flatten().boxed()
    } else {
        let seen = std::sync::Mutex::new(HashSet::new());
        stream::iter(streams)
            .flatten()
            .filter_map(move |row| {
                let result = match row {
                    Err(e) => Some(Err(e)),
                    Ok(row) => {
                        let key = row_key(&row);
                        if seen.lock().unwrap().insert(key) {
                            Some(Ok(row))
                        } else {
                            None
                        }
                    }
                };
                async move { result }
            })
            .boxed()
    }
}

fn parallel_partition<'a>(node: &'a ParallelPartition, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let (child_ctx, child_token) = ctx.child_scope();
    let streams: Vec<BoxStream<'a, Result<QueryRow>>> = node
        .partitions
        .iter()
        .map(|p| execute_node(p, child_ctx.clone()))
        .collect();
    let merged = stream::select_all(streams);
    stream::unfold((merged, child_token, false), |(mut inner, token, stopped)| async move {
        if stopped {
            return None;
        }
        match inner.next().await {
            None => None,
            Some(Err(e)) => {
                token.cancel();
                Some((Err(e), (inner, token, true)))
            }
            Some(Ok(row)) => Some((Ok(row), (inner, token, false))),
        }
    })
    .boxed()
}

fn merge_aggregate<'a>(m: &'a fetchql_plan::MergeAggregate, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let input = execute_node(&m.input, ctx);
    stream::once(crate::merge::merge_rows(input, &m.group_by, &m.columns, &m.order_by))
        .flat_map(|result: Result<Vec<QueryRow>>| rows_or_error(result))
        .boxed()
}

fn dml_execute<'a>(node: &'a DmlExecute, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    stream::once(run_dml(node, ctx)).boxed()
}

async fn run_dml(node: &DmlExecute, ctx: ExecutionContext) -> Result<QueryRow> {
    let (entity, operation) = dml_kind_info(&node.kind);
    let mut requests = Vec::new();
    let variables = ctx.variables.clone();

    match (&node.source, &node.kind) {
        (Some(source_plan), DmlKind::Insert(insert)) => {
            let mut src = execute_node(source_plan, ctx.clone());
            while let Some(row) = src.next().await {
                if node.row_cap > 0 && requests.len() as u64 >= node.row_cap {
                    break;
                }
                let row = row?;
                let mut fields = indexmap::IndexMap::new();
                for (i, column) in insert.columns.iter().enumerate() {
                    if let Some(source_column) = node.source_columns.get(i) {
                        if let Some(value) = row.get(source_column) {
                            fields.insert(column.clone(), value.clone());
                        }
                    }
                }
                requests.push(BulkRequest { operation: DmlOperation::Insert, entity: entity.clone(), id: None, fields });
            }
        }
        (None, DmlKind::Insert(insert)) => {
            let empty = QueryRow::new(entity.clone());
            for values in &node.insert_value_rows {
                if node.row_cap > 0 && requests.len() as u64 >= node.row_cap {
                    break;
                }
                let evaluator = match &variables {
                    Some(scope) => Evaluator::with_scope(&empty, scope),
                    None => Evaluator::new(&empty),
                };
                let mut fields = indexmap::IndexMap::new();
                for (column, expr) in insert.columns.iter().zip(values.iter()) {
                    fields.insert(column.clone(), evaluator.evaluate(expr)?);
                }
                requests.push(BulkRequest { operation: DmlOperation::Insert, entity: entity.clone(), id: None, fields });
            }
        }
        (Some(source_plan), DmlKind::Update(update)) => {
            let mut src = execute_node(source_plan, ctx.clone());
            while let Some(row) = src.next().await {
                if node.row_cap > 0 && requests.len() as u64 >= node.row_cap {
                    break;
                }
                let row = row?;
                let evaluator = match &variables {
                    Some(scope) => Evaluator::with_scope(&row, scope),
                    None => Evaluator::new(&row),
                };
                let mut fields = indexmap::IndexMap::new();
                for (column, expr) in &update.set {
                    fields.insert(column.clone(), evaluator.evaluate(expr)?);
                }
                let id = row.get(&format!("{entity}id")).and_then(|v| v.as_display_string());
                requests.push(BulkRequest { operation: DmlOperation::Update, entity: entity.clone(), id, fields });
            }
        }
        (Some(source_plan), DmlKind::Delete(_)) => {
            let mut src = execute_node(source_plan, ctx.clone());
            while let Some(row) = src.next().await {
                if node.row_cap > 0 && requests.len() as u64 >= node.row_cap {
                    break;
                }
                let row = row?;
                let id = row.get(&format!("{entity}id")).and_then(|v| v.as_display_string());
                requests.push(BulkRequest { operation: DmlOperation::Delete, entity: entity.clone(), id, fields: indexmap::IndexMap::new() });
            }
        }
        _ => {}
    }

    if ctx.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let client = ctx.pool.get_client(None, None, ctx.cancel.clone()).await?;
    let result = client.execute_bulk(requests, ctx.dml_batch_size, None).await?;

    let mut out = QueryRow::new(entity);
    let column = match operation {
        DmlOperation::Insert => "inserted",
        DmlOperation::Update => "updated",
        DmlOperation::Delete => "deleted",
    };
    out.set(column, QueryValue::from_i64(result.succeeded as i64));
    out.set("failed", QueryValue::from_i64(result.failed as i64));
    Ok(out)
}

fn dml_kind_info(kind: &DmlKind) -> (String, DmlOperation) {
    match kind {
        DmlKind::Insert(s) => (s.table.clone(), DmlOperation::Insert),
        DmlKind::Update(s) => (s.table.clone(), DmlOperation::Update),
        DmlKind::Delete(s) => (s.table.clone(), DmlOperation::Delete),
    }
}

fn prefetch_scan<'a>(p: &'a PrefetchScan, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let buffer_size = p.buffer_size.max(1);
    let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);
    let owned_input = (*p.input).clone();
    tokio::spawn(async move {
        let mut input = execute_node(&owned_input, ctx);
        while let Some(item) = input.next().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

fn rows_or_error(result: Result<Vec<QueryRow>>) -> BoxStream<'static, Result<QueryRow>> {
    match result {
        Ok(rows) => stream::iter(rows.into_iter().map(Ok)).boxed(),
        Err(e) => stream::iter(vec![Err(e)]).boxed(),
    }
}
