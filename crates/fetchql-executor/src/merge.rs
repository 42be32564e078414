//! Client-side merge for [`fetchql_plan::MergeAggregate`]: drains its input
//! stream fully (there is no way to emit a correct grouped total before
//! every partial row has been seen), groups, accumulates, and sorts.
//!
//! AVG is the one accumulator that cannot just add partial values together:
//! each partition's FetchXML reports a true average of that partition plus a
//! companion count (see [`fetchql_plan::AggregateColumn::count_alias`]), so
//! merging recovers `partition_sum = avg * count` before folding sum/count
//! into the running total and only divides once, at the very end.

use futures::stream::{BoxStream, StreamExt};

use fetchql_ast::{DatePart, GroupByItem, OrderByItem};
use fetchql_common::{QueryRow, QueryValue, Result};
use fetchql_plan::{AggregateColumn, AggregateOp};

enum Acc {
    Count(i64),
    Sum(Option<f64>),
    Extreme { is_min: bool, value: Option<QueryValue> },
    Avg { sum: f64, count: i64 },
}

impl Acc {
    fn new(op: AggregateOp) -> Self {
        match op {
            AggregateOp::Count => Acc::Count(0),
            AggregateOp::Sum => Acc::Sum(None),
            AggregateOp::Min => Acc::Extreme { is_min: true, value: None },
            AggregateOp::Max => Acc::Extreme { is_min: false, value: None },
            AggregateOp::Avg => Acc::Avg { sum: 0.0, count: 0 },
        }
    }

    fn absorb(&mut self, row: &QueryRow, column: &AggregateColumn) {
        match self {
            Acc::Count(n) => {
                if let Some(v) = row.get(&column.alias).and_then(as_i64) {
                    *n += v;
                }
            }
            Acc::Sum(sum) => {
                if let Some(v) = row.get(&column.alias).and_then(as_f64) {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            Acc::Extreme { is_min, value } => {
                if let Some(v) = row.get(&column.alias) {
                    let better = match value {
                        None => true,
                        Some(current) => {
                            if *is_min {
                                less_than(v, current)
                            } else {
                                less_than(current, v)
                            }
                        }
                    };
                    if better {
                        *value = Some(v.clone());
                    }
                }
            }
            Acc::Avg { sum, count } => {
                let partition_avg = row.get(&column.alias).and_then(as_f64).unwrap_or(0.0);
                let partition_count = column
                    .count_alias
                    .as_ref()
                    .and_then(|alias| row.get(alias))
                    .and_then(as_i64)
                    .unwrap_or(0);
                *sum += partition_avg * partition_count as f64;
                *count += partition_count;
            }
        }
    }

    fn finish(self) -> QueryValue {
        match self {
            Acc::Count(n) => QueryValue::from_i64(n),
            Acc::Sum(Some(v)) => QueryValue::Simple(Some(serde_json::Value::from(v))),
            Acc::Sum(None) => QueryValue::null(),
            Acc::Extreme { value, .. } => value.unwrap_or_else(QueryValue::null),
            Acc::Avg { sum, count } => {
                if count == 0 {
                    QueryValue::null()
                } else {
                    QueryValue::Simple(Some(serde_json::Value::from(sum / count as f64)))
                }
            }
        }
    }
}

fn as_f64(v: &QueryValue) -> Option<f64> {
    match v {
        QueryValue::Simple(Some(serde_json::Value::Number(n))) => n.as_f64(),
        QueryValue::Money(d) => d.to_string().parse().ok(),
        QueryValue::OptionSet { value, .. } => Some(*value as f64),
        _ => None,
    }
}

fn as_i64(v: &QueryValue) -> Option<i64> {
    as_f64(v).map(|f| f as i64)
}

fn less_than(a: &QueryValue, b: &QueryValue) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x < y,
        _ => a.as_display_string() < b.as_display_string(),
    }
}

fn group_by_column_name(item: &GroupByItem) -> String {
    match item {
        GroupByItem::Column(c) => c.name.clone(),
        GroupByItem::DatePart { part, column } => format!("{}_{}", column.name, date_part_name(*part)),
    }
}

fn date_part_name(part: DatePart) -> &'static str {
    match part {
        DatePart::Year => "year",
        DatePart::Month => "month",
        DatePart::Day => "day",
        DatePart::Quarter => "quarter",
        DatePart::Week => "week",
    }
}

fn group_key(row: &QueryRow, group_by: &[GroupByItem]) -> Vec<String> {
    group_by
        .iter()
        .map(|g| {
            let name = group_by_column_name(g);
            row.get(&name).and_then(|v| v.as_display_string()).unwrap_or_default()
        })
        .collect()
}

/// Drains `input`, grouping by `group_by` and accumulating `columns`, then
/// sorts by `order_by`. A no-GROUP-BY aggregate over zero input rows still
/// yields one row (`COUNT(*)` of an empty set is `0`, not an empty result).
pub(crate) async fn merge_rows(
    mut input: BoxStream<'_, Result<QueryRow>>,
    group_by: &[GroupByItem],
    columns: &[AggregateColumn],
    order_by: &[OrderByItem],
) -> Result<Vec<QueryRow>> {
    let mut groups: indexmap::IndexMap<Vec<String>, (Vec<(String, QueryValue)>, String, Vec<Acc>)> = indexmap::IndexMap::new();
    let mut any_row = false;

    while let Some(row) = input.next().await {
        let row = row?;
        any_row = true;
        let key = group_key(&row, group_by);
        let entity = row.entity_logical_name.clone();
        let entry = groups.entry(key).or_insert_with(|| {
            let key_values = group_by
                .iter()
                .map(|g| {
                    let name = group_by_column_name(g);
                    let value = row.get(&name).cloned().unwrap_or_else(QueryValue::null);
                    (name, value)
                })
                .collect();
            let accs = columns.iter().map(|c| Acc::new(c.op)).collect();
            (key_values, entity, accs)
        });
        for (acc, column) in entry.2.iter_mut().zip(columns.iter()) {
            acc.absorb(&row, column);
        }
    }

    let mut out = Vec::new();
    if !any_row && group_by.is_empty() && !columns.is_empty() {
        let mut row = QueryRow::new(String::new());
        for column in columns {
            let value = match column.op {
                AggregateOp::Count => QueryValue::from_i64(0),
                _ => QueryValue::null(),
            };
            row.set(column.alias.clone(), value);
        }
        out.push(row);
    } else {
        for (key_values, entity, accs) in groups.into_values() {
            let mut row = QueryRow::new(entity);
            for (name, value) in key_values {
                row.set(name, value);
            }
            for (acc, column) in accs.into_iter().zip(columns.iter()) {
                row.set(column.alias.clone(), acc.finish());
            }
            out.push(row);
        }
    }

    sort_rows(&mut out, order_by);
    Ok(out)
}

fn sort_rows(rows: &mut [QueryRow], order_by: &[OrderByItem]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for item in order_by {
            let ordering = compare_values(a.get(&item.name), b.get(&item.name));
            let ordering = if item.descending { ordering.reverse() } else { ordering };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn compare_values(a: Option<&QueryValue>, b: Option<&QueryValue>) -> std::cmp::Ordering {
    match (a.and_then(as_f64), b.and_then(as_f64)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.and_then(|v| v.as_display_string()).cmp(&b.and_then(|v| v.as_display_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn row(group: &str, value: i64, count: i64) -> QueryRow {
        let mut r = QueryRow::new("account");
        r.set("region", QueryValue::from_str(group));
        r.set("total", QueryValue::from_i64(value));
        r.set("total_count", QueryValue::from_i64(count));
        r
    }

    #[tokio::test]
    async fn sum_accumulates_across_partitions() {
        let rows = vec![Ok(row("east", 10, 2)), Ok(row("east", 20, 3)), Ok(row("west", 5, 1))];
        let input = stream::iter(rows).boxed();
        let columns = vec![AggregateColumn { op: AggregateOp::Sum, alias: "total".into(), count_alias: None }];
        let group_by = vec![GroupByItem::Column(fetchql_ast::ColumnRef::new("region"))];
        let result = merge_rows(input, &group_by, &columns, &[]).await.unwrap();
        assert_eq!(result.len(), 2);
        let east = result.iter().find(|r| r.get("region").unwrap().as_display_string().as_deref() == Some("east")).unwrap();
        assert_eq!(east.get("total").unwrap().as_display_string().as_deref(), Some("30.0"));
    }

    #[tokio::test]
    async fn avg_recovers_weighted_mean_from_partition_averages() {
        // partition A: 2 rows averaging 10 (sum 20); partition B: 1 row at 40.
        let mut a = QueryRow::new("account");
        a.set("avg_total", QueryValue::Simple(Some(serde_json::Value::from(10.0))));
        a.set("avg_total_count", QueryValue::from_i64(2));
        let mut b = QueryRow::new("account");
        b.set("avg_total", QueryValue::Simple(Some(serde_json::Value::from(40.0))));
        b.set("avg_total_count", QueryValue::from_i64(1));

        let input = stream::iter(vec![Ok(a), Ok(b)]).boxed();
        let columns = vec![AggregateColumn {
            op: AggregateOp::Avg,
            alias: "avg_total".into(),
            count_alias: Some("avg_total_count".into()),
        }];
        let result = merge_rows(input, &[], &columns, &[]).await.unwrap();
        assert_eq!(result.len(), 1);
        // (10*2 + 40*1) / 3 = 20, not (10+40)/2 = 25.
        assert_eq!(result[0].get("avg_total").unwrap().as_display_string().as_deref(), Some("20.0"));
    }

    #[tokio::test]
    async fn empty_input_with_no_group_by_yields_one_row() {
        let input = stream::iter(Vec::<Result<QueryRow>>::new()).boxed();
        let columns = vec![AggregateColumn { op: AggregateOp::Count, alias: "count".into(), count_alias: None }];
        let result = merge_rows(input, &[], &columns, &[]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("count").unwrap().as_display_string().as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn order_by_sorts_descending() {
        let rows = vec![Ok(row("east", 10, 1)), Ok(row("west", 50, 1)), Ok(row("north", 5, 1))];
        let input = stream::iter(rows).boxed();
        let columns = vec![AggregateColumn { op: AggregateOp::Sum, alias: "total".into(), count_alias: None }];
        let group_by = vec![GroupByItem::Column(fetchql_ast::ColumnRef::new("region"))];
        let order_by = vec![OrderByItem { name: "total".into(), descending: true }];
        let result = merge_rows(input, &group_by, &columns, &order_by).await.unwrap();
        let totals: Vec<_> = result.iter().map(|r| r.get("total").unwrap().as_display_string().unwrap()).collect();
        assert_eq!(totals, vec!["50.0", "10.0", "5.0"]);
    }
}
