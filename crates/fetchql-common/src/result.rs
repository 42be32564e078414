//! Row and result types produced by the executor.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One column of the buffered [`QueryResult`] surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A single cell value as it comes back from the remote store.
///
/// Lookups, option sets, money, and aliased values keep their rich shape so
/// that virtual-column projection (display-name materialization) and
/// formatting can act on them without re-querying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    /// A plain scalar: string, integer, float, bool, datetime, or null.
    Simple(Option<serde_json::Value>),
    /// A lookup attribute: the referenced record's id, its entity, and an
    /// optional already-known display name.
    Lookup {
        id: Uuid,
        logical_name: String,
        display_name: Option<String>,
    },
    /// An option set (choice) value with its numeric value and label.
    OptionSet { value: i32, label: Option<String> },
    /// A currency value.
    Money(Decimal),
    /// A value projected from a linked entity via `<link-entity alias="...">`.
    Aliased {
        source_entity: String,
        attribute: String,
        inner: Box<QueryValue>,
    },
}

impl QueryValue {
    pub fn null() -> Self {
        QueryValue::Simple(None)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Simple(None))
    }

    pub fn from_str(s: impl Into<String>) -> Self {
        QueryValue::Simple(Some(serde_json::Value::String(s.into())))
    }

    pub fn from_i64(v: i64) -> Self {
        QueryValue::Simple(Some(serde_json::Value::from(v)))
    }

    /// The display-facing text, used by the `CONCAT`/string functions and by
    /// the plan formatter. `None` for null.
    pub fn as_display_string(&self) -> Option<String> {
        match self {
            QueryValue::Simple(None) => None,
            QueryValue::Simple(Some(v)) => Some(match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            QueryValue::Lookup {
                display_name: Some(d),
                ..
            } => Some(d.clone()),
            QueryValue::Lookup { id, .. } => Some(id.to_string()),
            QueryValue::OptionSet {
                label: Some(l), ..
            } => Some(l.clone()),
            QueryValue::OptionSet { value, .. } => Some(value.to_string()),
            QueryValue::Money(d) => Some(d.to_string()),
            QueryValue::Aliased { inner, .. } => inner.as_display_string(),
        }
    }
}

/// A decoded record, keyed by requested attribute (or alias) name.
///
/// Keys preserve the order they were first inserted in, so that the
/// buffered surface can infer column order from the first row without a
/// separate schema pass.
#[derive(Debug, Clone, Default)]
pub struct QueryRow {
    pub values: IndexMap<String, QueryValue>,
    pub entity_logical_name: String,
}

impl QueryRow {
    pub fn new(entity_logical_name: impl Into<String>) -> Self {
        Self {
            values: IndexMap::new(),
            entity_logical_name: entity_logical_name.into(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&QueryValue> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: QueryValue) {
        self.values.insert(column.into(), value);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }
}

/// The buffered `Execute` surface's return value.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub records: Vec<QueryRow>,
    pub columns: Vec<ColumnInfo>,
    pub count: usize,
    pub executed_fetch_xml: Option<String>,
    pub entity_logical_name: Option<String>,
}

impl QueryResult {
    /// Builds a result from a fully materialized row set, inferring columns
    /// from the first row (empty results have empty columns, per invariant).
    pub fn from_rows(rows: Vec<QueryRow>, executed_fetch_xml: Option<String>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.columns().map(ColumnInfo::new).collect())
            .unwrap_or_default();
        let entity_logical_name = rows.first().map(|r| r.entity_logical_name.clone());
        let count = rows.len();
        Self {
            records: rows,
            columns,
            count,
            executed_fetch_xml,
            entity_logical_name,
        }
    }
}
