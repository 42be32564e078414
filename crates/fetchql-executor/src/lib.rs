//! Drives a [`fetchql_plan::PlanNode`] tree against a [`fetchql_client::RemoteClient`].
//!
//! Every node is a lazy stream of [`QueryRow`]; this crate never materializes
//! more of a result than a consumer (or an internal node that genuinely
//! needs the whole input, like a group-by merge) asks for. Two surfaces sit
//! on top of the same recursive node walk: [`execute`] buffers everything
//! into a [`QueryResult`], [`execute_streaming`] hands back the lazy
//! sequence directly.

mod merge;
mod nodes;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tracing::instrument;

use fetchql_client::ClientPool;
use fetchql_common::{CancellationToken, Error, QueryResult, QueryRow, Result};
use fetchql_eval::VariableScope;
use fetchql_plan::PlanNode;

/// Atomically-updated counters a [`ExecutionContext`] shares across every
/// node in one top-level execution, per the immutable-plan/mutable-stats
/// split the concurrency model calls for.
#[derive(Debug)]
pub struct ExecutionStatistics {
    pub rows_output: AtomicU64,
}

impl Default for ExecutionStatistics {
    fn default() -> Self {
        Self { rows_output: AtomicU64::new(0) }
    }
}

/// Everything a node needs to run: where to get a client from, how to tell
/// it to stop, where to report row counts, and the variable scope a
/// preceding DECLARE/SET batch may have populated.
///
/// Cheap to clone: every field is an `Arc` or a `Copy` handle, which is what
/// lets [`ParallelPartition`](fetchql_plan::ParallelPartition) and
/// [`Concatenate`](fetchql_plan::Concatenate) hand an independent context to
/// each child without synchronizing on it.
#[derive(Clone)]
pub struct ExecutionContext {
    pool: Arc<dyn ClientPool>,
    cancel: CancellationToken,
    statistics: Arc<ExecutionStatistics>,
    variables: Option<Arc<VariableScope>>,
    dml_batch_size: usize,
    timeout: Option<Duration>,
}

impl ExecutionContext {
    pub fn new(pool: Arc<dyn ClientPool>, cancel: CancellationToken) -> Self {
        Self {
            pool,
            cancel,
            statistics: Arc::new(ExecutionStatistics::default()),
            variables: None,
            dml_batch_size: 100,
            timeout: None,
        }
    }

    pub fn with_variables(mut self, scope: Arc<VariableScope>) -> Self {
        self.variables = Some(scope);
        self
    }

    pub fn with_dml_batch_size(mut self, size: usize) -> Self {
        self.dml_batch_size = size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn statistics(&self) -> &ExecutionStatistics {
        &self.statistics
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    fn child_scope(&self) -> (Self, CancellationToken) {
        let token = self.cancel.child_token();
        let mut child = self.clone();
        child.cancel = token.clone();
        (child, token)
    }
}

/// `ExecuteStreaming(plan, ctx) -> lazy sequence of QueryRow`. Increments
/// `ctx.statistics().rows_output` as rows leave this, the top node — nested
/// calls go through [`nodes::execute_node`] directly, uncounted.
pub fn execute_streaming<'a>(plan: &'a PlanNode, ctx: ExecutionContext) -> BoxStream<'a, Result<QueryRow>> {
    let stats = ctx.statistics.clone();
    nodes::execute_node(plan, ctx)
        .map(move |item| {
            if item.is_ok() {
                stats.rows_output.fetch_add(1, Ordering::Relaxed);
            }
            item
        })
        .boxed()
}

/// `Execute(plan, ctx) -> QueryResult`. Columns are inferred from the first
/// row; an empty result has empty columns. Honors `ctx`'s configured
/// timeout, if any, around the whole drain.
#[instrument(skip(plan, ctx))]
pub async fn execute(plan: &PlanNode, ctx: ExecutionContext) -> Result<QueryResult> {
    let fetch_xml = nodes::executed_fetch_xml(plan);
    let timeout = ctx.timeout;
    let drain = async {
        let mut stream = execute_streaming(plan, ctx);
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row?);
        }
        Ok(rows)
    };
    let rows = match timeout {
        Some(duration) => tokio::time::timeout(duration, drain)
            .await
            .map_err(|_| Error::Timeout(duration))??,
        None => drain.await?,
    };
    Ok(QueryResult::from_rows(rows, fetch_xml))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use fetchql_ast::{ColumnRef, CompareOp, Cond, CondKind, Expr, Literal};
    use fetchql_client::{
        BulkRecordResult, BulkRequest, BulkResult, ClientPool, PassthroughRequest, PassthroughResponse,
        ProgressSink, RemoteClient, RetrieveMultipleResponse,
    };
    use fetchql_plan::{ClientFilter, Distinct, FetchXmlScan};

    fn row(revenue: i64) -> QueryRow {
        let mut r = QueryRow::new("account");
        r.set("revenue", fetchql_common::QueryValue::from_i64(revenue));
        r
    }

    struct StubClient {
        pages: std::sync::Mutex<Vec<RetrieveMultipleResponse>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteClient for StubClient {
        async fn retrieve_multiple(
            &self,
            _fetch_xml: &str,
            _paging_cookie: Option<&str>,
            _page_size: Option<u32>,
        ) -> Result<RetrieveMultipleResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return Ok(RetrieveMultipleResponse::default());
            }
            Ok(pages.remove(0))
        }

        async fn get_total_record_count(&self, _entity_names: &[String]) -> Result<HashMap<String, i64>> {
            Ok(HashMap::new())
        }

        async fn execute_bulk(
            &self,
            requests: Vec<BulkRequest>,
            _batch_size: usize,
            _progress: Option<ProgressSink>,
        ) -> Result<BulkResult> {
            Ok(BulkResult {
                succeeded: requests.len() as u64,
                failed: 0,
                details: requests
                    .iter()
                    .enumerate()
                    .map(|(i, _)| BulkRecordResult { index: i, error: None })
                    .collect(),
            })
        }

        async fn execute(&self, _request: PassthroughRequest) -> Result<PassthroughResponse> {
            Ok(PassthroughResponse::default())
        }
    }

    fn ctx_with_pages(pages: Vec<RetrieveMultipleResponse>) -> ExecutionContext {
        let client: Arc<dyn RemoteClient> = Arc::new(StubClient { pages: std::sync::Mutex::new(pages), calls: AtomicUsize::new(0) });
        let pool: Arc<dyn ClientPool> = Arc::new(fetchql_client::BoundedClientPool::new(client, 4));
        ExecutionContext::new(pool, CancellationToken::new())
    }

    #[tokio::test]
    async fn fetch_xml_scan_pages_until_exhaustion() {
        let ctx = ctx_with_pages(vec![
            RetrieveMultipleResponse { records: vec![row(1), row(2)], paging_cookie: Some("p1".into()), more_records: true },
            RetrieveMultipleResponse { records: vec![row(3)], paging_cookie: None, more_records: false },
        ]);
        let plan = PlanNode::FetchXmlScan(FetchXmlScan {
            entity: "account".into(),
            fetch_xml: "<fetch/>".into(),
            virtual_columns: Vec::new(),
            auto_page: true,
            max_rows: None,
        });
        let result = execute(&plan, ctx).await.unwrap();
        assert_eq!(result.count, 3);
    }

    #[tokio::test]
    async fn client_filter_drops_rows_not_matching_condition() {
        let ctx = ctx_with_pages(vec![RetrieveMultipleResponse {
            records: vec![row(10), row(200)],
            paging_cookie: None,
            more_records: false,
        }]);
        let scan = PlanNode::FetchXmlScan(FetchXmlScan {
            entity: "account".into(),
            fetch_xml: "<fetch/>".into(),
            virtual_columns: Vec::new(),
            auto_page: true,
            max_rows: None,
        });
        let plan = PlanNode::ClientFilter(ClientFilter {
            input: Box::new(scan),
            condition: Cond::new(
                0,
                CondKind::Comparison {
                    op: CompareOp::Gt,
                    left: Expr::column(0, ColumnRef::new("revenue")),
                    right: Expr::literal(0, Literal::Int(100)),
                },
            ),
        });
        let result = execute(&plan, ctx).await.unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.records[0].get("revenue"), Some(&fetchql_common::QueryValue::from_i64(200)));
    }

    #[tokio::test]
    async fn distinct_drops_duplicate_rows() {
        let ctx = ctx_with_pages(vec![RetrieveMultipleResponse {
            records: vec![row(5), row(5), row(6)],
            paging_cookie: None,
            more_records: false,
        }]);
        let scan = PlanNode::FetchXmlScan(FetchXmlScan {
            entity: "account".into(),
            fetch_xml: "<fetch/>".into(),
            virtual_columns: Vec::new(),
            auto_page: true,
            max_rows: None,
        });
        let plan = PlanNode::Distinct(Distinct { input: Box::new(scan) });
        let result = execute(&plan, ctx).await.unwrap();
        assert_eq!(result.count, 2);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_scan() {
        let ctx = ctx_with_pages(vec![RetrieveMultipleResponse {
            records: vec![row(1)],
            paging_cookie: None,
            more_records: false,
        }]);
        ctx.cancel.cancel();
        let plan = PlanNode::FetchXmlScan(FetchXmlScan {
            entity: "account".into(),
            fetch_xml: "<fetch/>".into(),
            virtual_columns: Vec::new(),
            auto_page: true,
            max_rows: None,
        });
        let err = execute(&plan, ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
