//! The `RemoteClient` capability set the query core treats as an external
//! collaborator, plus the bounded connection pool it is acquired through.
//!
//! Nothing here talks to an actual remote store — transport, auth, and
//! retries are out of scope (see the crate's place in the workspace); this
//! crate only fixes the contract the executor programs against and a
//! pool that hands out scoped, guaranteed-release handles to it.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use fetchql_common::{CancellationToken, Error, QueryRow, Result};

/// The response to `RetrieveMultipleAsync`: a page of records plus the
/// paging cookie to resume from, if any remain.
#[derive(Debug, Clone, Default)]
pub struct RetrieveMultipleResponse {
    pub records: Vec<QueryRow>,
    pub paging_cookie: Option<String>,
    pub more_records: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlOperation {
    Insert,
    Update,
    Delete,
}

/// One record-level DML operation inside an `ExecuteBulkAsync` batch.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub operation: DmlOperation,
    pub entity: String,
    /// The target record's id; required for `Update`/`Delete`, absent for `Insert`.
    pub id: Option<String>,
    pub fields: indexmap::IndexMap<String, fetchql_common::QueryValue>,
}

/// Per-record outcome inside a bulk batch: a single failed record does not
/// abort the rest of the operation (see the propagation policy this
/// mirrors in the executor's `DmlExecuteNode`).
#[derive(Debug, Clone)]
pub struct BulkRecordResult {
    pub index: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub succeeded: u64,
    pub failed: u64,
    pub details: Vec<BulkRecordResult>,
}

pub struct PassthroughRequest {
    pub sql: String,
}

#[derive(Debug, Clone, Default)]
pub struct PassthroughResponse {
    pub rows: Vec<QueryRow>,
}

/// Reports `(completed, total)` progress during a bulk operation.
pub type ProgressSink = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// The three primitive operations `FetchXmlScan`/`CountOptimized`/
/// `DmlExecute`/`TdsScan` drive, plus the passthrough escape hatch.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn retrieve_multiple(
        &self,
        fetch_xml: &str,
        paging_cookie: Option<&str>,
        page_size: Option<u32>,
    ) -> Result<RetrieveMultipleResponse>;

    async fn get_total_record_count(&self, entity_names: &[String]) -> Result<HashMap<String, i64>>;

    async fn execute_bulk(
        &self,
        requests: Vec<BulkRequest>,
        batch_size: usize,
        progress: Option<ProgressSink>,
    ) -> Result<BulkResult>;

    async fn execute(&self, request: PassthroughRequest) -> Result<PassthroughResponse>;
}

/// A scoped handle to a pooled [`RemoteClient`]. Releases its pool slot on
/// every exit path, including a cancelled or panicking caller, because the
/// release lives in `OwnedSemaphorePermit`'s own `Drop`.
pub struct PooledClient {
    client: Arc<dyn RemoteClient>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledClient {
    type Target = dyn RemoteClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

/// `GetClientAsync(name?, tag?, cancel) -> PooledClient`.
#[async_trait]
pub trait ClientPool: Send + Sync {
    async fn get_client(
        &self,
        name: Option<&str>,
        tag: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<PooledClient>;
}

/// A pool backed by a single shared [`RemoteClient`] and a counting
/// semaphore: `poolCapacity` concurrent checkouts, beyond which callers
/// wait (or are cancelled). This is the hard upper bound on
/// `ParallelPartitionNode`'s `maxParallelism` (see §5).
pub struct BoundedClientPool {
    client: Arc<dyn RemoteClient>,
    semaphore: Arc<Semaphore>,
}

impl BoundedClientPool {
    pub fn new(client: Arc<dyn RemoteClient>, capacity: usize) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl ClientPool for BoundedClientPool {
    async fn get_client(
        &self,
        _name: Option<&str>,
        _tag: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<PooledClient> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = self.semaphore.clone().acquire_owned() => {
                res.map_err(|_| Error::execution_failed("connection pool closed"))?
            }
        };
        Ok(PooledClient {
            client: self.client.clone(),
            _permit: permit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClient {
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
            Ok(RetrieveMultipleResponse::default())
        }

        async fn get_total_record_count(&self, _entity_names: &[String]) -> Result<HashMap<String, i64>> {
            Ok(HashMap::new())
        }

        async fn execute_bulk(
            &self,
            _requests: Vec<BulkRequest>,
            _batch_size: usize,
            _progress: Option<ProgressSink>,
        ) -> Result<BulkResult> {
            Ok(BulkResult::default())
        }

        async fn execute(&self, _request: PassthroughRequest) -> Result<PassthroughResponse> {
            Ok(PassthroughResponse::default())
        }
    }

    #[tokio::test]
    async fn checkout_releases_slot_on_drop() {
        let pool = BoundedClientPool::new(Arc::new(StubClient { calls: AtomicUsize::new(0) }), 1);
        let cancel = CancellationToken::new();
        let first = pool.get_client(None, None, cancel.clone()).await.unwrap();
        assert_eq!(pool.capacity(), 0);
        drop(first);
        let second = pool.get_client(None, None, cancel).await.unwrap();
        assert_eq!(pool.capacity(), 0);
        drop(second);
        assert_eq!(pool.capacity(), 1);
    }

    #[tokio::test]
    async fn cancelled_checkout_returns_cancelled_error() {
        let pool = BoundedClientPool::new(Arc::new(StubClient { calls: AtomicUsize::new(0) }), 1);
        let held = pool.get_client(None, None, CancellationToken::new()).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pool.get_client(None, None, cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        drop(held);
    }

    #[tokio::test]
    async fn pooled_client_derefs_to_remote_client() {
        let pool = BoundedClientPool::new(Arc::new(StubClient { calls: AtomicUsize::new(0) }), 1);
        let client = pool.get_client(None, None, CancellationToken::new()).await.unwrap();
        client.retrieve_multiple("<fetch/>", None, None).await.unwrap();
    }
}
