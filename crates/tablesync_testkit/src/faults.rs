//! Fault-injecting wrappers around the push collaborators.
//!
//! Each wrapper forwards to an inner implementation until a fault is
//! switched on, after which the affected call fails with
//! `StoreError::Unavailable`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tablesync_engine::{
    ErrorStore, ItemLockGuard, LocalStore, OperationQueue, QueueError, QueueResult, StoreError,
    StoreResult,
};
use tablesync_protocol::{Bookmark, Document, QueueEntry, TableOperationError};
use tokio_util::sync::CancellationToken;

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {what} failure"))
}

/// A local store whose reads and writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore<S> {
    inner: S,
    fail_lookup: AtomicBool,
    fail_upsert: AtomicBool,
}

impl<S> FlakyStore<S> {
    /// Wraps `inner` with every fault switched off.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_lookup: AtomicBool::new(false),
            fail_upsert: AtomicBool::new(false),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes lookups fail.
    pub fn fail_lookup(&self, fail: bool) {
        self.fail_lookup.store(fail, Ordering::SeqCst);
    }

    /// Makes upserts fail.
    pub fn fail_upsert(&self, fail: bool) {
        self.fail_upsert.store(fail, Ordering::SeqCst);
    }
}

impl<S: LocalStore> LocalStore for FlakyStore<S> {
    async fn lookup(&self, table_name: &str, id: &str) -> StoreResult<Option<Document>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(injected("lookup"));
        }
        self.inner.lookup(table_name, id).await
    }

    async fn upsert(&self, table_name: &str, document: Document) -> StoreResult<()> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(injected("upsert"));
        }
        self.inner.upsert(table_name, document).await
    }
}

/// An error store whose operations can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyErrorStore<E> {
    inner: E,
    fail_add: AtomicBool,
    fail_load: AtomicBool,
    fail_delete: AtomicBool,
}

impl<E> FlakyErrorStore<E> {
    /// Wraps `inner` with every fault switched off.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            fail_add: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Makes `add_error` fail.
    pub fn fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    /// Makes `load_errors` fail.
    pub fn fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    /// Makes `delete_errors` fail.
    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

impl<E: ErrorStore> ErrorStore for FlakyErrorStore<E> {
    async fn add_error(&self, error: &TableOperationError) -> StoreResult<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(injected("add"));
        }
        self.inner.add_error(error).await
    }

    async fn load_errors(&self) -> StoreResult<Vec<TableOperationError>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(injected("load"));
        }
        self.inner.load_errors().await
    }

    async fn delete_errors(&self, errors: &[TableOperationError]) -> StoreResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete_errors(errors).await
    }
}

/// An operation queue whose dequeues can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyQueue<Q> {
    inner: Q,
    fail_dequeue: AtomicBool,
}

impl<Q> FlakyQueue<Q> {
    /// Wraps `inner` with every fault switched off.
    pub fn new(inner: Q) -> Self {
        Self {
            inner,
            fail_dequeue: AtomicBool::new(false),
        }
    }

    /// The wrapped queue.
    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Makes `dequeue` fail.
    pub fn fail_dequeue(&self, fail: bool) {
        self.fail_dequeue.store(fail, Ordering::SeqCst);
    }
}

impl<Q: OperationQueue> OperationQueue for FlakyQueue<Q> {
    fn peek(&self) -> Option<QueueEntry> {
        self.inner.peek()
    }

    fn find(&self, sequence: u64) -> Option<QueueEntry> {
        self.inner.find(sequence)
    }

    async fn dequeue(&self, sequence: u64) -> QueueResult<bool> {
        if self.fail_dequeue.load(Ordering::SeqCst) {
            return Err(QueueError::Store(injected("dequeue")));
        }
        self.inner.dequeue(sequence).await
    }

    fn enqueue_bookmark(&self) -> impl Future<Output = QueueResult<Bookmark>> + Send {
        self.inner.enqueue_bookmark()
    }

    fn lock_item(
        &self,
        key: &str,
        token: &CancellationToken,
    ) -> impl Future<Output = QueueResult<ItemLockGuard>> + Send {
        self.inner.lock_item(key, token)
    }
}
