//! Operation queue abstraction and an in-memory implementation.

use crate::error::{QueueError, QueueResult};
use crate::lock::{ItemLockGuard, ItemLocks};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tablesync_protocol::{Bookmark, Operation, QueueEntry};
use tokio_util::sync::CancellationToken;

/// The durable, ordered queue of pending operations.
///
/// Implementations guarantee that `dequeue` is atomic with respect to
/// `peek`. The push engine only ever removes the head.
pub trait OperationQueue: Send + Sync {
    /// Returns a copy of the head entry, or `None` if the queue is empty.
    fn peek(&self) -> Option<QueueEntry>;

    /// Returns a copy of the entry with the given sequence, if still queued.
    fn find(&self, sequence: u64) -> Option<QueueEntry>;

    /// Removes the head entry, which must have the given sequence.
    ///
    /// Returns `Ok(false)` if the entry is no longer queued at all, and
    /// `QueueError::ConcurrentModification` if it is queued but not at the head.
    fn dequeue(&self, sequence: u64) -> impl Future<Output = QueueResult<bool>> + Send;

    /// Appends a new bookmark at the tail and returns it.
    fn enqueue_bookmark(&self) -> impl Future<Output = QueueResult<Bookmark>> + Send;

    /// Takes the exclusive lock of an item, giving up when `token` fires.
    fn lock_item(
        &self,
        key: &str,
        token: &CancellationToken,
    ) -> impl Future<Output = QueueResult<ItemLockGuard>> + Send;
}

/// An in-memory operation queue.
#[derive(Debug)]
pub struct MemoryOperationQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    next_sequence: AtomicU64,
    locks: ItemLocks,
}

impl MemoryOperationQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            next_sequence: AtomicU64::new(1),
            locks: ItemLocks::new(),
        }
    }

    /// Appends an operation, returning its assigned sequence.
    pub fn enqueue(&self, mut operation: Operation) -> u64 {
        let mut entries = self.entries.lock();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        operation.sequence = sequence;
        entries.push_back(QueueEntry::Mutation(operation));
        sequence
    }

    /// Appends a bookmark, returning it with its assigned sequence.
    pub fn push_bookmark(&self) -> Bookmark {
        let mut entries = self.entries.lock();
        let mut bookmark = Bookmark::new();
        bookmark.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        entries.push_back(QueueEntry::Bookmark(bookmark.clone()));
        bookmark
    }

    /// Marks every queued operation on the item as superseded.
    ///
    /// Returns how many operations were marked.
    pub fn cancel_item(&self, table_name: &str, item_id: &str) -> usize {
        let mut marked = 0;
        for entry in self.entries.lock().iter_mut() {
            if let QueueEntry::Mutation(op) = entry {
                if op.table_name == table_name && op.item_id == item_id && !op.cancelled {
                    op.cancelled = true;
                    marked += 1;
                }
            }
        }
        marked
    }

    /// Removes an operation wherever it sits in the queue.
    pub fn remove(&self, sequence: u64) -> Option<QueueEntry> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|e| e.sequence() == sequence)?;
        entries.remove(index)
    }

    /// Returns a snapshot of all entries in order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Returns the queued mutations in order.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| e.as_mutation().cloned())
            .collect()
    }

    /// Total number of entries, bookmarks included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// The item lock registry shared with pull.
    pub fn locks(&self) -> &ItemLocks {
        &self.locks
    }
}

impl Default for MemoryOperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueue for MemoryOperationQueue {
    fn peek(&self) -> Option<QueueEntry> {
        self.entries.lock().front().cloned()
    }

    fn find(&self, sequence: u64) -> Option<QueueEntry> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.sequence() == sequence)
            .cloned()
    }

    async fn dequeue(&self, sequence: u64) -> QueueResult<bool> {
        let mut entries = self.entries.lock();
        match entries.front().map(QueueEntry::sequence) {
            Some(head) if head == sequence => {
                entries.pop_front();
                Ok(true)
            }
            head => {
                if entries.iter().any(|e| e.sequence() == sequence) {
                    Err(QueueError::ConcurrentModification {
                        expected: sequence,
                        found: head,
                    })
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn enqueue_bookmark(&self) -> QueueResult<Bookmark> {
        Ok(self.push_bookmark())
    }

    async fn lock_item(&self, key: &str, token: &CancellationToken) -> QueueResult<ItemLockGuard> {
        self.locks.lock(key, token).await
    }
}
