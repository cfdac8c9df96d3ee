//! Test fixtures: document builders and a wired push harness.

use crate::faults::{FlakyErrorStore, FlakyQueue, FlakyStore};
use serde_json::Value;
use std::sync::Arc;
use tablesync_engine::{
    MemoryErrorStore, MemoryLocalStore, MemoryOperationQueue, MockSyncHandler, PushConfig,
    PushContext, PushReport, PushResult,
};
use tablesync_protocol::{Document, Operation};
use tokio_util::sync::CancellationToken;

/// Table used by the fixture builders.
pub const TODO_TABLE: &str = "todo";

/// Converts a JSON object literal into a document.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A todo item document.
pub fn todo_item(id: &str, text: &str) -> Document {
    doc(serde_json::json!({ "id": id, "text": text }))
}

/// An insert of a todo item with its payload attached.
pub fn insert_todo(id: &str, text: &str) -> Operation {
    Operation::insert(TODO_TABLE, id).with_item(todo_item(id, text))
}

/// An update of a todo item with its payload attached.
pub fn update_todo(id: &str, text: &str) -> Operation {
    Operation::update(TODO_TABLE, id).with_item(todo_item(id, text))
}

/// A delete of a todo item.
pub fn delete_todo(id: &str) -> Operation {
    Operation::delete(TODO_TABLE, id)
}

/// The queue used by [`Harness`].
pub type HarnessQueue = FlakyQueue<MemoryOperationQueue>;
/// The local store used by [`Harness`].
pub type HarnessStore = FlakyStore<MemoryLocalStore>;
/// The error store used by [`Harness`].
pub type HarnessErrorStore = FlakyErrorStore<MemoryErrorStore>;

/// A push context over in-memory collaborators with fault injection.
pub struct Harness {
    context: PushContext<HarnessQueue, HarnessStore, HarnessErrorStore, MockSyncHandler>,
}

impl Harness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PushConfig::default())
    }

    /// Creates a harness with the given configuration.
    pub fn with_config(config: PushConfig) -> Self {
        let context = PushContext::new(
            Arc::new(FlakyQueue::new(MemoryOperationQueue::new())),
            Arc::new(FlakyStore::new(MemoryLocalStore::new())),
            Arc::new(FlakyErrorStore::new(MemoryErrorStore::new())),
            Arc::new(MockSyncHandler::new()),
        )
        .with_config(config);
        Self { context }
    }

    /// The underlying push context.
    pub fn context(
        &self,
    ) -> &PushContext<HarnessQueue, HarnessStore, HarnessErrorStore, MockSyncHandler> {
        &self.context
    }

    /// The fault-injecting queue wrapper.
    pub fn flaky_queue(&self) -> &HarnessQueue {
        self.context.queue()
    }

    /// The in-memory queue.
    pub fn queue(&self) -> &MemoryOperationQueue {
        self.context.queue().inner()
    }

    /// The fault-injecting local store wrapper.
    pub fn flaky_store(&self) -> &HarnessStore {
        self.context.store()
    }

    /// The in-memory local store.
    pub fn store(&self) -> &MemoryLocalStore {
        self.context.store().inner()
    }

    /// The fault-injecting error store wrapper.
    pub fn flaky_errors(&self) -> &HarnessErrorStore {
        self.context.error_store()
    }

    /// The in-memory error store.
    pub fn errors(&self) -> &MemoryErrorStore {
        self.context.error_store().inner()
    }

    /// The scripted sync handler.
    pub fn handler(&self) -> &MockSyncHandler {
        self.context.handler()
    }

    /// Enqueues an operation, returning its sequence.
    pub fn enqueue(&self, operation: Operation) -> u64 {
        self.queue().enqueue(operation)
    }

    /// Runs a push with a fresh token.
    pub async fn push(&self) -> PushResult<()> {
        self.context.push(CancellationToken::new()).await
    }

    /// Runs a push with the given token.
    pub async fn push_with(&self, token: CancellationToken) -> PushResult<()> {
        self.context.push(token).await
    }

    /// Runs a push with a fresh token, returning the per-run report.
    pub async fn push_report(&self) -> PushResult<PushReport> {
        self.context
            .push_with_report(CancellationToken::new())
            .await
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
