//! Sync handler abstraction: the only network-facing collaborator.

use crate::error::{BoxError, RemoteError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tablesync_protocol::{Operation, OperationKind, PushCompletionResult};

/// Executes operations against the remote service and receives the outcome
/// of each push run.
pub trait SyncHandler: Send + Sync {
    /// Executes one operation remotely, returning the remote result.
    fn execute_table_operation(
        &self,
        operation: &Operation,
    ) -> impl Future<Output = Result<Option<Value>, RemoteError>> + Send;

    /// Called once per push run, after every operation has been processed.
    ///
    /// Errors the application resolves should be marked handled here.
    fn on_push_complete(
        &self,
        result: &mut PushCompletionResult,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

type ExecuteHook = Box<dyn Fn(&Operation) + Send + Sync>;

/// A scriptable sync handler for testing.
///
/// Without a script, inserts and updates echo the operation's item back as
/// the remote result and deletes return nothing.
#[derive(Default)]
pub struct MockSyncHandler {
    responses: Mutex<HashMap<(String, String), VecDeque<Result<Option<Value>, RemoteError>>>>,
    hook: Mutex<Option<ExecuteHook>>,
    executed: Mutex<Vec<Operation>>,
    completions: Mutex<Vec<PushCompletionResult>>,
    completion_error: Mutex<Option<String>>,
    handle_errors: AtomicBool,
}

impl MockSyncHandler {
    /// Creates a handler with no script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the response for the next execution of `table/item`.
    pub fn respond(
        &self,
        table_name: &str,
        item_id: &str,
        response: Result<Option<Value>, RemoteError>,
    ) {
        self.responses
            .lock()
            .entry((table_name.to_string(), item_id.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Runs `hook` at the start of every execution.
    pub fn on_execute(&self, hook: impl Fn(&Operation) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Makes the completion callback fail with `message`.
    pub fn fail_completion(&self, message: impl Into<String>) {
        *self.completion_error.lock() = Some(message.into());
    }

    /// Makes the completion callback mark every error handled.
    pub fn handle_all_errors(&self, handle: bool) {
        self.handle_errors.store(handle, Ordering::SeqCst);
    }

    /// Operations executed so far, in order.
    pub fn executed(&self) -> Vec<Operation> {
        self.executed.lock().clone()
    }

    /// Results passed to the completion callback so far, as received.
    pub fn completions(&self) -> Vec<PushCompletionResult> {
        self.completions.lock().clone()
    }
}

impl std::fmt::Debug for MockSyncHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSyncHandler")
            .field("executed", &self.executed.lock().len())
            .field("completions", &self.completions.lock().len())
            .finish_non_exhaustive()
    }
}

impl SyncHandler for MockSyncHandler {
    async fn execute_table_operation(
        &self,
        operation: &Operation,
    ) -> Result<Option<Value>, RemoteError> {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(operation);
        }
        self.executed.lock().push(operation.clone());

        let key = (operation.table_name.clone(), operation.item_id.clone());
        let scripted = self
            .responses
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => response,
            None if operation.kind == OperationKind::Delete => Ok(None),
            None => Ok(operation.item.clone().map(Value::Object)),
        }
    }

    async fn on_push_complete(&self, result: &mut PushCompletionResult) -> Result<(), BoxError> {
        self.completions.lock().push(result.clone());

        if self.handle_errors.load(Ordering::SeqCst) {
            for error in result.errors_mut() {
                error.handle();
            }
        }

        match self.completion_error.lock().clone() {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }
}
