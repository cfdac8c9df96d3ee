//! The push action: drains the queue up to a bookmark.

use crate::batch::{OperationBatch, OperationCounts};
use crate::config::PushConfig;
use crate::error::{PushError, PushResult};
use crate::executor::{execute_operation, ExecutionOutcome};
use crate::handler::SyncHandler;
use crate::queue::OperationQueue;
use crate::store::{ErrorStore, LocalStore};
use tablesync_protocol::{Bookmark, PushCompletionResult, PushStatus, QueueEntry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one push run.
#[derive(Debug)]
pub struct PushReport {
    /// Final batch status.
    pub status: PushStatus,
    /// Per-run counters.
    pub counts: OperationCounts,
    /// What the caller sees.
    pub result: PushResult<()>,
}

impl PushReport {
    /// Discards the counters, returning the caller-facing result.
    pub fn into_result(self) -> PushResult<()> {
        self.result
    }
}

/// Executes queued operations until the run's bookmark is reached.
///
/// # Invariants
///
/// - Operations run strictly in queue order, one at a time
/// - An operation is dequeued only after it reached a terminal state
/// - An operation that stopped the batch stays at the head of the queue
/// - The bookmark is dequeued whenever it is reached, never executed
pub struct PushAction<'a, Q, S, E, H> {
    queue: &'a Q,
    store: &'a S,
    error_store: &'a E,
    handler: &'a H,
    config: PushConfig,
    token: CancellationToken,
    bookmark: Bookmark,
}

impl<'a, Q, S, E, H> PushAction<'a, Q, S, E, H>
where
    Q: OperationQueue,
    S: LocalStore,
    E: ErrorStore,
    H: SyncHandler,
{
    /// Creates a push action bound to `bookmark`, which must already be queued.
    pub fn new(
        queue: &'a Q,
        store: &'a S,
        error_store: &'a E,
        handler: &'a H,
        token: CancellationToken,
        bookmark: Bookmark,
    ) -> Self {
        Self {
            queue,
            store,
            error_store,
            handler,
            config: PushConfig::default(),
            token,
            bookmark,
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: PushConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the push.
    pub async fn execute(self) -> PushReport {
        let mut batch = OperationBatch::new(self.store, self.error_store, self.handler);
        info!(bookmark = self.bookmark.sequence, "push started");

        let reached_bookmark = self.drain(&mut batch).await;
        if reached_bookmark {
            debug!(sequence = self.bookmark.sequence, "consuming bookmark");
            if let Err(e) = self.queue.dequeue(self.bookmark.sequence).await {
                batch.add_handler_error(e.into());
            }
        }

        let status = batch.status();
        let errors = match batch.load_sync_errors().await {
            Ok(errors) => errors,
            Err(e) => {
                batch.add_handler_error(PushError::sync_store("failed to load sync errors", e));
                Vec::new()
            }
        };

        let mut result = PushCompletionResult::new(errors, status);
        if let Err(e) = self.handler.on_push_complete(&mut result).await {
            batch.add_handler_error(PushError::Handler(e));
        }

        // The callback has seen these errors, whether or not it succeeded.
        if let Err(e) = batch.delete_errors(result.errors()).await {
            batch.add_handler_error(PushError::sync_store("failed to delete sync errors", e));
        }

        let counts = batch.counts();
        info!(
            %status,
            errors = result.errors().len(),
            executed = counts.executed,
            succeeded = counts.succeeded,
            conflicts = counts.conflicts,
            "push finished"
        );

        let outcome = if batch.is_aborted() || batch.has_errors(result.errors()) {
            let cause = PushError::collapse(batch.take_handler_errors()).map(Box::new);
            Err(PushError::PushFailed {
                result: result.unhandled(),
                cause,
            })
        } else {
            Ok(())
        };

        PushReport {
            status,
            counts,
            result: outcome,
        }
    }

    /// Executes operations until the bookmark, an empty queue, or an abort.
    ///
    /// Returns true if the loop stopped on this run's bookmark.
    async fn drain(&self, batch: &mut OperationBatch<'a, S, E, H>) -> bool {
        while let Some(entry) = self.queue.peek() {
            if entry.is_bookmark(&self.bookmark) {
                return true;
            }
            let sequence = entry.sequence();
            match entry {
                QueueEntry::Bookmark(_) => {
                    // Left behind by an earlier run that never reached it.
                    debug!(sequence, "consuming stale bookmark");
                }
                QueueEntry::Mutation(operation) => {
                    // Cancellation is checked inside, never during the remote call.
                    let outcome = execute_operation(
                        self.queue,
                        &self.config,
                        operation,
                        batch,
                        &self.token,
                    )
                    .await;
                    match outcome {
                        ExecutionOutcome::Completed => {}
                        ExecutionOutcome::Retained => {
                            batch.abort(PushStatus::CancelledByToken);
                            return false;
                        }
                        ExecutionOutcome::Abort { status, error } => {
                            if let Some(error) = error {
                                batch.add_handler_error(error);
                            }
                            batch.abort(status);
                            return false;
                        }
                    }
                }
            }

            match self.queue.dequeue(sequence).await {
                Ok(true) => {}
                Ok(false) => debug!(sequence, "entry already removed from queue"),
                Err(e) => {
                    warn!(sequence, error = %e, "failed to dequeue entry");
                    batch.add_handler_error(e.into());
                    batch.abort(PushStatus::CancelledBySyncStoreError);
                    return false;
                }
            }
            if self.token.is_cancelled() {
                batch.abort(PushStatus::CancelledByToken);
                return false;
            }
        }
        false
    }
}
