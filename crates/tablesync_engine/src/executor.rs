//! Execution of a single queued operation.

use crate::batch::OperationBatch;
use crate::config::PushConfig;
use crate::error::{PushError, QueueError, RemoteError, StoreError, StoreResult};
use crate::handler::SyncHandler;
use crate::queue::OperationQueue;
use crate::store::{ErrorStore, LocalStore};
use serde_json::Value;
use tablesync_protocol::{
    strip_system_properties, Operation, PushStatus, QueueEntry, TableOperationError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What happened to one queued operation.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The operation reached a terminal state (accepted, conflict recorded,
    /// or superseded) and can be dequeued.
    Completed,
    /// Nothing was done; the operation stays queued for the next push.
    Retained,
    /// A systemic failure; the batch stops and the operation stays queued.
    Abort {
        /// Batch status to record.
        status: PushStatus,
        /// Handler-level error to record alongside, if any.
        error: Option<PushError>,
    },
}

impl ExecutionOutcome {
    fn store_failure(message: &'static str, source: StoreError) -> Self {
        Self::Abort {
            status: PushStatus::CancelledBySyncStoreError,
            error: Some(PushError::sync_store(message, source)),
        }
    }
}

/// How a failed remote call affects the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// Stop the batch and retry the operation on the next push.
    Abort(PushStatus),
    /// Record a structured error for this operation and carry on.
    Conflict {
        /// Response status code.
        status: Option<u16>,
        /// Response body.
        body: Option<String>,
    },
}

/// Classifies a remote failure.
///
/// Network and authentication failures are systemic; everything else is a
/// conflict of this one operation.
pub fn classify(error: &RemoteError) -> RemoteFailure {
    match error {
        RemoteError::Network(_) => RemoteFailure::Abort(PushStatus::CancelledByNetworkError),
        RemoteError::Authentication(_) => {
            RemoteFailure::Abort(PushStatus::CancelledByAuthenticationError)
        }
        RemoteError::InvalidOperation { status, body, .. } => RemoteFailure::Conflict {
            status: *status,
            body: body.clone(),
        },
        RemoteError::Other(_) => RemoteFailure::Conflict {
            status: None,
            body: None,
        },
    }
}

/// Executes `operation` under its item lock.
///
/// Cancellation is checked after the lock is taken and again after the
/// payload is loaded. The lock is released on every return path.
pub async fn execute_operation<Q, S, E, H>(
    queue: &Q,
    config: &PushConfig,
    mut operation: Operation,
    batch: &mut OperationBatch<'_, S, E, H>,
    token: &CancellationToken,
) -> ExecutionOutcome
where
    Q: OperationQueue,
    S: LocalStore,
    E: ErrorStore,
    H: SyncHandler,
{
    let _guard = match queue.lock_item(&operation.lock_key(), token).await {
        Ok(guard) => guard,
        Err(QueueError::LockCancelled(_)) => return ExecutionOutcome::Retained,
        Err(e) => {
            return ExecutionOutcome::Abort {
                status: PushStatus::CancelledBySyncStoreError,
                error: Some(e.into()),
            }
        }
    };

    if token.is_cancelled() {
        return ExecutionOutcome::Retained;
    }

    if is_superseded(queue, &operation) {
        debug!(
            table = %operation.table_name,
            item = %operation.item_id,
            sequence = operation.sequence,
            "skipping superseded operation"
        );
        batch.counts_mut().skipped += 1;
        return ExecutionOutcome::Completed;
    }

    if operation.item.is_none() {
        match batch
            .store()
            .lookup(&operation.table_name, &operation.item_id)
            .await
        {
            Ok(item) => operation.item = item,
            Err(e) => {
                return ExecutionOutcome::store_failure("failed to read item from local store", e)
            }
        }
    }

    if token.is_cancelled() {
        return ExecutionOutcome::Retained;
    }

    debug!(
        table = %operation.table_name,
        item = %operation.item_id,
        sequence = operation.sequence,
        kind = %operation.kind,
        "executing operation"
    );
    batch.counts_mut().executed += 1;

    match batch.handler().execute_table_operation(&operation).await {
        Ok(result) => {
            operation.result = result;
            if let Err(e) = write_result(config, &operation, batch).await {
                return ExecutionOutcome::store_failure("failed to upsert item into local store", e);
            }
            batch.counts_mut().succeeded += 1;
            ExecutionOutcome::Completed
        }
        Err(error) => match classify(&error) {
            RemoteFailure::Abort(status) => {
                debug!(
                    %error,
                    %status,
                    item = %operation.item_id,
                    "remote failure stops the batch"
                );
                ExecutionOutcome::Abort {
                    status,
                    error: None,
                }
            }
            RemoteFailure::Conflict { status, body } => {
                info!(
                    %error,
                    table = %operation.table_name,
                    item = %operation.item_id,
                    status = ?status,
                    "recording sync error"
                );
                let record = TableOperationError::from_operation(&operation, status, body);
                match batch.add_sync_error(&record).await {
                    Ok(()) => ExecutionOutcome::Completed,
                    Err(e) => ExecutionOutcome::store_failure("failed to save sync error", e),
                }
            }
        },
    }
}

/// Returns true if the operation was superseded or has left the queue.
fn is_superseded<Q: OperationQueue>(queue: &Q, operation: &Operation) -> bool {
    if operation.cancelled {
        return true;
    }
    match queue.find(operation.sequence) {
        Some(QueueEntry::Mutation(current)) => current.cancelled,
        _ => true,
    }
}

/// Writes the remote result back to the local store if the operation asks for it.
async fn write_result<S, E, H>(
    config: &PushConfig,
    operation: &Operation,
    batch: &OperationBatch<'_, S, E, H>,
) -> StoreResult<()>
where
    S: LocalStore,
    E: ErrorStore,
    H: SyncHandler,
{
    if !config.write_results || !operation.write_result_to_store {
        return Ok(());
    }
    // Only documents can be upserted.
    let Some(Value::Object(document)) = &operation.result else {
        return Ok(());
    };
    let document = strip_system_properties(
        document.clone(),
        &config.system_property_prefix,
        &config.version_property,
    );
    batch.store().upsert(&operation.table_name, document).await
}
