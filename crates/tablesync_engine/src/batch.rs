//! Per-run push state.

use crate::error::{PushError, StoreResult};
use crate::handler::SyncHandler;
use crate::store::{ErrorStore, LocalStore};
use tablesync_protocol::{PushStatus, TableOperationError};
use tracing::{debug, warn};

/// Counters for one push run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    /// Operations sent to the remote service.
    pub executed: u64,
    /// Operations the remote service accepted.
    pub succeeded: u64,
    /// Operations that produced a structured error.
    pub conflicts: u64,
    /// Superseded operations dropped without execution.
    pub skipped: u64,
}

/// State of a single push run.
///
/// Owned by the push action and handed by exclusive reference to every
/// execution step. Once aborted, the first reason sticks.
pub struct OperationBatch<'a, S, E, H> {
    store: &'a S,
    error_store: &'a E,
    handler: &'a H,
    status: Option<PushStatus>,
    handler_errors: Vec<PushError>,
    counts: OperationCounts,
}

impl<'a, S, E, H> OperationBatch<'a, S, E, H>
where
    S: LocalStore,
    E: ErrorStore,
    H: SyncHandler,
{
    /// Creates a fresh batch.
    pub fn new(store: &'a S, error_store: &'a E, handler: &'a H) -> Self {
        Self {
            store,
            error_store,
            handler,
            status: None,
            handler_errors: Vec::new(),
            counts: OperationCounts::default(),
        }
    }

    /// The local store.
    pub fn store(&self) -> &'a S {
        self.store
    }

    /// The sync handler.
    pub fn handler(&self) -> &'a H {
        self.handler
    }

    /// Aborts the batch. Only the first call's status is kept.
    pub fn abort(&mut self, status: PushStatus) {
        match self.status {
            None => {
                warn!(%status, "push batch aborted");
                self.status = Some(status);
            }
            Some(current) => {
                debug!(%current, ignored = %status, "push batch already aborted");
            }
        }
    }

    /// Returns true once the batch has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.status.is_some()
    }

    /// The abort reason, if aborted.
    pub fn abort_status(&self) -> Option<PushStatus> {
        self.status
    }

    /// The abort reason, or `Complete`.
    pub fn status(&self) -> PushStatus {
        self.status.unwrap_or(PushStatus::Complete)
    }

    /// Records a handler-level error.
    pub fn add_handler_error(&mut self, error: PushError) {
        warn!(%error, "push handler error recorded");
        self.handler_errors.push(error);
    }

    /// Handler-level errors recorded so far, in order.
    pub fn handler_errors(&self) -> &[PushError] {
        &self.handler_errors
    }

    /// Takes the recorded handler-level errors.
    pub fn take_handler_errors(&mut self) -> Vec<PushError> {
        std::mem::take(&mut self.handler_errors)
    }

    /// Returns true if any error is unhandled or a handler-level error was recorded.
    pub fn has_errors(&self, errors: &[TableOperationError]) -> bool {
        !self.handler_errors.is_empty() || errors.iter().any(|e| !e.handled)
    }

    /// Persists a structured error.
    pub async fn add_sync_error(&mut self, error: &TableOperationError) -> StoreResult<()> {
        self.error_store.add_error(error).await?;
        self.counts.conflicts += 1;
        Ok(())
    }

    /// Loads the persisted structured errors.
    pub async fn load_sync_errors(&self) -> StoreResult<Vec<TableOperationError>> {
        self.error_store.load_errors().await
    }

    /// Deletes structured errors that have been shown to the handler.
    pub async fn delete_errors(&self, errors: &[TableOperationError]) -> StoreResult<()> {
        if errors.is_empty() {
            return Ok(());
        }
        self.error_store.delete_errors(errors).await
    }

    /// Counters for this run.
    pub fn counts(&self) -> OperationCounts {
        self.counts
    }

    pub(crate) fn counts_mut(&mut self) -> &mut OperationCounts {
        &mut self.counts
    }
}
