//! Long-lived push entry point shared by the application.

use crate::batch::OperationCounts;
use crate::config::PushConfig;
use crate::error::{PushError, PushResult};
use crate::handler::SyncHandler;
use crate::push::{PushAction, PushReport};
use crate::queue::OperationQueue;
use crate::store::{ErrorStore, LocalStore};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tablesync_protocol::PushStatus;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cumulative push statistics.
#[derive(Debug, Clone, Default)]
pub struct PushStats {
    /// Push runs finished.
    pub runs: u64,
    /// Operations sent to the remote service.
    pub operations_executed: u64,
    /// Operations the remote service accepted.
    pub operations_succeeded: u64,
    /// Structured errors recorded.
    pub conflicts_recorded: u64,
    /// Superseded operations dropped.
    pub operations_skipped: u64,
    /// Status of the most recent run.
    pub last_status: Option<PushStatus>,
    /// When the most recent run finished.
    pub last_push_time: Option<Instant>,
    /// Error message of the most recent run, if it failed.
    pub last_error: Option<String>,
}

impl PushStats {
    fn record(&mut self, status: PushStatus, counts: OperationCounts, error: Option<String>) {
        self.runs += 1;
        self.operations_executed += counts.executed;
        self.operations_succeeded += counts.succeeded;
        self.conflicts_recorded += counts.conflicts;
        self.operations_skipped += counts.skipped;
        self.last_status = Some(status);
        self.last_push_time = Some(Instant::now());
        self.last_error = error;
    }
}

/// Owns the push collaborators and runs pushes one at a time.
pub struct PushContext<Q, S, E, H> {
    queue: Arc<Q>,
    store: Arc<S>,
    error_store: Arc<E>,
    handler: Arc<H>,
    config: PushConfig,
    gate: Mutex<()>,
    stats: RwLock<PushStats>,
}

impl<Q, S, E, H> PushContext<Q, S, E, H>
where
    Q: OperationQueue,
    S: LocalStore,
    E: ErrorStore,
    H: SyncHandler,
{
    /// Creates a context with the default configuration.
    pub fn new(queue: Arc<Q>, store: Arc<S>, error_store: Arc<E>, handler: Arc<H>) -> Self {
        Self {
            queue,
            store,
            error_store,
            handler,
            config: PushConfig::default(),
            gate: Mutex::new(()),
            stats: RwLock::new(PushStats::default()),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: PushConfig) -> Self {
        self.config = config;
        self
    }

    /// The operation queue.
    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    /// The local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The error store.
    pub fn error_store(&self) -> &Arc<E> {
        &self.error_store
    }

    /// The sync handler.
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// The configuration.
    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> PushStats {
        self.stats.read().clone()
    }

    /// Pushes every operation queued before this call.
    ///
    /// Operations enqueued after the run's bookmark belong to a later push.
    /// Fails with `PushError::Cancelled` only if the token was already
    /// cancelled on entry; cancellation during the run is reported through
    /// `PushError::PushFailed`.
    pub async fn push(&self, token: CancellationToken) -> PushResult<()> {
        self.push_with_report(token).await?.into_result()
    }

    /// Like [`push`](Self::push), returning the per-run report.
    pub async fn push_with_report(&self, token: CancellationToken) -> PushResult<PushReport> {
        if token.is_cancelled() {
            return Err(PushError::Cancelled);
        }

        let bookmark = self.queue.enqueue_bookmark().await?;
        let _gate = self.gate.lock().await;
        debug!(bookmark = bookmark.sequence, "push gate acquired");

        let report = PushAction::new(
            self.queue.as_ref(),
            self.store.as_ref(),
            self.error_store.as_ref(),
            self.handler.as_ref(),
            token,
            bookmark,
        )
        .with_config(self.config.clone())
        .execute()
        .await;

        let error = report.result.as_ref().err().map(ToString::to_string);
        self.stats
            .write()
            .record(report.status, report.counts, error);
        Ok(report)
    }
}
