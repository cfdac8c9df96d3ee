//! Error types for the push engine.

use tablesync_protocol::{PushCompletionResult, PushStatus};
use thiserror::Error;

/// Result type for push operations.
pub type PushResult<T> = Result<T, PushError>;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Boxed error raised by application-provided sync handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the local store or the error store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O failure in the backing storage.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A document to store has no usable `id` property.
    #[error("document for table {0} has no id")]
    MissingId(String),
}

/// Errors raised by the operation queue.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The entry to dequeue is no longer at the head of the queue.
    #[error("queue head changed: expected sequence {expected}, found {found:?}")]
    ConcurrentModification {
        /// Sequence the caller expected at the head.
        expected: u64,
        /// Sequence actually at the head.
        found: Option<u64>,
    },

    /// Waiting for an item lock was cancelled.
    #[error("lock acquisition for {0} was cancelled")]
    LockCancelled(String),

    /// The queue's storage failed.
    #[error("queue storage error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of a single remote call, as reported by a sync handler.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The remote service could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The remote service rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The remote service refused the operation and explained why.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Error message.
        message: String,
        /// HTTP-like status code.
        status: Option<u16>,
        /// Response body.
        body: Option<String>,
    },

    /// Any other failure of the remote call.
    #[error("remote error: {0}")]
    Other(String),
}

impl RemoteError {
    /// Creates an invalid-operation error carrying a response.
    pub fn invalid_operation(status: u16, body: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: format!("remote service answered {status}"),
            status: Some(status),
            body: Some(body.into()),
        }
    }
}

/// Errors surfaced by a push run.
#[derive(Error, Debug)]
pub enum PushError {
    /// The local store failed while the batch was running.
    #[error("{message}: {source}")]
    SyncStore {
        /// What the engine was doing.
        message: &'static str,
        /// Underlying store error.
        source: StoreError,
    },

    /// The operation queue failed.
    #[error("operation queue error: {0}")]
    Queue(#[from] QueueError),

    /// The sync handler's completion callback failed.
    #[error("sync handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The push was cancelled before it started.
    #[error("push cancelled")]
    Cancelled,

    /// Several handler-level errors, in the order they were recorded.
    #[error("{} errors occurred during push", .0.len())]
    Aggregate(Vec<PushError>),

    /// The push run did not complete cleanly.
    #[error("push failed ({}) with {} unhandled errors", .result.status(), .result.errors().len())]
    PushFailed {
        /// Run outcome restricted to unhandled errors.
        result: PushCompletionResult,
        /// Handler-level errors collapsed into one cause.
        #[source]
        cause: Option<Box<PushError>>,
    },
}

impl PushError {
    /// Wraps a store error with context.
    pub fn sync_store(message: &'static str, source: StoreError) -> Self {
        Self::SyncStore { message, source }
    }

    /// Wraps a handler error.
    pub fn handler(error: impl Into<BoxError>) -> Self {
        Self::Handler(error.into())
    }

    /// Collapses recorded errors: none gives `None`, one is returned as is,
    /// more are wrapped in `Aggregate`.
    pub fn collapse(mut errors: Vec<PushError>) -> Option<PushError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(PushError::Aggregate(errors)),
        }
    }

    /// Returns the run outcome of a `PushFailed` error.
    pub fn push_result(&self) -> Option<&PushCompletionResult> {
        match self {
            PushError::PushFailed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Returns the batch status of a `PushFailed` error.
    pub fn push_status(&self) -> Option<PushStatus> {
        self.push_result().map(PushCompletionResult::status)
    }

    /// Returns the collapsed cause of a `PushFailed` error.
    pub fn cause(&self) -> Option<&PushError> {
        match self {
            PushError::PushFailed { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}
