//! # Tablesync Engine
//!
//! Push half of an offline-first table sync engine.
//!
//! Local mutations are recorded in a durable operation queue. A push run
//! replays them, in order, against a remote service through a
//! [`SyncHandler`], writes the remote results back into the [`LocalStore`],
//! and records per-item conflicts in an [`ErrorStore`] for the application
//! to resolve.
//!
//! ## Architecture
//!
//! - [`PushContext`] enqueues a bookmark and runs one [`PushAction`] at a time
//! - [`PushAction`] drains the queue up to its bookmark
//! - [`execute_operation`] runs a single operation under the item's lock and
//!   turns the remote outcome into an [`ExecutionOutcome`]
//! - [`OperationBatch`] holds the run's abort reason and recorded errors
//!
//! ## Key Invariants
//!
//! - Operations execute strictly in queue order, one at a time
//! - An operation leaves the queue only after reaching a terminal state
//! - Network, authentication and local-store failures stop the run and keep
//!   the failing operation queued
//! - Application-level rejections are recorded and the run continues
//! - The first abort reason wins

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod context;
mod error;
mod executor;
mod handler;
mod lock;
mod push;
mod queue;
mod store;

pub use batch::{OperationBatch, OperationCounts};
pub use config::PushConfig;
pub use context::{PushContext, PushStats};
pub use error::{
    BoxError, PushError, PushResult, QueueError, QueueResult, RemoteError, StoreError,
    StoreResult,
};
pub use executor::{classify, execute_operation, ExecutionOutcome, RemoteFailure};
pub use handler::{MockSyncHandler, SyncHandler};
pub use lock::{ItemLockGuard, ItemLocks};
pub use push::{PushAction, PushReport};
pub use queue::{MemoryOperationQueue, OperationQueue};
pub use store::{document_id, ErrorStore, LocalStore, MemoryErrorStore, MemoryLocalStore};

pub use tablesync_protocol;
