//! # tablesync protocol
//!
//! Data types shared by the tablesync push engine and its collaborators.
//!
//! This crate provides:
//! - `Operation` and `QueueEntry` for the durable operation queue
//! - `Bookmark` markers that bound a single push run
//! - `TableOperationError` for structured conflict records
//! - `PushStatus` and `PushCompletionResult` for run outcomes
//! - Document helpers for stripping server-managed properties
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod document;
mod operation;
mod result;

pub use conflict::TableOperationError;
pub use document::{strip_system_properties, Document};
pub use operation::{Bookmark, Operation, OperationKind, QueueEntry};
pub use result::{PushCompletionResult, PushStatus};
