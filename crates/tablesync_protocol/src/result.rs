//! Push run outcomes.

use crate::conflict::TableOperationError;
use serde::{Deserialize, Serialize};

/// Why a push run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushStatus {
    /// Every operation up to the bookmark was processed.
    Complete,
    /// The caller's cancellation token fired.
    CancelledByToken,
    /// The remote service rejected the credentials.
    CancelledByAuthenticationError,
    /// The remote service could not be reached.
    CancelledByNetworkError,
    /// The local store failed to read or write.
    CancelledBySyncStoreError,
}

impl PushStatus {
    /// Returns true for every status except `Complete`.
    pub fn is_cancelled(&self) -> bool {
        !matches!(self, PushStatus::Complete)
    }
}

impl std::fmt::Display for PushStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PushStatus::Complete => "complete",
            PushStatus::CancelledByToken => "cancelled by token",
            PushStatus::CancelledByAuthenticationError => "cancelled by authentication error",
            PushStatus::CancelledByNetworkError => "cancelled by network error",
            PushStatus::CancelledBySyncStoreError => "cancelled by sync store error",
        };
        f.write_str(name)
    }
}

/// Outcome of one push run, as shown to the completion callback and the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PushCompletionResult {
    errors: Vec<TableOperationError>,
    status: PushStatus,
}

impl PushCompletionResult {
    /// Creates a result.
    pub fn new(errors: Vec<TableOperationError>, status: PushStatus) -> Self {
        Self { errors, status }
    }

    /// Structured errors of the run.
    pub fn errors(&self) -> &[TableOperationError] {
        &self.errors
    }

    /// Mutable access so the completion callback can mark errors handled.
    pub fn errors_mut(&mut self) -> &mut [TableOperationError] {
        &mut self.errors
    }

    /// Final batch status.
    pub fn status(&self) -> PushStatus {
        self.status
    }

    /// Returns true if nothing went wrong.
    pub fn is_success(&self) -> bool {
        self.status == PushStatus::Complete && self.errors.iter().all(|e| e.handled)
    }

    /// Returns a copy of this result keeping only unhandled errors.
    pub fn unhandled(&self) -> Self {
        Self {
            errors: self.errors.iter().filter(|e| !e.handled).cloned().collect(),
            status: self.status,
        }
    }

    /// Consumes the result, returning its errors.
    pub fn into_errors(self) -> Vec<TableOperationError> {
        self.errors
    }
}
