//! Structured conflict records produced by failed operations.

use crate::document::Document;
use crate::operation::{Operation, OperationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A conflict between a local mutation and the remote service's answer.
///
/// Records are persisted by the error store and survive restarts until the
/// push that loaded them has shown them to the completion callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOperationError {
    /// Unique record ID.
    pub id: String,
    /// HTTP-like status code of the remote response, if any.
    pub status: Option<u16>,
    /// Kind of the failed operation.
    pub operation_kind: OperationKind,
    /// Table of the failed operation.
    pub table_name: String,
    /// Item identifier of the failed operation.
    pub item_id: String,
    /// Local item payload at the time of the push.
    pub item: Option<Document>,
    /// Remote response body as received.
    pub raw_result: Option<String>,
    /// Remote response body parsed as JSON.
    pub result: Option<Value>,
    /// Set by application code once the conflict has been dealt with.
    #[serde(default)]
    pub handled: bool,
}

impl TableOperationError {
    /// Creates a new unhandled record.
    pub fn new(
        status: Option<u16>,
        operation_kind: OperationKind,
        table_name: impl Into<String>,
        item_id: impl Into<String>,
        item: Option<Document>,
        raw_result: Option<String>,
        result: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status,
            operation_kind,
            table_name: table_name.into(),
            item_id: item_id.into(),
            item,
            raw_result,
            result,
            handled: false,
        }
    }

    /// Creates a record for `operation` from the remote response.
    ///
    /// The parsed form is only filled in when the body is valid JSON.
    pub fn from_operation(
        operation: &Operation,
        status: Option<u16>,
        raw_result: Option<String>,
    ) -> Self {
        let result = raw_result
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Self::new(
            status,
            operation.kind,
            operation.table_name.clone(),
            operation.item_id.clone(),
            operation.item.clone(),
            raw_result,
            result,
        )
    }

    /// Marks the conflict as handled.
    pub fn handle(&mut self) {
        self.handled = true;
    }
}
