//! Queued operations and bookmark markers.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of local mutation recorded in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Item was created locally.
    Insert,
    /// Item was modified locally.
    Update,
    /// Item was deleted locally.
    Delete,
}

impl OperationKind {
    /// Returns the lowercase name used in logs and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending local mutation waiting to be pushed.
///
/// `(table_name, item_id)` is unique among active operations. The queue
/// assigns `sequence` on enqueue; it only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation ID.
    pub id: String,
    /// Kind of mutation.
    pub kind: OperationKind,
    /// Table the item belongs to.
    pub table_name: String,
    /// Item identifier within the table.
    pub item_id: String,
    /// Item payload. Loaded from the local store on demand when absent.
    pub item: Option<Document>,
    /// Queue position.
    pub sequence: u64,
    /// Set when the operation was superseded before it could be pushed.
    pub cancelled: bool,
    /// Whether the remote result is written back to the local store.
    pub write_result_to_store: bool,
    /// Remote result, set after a successful execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Operation {
    /// Creates a new operation with no payload attached.
    pub fn new(
        kind: OperationKind,
        table_name: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            table_name: table_name.into(),
            item_id: item_id.into(),
            item: None,
            sequence: 0,
            cancelled: false,
            write_result_to_store: kind != OperationKind::Delete,
            result: None,
        }
    }

    /// Creates an insert operation.
    pub fn insert(table_name: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self::new(OperationKind::Insert, table_name, item_id)
    }

    /// Creates an update operation.
    pub fn update(table_name: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self::new(OperationKind::Update, table_name, item_id)
    }

    /// Creates a delete operation.
    pub fn delete(table_name: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, table_name, item_id)
    }

    /// Attaches the item payload.
    pub fn with_item(mut self, item: Document) -> Self {
        self.item = Some(item);
        self
    }

    /// Sets whether the remote result is written back locally.
    pub fn with_write_result(mut self, write: bool) -> Self {
        self.write_result_to_store = write;
        self
    }

    /// Key used for per-item locking: `table/item`.
    ///
    /// Slashes and backslashes inside either part are escaped with a backslash.
    pub fn lock_key(&self) -> String {
        let mut key = String::with_capacity(self.table_name.len() + self.item_id.len() + 1);
        push_escaped(&mut key, &self.table_name);
        key.push('/');
        push_escaped(&mut key, &self.item_id);
        key
    }
}

fn push_escaped(key: &mut String, part: &str) {
    for c in part.chars() {
        if c == '/' || c == '\\' {
            key.push('\\');
        }
        key.push(c);
    }
}

/// A marker inserted at the queue tail when a push is requested.
///
/// Everything ahead of the bookmark belongs to that push run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Unique bookmark ID.
    pub id: String,
    /// Queue position.
    pub sequence: u64,
}

impl Bookmark {
    /// Creates a bookmark not yet placed in a queue.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
        }
    }
}

impl Default for Bookmark {
    fn default() -> Self {
        Self::new()
    }
}

/// An entry in the operation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueueEntry {
    /// A real mutation to push.
    Mutation(Operation),
    /// A push-run boundary.
    Bookmark(Bookmark),
}

impl QueueEntry {
    /// Returns the queue position of this entry.
    pub fn sequence(&self) -> u64 {
        match self {
            QueueEntry::Mutation(op) => op.sequence,
            QueueEntry::Bookmark(bookmark) => bookmark.sequence,
        }
    }

    /// Returns the mutation, if this entry is one.
    pub fn as_mutation(&self) -> Option<&Operation> {
        match self {
            QueueEntry::Mutation(op) => Some(op),
            QueueEntry::Bookmark(_) => None,
        }
    }

    /// Returns true if this entry is the given bookmark.
    pub fn is_bookmark(&self, bookmark: &Bookmark) -> bool {
        matches!(self, QueueEntry::Bookmark(b) if b.id == bookmark.id)
    }
}
