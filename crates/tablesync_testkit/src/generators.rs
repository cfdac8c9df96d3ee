//! Property-based test generators using proptest.

use crate::fixtures::{doc, TODO_TABLE};
use proptest::prelude::*;
use serde_json::{json, Value};
use tablesync_engine::{MockSyncHandler, RemoteError};
use tablesync_protocol::{Document, Operation, OperationKind};

/// Strategy for generating item ids.
pub fn item_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,6}").expect("Invalid regex")
}

/// Strategy for generating operation kinds.
pub fn operation_kind_strategy() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Insert),
        Just(OperationKind::Update),
        Just(OperationKind::Delete),
    ]
}

/// Strategy for generating item documents, including server-managed keys.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    (
        item_id_strategy(),
        prop::string::string_regex("[a-z ]{0,12}").expect("Invalid regex"),
        any::<u32>(),
        any::<bool>(),
    )
        .prop_map(|(id, text, version, done)| {
            doc(json!({
                "id": id,
                "text": text,
                "done": done,
                "__version": version.to_string(),
                "__updatedAt": "2024-01-01T00:00:00Z",
            }))
        })
}

/// Strategy for generating todo-table operations with payloads attached.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    (operation_kind_strategy(), document_strategy()).prop_map(|(kind, item)| {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let operation = Operation::new(kind, TODO_TABLE, id);
        match kind {
            OperationKind::Delete => operation,
            _ => operation.with_item(item),
        }
    })
}

/// What the remote service does with one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteBehavior {
    /// The operation is accepted and its item echoed back.
    Accept,
    /// The operation is rejected with the given status.
    Reject(u16),
    /// The service is unreachable.
    Unreachable,
    /// The credentials were refused.
    Unauthorized,
}

impl RemoteBehavior {
    /// Returns true if this behavior stops a push run.
    pub fn aborts(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Unauthorized)
    }

    /// Scripts `handler` to respond to `operation` this way.
    pub fn script(&self, handler: &MockSyncHandler, operation: &Operation) {
        let response = match self {
            Self::Accept => return,
            Self::Reject(status) => Err(RemoteError::invalid_operation(
                *status,
                json!({ "id": operation.item_id }).to_string(),
            )),
            Self::Unreachable => Err(RemoteError::Network("connection refused".into())),
            Self::Unauthorized => Err(RemoteError::Authentication("token expired".into())),
        };
        handler.respond(&operation.table_name, &operation.item_id, response);
    }
}

/// Strategy for generating remote behaviors, mostly accepting.
pub fn remote_behavior_strategy() -> impl Strategy<Value = RemoteBehavior> {
    prop_oneof![
        6 => Just(RemoteBehavior::Accept),
        2 => prop_oneof![Just(400u16), Just(409), Just(412)].prop_map(RemoteBehavior::Reject),
        1 => Just(RemoteBehavior::Unreachable),
        1 => Just(RemoteBehavior::Unauthorized),
    ]
}

/// Strategy for generating a queue of operations with their remote behavior.
///
/// Every operation targets a distinct item so scripted responses cannot
/// collide.
pub fn scripted_queue_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<(Operation, RemoteBehavior)>> {
    prop::collection::vec((operation_strategy(), remote_behavior_strategy()), 0..=max_len)
        .prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(index, (mut operation, behavior))| {
                    let id = format!("item{index}");
                    operation.item_id = id.clone();
                    if let Some(item) = operation.item.as_mut() {
                        item.insert("id".into(), Value::String(id));
                    }
                    (operation, behavior)
                })
                .collect()
        })
}
