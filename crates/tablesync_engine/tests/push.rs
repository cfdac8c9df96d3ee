//! Push scenarios run against the testkit harness.

use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tablesync_engine::{PushError, QueueError, RemoteError, StoreError};
use tablesync_protocol::{Operation, PushStatus, QueueEntry};
use tablesync_testkit::prelude::*;
use tokio_util::sync::CancellationToken;

fn sync_store_message(error: &PushError) -> Option<&'static str> {
    match error {
        PushError::SyncStore { message, .. } => Some(*message),
        _ => None,
    }
}

#[tokio::test]
async fn operations_enqueued_during_run_wait_for_next_push() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));

    let queue = Arc::clone(harness.context().queue());
    let fired = AtomicBool::new(false);
    harness.handler().on_execute(move |_| {
        if !fired.swap(true, Ordering::SeqCst) {
            queue.inner().enqueue(insert_todo("late", "eggs"));
        }
    });

    harness.push().await.unwrap();

    let executed = harness.handler().executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].item_id, "1");
    let pending = harness.queue().pending_operations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item_id, "late");
    assert_eq!(harness.queue().len(), 1);

    harness.push().await.unwrap();
    assert!(harness.queue().is_empty());
    assert_eq!(harness.handler().executed().len(), 2);
}

#[tokio::test]
async fn second_push_without_new_operations_does_nothing() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness.enqueue(delete_todo("2"));

    harness.push().await.unwrap();
    let report = harness.push_report().await.unwrap();

    assert_eq!(report.status, PushStatus::Complete);
    assert_eq!(report.counts.executed, 0);
    assert!(report.result.is_ok());
    assert_eq!(harness.handler().executed().len(), 2);

    let completions = harness.handler().completions();
    assert_eq!(completions.len(), 2);
    assert!(completions[1].errors().is_empty());
}

#[tokio::test]
async fn network_failure_retains_operation_for_retry() {
    init_tracing();
    let harness = Harness::new();
    let first = harness.enqueue(update_todo("1", "milk"));
    harness.enqueue(update_todo("2", "eggs"));
    harness
        .handler()
        .respond(TODO_TABLE, "1", Err(RemoteError::Network("timeout".into())));

    let err = harness.push().await.unwrap_err();
    assert_eq!(err.push_status(), Some(PushStatus::CancelledByNetworkError));
    assert!(err.cause().is_none());
    assert!(err.push_result().unwrap().errors().is_empty());

    let pending = harness.queue().pending_operations();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].sequence, first);
    assert_eq!(harness.handler().executed().len(), 1);

    // Connectivity is back.
    harness.push().await.unwrap();
    assert!(harness.queue().is_empty());
    let executed: Vec<_> = harness
        .handler()
        .executed()
        .into_iter()
        .map(|op| op.item_id)
        .collect();
    assert_eq!(executed, vec!["1", "1", "2"]);
}

#[tokio::test]
async fn authentication_failure_stops_the_run() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness.enqueue(insert_todo("2", "eggs"));
    harness.handler().respond(
        TODO_TABLE,
        "2",
        Err(RemoteError::Authentication("token expired".into())),
    );

    let err = harness.push().await.unwrap_err();
    assert_eq!(
        err.push_status(),
        Some(PushStatus::CancelledByAuthenticationError)
    );
    let pending = harness.queue().pending_operations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item_id, "2");
    assert!(harness.store().get(TODO_TABLE, "1").is_some());
}

#[tokio::test]
async fn conflict_is_recorded_once_and_reported_unhandled() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(update_todo("1", "milk"));
    harness.enqueue(update_todo("2", "eggs"));
    let body = json!({"id": "1", "text": "server milk", "__version": "7"}).to_string();
    harness
        .handler()
        .respond(TODO_TABLE, "1", Err(RemoteError::invalid_operation(412, body.clone())));

    let err = harness.push().await.unwrap_err();
    let result = err.push_result().unwrap();
    assert_eq!(result.status(), PushStatus::Complete);
    assert_eq!(result.errors().len(), 1);

    let conflict = &result.errors()[0];
    assert_eq!(conflict.status, Some(412));
    assert_eq!(conflict.item_id, "1");
    assert!(!conflict.handled);
    assert_eq!(conflict.raw_result.as_deref(), Some(body.as_str()));
    assert_eq!(conflict.result.as_ref().unwrap()["__version"], "7");
    assert_eq!(conflict.item.as_ref().unwrap()["text"], "milk");

    assert!(harness.queue().is_empty());
    assert!(harness.errors().is_empty());
    assert!(harness.store().get(TODO_TABLE, "2").is_some());

    // Delivered once; the next run has nothing to report.
    harness.push().await.unwrap();
    assert!(harness.handler().completions()[1].errors().is_empty());
}

#[tokio::test]
async fn errors_are_deleted_only_once_shown() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness
        .handler()
        .respond(TODO_TABLE, "1", Err(RemoteError::invalid_operation(409, "{}")));
    harness.flaky_errors().fail_load(true);

    let err = harness.push().await.unwrap_err();
    assert_eq!(
        err.cause().and_then(sync_store_message),
        Some("failed to load sync errors")
    );
    assert!(err.push_result().unwrap().errors().is_empty());
    assert_eq!(harness.errors().len(), 1);

    harness.flaky_errors().fail_load(false);
    let err = harness.push().await.unwrap_err();
    assert_eq!(err.push_result().unwrap().errors().len(), 1);
    assert!(err.cause().is_none());
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn failing_completion_callback_still_deletes_shown_errors() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness
        .handler()
        .respond(TODO_TABLE, "1", Err(RemoteError::invalid_operation(409, "{}")));
    harness.handler().fail_completion("ui thread gone");

    let err = harness.push().await.unwrap_err();
    assert!(matches!(err.cause(), Some(PushError::Handler(_))));
    assert_eq!(err.push_result().unwrap().errors().len(), 1);
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn handled_errors_are_dropped_from_the_result() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness
        .handler()
        .respond(TODO_TABLE, "1", Err(RemoteError::invalid_operation(409, "{}")));
    harness.handler().handle_all_errors(true);

    harness.push().await.unwrap();
    assert!(harness.errors().is_empty());
}

#[tokio::test]
async fn cancellation_while_waiting_for_item_lock_keeps_remaining_operations() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    let second = harness.enqueue(insert_todo("2", "eggs"));
    harness.enqueue(insert_todo("3", "bread"));

    // A pull is working on item 2.
    let pull_key = insert_todo("2", "eggs").lock_key();
    let pull = harness
        .queue()
        .locks()
        .lock(&pull_key, &CancellationToken::new())
        .await
        .unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    let cancel_later = async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    };
    let (result, ()) = tokio::join!(harness.push_with(token), cancel_later);

    let err = result.unwrap_err();
    assert_eq!(err.push_status(), Some(PushStatus::CancelledByToken));
    assert!(err.cause().is_none());

    let pending = harness.queue().pending_operations();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].sequence, second);
    assert_eq!(pending[1].item_id, "3");
    assert!(harness.store().get(TODO_TABLE, "1").is_some());
    assert!(harness.store().get(TODO_TABLE, "2").is_none());
    assert_eq!(harness.handler().executed().len(), 1);
    assert_eq!(harness.handler().completions().len(), 1);

    assert!(harness.queue().locks().is_locked(&pull_key));
    drop(pull);
    assert!(harness.queue().locks().is_empty());
}

#[tokio::test]
async fn operation_completed_after_cancel_is_not_sent_again() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness.enqueue(insert_todo("2", "eggs"));

    let token = CancellationToken::new();
    let trigger = token.clone();
    harness.handler().on_execute(move |op| {
        if op.item_id == "1" {
            trigger.cancel();
        }
    });

    let err = harness.push_with(token).await.unwrap_err();
    assert_eq!(err.push_status(), Some(PushStatus::CancelledByToken));
    assert!(harness.store().get(TODO_TABLE, "1").is_some());
    let pending: Vec<_> = harness
        .queue()
        .pending_operations()
        .into_iter()
        .map(|op| op.item_id)
        .collect();
    assert_eq!(pending, vec!["2"]);

    harness.push().await.unwrap();
    let executed: Vec<_> = harness
        .handler()
        .executed()
        .into_iter()
        .map(|op| op.item_id)
        .collect();
    assert_eq!(executed, vec!["1", "2"]);
    assert!(harness.queue().is_empty());
}

#[tokio::test]
async fn later_update_wins_and_keeps_version() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(update_todo("1", "milk"));
    harness.enqueue(update_todo("1", "oat milk"));
    harness.handler().respond(
        TODO_TABLE,
        "1",
        Ok(Some(json!({
            "id": "1",
            "text": "milk",
            "__version": "2",
            "__updatedAt": "2024-05-01T10:00:00Z",
        }))),
    );
    harness.handler().respond(
        TODO_TABLE,
        "1",
        Ok(Some(json!({
            "id": "1",
            "text": "oat milk",
            "__version": "3",
            "__updatedAt": "2024-05-01T10:00:01Z",
            "__deleted": false,
        }))),
    );

    harness.push().await.unwrap();

    let stored = harness.store().get(TODO_TABLE, "1").unwrap();
    assert_eq!(stored["text"], "oat milk");
    assert_eq!(stored["__version"], "3");
    assert!(!stored.contains_key("__updatedAt"));
    assert!(!stored.contains_key("__deleted"));
    assert_eq!(harness.store().table_len(TODO_TABLE), 1);
}

#[tokio::test]
async fn missing_payload_is_read_from_local_store() {
    init_tracing();
    let harness = Harness::new();
    harness
        .store()
        .put(TODO_TABLE, "1", doc(json!({"id": "1", "text": "stored"})));
    harness.enqueue(Operation::update(TODO_TABLE, "1"));

    harness.push().await.unwrap();
    let executed = harness.handler().executed();
    assert_eq!(executed[0].item.as_ref().unwrap()["text"], "stored");
}

#[tokio::test]
async fn local_store_read_failure_aborts_and_retains() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(Operation::update(TODO_TABLE, "1"));
    harness.flaky_store().fail_lookup(true);

    let err = harness.push().await.unwrap_err();
    assert_eq!(
        err.push_status(),
        Some(PushStatus::CancelledBySyncStoreError)
    );
    assert_eq!(
        err.cause().and_then(sync_store_message),
        Some("failed to read item from local store")
    );
    assert!(harness.handler().executed().is_empty());
    assert_eq!(harness.queue().pending_operations().len(), 1);
}

#[tokio::test]
async fn remote_result_without_id_aborts_and_retains() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness.enqueue(insert_todo("2", "eggs"));
    harness
        .handler()
        .respond(TODO_TABLE, "1", Ok(Some(json!({"text": "milk"}))));

    let err = harness.push().await.unwrap_err();
    assert_eq!(
        err.push_status(),
        Some(PushStatus::CancelledBySyncStoreError)
    );
    match err.cause() {
        Some(PushError::SyncStore { message, source }) => {
            assert_eq!(*message, "failed to upsert item into local store");
            assert!(matches!(source, StoreError::MissingId(_)));
        }
        other => panic!("expected a store cause, got {other:?}"),
    }
    assert_eq!(harness.store().table_len(TODO_TABLE), 0);
    assert_eq!(harness.queue().pending_operations().len(), 2);
}

#[tokio::test]
async fn store_failure_and_failed_error_load_are_aggregated_in_order() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness.flaky_store().fail_upsert(true);
    harness.flaky_errors().fail_load(true);

    let err = harness.push().await.unwrap_err();
    assert_eq!(
        err.push_status(),
        Some(PushStatus::CancelledBySyncStoreError)
    );
    match err.cause() {
        Some(PushError::Aggregate(errors)) => {
            let messages: Vec<_> = errors.iter().map(sync_store_message).collect();
            assert_eq!(
                messages,
                vec![
                    Some("failed to upsert item into local store"),
                    Some("failed to load sync errors"),
                ]
            );
        }
        other => panic!("expected aggregate cause, got {other:?}"),
    }
    // Executed remotely, but the write-back failed: retried next time.
    assert_eq!(harness.handler().executed().len(), 1);
    assert_eq!(harness.queue().pending_operations().len(), 1);
}

#[tokio::test]
async fn network_abort_with_failed_error_load_has_single_cause() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness
        .handler()
        .respond(TODO_TABLE, "1", Err(RemoteError::Network("offline".into())));
    harness.flaky_errors().fail_load(true);

    let err = harness.push().await.unwrap_err();
    assert_eq!(err.push_status(), Some(PushStatus::CancelledByNetworkError));
    match err.cause() {
        Some(PushError::SyncStore { message, source }) => {
            assert_eq!(*message, "failed to load sync errors");
            assert!(matches!(source, StoreError::Unavailable(_)));
        }
        other => panic!("expected a single store cause, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_to_save_a_conflict_aborts_and_retains() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness
        .handler()
        .respond(TODO_TABLE, "1", Err(RemoteError::invalid_operation(409, "{}")));
    harness.flaky_errors().fail_add(true);

    let err = harness.push().await.unwrap_err();
    assert_eq!(
        err.push_status(),
        Some(PushStatus::CancelledBySyncStoreError)
    );
    assert_eq!(
        err.cause().and_then(sync_store_message),
        Some("failed to save sync error")
    );
    assert_eq!(harness.queue().pending_operations().len(), 1);
}

#[tokio::test]
async fn dequeue_failure_aborts_the_run() {
    init_tracing();
    let harness = Harness::new();
    let first = harness.enqueue(insert_todo("1", "milk"));
    harness.enqueue(insert_todo("2", "eggs"));
    harness.flaky_queue().fail_dequeue(true);

    let err = harness.push().await.unwrap_err();
    assert_eq!(
        err.push_status(),
        Some(PushStatus::CancelledBySyncStoreError)
    );
    assert!(matches!(
        err.cause(),
        Some(PushError::Queue(QueueError::Store(_)))
    ));
    assert_eq!(harness.handler().executed().len(), 1);
    assert_eq!(harness.queue().pending_operations()[0].sequence, first);
}

#[tokio::test]
async fn operation_removed_while_executing_is_not_an_error() {
    init_tracing();
    let harness = Harness::new();
    let first = harness.enqueue(insert_todo("1", "milk"));
    harness.enqueue(insert_todo("2", "eggs"));

    let queue = Arc::clone(harness.context().queue());
    harness.handler().on_execute(move |op| {
        if op.sequence == first {
            queue.inner().remove(first);
        }
    });

    harness.push().await.unwrap();
    assert!(harness.queue().is_empty());
    assert_eq!(harness.handler().executed().len(), 2);
}

#[tokio::test]
async fn superseded_operations_are_skipped() {
    init_tracing();
    let harness = Harness::new();
    harness.enqueue(insert_todo("1", "milk"));
    harness.enqueue(update_todo("1", "oat milk"));
    harness.enqueue(delete_todo("2"));
    assert_eq!(harness.queue().cancel_item(TODO_TABLE, "1"), 2);

    let report = harness.push_report().await.unwrap();
    assert!(report.result.is_ok());
    assert_eq!(report.counts.skipped, 2);
    assert_eq!(report.counts.executed, 1);
    assert!(harness.queue().is_empty());
    assert_eq!(harness.context().stats().operations_skipped, 2);
}

#[tokio::test]
async fn concurrent_pushes_run_one_at_a_time() {
    init_tracing();
    let harness = Harness::new();
    for id in ["1", "2", "3"] {
        harness.enqueue(insert_todo(id, id));
    }

    let (a, b) = tokio::join!(harness.push(), harness.push());
    a.unwrap();
    b.unwrap();

    assert!(harness.queue().is_empty());
    assert_eq!(harness.handler().executed().len(), 3);
    assert_eq!(harness.context().stats().runs, 2);
    assert!(harness
        .queue()
        .snapshot()
        .iter()
        .all(|entry| !matches!(entry, QueueEntry::Bookmark(_))));
}
