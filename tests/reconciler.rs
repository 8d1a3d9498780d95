//! Purchase-queue reconciliation tests

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use common::*;
use storekeep::dispatch::InlineContext;
use storekeep::events::EventBus;
use storekeep::reconciler::{PurchasedProducts, Revalidate, TransactionReconciler};

#[derive(Default)]
struct RecordingRevalidate {
    calls: Mutex<Vec<bool>>,
}

impl RecordingRevalidate {
    fn calls(&self) -> Vec<bool> {
        self.calls.lock().unwrap().clone()
    }
}

impl Revalidate for RecordingRevalidate {
    fn revalidate(&self, restoring: bool) {
        self.calls.lock().unwrap().push(restoring);
    }
}

struct Harness {
    queue: Arc<FakeQueue>,
    delegate: Arc<RecordingTransactionDelegate>,
    events: EventBus,
    purchased: PurchasedProducts,
    reconciler: TransactionReconciler,
}

fn harness() -> Harness {
    let queue = Arc::new(FakeQueue::new());
    let delegate = Arc::new(RecordingTransactionDelegate::default());
    let events = EventBus::new();
    let purchased = PurchasedProducts::default();
    let reconciler = TransactionReconciler::new(
        queue.clone(),
        delegate.clone(),
        events.clone(),
        Arc::new(InlineContext),
        purchased.clone(),
    );
    Harness {
        queue,
        delegate,
        events,
        purchased,
        reconciler,
    }
}

fn drained(delegate: &RecordingTransactionDelegate) -> usize {
    delegate.drained.load(Ordering::SeqCst)
}

fn cancelled(delegate: &RecordingTransactionDelegate) -> usize {
    delegate.cancelled.load(Ordering::SeqCst)
}

#[test]
fn test_purchased_notifies_once_and_finishes() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.updated_transactions(&[TransactionRecord::new(
        "t1",
        "pro.monthly",
        TransactionState::Purchased,
    )]);

    assert_eq!(
        drain_events(&mut rx),
        vec![StoreEvent::PurchaseCompleted {
            product_identifier: "pro.monthly".to_string()
        }]
    );
    assert_eq!(h.queue.finished(), vec!["t1"]);
    assert_eq!(drained(&h.delegate), 1);
    assert!(h.purchased.contains("pro.monthly"));
}

#[test]
fn test_purchased_handled_the_same_at_any_position() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.updated_transactions(&[
        TransactionRecord::new("t1", "pro.monthly", TransactionState::Purchased),
        TransactionRecord::new("t2", "pro.yearly", TransactionState::Purchasing),
        TransactionRecord::new("t3", "coins.100", TransactionState::Purchased),
    ]);

    let events = drain_events(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.contains(&StoreEvent::PurchaseCompleted {
        product_identifier: "pro.monthly".to_string()
    }));
    assert!(events.contains(&StoreEvent::PurchaseCompleted {
        product_identifier: "coins.100".to_string()
    }));
    assert_eq!(h.queue.finished(), vec!["t1", "t3"]);
    assert_eq!(drained(&h.delegate), 2);
    assert_eq!(h.purchased.snapshot(), vec!["coins.100", "pro.monthly"]);
}

#[test]
fn test_cancelled_failure_is_neutral() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.updated_transactions(&[TransactionRecord::new(
        "t1",
        "pro.monthly",
        TransactionState::Failed,
    )
    .with_error(TransactionError::cancelled())]);

    assert_eq!(
        drain_events(&mut rx),
        vec![StoreEvent::TransactionFailed {
            product_identifier: Some("pro.monthly".to_string()),
            error: None,
        }]
    );
    assert_eq!(cancelled(&h.delegate), 1);
    assert_eq!(h.queue.finished(), vec!["t1"]);
    assert!(!h.purchased.contains("pro.monthly"));
}

#[test]
fn test_other_failure_carries_error() {
    let h = harness();
    let mut rx = h.events.subscribe();
    let error = TransactionError::new(TransactionErrorCode::PaymentInvalid, "Card declined");

    h.reconciler.updated_transactions(&[TransactionRecord::new(
        "t1",
        "pro.monthly",
        TransactionState::Failed,
    )
    .with_error(error.clone())]);

    assert_eq!(
        drain_events(&mut rx),
        vec![StoreEvent::TransactionFailed {
            product_identifier: Some("pro.monthly".to_string()),
            error: Some(error),
        }]
    );
    assert_eq!(cancelled(&h.delegate), 0);
    assert_eq!(h.queue.finished(), vec!["t1"]);
}

#[test]
fn test_failure_without_error_is_unknown() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.updated_transactions(&[TransactionRecord::new(
        "t1",
        "pro.monthly",
        TransactionState::Failed,
    )]);

    match drain_events(&mut rx).as_slice() {
        [StoreEvent::TransactionFailed { error: Some(error), .. }] => {
            assert_eq!(error.code, TransactionErrorCode::Unknown);
        }
        other => panic!("unexpected events: {:?}", other),
    }
    assert_eq!(h.queue.finished(), vec!["t1"]);
}

#[test]
fn test_restored_with_original_delivers_current_product() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.updated_transactions(&[TransactionRecord::new(
        "t2",
        "pro.yearly",
        TransactionState::Restored,
    )
    .with_original(OriginalTransaction {
        transaction_id: "t1".to_string(),
        product_identifier: "pro.monthly".to_string(),
    })]);

    assert_eq!(
        drain_events(&mut rx),
        vec![StoreEvent::PurchaseCompleted {
            product_identifier: "pro.yearly".to_string()
        }]
    );
    assert!(h.purchased.contains("pro.yearly"));
    assert!(!h.purchased.contains("pro.monthly"));
    assert_eq!(h.queue.finished(), vec!["t2"]);
}

#[test]
fn test_restored_without_original_only_finishes() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.updated_transactions(&[TransactionRecord::new(
        "t2",
        "pro.yearly",
        TransactionState::Restored,
    )]);

    assert!(drain_events(&mut rx).is_empty());
    assert_eq!(drained(&h.delegate), 0);
    assert_eq!(h.queue.finished(), vec!["t2"]);
}

#[test]
fn test_in_flight_states_are_ignored() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.updated_transactions(&[
        TransactionRecord::new("t1", "pro.monthly", TransactionState::Purchasing),
        TransactionRecord::new("t2", "pro.yearly", TransactionState::Deferred),
    ]);

    assert!(drain_events(&mut rx).is_empty());
    assert!(h.queue.finished().is_empty());
    assert_eq!(drained(&h.delegate), 0);
}

#[test]
fn test_every_terminal_transaction_finished_once() {
    let h = harness();

    let batch = vec![
        TransactionRecord::new("a", "p1", TransactionState::Purchased),
        TransactionRecord::new("b", "p2", TransactionState::Failed),
        TransactionRecord::new("c", "p3", TransactionState::Restored),
        TransactionRecord::new("d", "p4", TransactionState::Deferred),
        TransactionRecord::new("e", "p5", TransactionState::Purchasing),
    ];
    h.reconciler.updated_transactions(&batch);

    let expected: Vec<String> = batch
        .iter()
        .filter(|r| r.state.is_terminal())
        .map(|r| r.transaction_id.clone())
        .collect();
    assert_eq!(h.queue.finished(), expected);
}

#[test]
fn test_purchased_batch_revalidates_once() {
    let h = harness();
    let revalidate = Arc::new(RecordingRevalidate::default());
    let reconciler = h.reconciler.with_revalidation(revalidate.clone());

    reconciler.updated_transactions(&[
        TransactionRecord::new("t1", "p1", TransactionState::Purchased),
        TransactionRecord::new("t2", "p2", TransactionState::Purchased),
    ]);
    assert_eq!(revalidate.calls(), vec![false]);

    reconciler.updated_transactions(&[
        TransactionRecord::new("t3", "p3", TransactionState::Failed),
        TransactionRecord::new("t4", "p4", TransactionState::Restored),
    ]);
    assert_eq!(revalidate.calls(), vec![false]);
}

#[test]
fn test_restore_finished_revalidates_as_restore() {
    let h = harness();
    let mut rx = h.events.subscribe();
    let revalidate = Arc::new(RecordingRevalidate::default());
    let reconciler = h.reconciler.with_revalidation(revalidate.clone());

    reconciler.restore_finished();

    assert_eq!(revalidate.calls(), vec![true]);
    // The validator publishes RestoreFinished once it reports
    assert!(drain_events(&mut rx).is_empty());
}

#[test]
fn test_restore_finished_without_validator_publishes() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.restore_finished();

    assert_eq!(drain_events(&mut rx), vec![StoreEvent::RestoreFinished]);
}

#[test]
fn test_restore_failed_surfaces_error() {
    let h = harness();
    let mut rx = h.events.subscribe();
    let error = TransactionError::new(TransactionErrorCode::ClientInvalid, "Not signed in");

    h.reconciler.restore_failed(error.clone());

    assert_eq!(
        drain_events(&mut rx),
        vec![StoreEvent::TransactionFailed {
            product_identifier: None,
            error: Some(error),
        }]
    );
    assert!(h.queue.finished().is_empty());
}

#[test]
fn test_restore_cancelled_is_neutral() {
    let h = harness();
    let mut rx = h.events.subscribe();

    h.reconciler.restore_failed(TransactionError::cancelled());

    assert_eq!(
        drain_events(&mut rx),
        vec![StoreEvent::TransactionFailed {
            product_identifier: None,
            error: None,
        }]
    );
    assert_eq!(cancelled(&h.delegate), 1);
}

#[test]
fn test_store_payment_follows_queue_permission() {
    let h = harness();
    assert!(h.reconciler.should_add_store_payment("pro.monthly"));

    h.queue.allowed.store(false, Ordering::SeqCst);
    assert!(!h.reconciler.should_add_store_payment("pro.monthly"));
}

#[tokio::test]
async fn test_serial_context_defers_delivery() {
    let queue = Arc::new(FakeQueue::new());
    let delegate = Arc::new(RecordingTransactionDelegate::default());
    let ui = storekeep::SerialContext::new();
    let purchased = PurchasedProducts::default();
    let reconciler = TransactionReconciler::new(
        queue.clone(),
        delegate.clone(),
        EventBus::new(),
        Arc::new(ui.clone()),
        purchased.clone(),
    );

    reconciler.updated_transactions(&[TransactionRecord::new(
        "t1",
        "pro.monthly",
        TransactionState::Purchased,
    )]);

    // Finalization is synchronous, delivery waits for the UI context
    assert_eq!(queue.finished(), vec!["t1"]);
    ui.flush().await;
    assert!(purchased.contains("pro.monthly"));
    assert_eq!(drained(&delegate), 1);
}
