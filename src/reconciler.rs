//! Purchase-queue observer.
//!
//! Each queue event is reconciled into one of: ignore (`purchasing`,
//! `deferred`), complete (`purchased`), restore (`restored`) or fail
//! (`failed`). Every terminal transaction is finalized with the queue exactly
//! once; an unfinished transaction is redelivered on the next launch.
//!
//! The platform calls in on its own serialized queue. Shared state and
//! delegate callbacks are handed off to the [`UiContext`].

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::dispatch::UiContext;
use crate::events::{EventBus, StoreEvent};
use crate::models::{TransactionError, TransactionErrorCode, TransactionRecord, TransactionState};

/// The platform purchase queue.
pub trait PaymentQueue: Send + Sync {
    fn add_payment(&self, product_identifier: &str);
    fn finish_transaction(&self, transaction: &TransactionRecord);
    fn restore_completed_transactions(&self);
    fn can_make_payments(&self) -> bool;
}

/// Host callbacks for transaction activity. Both default to no-ops.
pub trait TransactionDelegate: Send + Sync {
    fn on_transaction_list_drained(&self) {}
    fn on_purchase_cancelled(&self) {}
}

/// Delegate that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransactionDelegate;

impl TransactionDelegate for NoopTransactionDelegate {}

/// Something that can kick off a receipt validation.
pub trait Revalidate: Send + Sync {
    fn revalidate(&self, restoring: bool);
}

/// Product identifiers purchased during this session.
///
/// Written only from UI context jobs.
#[derive(Debug, Clone, Default)]
pub struct PurchasedProducts {
    inner: Arc<RwLock<BTreeSet<String>>>,
}

impl PurchasedProducts {
    pub fn insert(&self, product_identifier: &str) {
        if let Ok(mut set) = self.inner.write() {
            set.insert(product_identifier.to_string());
        }
    }

    pub fn contains(&self, product_identifier: &str) -> bool {
        self.inner
            .read()
            .map(|set| set.contains(product_identifier))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

pub struct TransactionReconciler {
    queue: Arc<dyn PaymentQueue>,
    delegate: Arc<dyn TransactionDelegate>,
    events: EventBus,
    ui: Arc<dyn UiContext>,
    purchased: PurchasedProducts,
    revalidate: Option<Arc<dyn Revalidate>>,
}

impl TransactionReconciler {
    pub fn new(
        queue: Arc<dyn PaymentQueue>,
        delegate: Arc<dyn TransactionDelegate>,
        events: EventBus,
        ui: Arc<dyn UiContext>,
        purchased: PurchasedProducts,
    ) -> Self {
        Self {
            queue,
            delegate,
            events,
            ui,
            purchased,
            revalidate: None,
        }
    }

    pub fn with_revalidation(mut self, revalidate: Arc<dyn Revalidate>) -> Self {
        self.revalidate = Some(revalidate);
        self
    }

    /// Entry point for the queue's "updated transactions" callback.
    pub fn updated_transactions(&self, transactions: &[TransactionRecord]) {
        let mut purchased_any = false;

        for (index, record) in transactions.iter().enumerate() {
            let is_last = index + 1 == transactions.len();

            match record.state {
                TransactionState::Purchasing => {}
                TransactionState::Deferred => {
                    tracing::info!("Transaction deferred for {}", record.product_identifier);
                }
                TransactionState::Purchased => {
                    self.complete(record, is_last);
                    purchased_any = true;
                }
                TransactionState::Restored => self.restore(record, is_last),
                TransactionState::Failed => self.fail(record),
            }
        }

        if purchased_any && let Some(revalidate) = &self.revalidate {
            tracing::debug!("Purchased transactions in batch, revalidating receipt");
            revalidate.revalidate(false);
        }
    }

    /// Queue callback: all restorable transactions were delivered.
    pub fn restore_finished(&self) {
        match &self.revalidate {
            Some(revalidate) => revalidate.revalidate(true),
            None => {
                let events = self.events.clone();
                self.ui
                    .dispatch(Box::new(move || events.publish(StoreEvent::RestoreFinished)));
            }
        }
    }

    /// Queue callback: the restore request itself failed.
    pub fn restore_failed(&self, error: TransactionError) {
        tracing::warn!("Restore failed: {}", error);
        self.surface_failure(None, Some(&error));
    }

    /// Whether a payment started outside the app (e.g. from the storefront)
    /// should be accepted.
    pub fn should_add_store_payment(&self, product_identifier: &str) -> bool {
        let allowed = self.queue.can_make_payments();
        tracing::debug!(
            "Store payment for {} requested, payments allowed: {}",
            product_identifier,
            allowed
        );
        allowed
    }

    fn complete(&self, record: &TransactionRecord, is_last: bool) {
        tracing::info!(
            "Transaction {} purchased: product={}, last_in_batch={}",
            record.transaction_id,
            record.product_identifier,
            is_last
        );
        self.deliver_purchase(&record.product_identifier);
        self.queue.finish_transaction(record);
    }

    fn restore(&self, record: &TransactionRecord, is_last: bool) {
        if let Some(original) = &record.original {
            tracing::info!(
                "Transaction {} restored from {}: product={}, last_in_batch={}",
                record.transaction_id,
                original.transaction_id,
                record.product_identifier,
                is_last
            );
            // The current payment's identifier is delivered, not the original's.
            self.deliver_purchase(&record.product_identifier);
        } else {
            tracing::warn!(
                "Restored transaction {} has no original transaction",
                record.transaction_id
            );
        }
        self.queue.finish_transaction(record);
    }

    fn fail(&self, record: &TransactionRecord) {
        tracing::info!(
            "Transaction {} failed: product={}, error={:?}",
            record.transaction_id,
            record.product_identifier,
            record.error
        );
        self.surface_failure(Some(&record.product_identifier), record.error.as_ref());
        self.queue.finish_transaction(record);
    }

    fn surface_failure(&self, product_identifier: Option<&str>, error: Option<&TransactionError>) {
        let product_identifier = product_identifier.map(String::from);
        let events = self.events.clone();
        let delegate = self.delegate.clone();

        match error {
            Some(e) if e.is_cancellation() => {
                self.ui.dispatch(Box::new(move || {
                    events.publish(StoreEvent::TransactionFailed {
                        product_identifier,
                        error: None,
                    });
                    delegate.on_purchase_cancelled();
                }));
            }
            other => {
                let error = other.cloned().unwrap_or_else(|| {
                    TransactionError::new(TransactionErrorCode::Unknown, "Transaction failed")
                });
                self.ui.dispatch(Box::new(move || {
                    events.publish(StoreEvent::TransactionFailed {
                        product_identifier,
                        error: Some(error),
                    });
                }));
            }
        }
    }

    fn deliver_purchase(&self, product_identifier: &str) {
        let product_identifier = product_identifier.to_string();
        let purchased = self.purchased.clone();
        let events = self.events.clone();
        let delegate = self.delegate.clone();

        self.ui.dispatch(Box::new(move || {
            purchased.insert(&product_identifier);
            events.publish(StoreEvent::PurchaseCompleted { product_identifier });
            delegate.on_transaction_list_drained();
        }));
    }
}
