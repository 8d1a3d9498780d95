//! Test utilities and fakes for storekeep integration tests

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use storekeep::config::{Config, RatingThresholds, StoreConfig, ValidationConfig};
pub use storekeep::events::StoreEvent;
pub use storekeep::models::*;
pub use storekeep::reconciler::{PaymentQueue, TransactionDelegate};
pub use storekeep::store::{ProductCatalog, RatingPrompt};
pub use storekeep::validator::{ValidationDelegate, ValidationReport};

pub const BUNDLE_ID: &str = "com.example.app";
pub const RECEIPT_BYTES: &[u8] = b"\x30\x82receipt-payload\r\n";

/// Write a receipt file into `dir` and return its path
pub fn write_receipt(dir: &Path) -> PathBuf {
    let path = dir.join("receipt");
    std::fs::write(&path, RECEIPT_BYTES).expect("Failed to write receipt");
    path
}

pub fn validation_config(endpoint: &str, receipt: Option<&Path>) -> ValidationConfig {
    let config = ValidationConfig::new(endpoint, BUNDLE_ID).expect("Failed to build config");
    match receipt {
        Some(path) => config.receipt_path(path),
        None => config,
    }
}

pub fn store_config(validation: ValidationConfig, product_ids: &[&str]) -> Config {
    Config {
        validation,
        store: StoreConfig {
            product_ids: product_ids.iter().map(|s| s.to_string()).collect(),
            rating: RatingThresholds {
                min_launches: 3,
                min_days: 2,
            },
            state_dir: None,
        },
    }
}

pub fn product(identifier: &str) -> Product {
    Product {
        identifier: identifier.to_string(),
        title: format!("Title {}", identifier),
        description: format!("Description {}", identifier),
        price: "4.99".to_string(),
        currency: "USD".to_string(),
    }
}

/// Collect every event currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============ Fakes ============

pub struct FakeQueue {
    pub allowed: AtomicBool,
    pub payments: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<String>>,
    pub restores: AtomicUsize,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self {
            allowed: AtomicBool::new(true),
            payments: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            restores: AtomicUsize::new(0),
        }
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

impl PaymentQueue for FakeQueue {
    fn add_payment(&self, product_identifier: &str) {
        self.payments.lock().unwrap().push(product_identifier.to_string());
    }

    fn finish_transaction(&self, transaction: &TransactionRecord) {
        self.finished.lock().unwrap().push(transaction.transaction_id.clone());
    }

    fn restore_completed_transactions(&self) {
        self.restores.fetch_add(1, Ordering::SeqCst);
    }

    fn can_make_payments(&self) -> bool {
        self.allowed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingTransactionDelegate {
    pub drained: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl TransactionDelegate for RecordingTransactionDelegate {
    fn on_transaction_list_drained(&self) {
        self.drained.fetch_add(1, Ordering::SeqCst);
    }

    fn on_purchase_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingValidationDelegate {
    pub reports: Mutex<Vec<ValidationReport>>,
}

impl RecordingValidationDelegate {
    pub fn reports(&self) -> Vec<ValidationReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ValidationDelegate for RecordingValidationDelegate {
    fn on_validation_complete(&self, report: &ValidationReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Catalog returning a fixed product list; call `n` waits `delays[n]` first
pub struct FakeCatalog {
    pub products: Vec<Product>,
    pub delays: Vec<Duration>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            delays: Vec::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductCatalog for FakeCatalog {
    async fn fetch_products(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> storekeep::Result<Vec<Product>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(call) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail {
            return Err(storekeep::StoreError::catalog("catalog unavailable"));
        }
        Ok(self
            .products
            .iter()
            .filter(|p| identifiers.contains(&p.identifier))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct CountingRatingPrompt {
    pub requests: AtomicUsize,
}

impl RatingPrompt for CountingRatingPrompt {
    fn request_review(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}
