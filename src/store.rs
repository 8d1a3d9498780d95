//! Public store surface: products, purchases, restores, receipt validation
//! and the rating prompt.
//!
//! The store owns all session state (purchased identifiers, cached product
//! list) and wires the purchase-queue observer to a lazily built validator.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::{Config, StoreConfig, ValidationConfig};
use crate::dispatch::{InlineContext, UiContext};
use crate::error::{Result, StoreError};
use crate::events::{EventBus, StoreEvent};
use crate::models::Product;
use crate::reconciler::{
    NoopTransactionDelegate, PaymentQueue, PurchasedProducts, Revalidate, TransactionDelegate,
    TransactionReconciler,
};
use crate::storage::{FileLaunchHistory, LaunchHistory, LaunchRecord, MemoryLaunchHistory};
use crate::validator::{
    AlwaysExpired, ExpirationPolicy, HttpTransport, LoggingDelegate, ReceiptTransport,
    ReceiptValidator, ValidationDelegate, ValidationReport,
};

/// The platform product-catalog query.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn fetch_products(&self, identifiers: &BTreeSet<String>) -> Result<Vec<Product>>;
}

/// The native rating-prompt trigger.
pub trait RatingPrompt: Send + Sync {
    fn request_review(&self);
}

pub struct StoreBuilder {
    config: Config,
    queue: Arc<dyn PaymentQueue>,
    catalog: Arc<dyn ProductCatalog>,
    ui: Arc<dyn UiContext>,
    launches: Arc<dyn LaunchHistory>,
    rating: Option<Arc<dyn RatingPrompt>>,
    validation_delegate: Arc<dyn ValidationDelegate>,
    transaction_delegate: Arc<dyn TransactionDelegate>,
    transport: Option<Arc<dyn ReceiptTransport>>,
    expiration: Arc<dyn ExpirationPolicy>,
}

impl StoreBuilder {
    pub fn ui_context(mut self, ui: Arc<dyn UiContext>) -> Self {
        self.ui = ui;
        self
    }

    pub fn launch_history(mut self, launches: Arc<dyn LaunchHistory>) -> Self {
        self.launches = launches;
        self
    }

    pub fn rating_prompt(mut self, rating: Arc<dyn RatingPrompt>) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn validation_delegate(mut self, delegate: Arc<dyn ValidationDelegate>) -> Self {
        self.validation_delegate = delegate;
        self
    }

    pub fn transaction_delegate(mut self, delegate: Arc<dyn TransactionDelegate>) -> Self {
        self.transaction_delegate = delegate;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ReceiptTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn expiration_policy(mut self, expiration: Arc<dyn ExpirationPolicy>) -> Self {
        self.expiration = expiration;
        self
    }

    /// Must be called inside a tokio runtime; background work is spawned on it.
    pub fn build(self) -> Store {
        let events = EventBus::new();
        let purchased = PurchasedProducts::default();
        let runtime = Handle::current();

        let validator = Arc::new(LazyValidator {
            config: self.config.validation,
            delegate: self.validation_delegate,
            transport: self.transport,
            expiration: self.expiration,
            events: events.clone(),
            ui: self.ui.clone(),
            runtime: runtime.clone(),
            slot: Mutex::new(None),
        });

        let reconciler = TransactionReconciler::new(
            self.queue.clone(),
            self.transaction_delegate,
            events.clone(),
            self.ui.clone(),
            purchased.clone(),
        )
        .with_revalidation(validator.clone());

        Store {
            config: self.config.store,
            queue: self.queue,
            catalog: self.catalog,
            launches: self.launches,
            rating: self.rating,
            events,
            ui: self.ui,
            runtime,
            purchased,
            products: Arc::new(RwLock::new(None)),
            pending_products: Mutex::new(None),
            validator,
            reconciler: Arc::new(reconciler),
        }
    }
}

/// Builds the receipt validator on first use and reuses it afterwards.
struct LazyValidator {
    config: ValidationConfig,
    delegate: Arc<dyn ValidationDelegate>,
    transport: Option<Arc<dyn ReceiptTransport>>,
    expiration: Arc<dyn ExpirationPolicy>,
    events: EventBus,
    ui: Arc<dyn UiContext>,
    runtime: Handle,
    slot: Mutex<Option<Arc<ReceiptValidator>>>,
}

impl LazyValidator {
    fn get(&self) -> Result<Arc<ReceiptValidator>> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| StoreError::Internal("validator slot poisoned".into()))?;

        if let Some(validator) = slot.as_ref() {
            return Ok(validator.clone());
        }

        let transport: Arc<dyn ReceiptTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(HttpTransport::new()?),
        };

        tracing::debug!("Creating receipt validator for {}", self.config.endpoint);
        let validator = Arc::new(
            ReceiptValidator::with_transport(self.config.clone(), self.delegate.clone(), transport)
                .expiration_policy(self.expiration.clone())
                .events(self.events.clone())
                .ui_context(self.ui.clone()),
        );
        *slot = Some(validator.clone());
        Ok(validator)
    }

    fn start(&self, restoring: bool) -> Result<JoinHandle<ValidationReport>> {
        let validator = self.get()?;
        let _guard = self.runtime.enter();
        Ok(validator.start(restoring))
    }
}

impl Revalidate for LazyValidator {
    fn revalidate(&self, restoring: bool) {
        if let Err(e) = self.start(restoring) {
            tracing::error!("Could not start receipt validation: {}", e);
        }
    }
}

pub struct Store {
    config: StoreConfig,
    queue: Arc<dyn PaymentQueue>,
    catalog: Arc<dyn ProductCatalog>,
    launches: Arc<dyn LaunchHistory>,
    rating: Option<Arc<dyn RatingPrompt>>,
    events: EventBus,
    ui: Arc<dyn UiContext>,
    runtime: Handle,
    purchased: PurchasedProducts,
    products: Arc<RwLock<Option<Vec<Product>>>>,
    pending_products: Mutex<Option<AbortHandle>>,
    validator: Arc<LazyValidator>,
    reconciler: Arc<TransactionReconciler>,
}

impl Store {
    pub fn builder(
        config: Config,
        queue: Arc<dyn PaymentQueue>,
        catalog: Arc<dyn ProductCatalog>,
    ) -> StoreBuilder {
        let launches: Arc<dyn LaunchHistory> = match config.store.state_dir.as_deref() {
            Some(dir) => match FileLaunchHistory::open(dir) {
                Ok(history) => Arc::new(history),
                Err(e) => {
                    tracing::warn!(
                        "Launch history in {} unusable ({}), keeping it in memory",
                        dir.display(),
                        e
                    );
                    Arc::new(MemoryLaunchHistory::new())
                }
            },
            None => Arc::new(MemoryLaunchHistory::new()),
        };

        StoreBuilder {
            config,
            queue,
            catalog,
            ui: Arc::new(InlineContext),
            launches,
            rating: None,
            validation_delegate: Arc::new(LoggingDelegate),
            transaction_delegate: Arc::new(NoopTransactionDelegate),
            transport: None,
            expiration: Arc::new(AlwaysExpired),
        }
    }

    // ==================== Products ====================

    /// Fetch the configured products.
    ///
    /// May be called from any thread; the fetch runs on the runtime the store
    /// was built in.
    ///
    /// The first successful result (even an empty list) is cached for the
    /// lifetime of the store and served without fetching again; in that case
    /// no task is spawned and `None` is returned. Issuing a new request while
    /// one is pending aborts the pending one, whose completion never runs.
    pub fn request_products<F>(&self, completion: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<Vec<Product>>) + Send + 'static,
    {
        if let Some(cached) = self.cached_products() {
            tracing::debug!("Serving {} cached products", cached.len());
            self.ui.dispatch(Box::new(move || completion(Ok(cached))));
            return None;
        }

        let identifiers: BTreeSet<String> = self.config.product_ids.iter().cloned().collect();
        let catalog = self.catalog.clone();
        let cache = self.products.clone();
        let ui = self.ui.clone();

        let handle = self.runtime.spawn(async move {
            let result = catalog.fetch_products(&identifiers).await;
            match &result {
                Ok(products) => tracing::info!("Fetched {} products", products.len()),
                Err(e) => tracing::warn!("Product request failed: {}", e),
            }
            ui.dispatch(Box::new(move || {
                if let Ok(products) = &result
                    && let Ok(mut slot) = cache.write()
                {
                    *slot = Some(products.clone());
                }
                completion(result);
            }));
        });

        if let Ok(mut pending) = self.pending_products.lock()
            && let Some(previous) = pending.replace(handle.abort_handle())
            && !previous.is_finished()
        {
            tracing::debug!("Cancelling superseded product request");
            previous.abort();
        }

        Some(handle)
    }

    pub fn cached_products(&self) -> Option<Vec<Product>> {
        self.products.read().ok()?.clone()
    }

    // ==================== Purchases ====================

    pub fn can_make_payments(&self) -> bool {
        self.queue.can_make_payments()
    }

    pub fn purchase(&self, product: &Product) -> Result<()> {
        self.purchase_identifier(&product.identifier)
    }

    pub fn purchase_identifier(&self, product_identifier: &str) -> Result<()> {
        if !self.queue.can_make_payments() {
            tracing::warn!("Purchase of {} refused: payments not allowed", product_identifier);
            return Err(StoreError::PaymentsNotAllowed);
        }
        tracing::info!("Adding payment for {}", product_identifier);
        self.queue.add_payment(product_identifier);
        Ok(())
    }

    pub fn restore_purchases(&self) {
        tracing::info!("Restoring completed transactions");
        self.queue.restore_completed_transactions();
    }

    /// Purchase-history lookup. Not implemented yet: always `false`.
    pub fn is_product_purchased(&self, product_identifier: &str) -> bool {
        tracing::debug!("Purchase history lookup for {} is not implemented", product_identifier);
        false
    }

    /// Products purchased or restored during this session.
    pub fn purchased_identifiers(&self) -> Vec<String> {
        self.purchased.snapshot()
    }

    // ==================== Validation ====================

    pub fn validate_receipt(&self, restoring: bool) -> Result<JoinHandle<ValidationReport>> {
        self.validator.start(restoring)
    }

    /// Observer to register with the platform purchase queue.
    pub fn reconciler(&self) -> Arc<TransactionReconciler> {
        self.reconciler.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ==================== Rating prompt ====================

    /// Count one application launch. Returns the new launch count.
    pub fn record_launch(&self) -> u32 {
        let record = self.launches.load().launched(chrono::Utc::now().timestamp());
        self.launches.store(&record);
        record.count
    }

    pub fn launch_record(&self) -> LaunchRecord {
        self.launches.load()
    }

    pub fn should_request_review(&self) -> bool {
        self.should_request_review_at(chrono::Utc::now().timestamp())
    }

    /// Rating heuristic evaluated at `now` (Unix seconds).
    pub fn should_request_review_at(&self, now: i64) -> bool {
        let record = self.launches.load();
        record.count >= self.config.rating.min_launches
            && record.days_since_first_launch(now) >= self.config.rating.min_days
    }

    /// Trigger the native prompt when the heuristic passes. Returns whether it
    /// was triggered.
    pub fn request_review_if_appropriate(&self) -> bool {
        match &self.rating {
            Some(rating) if self.should_request_review() => {
                rating.request_review();
                true
            }
            _ => false,
        }
    }
}
