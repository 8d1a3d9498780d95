//! storekeep - in-app purchase lifecycle for mobile applications
//!
//! Receipt validation with a policy-driven follow-up action, reconciliation of
//! purchase-queue transactions, and a small store facade for product lists,
//! purchases, restores and the rating prompt.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storekeep::{Config, Store};
//!
//! let config = Config::from_env()?;
//! let store = Store::builder(config, queue, catalog)
//!     .validation_delegate(Arc::new(MyDelegate))
//!     .build();
//!
//! // Register with the platform purchase queue
//! let observer = store.reconciler();
//!
//! let report = store.validate_receipt(false)?.await?;
//! println!("{} -> {}", report.outcome, report.action);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod reconciler;
pub mod storage;
pub mod store;
pub mod validator;

pub use config::{Config, RatingThresholds, StoreConfig, ValidationConfig};
pub use dispatch::{InlineContext, SerialContext, UiContext};
pub use error::{Result, StoreError};
pub use events::{EventBus, StoreEvent};
pub use models::{
    FollowUpAction, InAppPurchase, PolicyTable, Product, ServerStatus, TransactionError,
    TransactionErrorCode, TransactionRecord, TransactionState, ValidationOutcome,
};
pub use reconciler::{PaymentQueue, TransactionDelegate, TransactionReconciler};
pub use storage::{FileLaunchHistory, LaunchHistory, LaunchRecord, MemoryLaunchHistory};
pub use store::{ProductCatalog, RatingPrompt, Store, StoreBuilder};
pub use validator::{
    ExpirationPolicy, ReceiptTransport, ReceiptValidator, ValidationDelegate, ValidationReport,
};
