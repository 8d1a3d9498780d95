//! Receipt validation pipeline.
//!
//! One call to [`ReceiptValidator::start`] runs, on a background task:
//!
//! 1. locate the local receipt,
//! 2. load its bytes,
//! 3. base64-encode and POST it to the validation endpoint,
//! 4. classify the server `status`,
//! 5. run the structural checks when the status is 0,
//! 6. map the outcome through the [`PolicyTable`] and report it.
//!
//! Every failure ends in exactly one [`ValidationOutcome`]; nothing escapes the
//! pipeline as an error. Overlapping calls are independent: each issues its own
//! request and each reaches the delegate.

pub mod checks;
pub mod receipt;
pub mod transport;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::ValidationConfig;
use crate::dispatch::{InlineContext, UiContext};
use crate::error::{Result, msg};
use crate::events::{EventBus, StoreEvent};
use crate::models::{FollowUpAction, PolicyTable, ServerStatus, ValidationOutcome};

pub use checks::{AlwaysExpired, ExpirationPolicy, max_expiration_ms};
pub use receipt::{VerifyReceiptRequest, encode_receipt};
pub use transport::{HttpTransport, ReceiptTransport, TransportResponse};

/// Result of one pipeline stage; `Err` carries the terminal outcome.
pub(crate) type Stage<T> = std::result::Result<T, ValidationOutcome>;

/// What the delegate receives at the end of every validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub action: FollowUpAction,
    pub should_refresh: bool,
    pub presentation_hint: Option<String>,
    pub restoring: bool,
}

pub trait ValidationDelegate: Send + Sync {
    fn on_validation_complete(&self, report: &ValidationReport);
}

/// Delegate that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDelegate;

impl ValidationDelegate for LoggingDelegate {
    fn on_validation_complete(&self, report: &ValidationReport) {
        tracing::info!(
            "Validation finished: outcome={}, action={}, refresh={}",
            report.outcome,
            report.action,
            report.should_refresh
        );
    }
}

pub struct ReceiptValidator {
    pipeline: Arc<Pipeline>,
}

struct Pipeline {
    config: ValidationConfig,
    transport: Arc<dyn ReceiptTransport>,
    policy: PolicyTable,
    expiration: Arc<dyn ExpirationPolicy>,
    delegate: Arc<dyn ValidationDelegate>,
    events: EventBus,
    ui: Arc<dyn UiContext>,
}

impl ReceiptValidator {
    /// Validator with the HTTP transport, default policy table, the default
    /// expiration rule, a private event bus and inline delivery.
    pub fn new(config: ValidationConfig, delegate: Arc<dyn ValidationDelegate>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::with_transport(config, delegate, transport))
    }

    pub fn with_transport(
        config: ValidationConfig,
        delegate: Arc<dyn ValidationDelegate>,
        transport: Arc<dyn ReceiptTransport>,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                config,
                transport,
                policy: PolicyTable::default(),
                expiration: Arc::new(AlwaysExpired),
                delegate,
                events: EventBus::new(),
                ui: Arc::new(InlineContext),
            }),
        }
    }

    pub fn policy(self, policy: PolicyTable) -> Self {
        self.map(|p| p.policy = policy)
    }

    pub fn expiration_policy(self, expiration: Arc<dyn ExpirationPolicy>) -> Self {
        self.map(|p| p.expiration = expiration)
    }

    pub fn events(self, events: EventBus) -> Self {
        self.map(|p| p.events = events)
    }

    pub fn ui_context(self, ui: Arc<dyn UiContext>) -> Self {
        self.map(|p| p.ui = ui)
    }

    fn map(self, f: impl FnOnce(&mut Pipeline)) -> Self {
        let mut pipeline = Arc::try_unwrap(self.pipeline).unwrap_or_else(|shared| Pipeline {
            config: shared.config.clone(),
            transport: shared.transport.clone(),
            policy: shared.policy.clone(),
            expiration: shared.expiration.clone(),
            delegate: shared.delegate.clone(),
            events: shared.events.clone(),
            ui: shared.ui.clone(),
        });
        f(&mut pipeline);
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.pipeline.config
    }

    /// Run one validation attempt in the background.
    ///
    /// The task keeps its own handle on the pipeline, so it completes and
    /// reports even if this validator is dropped first.
    pub fn start(&self, restoring: bool) -> JoinHandle<ValidationReport> {
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            match AssertUnwindSafe(pipeline.execute(restoring)).catch_unwind().await {
                Ok(report) => report,
                Err(_) => {
                    tracing::error!("Validation task panicked, reporting unknown status");
                    pipeline.report(ValidationOutcome::StatusUnknown, restoring)
                }
            }
        })
    }

    /// Run one validation attempt on the current task.
    pub async fn validate(&self, restoring: bool) -> ValidationReport {
        self.pipeline.execute(restoring).await
    }
}

impl Pipeline {
    async fn execute(&self, restoring: bool) -> ValidationReport {
        let outcome = match self.classify().await {
            Ok(outcome) | Err(outcome) => outcome,
        };
        tracing::info!("Receipt validation outcome: {}", outcome);
        self.report(outcome, restoring)
    }

    async fn classify(&self) -> Stage<ValidationOutcome> {
        let path = receipt::locate(&self.config)?;
        let bytes = receipt::load(path).await?;
        tracing::debug!("Loaded {} receipt bytes from {}", bytes.len(), path.display());

        let payload = self.transmit(&bytes).await?;

        let code = payload.get("status").and_then(Value::as_i64);
        let Some(code) = code else {
            tracing::warn!("Validation response has no integer status");
            return Err(ValidationOutcome::StatusUnknown);
        };

        match ServerStatus::from_code(code) {
            ServerStatus::Rejected(outcome) => {
                tracing::debug!("Server status {} maps to {}", code, outcome);
                Err(outcome)
            }
            ServerStatus::Verified => {
                let ctx = checks::CheckContext {
                    payload: &payload,
                    config: &self.config,
                };
                Ok(checks::run(&ctx, self.expiration.as_ref()))
            }
        }
    }

    async fn transmit(&self, receipt: &[u8]) -> Stage<Value> {
        let request = VerifyReceiptRequest::new(receipt, &self.config);

        let response = self
            .transport
            .post_json(&self.config.endpoint, &request)
            .await
            .map_err(|e| {
                tracing::warn!("Validation request to {} failed: {}", self.config.endpoint, e);
                ValidationOutcome::NetworkError
            })?;

        tracing::debug!(
            "Validation endpoint answered HTTP {} with {} bytes",
            response.status,
            response.body.len()
        );

        if response.body.is_empty() {
            tracing::warn!("Validation endpoint returned an empty body");
            return Err(ValidationOutcome::NetworkError);
        }

        match serde_json::from_slice::<Value>(&response.body) {
            Ok(payload) if payload.is_object() => Ok(payload),
            Ok(_) => {
                tracing::warn!("Validation response is not a JSON object");
                Err(ValidationOutcome::ServerError)
            }
            Err(e) => {
                tracing::warn!("Failed to parse validation response: {}", e);
                Err(ValidationOutcome::ServerError)
            }
        }
    }

    fn report(&self, outcome: ValidationOutcome, restoring: bool) -> ValidationReport {
        let action = self.policy.lookup(outcome);

        let presentation_hint = if self.config.silent {
            None
        } else if restoring && action == FollowUpAction::Pass {
            Some(msg::PURCHASES_RESTORED.to_string())
        } else {
            Some(outcome.message().to_string())
        };

        let report = ValidationReport {
            outcome,
            action,
            should_refresh: outcome.should_refresh(),
            presentation_hint,
            restoring,
        };

        let delegate = self.delegate.clone();
        let events = self.events.clone();
        let delivered = report.clone();
        self.ui.dispatch(Box::new(move || {
            delegate.on_validation_complete(&delivered);
            if restoring {
                events.publish(StoreEvent::RestoreFinished);
            }
        }));

        report
    }
}
