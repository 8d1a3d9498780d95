use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// State of a transaction as reported by the platform purchase queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionState {
    Purchasing,
    Purchased,
    Failed,
    Restored,
    Deferred,
}

impl TransactionState {
    /// Terminal states must be finalized with the queue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Purchased | Self::Failed | Self::Restored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionErrorCode {
    PaymentCancelled,
    ClientInvalid,
    PaymentInvalid,
    PaymentNotAllowed,
    ProductNotAvailable,
    Unknown,
}

/// Failure attached to a `failed` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionError {
    pub code: TransactionErrorCode,
    pub message: String,
}

impl TransactionError {
    pub fn new(code: TransactionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(TransactionErrorCode::PaymentCancelled, "Payment cancelled")
    }

    pub fn is_cancellation(&self) -> bool {
        self.code == TransactionErrorCode::PaymentCancelled
    }
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_ref(), self.message)
    }
}

/// The transaction a restore was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalTransaction {
    pub transaction_id: String,
    pub product_identifier: String,
}

/// One event from the purchase queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    /// Product identifier of the payment this transaction belongs to.
    pub product_identifier: String,
    pub state: TransactionState,
    pub error: Option<TransactionError>,
    pub original: Option<OriginalTransaction>,
}

impl TransactionRecord {
    pub fn new(
        transaction_id: impl Into<String>,
        product_identifier: impl Into<String>,
        state: TransactionState,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            product_identifier: product_identifier.into(),
            state,
            error: None,
            original: None,
        }
    }

    pub fn with_error(mut self, error: TransactionError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_original(mut self, original: OriginalTransaction) -> Self {
        self.original = Some(original);
        self
    }
}
