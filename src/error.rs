use thiserror::Error;

/// User-facing message constants.
pub mod msg {
    pub const RECEIPT_NOT_FOUND: &str = "No purchase receipt was found on this device";
    pub const SERVER_ERROR: &str = "The validation server returned an unreadable response";
    pub const RECEIPT_INVALID: &str = "The purchase receipt could not be authenticated";
    pub const SUBSCRIPTION_EXPIRED: &str = "Your subscription has expired";
    pub const SUBSCRIPTION_VALID: &str = "Your subscription is active";
    pub const CORRUPT_DATA: &str = "The validation response was missing receipt data";
    pub const BUNDLE_ID_MISMATCH: &str = "The receipt does not belong to this application";
    pub const APPLE_SERVER_DOWN: &str = "The App Store is temporarily unavailable";
    pub const CORRUPT_RECEIPT_DATA: &str = "The receipt data was malformed";
    pub const NETWORK_ERROR: &str = "Could not reach the validation server";
    pub const WRONG_ENVIRONMENT: &str = "The receipt belongs to a different store environment";
    pub const SECRET_KEY_MISMATCH: &str = "The shared secret does not match the account";
    pub const STATUS_UNKNOWN: &str = "The validation server returned an unknown status";
    pub const PURCHASES_RESTORED: &str = "Your purchases have been restored";

    pub const PAYMENTS_NOT_ALLOWED: &str = "This device is not allowed to make payments";
    pub const INVALID_ENDPOINT: &str = "Validation endpoint is not a valid URL";
    pub const MISSING_BUNDLE_ID: &str = "Application bundle identifier is required";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}", msg::PAYMENTS_NOT_ALLOWED)]
    PaymentsNotAllowed,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
