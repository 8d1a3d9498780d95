use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

use crate::error::msg;

/// Terminal result of one receipt validation attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationOutcome {
    ReceiptNotFound,
    ServerError,
    ReceiptInvalid,
    SubscriptionExpired,
    SubscriptionValid,
    CorruptData,
    #[strum(to_string = "bundle_id_mismatch", serialize = "bundle_id_invalid")]
    BundleIdMismatch,
    AppleServerDown,
    CorruptReceiptData,
    NetworkError,
    WrongEnvironment,
    SecretKeyMismatch,
    StatusUnknown,
}

impl ValidationOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ReceiptNotFound => msg::RECEIPT_NOT_FOUND,
            Self::ServerError => msg::SERVER_ERROR,
            Self::ReceiptInvalid => msg::RECEIPT_INVALID,
            Self::SubscriptionExpired => msg::SUBSCRIPTION_EXPIRED,
            Self::SubscriptionValid => msg::SUBSCRIPTION_VALID,
            Self::CorruptData => msg::CORRUPT_DATA,
            Self::BundleIdMismatch => msg::BUNDLE_ID_MISMATCH,
            Self::AppleServerDown => msg::APPLE_SERVER_DOWN,
            Self::CorruptReceiptData => msg::CORRUPT_RECEIPT_DATA,
            Self::NetworkError => msg::NETWORK_ERROR,
            Self::WrongEnvironment => msg::WRONG_ENVIRONMENT,
            Self::SecretKeyMismatch => msg::SECRET_KEY_MISMATCH,
            Self::StatusUnknown => msg::STATUS_UNKNOWN,
        }
    }

    /// Whether the caller should refresh the local receipt before retrying.
    pub fn should_refresh(&self) -> bool {
        matches!(self, Self::CorruptReceiptData)
    }
}

impl std::fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// What the validation server's `status` field tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Status 0: the receipt is authentic, structural checks decide the outcome.
    Verified,
    Rejected(ValidationOutcome),
}

impl ServerStatus {
    pub fn from_code(code: i64) -> Self {
        let outcome = match code {
            0 => return Self::Verified,
            21000 => ValidationOutcome::AppleServerDown,
            21002 => ValidationOutcome::CorruptReceiptData,
            21003 => ValidationOutcome::ReceiptInvalid,
            21004 => ValidationOutcome::SecretKeyMismatch,
            21005 => ValidationOutcome::AppleServerDown,
            21006 => ValidationOutcome::SubscriptionExpired,
            21007 => ValidationOutcome::WrongEnvironment,
            _ => ValidationOutcome::StatusUnknown,
        };
        Self::Rejected(outcome)
    }
}
