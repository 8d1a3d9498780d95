use serde::{Deserialize, Serialize};

/// Catalog entry returned by the platform product query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub identifier: String,
    pub title: String,
    pub description: String,
    /// Decimal string, e.g. "4.99"
    pub price: String,
    /// ISO 4217 code
    pub currency: String,
}

/// One element of the `in_app` list inside a validated receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InAppPurchase {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    /// Milliseconds since the epoch, encoded as a string by the server.
    #[serde(default)]
    pub expires_date_ms: Option<String>,
}

impl InAppPurchase {
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_date_ms.as_deref()?.trim().parse().ok()
    }
}
