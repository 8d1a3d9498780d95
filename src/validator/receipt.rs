//! Local receipt access and request encoding.

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;
use crate::models::ValidationOutcome;

use super::Stage;

/// Body posted to the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReceiptRequest {
    /// Base64 receipt without line breaks.
    pub data: String,
    /// "1" for sandbox, "0" for production.
    pub env: String,
}

impl VerifyReceiptRequest {
    pub fn new(receipt: &[u8], config: &ValidationConfig) -> Self {
        Self {
            data: encode_receipt(receipt),
            env: config.env_flag().to_string(),
        }
    }
}

/// Base64-encode receipt bytes and strip any CR/LF characters.
pub fn encode_receipt(bytes: &[u8]) -> String {
    STANDARD
        .encode(bytes)
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect()
}

pub(crate) fn locate(config: &ValidationConfig) -> Stage<&Path> {
    let Some(path) = config.receipt_path.as_deref() else {
        tracing::debug!("No receipt path configured");
        return Err(ValidationOutcome::ReceiptNotFound);
    };

    match path.try_exists() {
        Ok(true) => Ok(path),
        Ok(false) => {
            tracing::debug!("Receipt not present at {}", path.display());
            Err(ValidationOutcome::ReceiptNotFound)
        }
        Err(e) => {
            tracing::warn!("Failed to check receipt at {}: {}", path.display(), e);
            Err(ValidationOutcome::ReceiptNotFound)
        }
    }
}

pub(crate) async fn load(path: &Path) -> Stage<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        tracing::warn!("Failed to read receipt at {}: {}", path.display(), e);
        ValidationOutcome::ReceiptNotFound
    })
}
