use std::env;
use std::path::PathBuf;

use url::Url;

use crate::error::{Result, StoreError, msg};

/// Default validation endpoint when `STOREKEEP_VALIDATION_URL` is unset.
pub const DEFAULT_VALIDATION_URL: &str = "http://127.0.0.1:8080/verifyReceipt";

/// Settings for one receipt validator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    pub endpoint: Url,
    pub sandbox: bool,
    /// Suppresses presentation hints in validation reports.
    pub silent: bool,
    pub receipt_path: Option<PathBuf>,
    /// Bundle identifier of the running application.
    pub bundle_id: String,
}

impl ValidationConfig {
    pub fn new(endpoint: &str, bundle_id: &str) -> Result<Self> {
        if bundle_id.trim().is_empty() {
            return Err(StoreError::config(msg::MISSING_BUNDLE_ID));
        }

        let endpoint = Url::parse(endpoint).map_err(|e| {
            tracing::warn!("Rejected validation endpoint {}: {}", endpoint, e);
            StoreError::config(msg::INVALID_ENDPOINT)
        })?;

        Ok(Self {
            endpoint,
            sandbox: false,
            silent: false,
            receipt_path: None,
            bundle_id: bundle_id.to_string(),
        })
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn receipt_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.receipt_path = Some(path.into());
        self
    }

    /// Value of the `env` field sent with every validation request.
    pub fn env_flag(&self) -> &'static str {
        if self.sandbox { "1" } else { "0" }
    }
}

/// Thresholds for the rating prompt heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingThresholds {
    pub min_launches: u32,
    pub min_days: i64,
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self {
            min_launches: 5,
            min_days: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub product_ids: Vec<String>,
    pub rating: RatingThresholds,
    /// Directory for the JSON state file. `None` keeps state in memory.
    pub state_dir: Option<PathBuf>,
}

/// Full process configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub validation: ValidationConfig,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let endpoint = lookup("STOREKEEP_VALIDATION_URL")
            .unwrap_or_else(|| DEFAULT_VALIDATION_URL.to_string());
        let bundle_id = lookup("STOREKEEP_BUNDLE_ID").unwrap_or_default();

        let mut validation = ValidationConfig::new(&endpoint, &bundle_id)?
            .sandbox(flag("STOREKEEP_SANDBOX"))
            .silent(flag("STOREKEEP_SILENT"));
        if let Some(path) = lookup("STOREKEEP_RECEIPT_PATH").filter(|p| !p.is_empty()) {
            validation = validation.receipt_path(path);
        }

        let defaults = RatingThresholds::default();
        let rating = RatingThresholds {
            min_launches: lookup("STOREKEEP_RATING_MIN_LAUNCHES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_launches),
            min_days: lookup("STOREKEEP_RATING_MIN_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_days),
        };

        let product_ids = lookup("STOREKEEP_PRODUCT_IDS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            validation,
            store: StoreConfig {
                product_ids,
                rating,
                state_dir: lookup("STOREKEEP_STATE_DIR").map(PathBuf::from),
            },
        })
    }
}
