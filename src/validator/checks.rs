//! Structural checks applied to a response whose status is 0.
//!
//! Gate checks run in order; the first one that returns [`Step::Done`] decides
//! the outcome. When every gate passes, the expiration rule decides.

use serde_json::Value;

use crate::config::ValidationConfig;
use crate::models::{InAppPurchase, ValidationOutcome};

/// Decides whether the purchases in a validated receipt grant an active
/// subscription.
pub trait ExpirationPolicy: Send + Sync {
    fn is_active(&self, purchases: &[InAppPurchase]) -> bool;
}

impl<F> ExpirationPolicy for F
where
    F: Fn(&[InAppPurchase]) -> bool + Send + Sync,
{
    fn is_active(&self, purchases: &[InAppPurchase]) -> bool {
        self(purchases)
    }
}

/// Default rule: every receipt is treated as expired until the application
/// supplies a real per-product expiry rule.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysExpired;

impl ExpirationPolicy for AlwaysExpired {
    fn is_active(&self, _purchases: &[InAppPurchase]) -> bool {
        false
    }
}

/// Latest `expires_date_ms` across `purchases`; unparsable entries are ignored
/// and an empty result is 0.
pub fn max_expiration_ms(purchases: &[InAppPurchase]) -> i64 {
    purchases
        .iter()
        .filter_map(InAppPurchase::expires_at_ms)
        .max()
        .unwrap_or(0)
}

pub struct CheckContext<'a> {
    pub payload: &'a Value,
    pub config: &'a ValidationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done(ValidationOutcome),
}

pub type Check = fn(&CheckContext<'_>) -> Step;

pub const GATE_CHECKS: &[(&str, Check)] = &[
    ("signature", check_signature),
    ("bundle_id", check_bundle_id),
    ("app_version", check_app_version),
];

pub fn run(ctx: &CheckContext<'_>, expiration: &dyn ExpirationPolicy) -> ValidationOutcome {
    for (name, check) in GATE_CHECKS {
        if let Step::Done(outcome) = check(ctx) {
            tracing::debug!("Receipt check '{}' stopped validation: {}", name, outcome);
            return outcome;
        }
    }
    check_expiration(ctx, expiration)
}

fn check_signature(_ctx: &CheckContext<'_>) -> Step {
    Step::Continue
}

fn check_bundle_id(ctx: &CheckContext<'_>) -> Step {
    let bundle_id = ctx
        .payload
        .get("receipt")
        .and_then(|r| r.get("bundle_id"))
        .and_then(Value::as_str);

    match bundle_id {
        None => Step::Done(ValidationOutcome::CorruptData),
        Some(id) if id != ctx.config.bundle_id => {
            tracing::warn!(
                "Receipt bundle id {} does not match application {}",
                id,
                ctx.config.bundle_id
            );
            Step::Done(ValidationOutcome::BundleIdMismatch)
        }
        Some(_) => Step::Continue,
    }
}

fn check_app_version(_ctx: &CheckContext<'_>) -> Step {
    Step::Continue
}

fn check_expiration(
    ctx: &CheckContext<'_>,
    expiration: &dyn ExpirationPolicy,
) -> ValidationOutcome {
    let purchases = in_app_purchases(ctx.payload);
    if expiration.is_active(&purchases) {
        ValidationOutcome::SubscriptionValid
    } else {
        ValidationOutcome::SubscriptionExpired
    }
}

/// Entries of `receipt.in_app` that deserialize; anything else is skipped.
pub fn in_app_purchases(payload: &Value) -> Vec<InAppPurchase> {
    payload
        .get("receipt")
        .and_then(|r| r.get("in_app"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
