//! Business policy mapping validation outcomes to follow-up actions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::outcome::ValidationOutcome;

/// What the host application should do after a validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FollowUpAction {
    /// Keep previously known entitlement state; the failure is transient.
    Tolerate,
    /// Revoke or deny entitlement.
    Terminate,
    /// Entitlement confirmed.
    Pass,
    /// Run the whole validation flow again (sandbox/production mismatch).
    ReRun,
}

impl std::fmt::Display for FollowUpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Outcome → action lookup. Outcomes without an entry resolve to
/// [`FollowUpAction::Tolerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    entries: HashMap<ValidationOutcome, FollowUpAction>,
}

impl PolicyTable {
    pub const FALLBACK: FollowUpAction = FollowUpAction::Tolerate;

    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, outcome: ValidationOutcome, action: FollowUpAction) -> Self {
        self.entries.insert(outcome, action);
        self
    }

    pub fn without(mut self, outcome: ValidationOutcome) -> Self {
        self.entries.remove(&outcome);
        self
    }

    pub fn lookup(&self, outcome: ValidationOutcome) -> FollowUpAction {
        self.entries.get(&outcome).copied().unwrap_or(Self::FALLBACK)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        use FollowUpAction::*;
        use ValidationOutcome::*;

        [
            (SubscriptionValid, Pass),
            (ServerError, Tolerate),
            (AppleServerDown, Tolerate),
            (NetworkError, Tolerate),
            (StatusUnknown, Tolerate),
            (SecretKeyMismatch, Terminate),
            (ReceiptNotFound, Terminate),
            (ReceiptInvalid, Terminate),
            (SubscriptionExpired, Terminate),
            (CorruptData, Terminate),
            (BundleIdMismatch, Terminate),
            (CorruptReceiptData, Terminate),
            (WrongEnvironment, ReRun),
        ]
        .into_iter()
        .fold(Self::empty(), |table, (outcome, action)| table.with(outcome, action))
    }
}
