//! Store-wide broadcast events.
//!
//! Listeners subscribe through [`EventBus::subscribe`]. Sending never fails:
//! an event with no live receivers is dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::TransactionError;

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    PurchaseCompleted {
        product_identifier: String,
    },
    RestoreFinished,
    /// `error` is `None` when the user cancelled the payment.
    TransactionFailed {
        product_identifier: Option<String>,
        error: Option<TransactionError>,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        tracing::debug!("Publishing store event: {:?}", event);
        let _ = self.sender.send(event);
    }
}
