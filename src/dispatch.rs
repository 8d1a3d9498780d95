//! The UI execution context.
//!
//! Shared store state (purchased identifiers, cached products) and every
//! delegate callback run on a [`UiContext`]. Network completions and queue
//! observer callbacks hand their work off here instead of touching that state
//! directly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait UiContext: Send + Sync {
    /// Queue `job` for execution. Jobs run one at a time, in submission order.
    fn dispatch(&self, job: Job);
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineContext;

impl UiContext for InlineContext {
    fn dispatch(&self, job: Job) {
        run_job(job);
    }
}

/// Serial executor backed by a single tokio task.
///
/// Must be created inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct SerialContext {
    sender: mpsc::UnboundedSender<Job>,
}

impl SerialContext {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                run_job(job);
            }
            tracing::debug!("UI context closed");
        });
        Self { sender }
    }

    pub fn shared() -> Arc<dyn UiContext> {
        Arc::new(Self::new())
    }

    /// Resolves once every job queued before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.dispatch(Box::new(move || {
            let _ = tx.send(());
        }));
        let _ = rx.await;
    }
}

impl UiContext for SerialContext {
    fn dispatch(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::warn!("UI context is gone, dropping job");
        }
    }
}

fn run_job(job: Job) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let panic_msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("UI job panicked: {}", panic_msg);
    }
}
