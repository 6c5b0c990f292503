use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::{NotificationCategory, NotificationEvent};

/// Boundary to the external notification dispatcher. The engine calls
/// `notify` strictly after its owning transaction has committed.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> Result<()>;
}

/// Dispatch an event, recovering locally from sink failures. Delivery is not
/// part of any lifecycle operation's correctness contract, so a failed send
/// is logged and the operation still reports success.
pub async fn emit(sink: &dyn NotificationSink, event: NotificationEvent) {
    let category = event.category;
    let recipient = event.recipient_id;
    match sink.notify(event).await {
        Ok(()) => debug!("dispatched {} notification to {}", category, recipient),
        Err(err) => warn!(
            "notification dispatch failed ({} to {}): {:#}",
            category, recipient, err
        ),
    }
}

/// Production default until the real dispatcher is wired in: structured log
/// lines only.
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn notify(&self, event: NotificationEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        tracing::info!(
            category = %event.category,
            recipient = %event.recipient_id,
            "notification: {}",
            payload
        );
        Ok(())
    }
}

/// Test double that captures every event it receives. `failing()` keeps
/// recording but reports dispatch failure, for exercising the
/// log-and-continue contract.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    pub fn count(&self, category: NotificationCategory) -> usize {
        self.events()
            .iter()
            .filter(|event| event.category == category)
            .count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: NotificationEvent) -> Result<()> {
        self.events.lock().expect("sink mutex poisoned").push(event);
        if self.fail.load(Ordering::Relaxed) {
            return Err(anyhow!("dispatcher unreachable"));
        }
        Ok(())
    }
}
