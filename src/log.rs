use crate::events::QrEvent;
use crate::store::HttpMethod;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

/// Default capacity of the global delivery log, across all webhooks.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// One delivery attempt record. Terminal: never mutated after creation.
///
/// A logical delivery (initial try plus retries) produces exactly one entry,
/// capturing the last attempt's response or error and the total elapsed time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryLog {
    pub id: Uuid,

    pub webhook_id: String,

    pub resource_id: String,

    pub event: QrEvent,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    pub request_url: String,

    pub request_method: HttpMethod,

    /// Snapshot of the payload as sent.
    pub request_payload: Value,

    /// Absent on network failure.
    pub response_status: Option<u16>,

    /// Truncated snippet of the response body.
    pub response_body: Option<String>,

    pub success: bool,

    pub error: Option<String>,

    pub duration_ms: u64,
}

/// Errors returned by delivery log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Log storage error: {0}")]
    Backend(String),
}

/// Persistence port for delivery logs: one bounded, FIFO-evicting collection.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    /// Append an entry, evicting the oldest once capacity is exceeded.
    async fn append(&self, entry: DeliveryLog) -> Result<(), LogError>;

    /// Entries for one webhook, most recent first.
    async fn for_webhook(&self, webhook_id: &str, limit: usize)
        -> Result<Vec<DeliveryLog>, LogError>;

    /// Entries for one QR code, most recent first.
    async fn for_resource(
        &self,
        resource_id: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, LogError>;

    /// Remove all entries for a webhook; returns how many were removed.
    async fn clear_for_webhook(&self, webhook_id: &str) -> Result<usize, LogError>;

    async fn clear_all(&self) -> Result<(), LogError>;

    /// Total number of retained entries.
    async fn count(&self) -> Result<usize, LogError>;
}

/// In-memory bounded delivery log.
///
/// The bound is small enough that queries scan the whole store; no secondary
/// index is kept.
#[derive(Debug, Clone)]
pub struct InMemoryDeliveryLog {
    entries: Arc<Mutex<VecDeque<DeliveryLog>>>,
    capacity: usize,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<DeliveryLog>>, LogError> {
        self.entries
            .lock()
            .map_err(|e| LogError::Backend(format!("delivery log lock poisoned: {e}")))
    }
}

impl Default for InMemoryDeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryLogStore for InMemoryDeliveryLog {
    async fn append(&self, entry: DeliveryLog) -> Result<(), LogError> {
        let mut entries = self.lock()?;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }

    async fn for_webhook(
        &self,
        webhook_id: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, LogError> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.webhook_id == webhook_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn for_resource(
        &self,
        resource_id: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, LogError> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.resource_id == resource_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear_for_webhook(&self, webhook_id: &str) -> Result<usize, LogError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|e| e.webhook_id != webhook_id);
        let removed = before - entries.len();
        if removed > 0 {
            info!(webhook_id = %webhook_id, removed, "Cleared delivery logs for webhook");
        }
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<(), LogError> {
        let mut entries = self.lock()?;
        let count = entries.len();
        entries.clear();
        info!(cleared_count = count, "Cleared all delivery logs");
        Ok(())
    }

    async fn count(&self) -> Result<usize, LogError> {
        Ok(self.lock()?.len())
    }
}
