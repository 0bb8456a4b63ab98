use crate::events::QrEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default base delay between retry attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// HTTP method used for webhook delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }

    /// GET requests carry no body.
    pub fn has_body(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent logical delivery for a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastStatus {
    Success,
    Failed,
}

/// One outbound webhook subscription, owned by a QR code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub id: String,

    /// The QR code this webhook belongs to.
    pub resource_id: String,

    pub name: String,

    pub description: Option<String>,

    pub url: String,

    pub method: HttpMethod,

    /// Extra request headers, in insertion order.
    pub headers: Vec<(String, String)>,

    /// Static fields merged into every delivery payload.
    pub static_payload: Option<Map<String, Value>>,

    /// Event kinds this webhook reacts to. Never empty.
    pub events: HashSet<QrEvent>,

    /// Shared secret for payload signing.
    #[serde(skip_serializing, default)]
    pub secret: Option<String>,

    /// Number of retries after the first attempt.
    pub retry_count: u32,

    /// Base delay between attempts; actual delay grows linearly.
    pub retry_delay_ms: u64,

    pub enabled: bool,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_triggered_at: Option<OffsetDateTime>,

    pub last_status: Option<LastStatus>,

    pub last_error: Option<String>,

    /// Dispatch counter, incremented once per matched event regardless of
    /// outcome. Only ever increases.
    pub trigger_count: u64,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl WebhookConfig {
    /// Check whether this webhook should receive a given event.
    pub fn matches_event(&self, event: QrEvent) -> bool {
        self.enabled && self.events.contains(&event)
    }
}

/// Fields supplied when creating a webhook. Everything else is defaulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub method: Option<HttpMethod>,
    pub headers: Option<Vec<(String, String)>>,
    pub static_payload: Option<Map<String, Value>>,
    pub events: HashSet<QrEvent>,
    pub secret: Option<String>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

/// Partial update applied by `WebhookStore::update`.
///
/// `id`, `resource_id` and `created_at` are deliberately absent: they can
/// never change after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<Vec<(String, String)>>,
    pub static_payload: Option<Option<Map<String, Value>>>,
    pub events: Option<HashSet<QrEvent>>,
    pub secret: Option<Option<String>>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub enabled: Option<bool>,
}

/// Post-delivery statistics written back after every logical delivery.
#[derive(Debug, Clone)]
pub struct StatsUpdate {
    pub status: LastStatus,
    pub error: Option<String>,
    pub triggered_at: OffsetDateTime,
}

impl StatsUpdate {
    pub fn success(triggered_at: OffsetDateTime) -> Self {
        Self {
            status: LastStatus::Success,
            error: None,
            triggered_at,
        }
    }

    pub fn failure(error: String, triggered_at: OffsetDateTime) -> Self {
        Self {
            status: LastStatus::Failed,
            error: Some(error),
            triggered_at,
        }
    }
}

/// Errors returned by webhook store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Webhook not found: {0}")]
    NotFound(String),

    #[error("Invalid webhook configuration: {0}")]
    Validation(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Persistence port for webhook configurations.
///
/// The dispatch path is the only writer of the mutable statistics fields, so
/// implementations do not need cross-record transactions.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Create a webhook for a QR code, assigning a fresh ID and defaults.
    async fn create(&self, resource_id: &str, spec: NewWebhook)
        -> Result<WebhookConfig, StoreError>;

    async fn get(&self, id: &str) -> Result<WebhookConfig, StoreError>;

    async fn list_by_resource(&self, resource_id: &str) -> Result<Vec<WebhookConfig>, StoreError>;

    /// Merge partial fields into an existing webhook and refresh `updated_at`.
    async fn update(&self, id: &str, patch: WebhookPatch) -> Result<WebhookConfig, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Flip `enabled` and return the new value.
    async fn toggle(&self, id: &str) -> Result<bool, StoreError>;

    /// Record the outcome of one logical delivery: stamps
    /// `last_triggered_at`, `last_status`, `last_error` and increments
    /// `trigger_count`.
    async fn record_dispatch(&self, id: &str, update: StatsUpdate) -> Result<(), StoreError>;
}

/// In-memory webhook store keyed by ID.
#[derive(Debug, Clone)]
pub struct InMemoryWebhookStore {
    records: Arc<RwLock<HashMap<String, WebhookConfig>>>,
    default_retry_count: u32,
    default_retry_delay_ms: u64,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::with_defaults(DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS)
    }

    /// Store whose newly created webhooks default to a different retry
    /// policy (see [`crate::EngineConfig`]).
    pub fn with_defaults(default_retry_count: u32, default_retry_delay_ms: u64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            default_retry_count,
            default_retry_delay_ms,
        }
    }
}

impl Default for InMemoryWebhookStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(name: &str, url: &str, events: &HashSet<QrEvent>) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation("name must not be empty".to_string()));
    }
    if url.trim().is_empty() {
        return Err(StoreError::Validation("url must not be empty".to_string()));
    }
    if events.is_empty() {
        return Err(StoreError::Validation(
            "at least one event must be selected".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn create(
        &self,
        resource_id: &str,
        spec: NewWebhook,
    ) -> Result<WebhookConfig, StoreError> {
        validate(&spec.name, &spec.url, &spec.events)?;

        let now = OffsetDateTime::now_utc();
        let config = WebhookConfig {
            id: Uuid::new_v4().to_string(),
            resource_id: resource_id.to_string(),
            name: spec.name,
            description: spec.description,
            url: spec.url,
            method: spec.method.unwrap_or_default(),
            headers: spec.headers.unwrap_or_default(),
            static_payload: spec.static_payload,
            events: spec.events,
            secret: spec.secret,
            retry_count: spec.retry_count.unwrap_or(self.default_retry_count),
            retry_delay_ms: spec.retry_delay_ms.unwrap_or(self.default_retry_delay_ms),
            enabled: true,
            last_triggered_at: None,
            last_status: None,
            last_error: None,
            trigger_count: 0,
            created_at: now,
            updated_at: now,
        };

        let mut records = self.records.write().await;
        records.insert(config.id.clone(), config.clone());
        info!(webhook_id = %config.id, resource_id = %resource_id, "Webhook created");
        Ok(config)
    }

    async fn get(&self, id: &str) -> Result<WebhookConfig, StoreError> {
        let records = self.records.read().await;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_by_resource(&self, resource_id: &str) -> Result<Vec<WebhookConfig>, StoreError> {
        let records = self.records.read().await;
        let mut configs: Vec<WebhookConfig> = records
            .values()
            .filter(|c| c.resource_id == resource_id)
            .cloned()
            .collect();
        // Stable dispatch order across calls.
        configs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(configs)
    }

    async fn update(&self, id: &str, patch: WebhookPatch) -> Result<WebhookConfig, StoreError> {
        let mut records = self.records.write().await;
        let config = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let name = patch.name.as_deref().unwrap_or(&config.name);
        let url = patch.url.as_deref().unwrap_or(&config.url);
        let events = patch.events.as_ref().unwrap_or(&config.events);
        validate(name, url, events)?;

        if let Some(name) = patch.name {
            config.name = name;
        }
        if let Some(description) = patch.description {
            config.description = description;
        }
        if let Some(url) = patch.url {
            config.url = url;
        }
        if let Some(method) = patch.method {
            config.method = method;
        }
        if let Some(headers) = patch.headers {
            config.headers = headers;
        }
        if let Some(static_payload) = patch.static_payload {
            config.static_payload = static_payload;
        }
        if let Some(events) = patch.events {
            config.events = events;
        }
        if let Some(secret) = patch.secret {
            config.secret = secret;
        }
        if let Some(retry_count) = patch.retry_count {
            config.retry_count = retry_count;
        }
        if let Some(retry_delay_ms) = patch.retry_delay_ms {
            config.retry_delay_ms = retry_delay_ms;
        }
        if let Some(enabled) = patch.enabled {
            config.enabled = enabled;
        }
        config.updated_at = OffsetDateTime::now_utc();

        debug!(webhook_id = %id, "Webhook updated");
        Ok(config.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        info!(webhook_id = %id, "Webhook deleted");
        Ok(())
    }

    async fn toggle(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let config = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        config.enabled = !config.enabled;
        config.updated_at = OffsetDateTime::now_utc();
        debug!(webhook_id = %id, enabled = config.enabled, "Webhook toggled");
        Ok(config.enabled)
    }

    async fn record_dispatch(&self, id: &str, update: StatsUpdate) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let config = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        config.last_triggered_at = Some(update.triggered_at);
        config.last_status = Some(update.status);
        config.last_error = update.error;
        config.trigger_count += 1;
        Ok(())
    }
}
