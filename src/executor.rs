use crate::config::EngineConfig;
use crate::events::QrEvent;
use crate::http::{AttemptResponse, HttpError, WebhookHttpClient};
use crate::log::{DeliveryLog, DeliveryLogStore};
use crate::retry::RetryPolicy;
use crate::signer::SignatureSigner;
use crate::store::WebhookConfig;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Response bodies are truncated to this many characters before being
/// surfaced in logs and test results.
pub const RESPONSE_SNIPPET_MAX: usize = 500;

/// Outcome of one logical delivery (initial attempt plus retries).
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,

    /// Status of the last attempt; absent when it never got a response.
    pub final_status: Option<u16>,

    /// Error of the last attempt; absent on success.
    pub final_error: Option<String>,

    /// Total wall time across all attempts, including backoff sleeps.
    pub duration_ms: u64,

    /// HTTP attempts actually executed. Zero when the delivery was cancelled
    /// before the first attempt.
    pub attempts: u32,
}

/// Runs the retry loop for one webhook delivery and records the result.
///
/// Each `execute` call is self-contained blocking-style async work (request
/// plus optional backoff sleeps); callers that must not stall other work
/// should spawn it on its own task.
pub struct DeliveryExecutor {
    http: WebhookHttpClient,
    signer: SignatureSigner,
    logs: Arc<dyn DeliveryLogStore>,
}

impl DeliveryExecutor {
    /// Executor with the default per-attempt timeout and HMAC signing.
    pub fn new(logs: Arc<dyn DeliveryLogStore>) -> Result<Self, HttpError> {
        Ok(Self {
            http: WebhookHttpClient::new()?,
            signer: SignatureSigner::new(),
            logs,
        })
    }

    /// Executor configured from [`EngineConfig`].
    pub fn with_config(
        logs: Arc<dyn DeliveryLogStore>,
        config: &EngineConfig,
    ) -> Result<Self, HttpError> {
        Ok(Self {
            http: WebhookHttpClient::with_timeout(config.request_timeout())?,
            signer: SignatureSigner::new(),
            logs,
        })
    }

    /// Override the signature scheme.
    pub fn with_signer(mut self, signer: SignatureSigner) -> Self {
        self.signer = signer;
        self
    }

    /// Deliver one event to one webhook, retrying per the webhook's policy.
    ///
    /// Never returns an error: the outcome (including exhausted-retry
    /// failures) is reported in the returned [`DeliveryOutcome`] and as one
    /// [`DeliveryLog`] entry. Cancelling `cancel` aborts remaining attempts;
    /// a delivery cancelled before any attempt ran leaves no log entry.
    pub async fn execute(
        &self,
        config: &WebhookConfig,
        event: QrEvent,
        data: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let policy = RetryPolicy::new(config.retry_count, config.retry_delay_ms);
        let payload = Value::Object(build_payload(config, event.as_str(), data));
        let body = payload.to_string();
        let headers = build_headers(config, &body, &self.signer);
        let body_for_send = config.method.has_body().then_some(body.as_str());

        let started = Instant::now();
        let mut final_status: Option<u16> = None;
        let mut final_body: Option<String> = None;
        let mut final_error: Option<String> = None;
        let mut success = false;
        let mut attempts_made: u32 = 0;

        'attempts: for attempt in 0..policy.total_attempts() {
            if cancel.is_cancelled() {
                final_error = Some("Delivery cancelled".to_string());
                break;
            }
            attempts_made += 1;

            debug!(
                webhook_id = %config.id,
                event = %event,
                attempt = attempt + 1,
                total_attempts = policy.total_attempts(),
                "Delivery attempt"
            );

            match self
                .http
                .send(config.method, &config.url, &headers, body_for_send)
                .await
            {
                Ok(AttemptResponse { status, body }) => {
                    info!(
                        webhook_id = %config.id,
                        event = %event,
                        attempt = attempt + 1,
                        status,
                        "Webhook delivered"
                    );
                    final_status = Some(status);
                    final_body = Some(body);
                    final_error = None;
                    success = true;
                    break;
                }
                Err(err) => {
                    final_status = err.status();
                    final_body = err.body().map(str::to_string);
                    final_error = Some(err.to_string());

                    match policy.delay_after(attempt) {
                        Some(delay) => {
                            warn!(
                                webhook_id = %config.id,
                                event = %event,
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Delivery attempt failed, will retry"
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    final_error = Some("Delivery cancelled".to_string());
                                    break 'attempts;
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => {
                            warn!(
                                webhook_id = %config.id,
                                event = %event,
                                attempts = attempt + 1,
                                error = %err,
                                "Delivery failed permanently"
                            );
                        }
                    }
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;

        // A log entry records an executed attempt sequence; a delivery
        // cancelled before its first attempt has nothing to log.
        if attempts_made > 0 {
            let entry = DeliveryLog {
                id: Uuid::new_v4(),
                webhook_id: config.id.clone(),
                resource_id: config.resource_id.clone(),
                event,
                timestamp: OffsetDateTime::now_utc(),
                request_url: config.url.clone(),
                request_method: config.method,
                request_payload: payload,
                response_status: final_status,
                response_body: final_body.as_deref().map(truncate_snippet),
                success,
                error: final_error.clone(),
                duration_ms,
            };

            // Logging is best-effort: a delivery that cannot be logged was
            // still attempted, and its outcome still reaches the webhook's
            // stats.
            if let Err(e) = self.logs.append(entry).await {
                warn!(webhook_id = %config.id, error = %e, "Failed to record delivery log");
            }
        }

        DeliveryOutcome {
            success,
            final_status,
            final_error,
            duration_ms,
            attempts: attempts_made,
        }
    }
}

/// Assemble the delivery payload: the standard envelope, then the webhook's
/// static fields, then the event data. Later sources override earlier keys.
pub(crate) fn build_payload(
    config: &WebhookConfig,
    event: &str,
    data: &Map<String, Value>,
) -> Map<String, Value> {
    let now = OffsetDateTime::now_utc();
    let timestamp = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());

    let mut payload = Map::new();
    payload.insert("event".to_string(), Value::String(event.to_string()));
    payload.insert(
        "resource_id".to_string(),
        Value::String(config.resource_id.clone()),
    );
    payload.insert("timestamp".to_string(), Value::String(timestamp));
    payload.insert("webhook_id".to_string(), Value::String(config.id.clone()));

    if let Some(static_payload) = &config.static_payload {
        for (key, value) in static_payload {
            payload.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in data {
        payload.insert(key.clone(), value.clone());
    }

    payload
}

/// Assemble request headers: content type, then the webhook's own headers,
/// then the signing headers when a secret is configured. Each header name
/// appears once; a later source replaces an earlier value, so a webhook can
/// override the default content type.
pub(crate) fn build_headers(
    config: &WebhookConfig,
    body: &str,
    signer: &SignatureSigner,
) -> Vec<(String, String)> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    for (name, value) in &config.headers {
        upsert_header(&mut headers, name, value);
    }

    if let Some(secret) = &config.secret {
        upsert_header(&mut headers, "X-Webhook-Secret", secret);
        upsert_header(&mut headers, "X-Webhook-Signature", &signer.sign(body, secret));
    }

    headers
}

// Header names are case-insensitive.
fn upsert_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
        Some((_, existing)) => *existing = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

pub(crate) fn truncate_snippet(body: &str) -> String {
    body.chars().take(RESPONSE_SNIPPET_MAX).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{InMemoryDeliveryLog, LogError};
    use crate::store::HttpMethod;
    use serde_json::json;
    use std::collections::HashSet;

    fn sample_config() -> WebhookConfig {
        let now = OffsetDateTime::now_utc();
        WebhookConfig {
            id: "wh-1".to_string(),
            resource_id: "qr-1".to_string(),
            name: "Test hook".to_string(),
            description: None,
            url: "https://example.com/hook".to_string(),
            method: HttpMethod::Post,
            headers: vec![],
            static_payload: None,
            events: [QrEvent::Scan].into_iter().collect::<HashSet<_>>(),
            secret: None,
            retry_count: 2,
            retry_delay_ms: 1,
            enabled: true,
            last_triggered_at: None,
            last_status: None,
            last_error: None,
            trigger_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_payload_envelope_fields() {
        let config = sample_config();
        let data = Map::new();
        let payload = build_payload(&config, "scan", &data);

        assert_eq!(payload["event"], "scan");
        assert_eq!(payload["resource_id"], "qr-1");
        assert_eq!(payload["webhook_id"], "wh-1");
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn test_payload_merge_precedence() {
        let mut config = sample_config();
        let mut static_payload = Map::new();
        static_payload.insert("source".to_string(), json!("static"));
        static_payload.insert("channel".to_string(), json!("qr"));
        config.static_payload = Some(static_payload);

        let mut data = Map::new();
        data.insert("source".to_string(), json!("event"));
        data.insert("scans".to_string(), json!(42));

        let payload = build_payload(&config, "scan", &data);

        // Event data wins over static fields
        assert_eq!(payload["source"], "event");
        assert_eq!(payload["channel"], "qr");
        assert_eq!(payload["scans"], 42);
    }

    #[test]
    fn test_headers_without_secret() {
        let config = sample_config();
        let headers = build_headers(&config, "{}", &SignatureSigner::new());

        assert_eq!(
            headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn test_headers_with_secret_and_custom_headers() {
        let mut config = sample_config();
        config.headers = vec![("X-Custom".to_string(), "yes".to_string())];
        config.secret = Some("hunter2".to_string());

        let signer = SignatureSigner::new();
        let headers = build_headers(&config, r#"{"event":"scan"}"#, &signer);

        assert_eq!(headers[0].0, "Content-Type");
        assert_eq!(headers[1], ("X-Custom".to_string(), "yes".to_string()));
        assert_eq!(
            headers[2],
            ("X-Webhook-Secret".to_string(), "hunter2".to_string())
        );
        assert_eq!(headers[3].0, "X-Webhook-Signature");
        assert_eq!(
            headers[3].1,
            signer.sign(r#"{"event":"scan"}"#, "hunter2")
        );
    }

    #[test]
    fn test_custom_content_type_replaces_default() {
        let mut config = sample_config();
        config.headers = vec![(
            "content-type".to_string(),
            "application/vnd.custom+json".to_string(),
        )];

        let headers = build_headers(&config, "{}", &SignatureSigner::new());

        let content_types: Vec<_> = headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(content_types[0].1, "application/vnd.custom+json");
    }

    #[test]
    fn test_truncate_snippet() {
        let long = "x".repeat(RESPONSE_SNIPPET_MAX + 100);
        assert_eq!(truncate_snippet(&long).len(), RESPONSE_SNIPPET_MAX);
        assert_eq!(truncate_snippet("short"), "short");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_logs_one_failed_entry() {
        let logs = Arc::new(InMemoryDeliveryLog::new());
        let executor = DeliveryExecutor::new(logs.clone()).expect("executor");

        let mut config = sample_config();
        config.url = "http://127.0.0.1:19996/hook".to_string(); // Nothing listening here
        config.retry_count = 1;

        let outcome = executor
            .execute(&config, QrEvent::Scan, &Map::new(), &CancellationToken::new())
            .await;

        assert!(!outcome.success);
        assert!(outcome.final_status.is_none());
        assert!(outcome.final_error.is_some());

        // One entry for the whole logical delivery, not one per attempt
        assert_eq!(logs.count().await.expect("count"), 1);
        let entry = &logs.for_webhook("wh-1", 10).await.expect("query")[0];
        assert!(!entry.success);
        assert!(entry.response_status.is_none());
        assert_eq!(entry.error, outcome.final_error);
    }

    #[tokio::test]
    async fn test_malformed_url_still_burns_retry_budget() {
        let logs = Arc::new(InMemoryDeliveryLog::new());
        let executor = DeliveryExecutor::new(logs.clone()).expect("executor");

        let mut config = sample_config();
        config.url = "not a url".to_string();
        config.retry_count = 2;
        config.retry_delay_ms = 10;

        let started = Instant::now();
        let outcome = executor
            .execute(&config, QrEvent::Scan, &Map::new(), &CancellationToken::new())
            .await;

        assert!(!outcome.success);
        // Two backoff sleeps (10ms + 20ms) prove all three attempts ran.
        assert!(started.elapsed() >= std::time::Duration::from_millis(30));
        assert_eq!(logs.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_first_attempt() {
        let logs = Arc::new(InMemoryDeliveryLog::new());
        let executor = DeliveryExecutor::new(logs.clone()).expect("executor");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let config = sample_config();
        let outcome = executor
            .execute(&config, QrEvent::Scan, &Map::new(), &cancel)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.final_error.as_deref(), Some("Delivery cancelled"));
        // No attempt ran, so no delivery log entry either
        assert_eq!(outcome.attempts, 0);
        assert_eq!(logs.count().await.expect("count"), 0);
    }

    struct FailingLogStore;

    #[async_trait::async_trait]
    impl DeliveryLogStore for FailingLogStore {
        async fn append(&self, _entry: DeliveryLog) -> Result<(), LogError> {
            Err(LogError::Backend("log store offline".to_string()))
        }

        async fn for_webhook(
            &self,
            _webhook_id: &str,
            _limit: usize,
        ) -> Result<Vec<DeliveryLog>, LogError> {
            Ok(vec![])
        }

        async fn for_resource(
            &self,
            _resource_id: &str,
            _limit: usize,
        ) -> Result<Vec<DeliveryLog>, LogError> {
            Ok(vec![])
        }

        async fn clear_for_webhook(&self, _webhook_id: &str) -> Result<usize, LogError> {
            Ok(0)
        }

        async fn clear_all(&self) -> Result<(), LogError> {
            Ok(())
        }

        async fn count(&self) -> Result<usize, LogError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_failing_log_store_does_not_abort_delivery() {
        let executor = DeliveryExecutor::new(Arc::new(FailingLogStore)).expect("executor");

        let mut config = sample_config();
        config.url = "http://127.0.0.1:19989/hook".to_string(); // Nothing listening here
        config.retry_count = 0;

        let outcome = executor
            .execute(&config, QrEvent::Scan, &Map::new(), &CancellationToken::new())
            .await;

        // The append failure is swallowed; the outcome still comes back intact
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.final_error.is_some());
    }
}
