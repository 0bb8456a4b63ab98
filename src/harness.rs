use crate::executor::{build_headers, build_payload, truncate_snippet};
use crate::http::{AttemptResponse, HttpError, WebhookHttpClient};
use crate::signer::SignatureSigner;
use crate::store::WebhookConfig;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::debug;

/// Result of a one-shot test delivery.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub success: bool,
    pub status: Option<u16>,
    /// Response body, truncated to [`crate::executor::RESPONSE_SNIPPET_MAX`]
    /// characters.
    pub response_snippet: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// One-shot delivery for the configuration UI's "Test" button.
///
/// Unlike the real dispatch path this makes exactly one attempt, marks the
/// payload with `"test": true`, and touches neither the delivery log nor the
/// webhook's statistics.
pub struct TestHarness {
    http: WebhookHttpClient,
    signer: SignatureSigner,
}

impl TestHarness {
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self {
            http: WebhookHttpClient::new()?,
            signer: SignatureSigner::new(),
        })
    }

    /// Override the signature scheme.
    pub fn with_signer(mut self, signer: SignatureSigner) -> Self {
        self.signer = signer;
        self
    }

    /// Send a single test request to the candidate configuration.
    pub async fn send_test(&self, config: &WebhookConfig) -> TestOutcome {
        let mut payload = build_payload(config, "test", &Map::new());
        payload.insert("test".to_string(), Value::Bool(true));
        let body = Value::Object(payload).to_string();
        let headers = build_headers(config, &body, &self.signer);
        let body_for_send = config.method.has_body().then_some(body.as_str());

        debug!(webhook_id = %config.id, url = %config.url, "Sending test delivery");

        let started = Instant::now();
        let result = self
            .http
            .send(config.method, &config.url, &headers, body_for_send)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(AttemptResponse { status, body }) => TestOutcome {
                success: true,
                status: Some(status),
                response_snippet: Some(truncate_snippet(&body)),
                error: None,
                duration_ms,
            },
            Err(err) => TestOutcome {
                success: false,
                status: err.status(),
                response_snippet: err.body().map(truncate_snippet),
                error: Some(err.to_string()),
                duration_ms,
            },
        }
    }
}
