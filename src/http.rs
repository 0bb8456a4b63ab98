use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::HttpMethod;

/// Default per-attempt request timeout. A timed-out attempt counts as a
/// network failure and is subject to the normal retry policy.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on how much of a response body is read.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Error type for a single delivery attempt.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP request failed: {0}")]
    Request(String),
}

impl HttpError {
    /// Status code of the failed attempt, when the endpoint answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body of the failed attempt, when one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            HttpError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Successful attempt: a 2xx response.
#[derive(Debug, Clone)]
pub struct AttemptResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP client wrapper for webhook delivery. One attempt per call; retry
/// lives in the executor.
#[derive(Debug, Clone)]
pub struct WebhookHttpClient {
    client: Client,
    timeout: Duration,
}

impl WebhookHttpClient {
    /// Client with the default per-attempt timeout.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("QrWebhooks/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Request(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform one HTTP attempt. `body` is `None` for GET deliveries.
    pub async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(String, String)],
        body: Option<&str>,
    ) -> Result<AttemptResponse, HttpError> {
        debug!(url = %url, method = %method, "Sending webhook request");

        let reqwest_method = match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        };

        let mut request = self.client.request(reqwest_method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Webhook request failed");
            self.classify(e)
        })?;

        let status = response.status();
        let body = read_body(response).await?;

        debug!(url = %url, status = %status.as_u16(), "Webhook response received");

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(AttemptResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::Timeout(self.timeout)
        } else if err.is_connect() {
            HttpError::Network(err.to_string())
        } else {
            HttpError::Request(err.to_string())
        }
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, HttpError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| HttpError::Request(format!("Failed to read response body: {e}")))?;

    if bytes.len() > MAX_BODY_SIZE {
        warn!(
            size = bytes.len(),
            max_size = MAX_BODY_SIZE,
            "Response body too large, truncating"
        );
    }

    Ok(String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_SIZE)]).to_string())
}
