// Outbound webhook delivery engine for QR lifecycle events.
//
// Independent components (no dependency on the dispatch path):
//   events, signer, retry, log, store, templates
//
// Delivery path components:
//   http       – single-attempt HTTP transport
//   executor   – retry loop around the transport, writes delivery logs
//   dispatcher – fans one event out to every matching webhook, sequentially
//   harness    – one-shot, unlogged "Test" delivery for the configuration UI

pub mod config;
pub mod dispatcher;
pub mod events;
pub mod executor;
pub mod harness;
pub mod http;
pub mod log;
pub mod retry;
pub mod signer;
pub mod store;
pub mod telemetry;
pub mod templates;

// Re-export commonly used types
pub use config::EngineConfig;
pub use dispatcher::{DispatchSummary, EventDispatcher};
pub use events::QrEvent;
pub use executor::{DeliveryExecutor, DeliveryOutcome};
pub use harness::{TestHarness, TestOutcome};
pub use http::{HttpError, WebhookHttpClient};
pub use log::{DeliveryLog, DeliveryLogStore, InMemoryDeliveryLog, LogError};
pub use retry::RetryPolicy;
pub use signer::{SignatureScheme, SignatureSigner};
pub use store::{
    HttpMethod, InMemoryWebhookStore, LastStatus, NewWebhook, StatsUpdate, StoreError,
    WebhookConfig, WebhookPatch, WebhookStore,
};
pub use templates::{Template, builtin_templates};
