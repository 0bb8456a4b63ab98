use crate::events::QrEvent;
use crate::executor::DeliveryExecutor;
use crate::store::{StatsUpdate, WebhookStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Aggregate result of one `trigger` call, for UI feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Webhooks that matched the event and were dispatched to.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Fans one QR lifecycle event out to every matching webhook.
///
/// Deliveries run strictly sequentially: delivery N+1 does not begin until
/// delivery N, including all of its retries, completes. This keeps the
/// statistics write-back single-writer; do not parallelize without also
/// serializing `record_dispatch`.
pub struct EventDispatcher {
    store: Arc<dyn WebhookStore>,
    executor: DeliveryExecutor,
}

impl EventDispatcher {
    pub fn new(store: Arc<dyn WebhookStore>, executor: DeliveryExecutor) -> Self {
        Self { store, executor }
    }

    /// Dispatch an event for a QR code to all enabled, subscribed webhooks.
    ///
    /// `data` is merged into every delivery payload. Never returns an error:
    /// per-webhook failures are captured in that webhook's stats and logs and
    /// do not abort the remaining webhooks.
    pub async fn trigger(
        &self,
        resource_id: &str,
        event: QrEvent,
        data: &Map<String, Value>,
    ) -> DispatchSummary {
        self.trigger_with_cancel(resource_id, event, data, &CancellationToken::new())
            .await
    }

    /// Like [`trigger`](Self::trigger), but abortable: cancelling the token
    /// stops remaining retries and skips webhooks not yet dispatched.
    pub async fn trigger_with_cancel(
        &self,
        resource_id: &str,
        event: QrEvent,
        data: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> DispatchSummary {
        let configs = match self.store.list_by_resource(resource_id).await {
            Ok(configs) => configs,
            Err(e) => {
                warn!(resource_id = %resource_id, error = %e, "Could not list webhooks, event dropped");
                return DispatchSummary::default();
            }
        };

        let matching: Vec<_> = configs
            .into_iter()
            .filter(|c| c.matches_event(event))
            .collect();

        if matching.is_empty() {
            debug!(resource_id = %resource_id, event = %event, "No webhooks matched");
            return DispatchSummary::default();
        }

        let mut summary = DispatchSummary::default();

        for config in matching {
            if cancel.is_cancelled() {
                info!(
                    resource_id = %resource_id,
                    event = %event,
                    dispatched = summary.attempted,
                    "Dispatch cancelled, remaining webhooks skipped"
                );
                break;
            }

            let outcome = self.executor.execute(&config, event, data, cancel).await;

            // Zero attempts means the token was cancelled before the first
            // request; this webhook was never dispatched to.
            if outcome.attempts == 0 {
                info!(
                    resource_id = %resource_id,
                    event = %event,
                    dispatched = summary.attempted,
                    "Dispatch cancelled, remaining webhooks skipped"
                );
                break;
            }

            summary.attempted += 1;

            if outcome.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }

            let update = if outcome.success {
                StatsUpdate::success(OffsetDateTime::now_utc())
            } else {
                let error = outcome
                    .final_error
                    .unwrap_or_else(|| "Delivery failed".to_string());
                StatsUpdate::failure(error, OffsetDateTime::now_utc())
            };

            // Best-effort: a stats write failure must not abort the
            // remaining webhooks.
            if let Err(e) = self.store.record_dispatch(&config.id, update).await {
                warn!(webhook_id = %config.id, error = %e, "Failed to record dispatch stats");
            }
        }

        info!(
            resource_id = %resource_id,
            event = %event,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Event dispatched"
        );

        summary
    }
}
