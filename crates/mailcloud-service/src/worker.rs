//! Single-consumer worker loop (§4.6): decode, persist, ack, with
//! exponential-backoff retry on transient persistence failures and a
//! bounded retry budget beyond which the record is marked `failed` and
//! dead-lettered by acceptance.

use crate::retry::RetryPolicy;
use futures_util::StreamExt;
use mailcloud_api::ServiceMetrics;
use mailcloud_broker::{into_delivery, BrokerClient};
use mailcloud_core::{EventStatus, WebhookEvent};
use mailcloud_storage::StorageAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-delivery outcome, used for metrics and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Persisted and marked processed; caller should `ack`.
    Processed,
    /// Persist failed but the retry budget is not exhausted; caller
    /// should sleep for `delay` then `nack_requeue`.
    Retrying { delay: std::time::Duration },
    /// Retry budget exhausted; a best-effort failed record was written.
    /// Caller should `ack` regardless (dead-letter by acceptance).
    Failed,
}

/// Tracks in-flight retry counts per `webhook_id` for the lifetime of the
/// worker process. A delivery that is nack-requeued comes back to this
/// same consumer (single consumer per process, per §4.6), so this table
/// is this worker's authoritative view of how many times a given delivery
/// has been retried; nothing outside the process needs to see it.
#[derive(Debug, Default)]
pub struct RetryTracker {
    counts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, webhook_id: &str) -> u32 {
        let mut counts = self.counts.lock().expect("retry tracker mutex poisoned");
        let count = counts.entry(webhook_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn clear(&self, webhook_id: &str) {
        self.counts
            .lock()
            .expect("retry tracker mutex poisoned")
            .remove(webhook_id);
    }
}

/// Decode a delivery body, applying the header-authoritative override for
/// `tenant_id`, `webhook_id`, and `webhook_type` described in §4.6.
pub fn decode_event(
    body: &[u8],
    header_webhook_id: Option<&str>,
    header_webhook_type: Option<&str>,
    header_tenant_id: Option<&str>,
) -> Result<WebhookEvent, serde_json::Error> {
    let mut event: WebhookEvent = serde_json::from_slice(body)?;
    if let Some(webhook_id) = header_webhook_id {
        event.webhook_id = webhook_id.to_string();
    }
    if let Some(webhook_type) = header_webhook_type {
        event.webhook_type = Some(webhook_type.to_string());
    }
    if let Some(tenant_id) = header_tenant_id {
        event.tenant_id = tenant_id.to_string();
    }
    Ok(event)
}

/// Run the persist/retry-decide portion of the state machine for an
/// already-decoded event. Pure of any broker ack/nack I/O, so it is
/// testable against any [`StorageAdapter`] without a live broker
/// connection.
pub async fn persist_and_decide(
    storage: &dyn StorageAdapter,
    retry_tracker: &RetryTracker,
    policy: &RetryPolicy,
    metrics: &ServiceMetrics,
    mut event: WebhookEvent,
) -> DeliveryOutcome {
    match storage.insert(&event).await {
        Ok(()) => {
            if let Err(error) = storage
                .update_status(&event.webhook_id, EventStatus::Processed, event.retry_count)
                .await
            {
                warn!(error = %error, webhook_id = %event.webhook_id, "failed to mark event processed after a successful insert");
            }
            retry_tracker.clear(&event.webhook_id);
            metrics
                .processed_total
                .with_label_values(&[&event.tenant_id, &event.event, "success"])
                .inc();
            DeliveryOutcome::Processed
        }
        Err(error) => {
            let retry_count = retry_tracker.next(&event.webhook_id);
            warn!(error = %error, webhook_id = %event.webhook_id, retry_count, "storage write failed");
            metrics
                .retry_attempts_total
                .with_label_values(&["webhooks"])
                .inc();

            if policy.should_retry(retry_count) {
                event.retry_count = retry_count;
                let delay = policy.delay_for(retry_count);
                DeliveryOutcome::Retrying { delay }
            } else {
                event.retry_count = retry_count;
                event.status = EventStatus::Failed;
                if let Err(error) = storage.insert(&event).await {
                    error!(error = %error, webhook_id = %event.webhook_id, "failed to persist exhausted-retry record; operator replay from the broker dead-letter is required");
                }
                retry_tracker.clear(&event.webhook_id);
                metrics
                    .processed_total
                    .with_label_values(&[&event.tenant_id, &event.event, "failed"])
                    .inc();
                DeliveryOutcome::Failed
            }
        }
    }
}

/// Process one raw broker delivery end to end: decode, persist/retry-decide,
/// then perform the matching ack/nack.
pub async fn handle_delivery(
    storage: &dyn StorageAdapter,
    retry_tracker: &RetryTracker,
    policy: &RetryPolicy,
    metrics: &ServiceMetrics,
    delivery: &mailcloud_broker::BrokerDelivery,
) {
    let started_at = Instant::now();
    let event = match decode_event(
        &delivery.body,
        delivery.webhook_id.as_deref(),
        delivery.webhook_type.as_deref(),
        delivery.tenant_id.as_deref(),
    ) {
        Ok(event) => event,
        Err(error) => {
            warn!(error = %error, "dropping malformed delivery");
            if let Err(error) = delivery.nack_drop().await {
                error!(error = %error, "failed to nack a malformed delivery");
            }
            return;
        }
    };

    let tenant_id = event.tenant_id.clone();
    let event_name = event.event.clone();
    let outcome = persist_and_decide(storage, retry_tracker, policy, metrics, event).await;
    metrics
        .processing_duration_seconds
        .with_label_values(&[&tenant_id, &event_name])
        .observe(started_at.elapsed().as_secs_f64());

    match outcome {
        DeliveryOutcome::Processed | DeliveryOutcome::Failed => {
            if let Err(error) = delivery.ack().await {
                error!(error = %error, "failed to ack a delivery");
            }
        }
        DeliveryOutcome::Retrying { delay } => {
            debug!(delay_secs = delay.as_secs_f64(), "backing off before requeue");
            tokio::time::sleep(delay).await;
            if let Err(error) = delivery.nack_requeue().await {
                error!(error = %error, "failed to nack-requeue a retryable delivery");
            }
        }
    }
}

/// Run the consume loop until the broker's delivery stream ends or
/// `shutdown` resolves. `shutdown` is only raced against waiting for the
/// *next* delivery — a delivery already in flight always runs to
/// completion, matching the worker's shutdown discipline in §4.7
/// ("finish current delivery; do not consume further").
pub async fn run(
    broker: Arc<BrokerClient>,
    storage: Arc<dyn StorageAdapter>,
    policy: RetryPolicy,
    metrics: Arc<ServiceMetrics>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), mailcloud_broker::BrokerError> {
    let retry_tracker = RetryTracker::new();
    let mut consumer = broker.consume("mailcloud-worker").await?;
    tokio::pin!(shutdown);

    info!("worker consume loop started");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received; finishing in-flight work and stopping consumption");
                break;
            }
            item = consumer.next() => {
                let Some(item) = item else { break };
                let Some(delivery) = into_delivery(item) else { continue };
                let started_at = Instant::now();
                handle_delivery(storage.as_ref(), &retry_tracker, &policy, metrics.as_ref(), &delivery).await;
                debug!(elapsed_ms = started_at.elapsed().as_millis(), "delivery handled");
            }
        }
    }
    info!("worker consume loop ended");
    Ok(())
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
