use super::*;
use async_trait::async_trait;
use mailcloud_storage::StorageError;
use std::sync::atomic::{AtomicU32, Ordering};

fn test_metrics() -> ServiceMetrics {
    ServiceMetrics::new().expect("metric registration")
}

fn sample_event(webhook_id: &str) -> WebhookEvent {
    WebhookEvent::new(
        webhook_id.to_string(),
        "tenant-1".to_string(),
        "delivered".to_string(),
    )
}

fn storage_error() -> StorageError {
    use serde::ser::Error as _;
    StorageError::Encode(bson::ser::Error::custom("storage unavailable"))
}

#[test]
fn decode_event_applies_header_overrides() {
    let body = serde_json::json!({
        "webhook_id": "mc_body",
        "tenant_id": "tenant-from-body",
        "event": "delivered",
    });
    let event = decode_event(
        body.to_string().as_bytes(),
        Some("mc_header"),
        Some("opened"),
        Some("tenant-from-header"),
    )
    .expect("decodes");

    assert_eq!(event.webhook_id, "mc_header");
    assert_eq!(event.tenant_id, "tenant-from-header");
    assert_eq!(event.webhook_type.as_deref(), Some("opened"));
}

#[test]
fn decode_event_keeps_body_values_when_headers_absent() {
    let body = serde_json::json!({
        "webhook_id": "mc_body",
        "tenant_id": "tenant-from-body",
        "event": "delivered",
    });
    let event = decode_event(body.to_string().as_bytes(), None, None, None).expect("decodes");
    assert_eq!(event.webhook_id, "mc_body");
    assert_eq!(event.tenant_id, "tenant-from-body");
}

#[test]
fn decode_event_rejects_malformed_json() {
    assert!(decode_event(b"not json", None, None, None).is_err());
}

struct AlwaysSucceeds;

#[async_trait]
impl StorageAdapter for AlwaysSucceeds {
    async fn insert(&self, _event: &WebhookEvent) -> Result<(), StorageError> {
        Ok(())
    }
    async fn update_status(
        &self,
        _webhook_id: &str,
        _status: EventStatus,
        _retry_count: u32,
    ) -> Result<(), StorageError> {
        Ok(())
    }
    async fn get_failed(&self, _tenant_id: &str) -> Result<Vec<WebhookEvent>, StorageError> {
        Ok(Vec::new())
    }
}

struct AlwaysFails;

#[async_trait]
impl StorageAdapter for AlwaysFails {
    async fn insert(&self, _event: &WebhookEvent) -> Result<(), StorageError> {
        Err(storage_error())
    }
    async fn update_status(
        &self,
        _webhook_id: &str,
        _status: EventStatus,
        _retry_count: u32,
    ) -> Result<(), StorageError> {
        Ok(())
    }
    async fn get_failed(&self, _tenant_id: &str) -> Result<Vec<WebhookEvent>, StorageError> {
        Ok(Vec::new())
    }
}

struct FailsNTimes {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl StorageAdapter for FailsNTimes {
    async fn insert(&self, _event: &WebhookEvent) -> Result<(), StorageError> {
        if self.remaining_failures.load(Ordering::SeqCst) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            Err(storage_error())
        } else {
            Ok(())
        }
    }
    async fn update_status(
        &self,
        _webhook_id: &str,
        _status: EventStatus,
        _retry_count: u32,
    ) -> Result<(), StorageError> {
        Ok(())
    }
    async fn get_failed(&self, _tenant_id: &str) -> Result<Vec<WebhookEvent>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn successful_persist_marks_processed_and_clears_retry_state() {
    let storage = AlwaysSucceeds;
    let tracker = RetryTracker::new();
    let policy = RetryPolicy::default();
    let metrics = test_metrics();

    let outcome = persist_and_decide(&storage, &tracker, &policy, &metrics, sample_event("mc_1")).await;
    assert_eq!(outcome, DeliveryOutcome::Processed);
    assert_eq!(tracker.next("mc_1"), 1); // cleared, so the next count starts fresh at 1
}

#[tokio::test]
async fn persist_failure_within_budget_requests_a_retry() {
    let storage = AlwaysFails;
    let tracker = RetryTracker::new();
    let policy = RetryPolicy::new(3, std::time::Duration::from_millis(1));
    let metrics = test_metrics();

    let outcome = persist_and_decide(&storage, &tracker, &policy, &metrics, sample_event("mc_2")).await;
    match outcome {
        DeliveryOutcome::Retrying { .. } => {}
        other => panic!("expected Retrying, got {other:?}"),
    }
}

#[tokio::test]
async fn persist_failure_beyond_budget_marks_failed() {
    let storage = AlwaysFails;
    let tracker = RetryTracker::new();
    let policy = RetryPolicy::new(2, std::time::Duration::from_millis(1));
    let metrics = test_metrics();

    for _ in 0..2 {
        let outcome =
            persist_and_decide(&storage, &tracker, &policy, &metrics, sample_event("mc_3")).await;
        assert!(matches!(outcome, DeliveryOutcome::Retrying { .. }));
    }

    let outcome = persist_and_decide(&storage, &tracker, &policy, &metrics, sample_event("mc_3")).await;
    assert_eq!(outcome, DeliveryOutcome::Failed);
}

#[tokio::test]
async fn a_later_success_recovers_from_earlier_failures() {
    let storage = FailsNTimes {
        remaining_failures: AtomicU32::new(2),
    };
    let tracker = RetryTracker::new();
    let policy = RetryPolicy::new(3, std::time::Duration::from_millis(1));
    let metrics = test_metrics();

    for _ in 0..2 {
        let outcome =
            persist_and_decide(&storage, &tracker, &policy, &metrics, sample_event("mc_4")).await;
        assert!(matches!(outcome, DeliveryOutcome::Retrying { .. }));
    }

    let outcome = persist_and_decide(&storage, &tracker, &policy, &metrics, sample_event("mc_4")).await;
    assert_eq!(outcome, DeliveryOutcome::Processed);
}
