use super::*;

#[test]
fn new_event_is_pending_with_zero_retries() {
    let event = WebhookEvent::new("mc_1".into(), "tenant-1".into(), "delivered".into());
    assert_eq!(event.status, EventStatus::Pending);
    assert_eq!(event.retry_count, 0);
    assert_eq!(event.webhook_id, "mc_1");
    assert_eq!(event.tenant_id, "tenant-1");
    assert_eq!(event.event, "delivered");
}

#[test]
fn pending_may_move_to_any_non_terminal_or_terminal_state() {
    let pending = EventStatus::Pending;
    assert!(pending.can_transition_to(EventStatus::Processed));
    assert!(pending.can_transition_to(EventStatus::Failed));
    assert!(pending.can_transition_to(EventStatus::Retrying));
}

#[test]
fn retrying_may_move_back_to_pending_or_to_a_terminal_state() {
    let retrying = EventStatus::Retrying;
    assert!(retrying.can_transition_to(EventStatus::Pending));
    assert!(retrying.can_transition_to(EventStatus::Processed));
    assert!(retrying.can_transition_to(EventStatus::Failed));
}

#[test]
fn terminal_states_accept_no_further_transition() {
    assert!(!EventStatus::Processed.can_transition_to(EventStatus::Pending));
    assert!(!EventStatus::Processed.can_transition_to(EventStatus::Retrying));
    assert!(!EventStatus::Failed.can_transition_to(EventStatus::Processed));
}

#[test]
fn list_id_round_trips_scalar_number_and_sequence_shapes() {
    let text: ListId = serde_json::from_value(serde_json::json!("abc")).unwrap();
    assert_eq!(text, ListId::Text("abc".into()));

    let number: ListId = serde_json::from_value(serde_json::json!(42)).unwrap();
    assert_eq!(number, ListId::Number(42));

    let seq: ListId = serde_json::from_value(serde_json::json!(["a", 1])).unwrap();
    assert_eq!(seq, ListId::Sequence(vec![ListId::Text("a".into()), ListId::Number(1)]));
}

#[test]
fn empty_sequence_list_id_is_reported_empty() {
    let seq = ListId::Sequence(vec![]);
    assert!(seq.is_empty_sequence());
    assert!(!ListId::Text("x".into()).is_empty_sequence());
}

#[test]
fn webhook_event_omits_unset_optional_fields_when_serialized() {
    let event = WebhookEvent::new("mc_1".into(), "tenant-1".into(), "delivered".into());
    let value = serde_json::to_value(&event).unwrap();
    let obj = value.as_object().unwrap();
    assert!(!obj.contains_key("campaign_id"));
    assert!(!obj.contains_key("email"));
    assert!(!obj.contains_key("emails"));
    assert!(!obj.contains_key("updated_at"));
}

#[test]
fn transient_upstream_is_the_only_retryable_category() {
    let transient = PipelineError::TransientUpstream {
        upstream: "broker".into(),
        message: "timeout".into(),
    };
    assert!(transient.is_transient());
    assert_eq!(transient.error_category(), ErrorCategory::Transient);

    let permanent = PipelineError::InvalidPayload {
        message: "bad json".into(),
    };
    assert!(!permanent.is_transient());
    assert_eq!(permanent.error_category(), ErrorCategory::Permanent);
}
