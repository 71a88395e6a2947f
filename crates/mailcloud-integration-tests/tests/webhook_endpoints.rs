//! End-to-end checks for webhook ingestion: attribution, acceptance, and
//! the vendor validation-probe short-circuit.

mod common;

use common::{delivered_webhook_payload, http_client, itests_enabled, IngressHarness, TENANT_API_KEY, TENANT_ID};

#[tokio::test]
async fn a_valid_webhook_is_accepted_and_attributed_to_its_tenant() {
    if !itests_enabled() {
        return;
    }

    let harness = IngressHarness::start().await.expect("start harness");
    let client = http_client();

    let response = client
        .post(harness.url("/webhook"))
        .header("X-API-Key", TENANT_API_KEY)
        .json(&delivered_webhook_payload("mc_itest_1"))
        .send()
        .await
        .expect("POST /webhook");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["tenant_id"], TENANT_ID);
    assert_eq!(body["webhook_id"], "mc_itest_1");

    let metrics = client
        .get(format!("{}/metrics", harness.observability_base_url))
        .send()
        .await
        .expect("GET /metrics");
    let metrics_body = metrics.text().await.expect("metrics body");
    assert!(metrics_body.contains("mailcloud_webhook_received_total"));
    assert!(metrics_body.contains("mailcloud_webhook_processed_total"));
}

#[tokio::test]
async fn a_validation_probe_is_acknowledged_without_a_tenant_credential() {
    if !itests_enabled() {
        return;
    }

    let harness = IngressHarness::start().await.expect("start harness");
    let client = http_client();

    let response = client
        .post(harness.url("/webhook"))
        .header("User-Agent", "MailerCloud")
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("POST /webhook");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn an_unknown_api_key_is_rejected() {
    if !itests_enabled() {
        return;
    }

    let harness = IngressHarness::start().await.expect("start harness");
    let client = http_client();

    let response = client
        .post(harness.url("/webhook"))
        .header("X-API-Key", "not-a-real-key")
        .json(&delivered_webhook_payload("mc_itest_2"))
        .send()
        .await
        .expect("POST /webhook");

    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn a_missing_credential_is_rejected() {
    if !itests_enabled() {
        return;
    }

    let harness = IngressHarness::start().await.expect("start harness");
    let client = http_client();

    let response = client
        .post(harness.url("/webhook"))
        .json(&delivered_webhook_payload("mc_itest_3"))
        .send()
        .await
        .expect("POST /webhook");

    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn a_non_object_json_body_is_rejected_as_invalid() {
    if !itests_enabled() {
        return;
    }

    let harness = IngressHarness::start().await.expect("start harness");
    let client = http_client();

    let response = client
        .post(harness.url("/webhook"))
        .header("X-API-Key", TENANT_API_KEY)
        .header("Content-Type", "application/json")
        .body("[1, 2, 3]")
        .send()
        .await
        .expect("POST /webhook");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}
