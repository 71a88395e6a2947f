use super::*;
use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;

#[test]
fn lowercase_headers_normalizes_header_names() {
    let mut headers = HeaderMap::new();
    headers.insert("Webhook-Id", "abc123".parse().unwrap());
    headers.insert("User-Agent", "MailerCloud".parse().unwrap());

    let lowered = lowercase_headers(&headers);
    assert_eq!(lowered.get("webhook-id").map(String::as_str), Some("abc123"));
    assert_eq!(lowered.get("user-agent").map(String::as_str), Some("MailerCloud"));
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let metrics = Arc::new(ServiceMetrics::new().expect("metrics register"));
    let router = observability_router(metrics);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_renders_text_exposition_format() {
    let metrics = Arc::new(ServiceMetrics::new().expect("metrics register"));
    metrics
        .received_total
        .with_label_values(&["tenant-1", "delivered"])
        .inc();
    let router = observability_router(metrics);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
