//! # Mailcloud Ingress HTTP Service
//!
//! HTTP surface for the webhook pipeline: request classification, tenant
//! attribution, rate limiting, and publication to the broker (§4.3). Health
//! and metrics are served from a separate listener per §4.7/§6, so
//! operational scraping is never subject to the same request handling as
//! the webhook path.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use mailcloud_broker::BrokerClient;
use mailcloud_core::{PipelineError, ProcessOutcome, RateLimiter, TenantRegistry, WebhookHeaders};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

pub use config::ServiceConfig;
pub use errors::WebhookHandlerError;
pub use metrics::ServiceMetrics;
pub use responses::{
    HealthResponse, ValidationProbeResponse, WebhookAcceptedResponse, WebhookReadinessResponse,
};

/// Shared application state for the ingress router.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TenantRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub broker: Arc<BrokerClient>,
    pub metrics: Arc<ServiceMetrics>,
    pub api_key_header: String,
    pub webhook_debug: bool,
    debug_dump: Option<Arc<AsyncMutex<std::fs::File>>>,
}

impl AppState {
    pub fn new(
        registry: Arc<TenantRegistry>,
        rate_limiter: Arc<RateLimiter>,
        broker: Arc<BrokerClient>,
        metrics: Arc<ServiceMetrics>,
        api_key_header: String,
        webhook_debug: bool,
    ) -> Self {
        let debug_dump = if webhook_debug {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open("mailcloud-webhook-debug.jsonl")
            {
                Ok(file) => Some(Arc::new(AsyncMutex::new(file))),
                Err(error) => {
                    warn!(error = %error, "failed to open webhook debug dump file; diagnostic mirroring disabled");
                    None
                }
            }
        } else {
            None
        };

        Self {
            registry,
            rate_limiter,
            broker,
            metrics,
            api_key_header,
            webhook_debug,
            debug_dump,
        }
    }
}

/// Build the ingress router: `GET /webhook` and `POST /webhook`. Health
/// and metrics are intentionally not mounted here — they belong to the
/// separate observability listener built by [`observability_router`].
pub fn ingress_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(webhook_readiness))
        .route("/webhook", post(handle_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the observability router served on `PROMETHEUS_PORT`: `/health`
/// and `/metrics`, network-restricted by deployment, not by this code.
pub fn observability_router(metrics: Arc<ServiceMetrics>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(metrics)
}

/// Serve the ingress router on `APP_PORT`, draining in-flight requests for
/// up to 5 seconds on shutdown signal, per §4.7.
pub async fn run_ingress(port: u16, state: AppState) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ingress listening");
    axum::serve(listener, ingress_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Serve the health/metrics router on `PROMETHEUS_PORT`.
pub async fn run_observability(port: u16, metrics: Arc<ServiceMetrics>) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "observability listening");
    axum::serve(listener, observability_router(metrics))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Wait for SIGINT or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse::default())
}

async fn handle_metrics(State(metrics): State<Arc<ServiceMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(error) => {
            error!(error = %error, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn webhook_readiness() -> impl IntoResponse {
    Json(WebhookReadinessResponse::default())
}

fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response, WebhookHandlerError> {
    let started_at = Instant::now();
    let raw_headers = lowercase_headers(&headers);
    let webhook_headers = WebhookHeaders::from_http_headers(&raw_headers, &state.api_key_header);

    if state.webhook_debug {
        mirror_debug_payload(&state, &body).await;
    }

    let outcome = mailcloud_core::process_webhook(&state.registry, &webhook_headers, &body)?;

    let event = match outcome {
        ProcessOutcome::ValidationProbe => {
            return Ok((StatusCode::OK, Json(ValidationProbeResponse::default())).into_response());
        }
        ProcessOutcome::Event(event) => event,
    };

    state
        .metrics
        .received_total
        .with_label_values(&[&event.tenant_id, &event.event])
        .inc();

    let tier = state.registry.tier(&event.tenant_id);
    if !state.rate_limiter.allow(&event.tenant_id, tier) {
        state
            .metrics
            .rate_limit_rejections_total
            .with_label_values(&[&event.tenant_id])
            .inc();
        state
            .metrics
            .processed_total
            .with_label_values(&[&event.tenant_id, &event.event, "rate_limited"])
            .inc();
        return Err(WebhookHandlerError(PipelineError::RateLimited {
            tenant_id: event.tenant_id,
        }));
    }

    let publish_result = state.broker.publish(&event).await;
    let elapsed = started_at.elapsed();
    state
        .metrics
        .processing_duration_seconds
        .with_label_values(&[&event.tenant_id, &event.event])
        .observe(elapsed.as_secs_f64());

    if let Err(error) = publish_result {
        state
            .metrics
            .publish_failures_total
            .with_label_values(&["webhooks"])
            .inc();
        state
            .metrics
            .processed_total
            .with_label_values(&[&event.tenant_id, &event.event, "publish_failed"])
            .inc();
        return Err(WebhookHandlerError(PipelineError::TransientUpstream {
            upstream: "broker".to_string(),
            message: error.to_string(),
        }));
    }

    state
        .metrics
        .processed_total
        .with_label_values(&[&event.tenant_id, &event.event, "accepted"])
        .inc();

    Ok((
        StatusCode::OK,
        Json(WebhookAcceptedResponse::new(event.webhook_id, event.tenant_id)),
    )
        .into_response())
}

/// Best-effort diagnostic mirroring of the raw inbound payload, gated by
/// `WEBHOOK_DEBUG`. Failures are logged and swallowed; this never changes
/// response semantics (§4.3).
async fn mirror_debug_payload(state: &AppState, body: &Bytes) {
    let Some(dump) = &state.debug_dump else {
        return;
    };
    debug!(bytes = body.len(), "mirroring inbound webhook payload to debug dump");
    let mut file = dump.lock().await;
    if let Err(error) = writeln!(file, "{}", String::from_utf8_lossy(body)) {
        warn!(error = %error, "failed to write webhook debug dump entry");
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
