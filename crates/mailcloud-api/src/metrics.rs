//! Prometheus metrics for the ingress and worker, per the observability
//! requirements of §4.3, §4.4, and §4.6.
//!
//! Metrics are registered on a private [`prometheus::Registry`] rather
//! than the process-global default registry, so a test (or an embedder)
//! can construct more than one [`ServiceMetrics`] without a duplicate-name
//! registration conflict.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Service metrics, constructed once at process startup.
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,
    /// `(tenant_id, event)` — incremented once per accepted, non-probe request.
    pub received_total: IntCounterVec,
    /// `(tenant_id, event, status)` — incremented once the pipeline reaches
    /// a terminal outcome for the request.
    pub processed_total: IntCounterVec,
    /// `(tenant_id, event)` — wall-clock processing time per request.
    pub processing_duration_seconds: HistogramVec,
    /// `(tenant_id)` — incremented when a request is rejected by the rate limiter.
    pub rate_limit_rejections_total: IntCounterVec,
    /// Incremented when a broker publish fails.
    pub publish_failures_total: IntCounterVec,
    /// `(queue)` — incremented per worker retry attempt.
    pub retry_attempts_total: IntCounterVec,
    /// Labelled by queue name; queue depth as observed by the broker
    /// client's background probe.
    pub queue_depth: IntGaugeVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let received_total = IntCounterVec::new(
            Opts::new(
                "mailcloud_webhook_received_total",
                "Webhook requests accepted for processing",
            ),
            &["tenant_id", "event"],
        )?;
        let processed_total = IntCounterVec::new(
            Opts::new(
                "mailcloud_webhook_processed_total",
                "Webhook requests reaching a terminal outcome",
            ),
            &["tenant_id", "event", "status"],
        )?;
        let processing_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mailcloud_webhook_processing_duration_seconds",
                "End-to-end ingress processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["tenant_id", "event"],
        )?;
        let rate_limit_rejections_total = IntCounterVec::new(
            Opts::new(
                "mailcloud_webhook_rate_limited_total",
                "Requests rejected by the per-tenant rate limiter",
            ),
            &["tenant_id"],
        )?;
        let publish_failures_total = IntCounterVec::new(
            Opts::new(
                "mailcloud_broker_publish_failures_total",
                "Broker publish failures",
            ),
            &["exchange"],
        )?;
        let retry_attempts_total = IntCounterVec::new(
            Opts::new(
                "mailcloud_worker_retry_attempts_total",
                "Worker retry attempts by queue",
            ),
            &["queue"],
        )?;
        let queue_depth = IntGaugeVec::new(
            Opts::new(
                "mailcloud_broker_queue_depth",
                "Messages waiting in the broker queue",
            ),
            &["queue"],
        )?;

        registry.register(Box::new(received_total.clone()))?;
        registry.register(Box::new(processed_total.clone()))?;
        registry.register(Box::new(processing_duration_seconds.clone()))?;
        registry.register(Box::new(rate_limit_rejections_total.clone()))?;
        registry.register(Box::new(publish_failures_total.clone()))?;
        registry.register(Box::new(retry_attempts_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            received_total,
            processed_total,
            processing_duration_seconds,
            rate_limit_rejections_total,
            publish_failures_total,
            retry_attempts_total,
            queue_depth,
        })
    }

    /// Render this registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|error| prometheus::Error::Msg(error.to_string()))
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
