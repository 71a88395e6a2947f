//! JSON response bodies for the ingress HTTP surface, per §6.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookReadinessResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub service: &'static str,
}

impl Default for WebhookReadinessResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            message: "Webhook endpoint is ready",
            service: "mailcloud-webhooks",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationProbeResponse {
    pub success: bool,
    pub message: &'static str,
}

impl Default for ValidationProbeResponse {
    fn default() -> Self {
        Self {
            success: true,
            message: "Webhook validation successful",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAcceptedResponse {
    pub webhook_id: String,
    pub tenant_id: String,
    pub message: &'static str,
}

impl WebhookAcceptedResponse {
    pub fn new(webhook_id: String, tenant_id: String) -> Self {
        Self {
            webhook_id,
            tenant_id,
            message: "Event accepted",
        }
    }
}
