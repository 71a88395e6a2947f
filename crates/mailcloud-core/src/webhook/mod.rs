//! Request classification, field extraction, and identity assignment for
//! inbound ESP webhook payloads — the logic behind §4.3 of the
//! specification.
//!
//! This module is transport-agnostic: it consumes a lowercase header map
//! and raw body bytes, and produces either a [`ProcessOutcome::ValidationProbe`]
//! (nothing further to do) or a fully populated [`WebhookEvent`] ready for
//! publication. The HTTP-specific parts (extracting headers from an axum
//! request, mapping errors to status codes) live in `mailcloud-api`.

use crate::registry::TenantRegistry;
use crate::{ListId, PipelineError, WebhookEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// The literal value of the `Webhook-Id` header that marks a vendor
/// URL-validation probe rather than a real event. This is a vendor-specific
/// literal string, not a type, and must be matched exactly.
pub const PROBE_WEBHOOK_ID: &str = "WebhookID";

/// The literal `User-Agent` value the ESP sends for its own
/// validation probes.
pub const PROBE_USER_AGENT: &str = "MailerCloud";

/// Header values relevant to classification and attribution, already
/// extracted from the transport layer with header names lowercased.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    /// Raw `Webhook-Id` header value. `Some("")` means the header was
    /// present but empty, distinct from `None` (header absent).
    pub webhook_id: Option<String>,
    /// Raw `Webhook-Type` header value, if present.
    pub webhook_type: Option<String>,
    /// Raw `User-Agent` header value, if present.
    pub user_agent: Option<String>,
    /// Value of whichever header is configured as the API-key header
    /// (`API_KEY_HEADER`, default `X-API-Key`), if present.
    pub api_key: Option<String>,
}

impl WebhookHeaders {
    /// Build from a lowercase-keyed header map, as produced by the HTTP
    /// layer from an inbound request.
    pub fn from_http_headers(headers: &HashMap<String, String>, api_key_header: &str) -> Self {
        Self {
            webhook_id: headers.get("webhook-id").cloned(),
            webhook_type: headers.get("webhook-type").cloned(),
            user_agent: headers.get("user-agent").cloned(),
            api_key: headers.get(&api_key_header.to_lowercase()).cloned(),
        }
    }
}

/// Result of applying the classification rules in §4.3, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Vendor URL-validation probe; respond `200` without publishing.
    ValidationProbe,
    /// `Webhook-Id` header present (and, by construction, not the probe
    /// literal). May be an empty string if the header was present but
    /// blank.
    VendorWebhook { webhook_id: String },
    /// The configured API-key header was present; validity against the
    /// registry is resolved by [`attribute_tenant`].
    ApiKeyCandidate { api_key: String },
    /// Neither credential was present at all.
    MissingCredential,
}

/// `true` if the request matches any of the three probe conditions: the
/// `Webhook-Id: WebhookID` literal, the `User-Agent: MailerCloud` literal,
/// or a JSON object body that is empty or holds exactly one `test` field.
pub fn is_validation_probe(headers: &WebhookHeaders, body_json: Option<&Value>) -> bool {
    if headers.webhook_id.as_deref() == Some(PROBE_WEBHOOK_ID) {
        return true;
    }
    if headers.user_agent.as_deref() == Some(PROBE_USER_AGENT) {
        return true;
    }
    if let Some(Value::Object(fields)) = body_json {
        if fields.is_empty() {
            return true;
        }
        if fields.len() == 1 && fields.contains_key("test") {
            return true;
        }
    }
    false
}

/// Classify an inbound request, first match wins.
pub fn classify(headers: &WebhookHeaders, body_json: Option<&Value>) -> Classification {
    if is_validation_probe(headers, body_json) {
        return Classification::ValidationProbe;
    }

    // `is_validation_probe` returning false guarantees, by construction,
    // that `webhook_id` is not `Some(PROBE_WEBHOOK_ID)` here.
    if let Some(webhook_id) = &headers.webhook_id {
        return Classification::VendorWebhook {
            webhook_id: webhook_id.clone(),
        };
    }

    if let Some(api_key) = &headers.api_key {
        return Classification::ApiKeyCandidate {
            api_key: api_key.clone(),
        };
    }

    Classification::MissingCredential
}

/// Resolve a non-probe [`Classification`] to a `tenant_id`, per §4.3's
/// "Tenant attribution for branches 2 and 3".
///
/// # Panics
///
/// Panics if called with [`Classification::ValidationProbe`]; probes are
/// handled before attribution and never reach this function.
pub fn attribute_tenant(
    classification: &Classification,
    registry: &TenantRegistry,
) -> Result<String, PipelineError> {
    match classification {
        Classification::ValidationProbe => {
            unreachable!("validation probes are handled before tenant attribution")
        }
        Classification::VendorWebhook { webhook_id } => {
            if webhook_id.is_empty() {
                // Anonymous-vendor fallback (see DESIGN.md): a header that
                // is present but carries no value can't be used as a
                // fallback tenant identifier either.
                Ok("unknown".to_string())
            } else {
                Ok(registry
                    .lookup_tenant_by_webhook(webhook_id)
                    .unwrap_or_else(|| webhook_id.clone()))
            }
        }
        Classification::ApiKeyCandidate { api_key } => registry
            .lookup_tenant_by_key(api_key)
            .ok_or_else(|| PipelineError::Unauthenticated {
                reason: "Invalid API key".to_string(),
            }),
        Classification::MissingCredential => Err(PipelineError::Unauthenticated {
            reason: "Missing API key".to_string(),
        }),
    }
}

/// Fields pulled out of the JSON body per the key-alias rules in §4.3.
/// `None`/empty means the field was absent or every alias was empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub event: Option<String>,
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    pub tag_name: Option<String>,
    pub url: Option<String>,
    pub reason: Option<String>,
    pub timestamp: Option<i64>,
    pub timestamp_event: Option<i64>,
    pub email: Option<String>,
    pub emails: Vec<String>,
    pub list_id: Option<ListId>,
}

fn first_non_empty_string(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        body.get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn extract_numeric(body: &Value, key: &str) -> Option<i64> {
    let value = body.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

/// Extract the fields described in §4.3 from a parsed JSON body. Unknown
/// fields are discarded silently by construction (only named keys are
/// ever read).
pub fn extract_fields(body: &Value) -> ExtractedFields {
    let emails = body
        .get("emails")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let list_id = body
        .get("list_id")
        .cloned()
        .and_then(|value| serde_json::from_value::<ListId>(value).ok());

    ExtractedFields {
        event: first_non_empty_string(body, &["event"]),
        campaign_id: first_non_empty_string(body, &["campaign_id", "camp_id"]),
        campaign_name: first_non_empty_string(body, &["campaign_name", "campaign name"]),
        tag_name: first_non_empty_string(body, &["tag_name", "tag"]),
        url: first_non_empty_string(body, &["URL", "url", "click_url"]),
        reason: first_non_empty_string(body, &["reason"]),
        timestamp: extract_numeric(body, "ts"),
        timestamp_event: extract_numeric(body, "ts_event"),
        email: first_non_empty_string(body, &["email"]),
        emails,
        list_id,
    }
}

/// Body keys that, if present as a non-empty string, are used verbatim as
/// the `webhook_id`.
const IDENTITY_FIELDS: [&str; 5] = [
    "webhook_id",
    "message_id",
    "event_id",
    "delivery_id",
    "tracking_id",
];

fn composite_identity(fields: &ExtractedFields) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(campaign_id) = &fields.campaign_id {
        parts.push(campaign_id.clone());
    }
    if let Some(email) = &fields.email {
        parts.push(email.clone());
    }
    if let Some(ts) = fields.timestamp {
        parts.push(ts.to_string());
    }
    if let Some(event) = &fields.event {
        parts.push(event.clone());
    }

    if parts.is_empty() {
        return None;
    }

    // unit separator keeps component boundaries unambiguous in the hex dump
    let joined = parts.join("\u{1f}");
    Some(format!("mc_{}", hex::encode(joined.as_bytes())))
}

static LAST_FALLBACK_NANOS: AtomicU64 = AtomicU64::new(0);

fn fallback_monotonic_identity() -> String {
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let mut last = LAST_FALLBACK_NANOS.load(Ordering::SeqCst);
    loop {
        let candidate = if now_nanos > last { now_nanos } else { last + 1 };
        match LAST_FALLBACK_NANOS.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => return format!("mc_{candidate}"),
            Err(actual) => last = actual,
        }
    }
}

/// Assign a `webhook_id` per §4.3's three-tier rule: a verbatim identity
/// field from the body, else a deterministic composite, else a monotonic
/// fallback.
pub fn assign_webhook_id(body: &Value, fields: &ExtractedFields) -> String {
    for key in IDENTITY_FIELDS {
        if let Some(value) = body.get(key).and_then(Value::as_str) {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    composite_identity(fields).unwrap_or_else(fallback_monotonic_identity)
}

/// Outcome of running a request through the full pipeline in
/// [`process_webhook`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Matched a validation-probe condition; caller should respond `200`
    /// without publishing anything.
    ValidationProbe,
    /// A fully populated event, ready to publish.
    Event(WebhookEvent),
}

/// Run classification, attribution, extraction, and identity assignment
/// end to end, producing either a probe acknowledgement or a
/// publish-ready [`WebhookEvent`].
///
/// Rate limiting is deliberately not performed here — it runs after
/// attribution per §4.3, and the caller (the ingress handler) owns the
/// tenant's [`crate::RateLimiter`] and its tier lookup.
pub fn process_webhook(
    registry: &TenantRegistry,
    headers: &WebhookHeaders,
    body_bytes: &[u8],
) -> Result<ProcessOutcome, PipelineError> {
    let body_json: Option<Value> = serde_json::from_slice(body_bytes).ok();

    let classification = classify(headers, body_json.as_ref());
    if classification == Classification::ValidationProbe {
        return Ok(ProcessOutcome::ValidationProbe);
    }

    let tenant_id = attribute_tenant(&classification, registry)?;

    let body = body_json.ok_or_else(|| PipelineError::InvalidPayload {
        message: "request body is not valid JSON".to_string(),
    })?;
    if !body.is_object() {
        return Err(PipelineError::InvalidPayload {
            message: "request body must be a JSON object".to_string(),
        });
    }

    let fields = extract_fields(&body);
    let webhook_id = assign_webhook_id(&body, &fields);

    let mut event = WebhookEvent::new(webhook_id, tenant_id, fields.event.clone().unwrap_or_default());
    event.webhook_type = headers.webhook_type.clone();
    event.campaign_id = fields.campaign_id;
    event.campaign_name = fields.campaign_name;
    event.tag_name = fields.tag_name;
    event.url = fields.url;
    event.reason = fields.reason;
    event.timestamp = fields.timestamp;
    event.timestamp_event = fields.timestamp_event;
    event.email = fields.email;
    event.emails = fields.emails;
    event.list_id = fields.list_id;

    Ok(ProcessOutcome::Event(event))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
