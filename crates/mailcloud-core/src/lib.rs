//! # Mailcloud Core
//!
//! Domain logic for the mailcloud webhook ingestion pipeline: the
//! `WebhookEvent` record, the tenant registry, the per-tenant rate limiter,
//! and the request-classification/field-extraction rules that turn an
//! inbound ESP payload into a `WebhookEvent`.
//!
//! ## Architecture
//!
//! Business logic here depends only on trait abstractions (`Broker`,
//! `Storage` are defined in their own crates); this crate has no network or
//! database dependency of its own beyond the registry's best-effort ESP
//! sync.
//!
//! ## Usage
//!
//! ```rust
//! use mailcloud_core::{EventStatus, WebhookEvent};
//!
//! let event = WebhookEvent::new("mc_abc123".to_string(), "tenant-1".to_string(), "delivered".to_string());
//! assert_eq!(event.status, EventStatus::Pending);
//! assert_eq!(event.retry_count, 0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod rate_limiter;
pub mod registry;
pub mod webhook;

pub use rate_limiter::{RateLimiter, Tier};
pub use registry::{TenantRegistration, TenantRegistry, WebhookBinding};
pub use webhook::{process_webhook, Classification, ProcessOutcome, WebhookHeaders};

/// Standard result type for mailcloud-core operations.
pub type MailcloudResult<T> = Result<T, PipelineError>;

// ============================================================================
// WebhookEvent
// ============================================================================

/// Processing status of a persisted [`WebhookEvent`].
///
/// Transitions are monotonic forward from `Pending` except `Retrying`,
/// which may move back to `Pending`, `Processed`, or `Failed`. `Processed`
/// and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
    Retrying,
}

impl EventStatus {
    /// Whether `self` is a valid status to transition to, starting from `self`.
    ///
    /// Terminal states (`Processed`, `Failed`) accept no further transition.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        use EventStatus::*;
        match self {
            Pending => matches!(next, Processed | Failed | Retrying),
            Retrying => matches!(next, Pending | Processed | Failed),
            Processed | Failed => false,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Pending => "pending",
            EventStatus::Processed => "processed",
            EventStatus::Failed => "failed",
            EventStatus::Retrying => "retrying",
        };
        write!(f, "{s}")
    }
}

/// Polymorphic `list_id`: the ESP may send a scalar string, a number, or an
/// ordered sequence of either. The stored shape mirrors the received shape
/// verbatim, so this is modeled as a pass-through tagged variant rather than
/// coerced to a single Rust type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListId {
    Text(String),
    Number(i64),
    Sequence(Vec<ListId>),
}

impl ListId {
    /// `true` for an empty sequence; used by the storage adapter to decide
    /// whether to omit the field entirely.
    pub fn is_empty_sequence(&self) -> bool {
        matches!(self, ListId::Sequence(items) if items.is_empty())
    }
}

/// The central record of the pipeline: one email-service-provider event,
/// attributed to a tenant, as it travels from ingress through the broker to
/// storage.
///
/// A persisted record always has `webhook_id`, `tenant_id`, `event`,
/// `received_at`, and `status` set; every other field is optional and, per
/// the storage adapter's `insert` contract, omitted entirely from the
/// stored document when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub webhook_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_type: Option<String>,
    pub tenant_id: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_event: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<ListId>,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    pub status: EventStatus,
}

impl WebhookEvent {
    /// Build a fresh, `Pending` event as created by the ingress handler on
    /// successful field extraction. `received_at` is stamped with the
    /// current time.
    pub fn new(webhook_id: String, tenant_id: String, event: String) -> Self {
        Self {
            webhook_id,
            webhook_type: None,
            tenant_id,
            event,
            campaign_id: None,
            campaign_name: None,
            tag_name: None,
            date_event: None,
            timestamp: None,
            timestamp_event: None,
            email: None,
            emails: Vec::new(),
            url: None,
            reason: None,
            list_id: None,
            received_at: Utc::now(),
            updated_at: None,
            retry_count: 0,
            status: EventStatus::Pending,
        }
    }
}

// ============================================================================
// Error taxonomy
// ============================================================================

/// Coarse category used for monitoring/alerting dashboards; finer detail
/// lives in the `thiserror` message itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Permanent,
    Transient,
    Configuration,
    Security,
}

/// Error taxonomy shared by the ingress handler and the worker.
///
/// Every variant maps to exactly one outcome per §7 of the specification:
/// the ingress never retries in-process, and the worker retries only
/// `TransientUpstream` failures, bounded by its configured retry budget.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Request body failed to parse as JSON, or required fields were
    /// missing. Maps to `400` at ingress; never published, never retried.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// No valid credential was found for the request. Maps to `401`.
    #[error("unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// Tenant has exceeded its rate limit. Maps to `429`.
    #[error("rate limited: tenant '{tenant_id}' exceeded its quota")]
    RateLimited { tenant_id: String },

    /// A downstream dependency (broker publish, storage write) failed in a
    /// way expected to be transient. Maps to `500` at ingress, or a worker
    /// retry.
    #[error("transient upstream failure in {upstream}: {message}")]
    TransientUpstream { upstream: String, message: String },

    /// The worker exhausted its retry budget. The record is marked
    /// `failed` and the delivery is acked; an operator must replay it from
    /// storage.
    #[error("permanent processing failure after {attempts} attempt(s): {message}")]
    PermanentProcessing { attempts: u32, message: String },

    /// A broker delivery's body could not be decoded at all. Nacked
    /// without requeue to avoid a poison-message loop.
    #[error("malformed delivery: {message}")]
    MalformedDelivery { message: String },

    /// Misconfiguration discovered at startup or at a component boundary.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl PipelineError {
    /// Whether this error represents a transient condition that a caller
    /// may legitimately retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientUpstream { .. })
    }

    /// Coarse category for monitoring and alerting.
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPayload { .. } => ErrorCategory::Permanent,
            Self::Unauthenticated { .. } => ErrorCategory::Security,
            Self::RateLimited { .. } => ErrorCategory::Permanent,
            Self::TransientUpstream { .. } => ErrorCategory::Transient,
            Self::PermanentProcessing { .. } => ErrorCategory::Permanent,
            Self::MalformedDelivery { .. } => ErrorCategory::Permanent,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Error type for input validation failures, used by the registry's packed
/// string parser and by request field validation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{field}' is required")]
    Required { field: String },

    #[error("field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
