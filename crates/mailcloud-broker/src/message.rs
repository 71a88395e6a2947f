//! Wire-level message shape: the three metadata headers duplicated onto
//! every delivery so the worker can read tenant/webhook attribution
//! without decoding the JSON body first.

use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::BasicProperties;

/// Header name carrying the event's `webhook_id`.
pub const HEADER_WEBHOOK_ID: &str = "webhook_id";
/// Header name carrying the event's `webhook_type`.
pub const HEADER_WEBHOOK_TYPE: &str = "webhook_type";
/// Header name carrying the event's `tenant_id`.
pub const HEADER_TENANT_ID: &str = "tenant_id";

/// Build the AMQP header table duplicating the three attribution fields
/// onto the delivery, per §4.4.
pub fn metadata_headers(webhook_id: &str, webhook_type: Option<&str>, tenant_id: &str) -> FieldTable {
    let mut table = FieldTable::default();
    table.insert(
        HEADER_WEBHOOK_ID.into(),
        AMQPValue::LongString(webhook_id.into()),
    );
    if let Some(webhook_type) = webhook_type {
        table.insert(
            HEADER_WEBHOOK_TYPE.into(),
            AMQPValue::LongString(webhook_type.into()),
        );
    }
    table.insert(
        HEADER_TENANT_ID.into(),
        AMQPValue::LongString(tenant_id.into()),
    );
    table
}

/// Standard properties for a persistently-delivered JSON message.
pub fn persistent_json_properties(headers: FieldTable) -> BasicProperties {
    BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2) // persistent
        .with_headers(headers)
}

/// A single consumed delivery, with the metadata headers already pulled
/// out for the worker's use and the raw `lapin` delivery retained for
/// ack/nack.
pub struct BrokerDelivery {
    pub body: Vec<u8>,
    pub webhook_id: Option<String>,
    pub webhook_type: Option<String>,
    pub tenant_id: Option<String>,
    inner: Delivery,
}

fn header_as_string(headers: &FieldTable, key: &str) -> Option<String> {
    headers.inner().get(key).and_then(|value| match value {
        AMQPValue::LongString(s) => Some(s.to_string()),
        AMQPValue::ShortString(s) => Some(s.to_string()),
        _ => None,
    })
}

impl BrokerDelivery {
    pub(crate) fn from_lapin(delivery: Delivery) -> Self {
        let headers = delivery
            .properties
            .headers()
            .clone()
            .unwrap_or_default();

        Self {
            body: delivery.data.clone(),
            webhook_id: header_as_string(&headers, HEADER_WEBHOOK_ID),
            webhook_type: header_as_string(&headers, HEADER_WEBHOOK_TYPE),
            tenant_id: header_as_string(&headers, HEADER_TENANT_ID),
            inner: delivery,
        }
    }

    /// Acknowledge successful processing.
    pub async fn ack(&self) -> Result<(), lapin::Error> {
        self.inner.ack(BasicAckOptions::default()).await
    }

    /// Reject without requeueing — used for malformed deliveries that
    /// would otherwise poison-loop.
    pub async fn nack_drop(&self) -> Result<(), lapin::Error> {
        self.inner
            .nack(BasicNackOptions {
                requeue: false,
                ..BasicNackOptions::default()
            })
            .await
    }

    /// Reject and requeue — used when a retryable processing failure has
    /// not yet exhausted its retry budget.
    pub async fn nack_requeue(&self) -> Result<(), lapin::Error> {
        self.inner
            .nack(BasicNackOptions {
                requeue: true,
                ..BasicNackOptions::default()
            })
            .await
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
