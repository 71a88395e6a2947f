//! Durable direct-exchange / durable-queue AMQP client.
//!
//! Topology: one durable direct exchange bound to one durable queue with an
//! empty routing key, declared idempotently on connect. Publication uses
//! persistent delivery mode and a 5-second per-call timeout; consumption
//! uses manual acknowledgement (no auto-ack) so the worker controls
//! redelivery.

use crate::error::BrokerError;
use crate::message::{metadata_headers, persistent_json_properties, BrokerDelivery};
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use mailcloud_core::WebhookEvent;
use std::time::Duration;
use tracing::{debug, info};

/// Per-call publish timeout, per §4.4.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between queue-depth probes, per §4.4.
pub const QUEUE_DEPTH_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Connection parameters for the message broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// AMQP connection URL (`CLOUDAMQP_URL`, falling back to `RABBITMQ_URI`).
    pub url: String,
    /// Durable direct exchange name (`RABBITMQ_EXCHANGE`).
    pub exchange: String,
    /// Durable queue name (`RABBITMQ_QUEUE`).
    pub queue: String,
}

/// A connected broker client, holding one AMQP channel for the process
/// lifetime. Reconnection on a dropped connection is `lapin`'s
/// responsibility, not this client's (§7).
pub struct BrokerClient {
    channel: Channel,
    connection: Connection,
    exchange: String,
    queue: String,
}

impl BrokerClient {
    /// Connect and idempotently declare the exchange/queue/binding
    /// topology described in §4.4.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let connection =
            Connection::connect(&config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            exchange = %config.exchange,
            queue = %config.queue,
            "connected to broker and declared topology"
        );

        Ok(Self {
            channel,
            connection,
            exchange: config.exchange.clone(),
            queue: config.queue.clone(),
        })
    }

    /// Marshal `event` as JSON, attach the three metadata headers, and
    /// publish with persistent delivery mode. Bounded by
    /// [`PUBLISH_TIMEOUT`]; a publish that doesn't complete in time is
    /// reported as [`BrokerError::PublishTimeout`].
    pub async fn publish(&self, event: &WebhookEvent) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(event)?;
        let headers = metadata_headers(
            &event.webhook_id,
            event.webhook_type.as_deref(),
            &event.tenant_id,
        );
        let properties = persistent_json_properties(headers);

        let publish = self.channel.basic_publish(
            &self.exchange,
            "",
            BasicPublishOptions::default(),
            &payload,
            properties,
        );

        let confirm = tokio::time::timeout(PUBLISH_TIMEOUT, async {
            publish.await?.await
        })
        .await
        .map_err(|_| BrokerError::PublishTimeout {
            timeout_secs: PUBLISH_TIMEOUT.as_secs(),
        })??;

        if confirm.is_nack() {
            return Err(BrokerError::PublishNotConfirmed);
        }

        debug!(webhook_id = %event.webhook_id, tenant_id = %event.tenant_id, "published event");
        Ok(())
    }

    /// Start consuming the queue in manual-ack mode.
    pub async fn consume(&self, consumer_tag: &str) -> Result<Consumer, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }

    /// Current queue depth (messages ready + unacked), via a passive
    /// `queue_declare`.
    pub async fn queue_depth(&self) -> Result<u32, BrokerError> {
        let queue = self
            .channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    passive: true,
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(queue.message_count())
    }

    /// Close the publisher channel and the underlying connection, in that
    /// order, as part of graceful shutdown (§4.7).
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.channel
            .close(200, "shutting down")
            .await?;
        self.connection
            .close(200, "shutting down")
            .await?;
        Ok(())
    }
}

/// Convert a raw `lapin` consumer item into a [`BrokerDelivery`], logging
/// and returning `None` for a consumer-level error (e.g. the channel was
/// closed) so the caller's `while let Some(delivery) = stream.next()`
/// loop can simply skip it.
pub fn into_delivery(item: Result<lapin::message::Delivery, lapin::Error>) -> Option<BrokerDelivery> {
    match item {
        Ok(delivery) => Some(BrokerDelivery::from_lapin(delivery)),
        Err(error) => {
            tracing::warn!(error = %error, "broker consumer stream yielded an error");
            None
        }
    }
}

/// Spawn a background task that polls [`BrokerClient::queue_depth`] every
/// [`QUEUE_DEPTH_PROBE_INTERVAL`] and reports the result through
/// `on_depth`, decoupling this crate from the metrics crate's types.
pub fn spawn_queue_depth_probe(
    client: std::sync::Arc<BrokerClient>,
    mut on_depth: impl FnMut(u32) + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(QUEUE_DEPTH_PROBE_INTERVAL);
        loop {
            ticker.tick().await;
            match client.queue_depth().await {
                Ok(depth) => on_depth(depth),
                Err(error) => {
                    tracing::warn!(error = %error, "failed to probe queue depth");
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
