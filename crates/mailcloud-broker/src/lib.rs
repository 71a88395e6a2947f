//! # Mailcloud Broker
//!
//! Durable publish/consume boundary over an AMQP direct exchange and
//! queue (§4.4). This crate knows nothing about tenants, rate limits, or
//! storage — it only knows how to get a [`mailcloud_core::WebhookEvent`]
//! onto the wire and how to hand consumed deliveries back with their
//! metadata headers already parsed.

pub mod client;
pub mod error;
pub mod message;

pub use client::{into_delivery, spawn_queue_depth_probe, BrokerClient, BrokerConfig};
pub use error::BrokerError;
pub use message::{BrokerDelivery, HEADER_TENANT_ID, HEADER_WEBHOOK_ID, HEADER_WEBHOOK_TYPE};
