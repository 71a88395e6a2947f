//! # Mailcloud Storage
//!
//! The document-store boundary (§4.5): one MongoDB collection holding
//! persisted [`WebhookEvent`]s, with the indexes the specification names
//! created idempotently at startup.

pub mod error;

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mailcloud_core::{EventStatus, WebhookEvent};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use std::time::Duration;

pub use error::StorageError;

/// Connection parameters and tuning for the document store, matching the
/// environment variables in §6 and the connection tuning named in §4.5.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

/// Persistence operations the worker and operational tooling need. A
/// trait so the worker can be unit-tested against an in-memory
/// implementation without a live MongoDB instance.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Write only the fields that are set on `event`; empty strings, a
    /// `None` unstructured `list_id`, and empty sequences are omitted from
    /// the stored document rather than written as empty values.
    async fn insert(&self, event: &WebhookEvent) -> Result<(), StorageError>;

    /// Update the status and retry count of every document matching
    /// `webhook_id` (duplicates from redelivery are tolerated, not
    /// deduplicated), stamping `updated_at` to now.
    async fn update_status(
        &self,
        webhook_id: &str,
        status: EventStatus,
        retry_count: u32,
    ) -> Result<(), StorageError>;

    /// All `failed` events for a tenant, for operational replay.
    async fn get_failed(&self, tenant_id: &str) -> Result<Vec<WebhookEvent>, StorageError>;
}

/// MongoDB-backed [`StorageAdapter`].
pub struct MongoStorage {
    collection: Collection<Document>,
}

impl MongoStorage {
    /// Connect with the pool/timeout tuning named in §4.5 and ensure the
    /// required indexes exist before returning, so the collection is
    /// query-ready before the ingress accepts traffic.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.max_pool_size = Some(100);
        options.max_idle_time = Some(Duration::from_secs(30));
        options.connect_timeout = Some(Duration::from_secs(10));
        options.server_selection_timeout = Some(Duration::from_secs(10));
        options.app_name = Some("mailcloud-webhooks".to_string());

        let client = Client::with_options(options)?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        let storage = Self { collection };
        storage.ensure_indexes().await?;
        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "connected to document store and ensured indexes"
        );
        Ok(storage)
    }

    async fn ensure_indexes(&self) -> Result<(), StorageError> {
        let models = vec![
            IndexModel::builder().keys(doc! { "webhook_id": 1 }).build(),
            IndexModel::builder().keys(doc! { "tenant_id": 1 }).build(),
            IndexModel::builder()
                .keys(doc! { "received_at": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "campaign_id": 1, "tenant_id": 1, "event": 1 })
                .options(IndexOptions::builder().sparse(true).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "status": 1, "tenant_id": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "email": 1, "campaign_id": 1 })
                .options(IndexOptions::builder().sparse(true).build())
                .build(),
        ];

        self.collection.create_indexes(models).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MongoStorage {
    async fn insert(&self, event: &WebhookEvent) -> Result<(), StorageError> {
        let mut document = bson::to_document(event)?;

        // `ListId` is untagged, so serde's `skip_serializing_if` can't
        // reach into it; an empty sequence must be dropped by hand to
        // honor the "empty sequences are omitted" rule in §4.5.
        let omit_list_id = event
            .list_id
            .as_ref()
            .is_some_and(|list_id| list_id.is_empty_sequence());
        if omit_list_id {
            document.remove("list_id");
        }

        self.collection.insert_one(document).await?;
        Ok(())
    }

    async fn update_status(
        &self,
        webhook_id: &str,
        status: EventStatus,
        retry_count: u32,
    ) -> Result<(), StorageError> {
        let filter = doc! { "webhook_id": webhook_id };
        let update = doc! {
            "$set": {
                "status": status.to_string(),
                "retry_count": retry_count as i64,
                "updated_at": bson::DateTime::now(),
            }
        };
        self.collection.update_many(filter, update).await?;
        Ok(())
    }

    async fn get_failed(&self, tenant_id: &str) -> Result<Vec<WebhookEvent>, StorageError> {
        let filter = doc! { "tenant_id": tenant_id, "status": "failed" };
        let mut cursor = self.collection.find(filter).await?;
        let mut events = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            events.push(bson::from_document(document)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
