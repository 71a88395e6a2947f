//! Worker binary: single-consumer AMQP delivery processor (§4.6/§4.7).
//! Startup sequencing mirrors the ingress binary; after startup this
//! binary runs the consume loop until shutdown, then closes the broker
//! connection.

use mailcloud_api::{shutdown_signal, ServiceConfig, ServiceMetrics};
use mailcloud_broker::{BrokerClient, BrokerConfig};
use mailcloud_service::RetryPolicy;
use mailcloud_storage::{MongoStorage, StorageAdapter, StorageConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_CONFIGURATION_ERROR: i32 = 3;
const EXIT_BROKER_CONNECT_FAILURE: i32 = 2;
const EXIT_STORAGE_CONNECT_FAILURE: i32 = 4;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            std::process::exit(EXIT_CONFIGURATION_ERROR);
        }
    };
    if let Err(error) = config.validate() {
        eprintln!("configuration error: {error}");
        std::process::exit(EXIT_CONFIGURATION_ERROR);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "mailcloud_service={0},mailcloud_core={0},mailcloud_broker={0},mailcloud_storage={0}",
                config.log_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting mailcloud worker");

    // Constructed for startup-sequencing symmetry with the ingress binary
    // (§4.7): an invalid tenant configuration should fail the worker's
    // deployment too, even though the consume loop itself never attributes
    // tenants.
    if let Err(error) = mailcloud_service::build_registry(&config.registry).await {
        error!(error = %error, "tenant registry configuration is invalid");
        std::process::exit(EXIT_CONFIGURATION_ERROR);
    }

    let broker_config = BrokerConfig {
        url: config.amqp_url.clone(),
        exchange: config.amqp_exchange.clone(),
        queue: config.amqp_queue.clone(),
    };
    let broker = match BrokerClient::connect(&broker_config).await {
        Ok(broker) => Arc::new(broker),
        Err(error) => {
            error!(error = %error, "failed to connect to the message broker");
            std::process::exit(EXIT_BROKER_CONNECT_FAILURE);
        }
    };

    let storage_config = StorageConfig {
        uri: config.mongodb_uri.clone(),
        database: config.mongodb_database.clone(),
        collection: config.mongodb_collection.clone(),
    };
    let storage: Arc<dyn StorageAdapter> = match MongoStorage::connect(&storage_config).await {
        Ok(storage) => Arc::new(storage),
        Err(error) => {
            error!(error = %error, "failed to connect to the document store");
            std::process::exit(EXIT_STORAGE_CONNECT_FAILURE);
        }
    };

    let policy = RetryPolicy::new(
        config.max_retries,
        Duration::from_secs(config.retry_base_delay_secs),
    );

    // The worker has no HTTP surface of its own (§4.7), so these metrics
    // are tracked in-process without a scrape endpoint; the ingress
    // binary's observability listener is the operator-facing surface.
    let metrics = Arc::new(ServiceMetrics::new().expect("metric registration is infallible at startup"));

    if let Err(error) =
        mailcloud_service::worker::run(broker.clone(), storage, policy, metrics, shutdown_signal()).await
    {
        error!(error = %error, "worker consume loop exited with an error");
    }

    if let Err(error) = broker.close().await {
        error!(error = %error, "failed to close broker connection cleanly");
    }

    info!("mailcloud worker shut down cleanly");
}
