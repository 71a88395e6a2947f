//! Ingress binary: HTTP webhook surface plus a separate metrics listener
//! (§4.7). Startup sequencing: load and validate configuration, init
//! logging, build the tenant registry (best-effort ESP sync), connect the
//! broker and declare topology, connect storage and ensure indexes, then
//! start both HTTP listeners.

use mailcloud_api::{run_ingress, run_observability, AppState, ServiceConfig, ServiceMetrics};
use mailcloud_broker::{BrokerClient, BrokerConfig};
use mailcloud_core::RateLimiter;
use mailcloud_storage::{MongoStorage, StorageConfig};
use std::sync::Arc;
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
            format!("mailcloud_api={0},mailcloud_core={0},mailcloud_broker={0}", config.log_level).into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting mailcloud ingress");

    let registry = match mailcloud_service::build_registry(&config.registry).await {
        Ok(registry) => registry,
        Err(error) => {
            error!(error = %error, "tenant registry configuration is invalid");
            std::process::exit(EXIT_CONFIGURATION_ERROR);
        }
    };

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
    if let Err(error) = MongoStorage::connect(&storage_config).await {
        error!(error = %error, "failed to connect to the document store");
        std::process::exit(EXIT_STORAGE_CONNECT_FAILURE);
    }

    let metrics = Arc::new(ServiceMetrics::new().expect("metric registration is infallible at startup"));

    let broker_for_probe = broker.clone();
    let metrics_for_probe = metrics.clone();
    mailcloud_broker::spawn_queue_depth_probe(broker_for_probe, move |depth| {
        metrics_for_probe
            .queue_depth
            .with_label_values(&["all"])
            .set(depth as i64);
    });

    let state = AppState::new(
        Arc::new(registry),
        Arc::new(RateLimiter::new()),
        broker.clone(),
        metrics.clone(),
        config.api_key_header.clone(),
        config.webhook_debug,
    );

    let (ingress_result, observability_result) = tokio::join!(
        run_ingress(config.app_port, state),
        run_observability(config.prometheus_port, metrics),
    );

    if let Err(error) = ingress_result {
        error!(error = %error, "ingress HTTP server exited with an error");
    }
    if let Err(error) = observability_result {
        error!(error = %error, "observability HTTP server exited with an error");
    }

    if let Err(error) = broker.close().await {
        error!(error = %error, "failed to close broker connection cleanly");
    }

    info!("mailcloud ingress shut down cleanly");
}
