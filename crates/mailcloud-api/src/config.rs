//! Environment-driven configuration for the ingress and worker binaries,
//! matching the keys in §6 of the specification.

use mailcloud_core::registry::RegistryConfig;
use std::collections::HashMap;
use std::env;

/// Top-level service configuration, assembled once at startup and
/// validated eagerly so a misconfigured deployment fails fast rather than
/// at the first request.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub app_port: u16,
    pub prometheus_port: u16,
    pub log_level: String,

    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub mongodb_collection: String,

    pub amqp_url: String,
    pub amqp_exchange: String,
    pub amqp_queue: String,

    pub api_key_header: String,
    pub webhook_debug: bool,

    pub registry: RegistryConfig,

    pub max_retries: u32,
    pub retry_base_delay_secs: u64,
}

/// Configuration-shape errors discovered at startup; every variant maps to
/// a distinct non-zero exit code per §6.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable '{name}' is not valid: {message}")]
    Invalid { name: String, message: String },

    #[error("tenant registry configuration is invalid: {0}")]
    Registry(#[from] mailcloud_core::ValidationError),
}

impl ServiceConfig {
    /// Load configuration from the process environment. Ports and
    /// booleans fall back to documented defaults; string values fall back
    /// to empty and are expected to be validated by the caller before the
    /// broker/storage connections are attempted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_port = parse_port("APP_PORT", 8080)?;
        let prometheus_port = parse_port("PROMETHEUS_PORT", 9090)?;

        let amqp_url = env::var("CLOUDAMQP_URL")
            .or_else(|_| env::var("RABBITMQ_URI"))
            .unwrap_or_default();

        let packed_tenants = env::var("MAILERCLOUD_API_KEYS").unwrap_or_default();
        let extra_tenant_keys = extra_tenant_keys_from_env();
        let premium_tenants = env::var("MAILERCLOUD_PREMIUM_TENANTS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            app_port,
            prometheus_port,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            mongodb_uri: env::var("MONGODB_URI").unwrap_or_default(),
            mongodb_database: env::var("MONGODB_DATABASE").unwrap_or_default(),
            mongodb_collection: env::var("MONGODB_COLLECTION").unwrap_or_default(),

            amqp_url,
            amqp_exchange: env::var("RABBITMQ_EXCHANGE").unwrap_or_default(),
            amqp_queue: env::var("RABBITMQ_QUEUE").unwrap_or_default(),

            api_key_header: env::var("API_KEY_HEADER").unwrap_or_else(|_| "X-API-Key".to_string()),
            webhook_debug: env::var("WEBHOOK_DEBUG")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),

            registry: RegistryConfig {
                packed_tenants,
                extra_tenant_keys,
                premium_tenants,
                esp_api_base_url: env::var("ESP_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.mailercloud.com/v1".to_string()),
            },

            max_retries: 3,
            retry_base_delay_secs: 10,
        })
    }

    /// Validate that the pieces required to actually run (not merely to
    /// parse) are present. Called once at startup before any connection is
    /// attempted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mongodb_uri.is_empty() {
            return Err(ConfigError::Invalid {
                name: "MONGODB_URI".to_string(),
                message: "must be set".to_string(),
            });
        }
        if self.amqp_url.is_empty() {
            return Err(ConfigError::Invalid {
                name: "CLOUDAMQP_URL".to_string(),
                message: "must be set (or RABBITMQ_URI as a fallback)".to_string(),
            });
        }
        if self.amqp_exchange.is_empty() {
            return Err(ConfigError::Invalid {
                name: "RABBITMQ_EXCHANGE".to_string(),
                message: "must be set".to_string(),
            });
        }
        if self.amqp_queue.is_empty() {
            return Err(ConfigError::Invalid {
                name: "RABBITMQ_QUEUE".to_string(),
                message: "must be set".to_string(),
            });
        }
        mailcloud_core::registry::parse_packed_tenants(&self.registry.packed_tenants)?;
        Ok(())
    }
}

fn parse_port(name: &str, default: u16) -> Result<u16, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            message: format!("'{value}' is not a valid port number"),
        }),
        Err(_) => Ok(default),
    }
}

/// Scan the environment for `<NAME>_API_KEY` entries and turn each into a
/// `(tenant_id, api_key)` pair with the tenant id lowercased, per §6.
fn extra_tenant_keys_from_env() -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = env::vars()
        .filter_map(|(key, value)| {
            let prefix = key.strip_suffix("_API_KEY")?;
            if prefix.is_empty() || key == "MAILERCLOUD_API_KEYS" {
                return None;
            }
            Some((prefix.to_lowercase(), value))
        })
        .collect();
    pairs.sort();
    pairs
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
