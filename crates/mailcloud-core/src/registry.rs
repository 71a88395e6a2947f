//! Tenant registry: resolves an inbound request to a `tenant_id`.
//!
//! The registry is a read-mostly snapshot built once at startup from
//! configuration (a packed `tenant:key[,tenant:key]*` string plus any
//! `<NAME>_API_KEY` environment entries) and, best-effort, from the ESP's
//! webhook-listing API. It is never mutated after construction; refreshing
//! webhook-to-tenant bindings requires a process restart.

use crate::ValidationError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// A tenant's API key binding, as parsed from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRegistration {
    pub tenant_id: String,
    pub api_key: String,
}

/// A binding from an ESP-side webhook registration to the tenant that owns
/// it, as discovered through the listing sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookBinding {
    pub webhook_id: String,
    pub tenant_id: String,
}

/// Rate-limiter tier. See [`crate::rate_limiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Default,
    Premium,
}

/// Configuration consumed by [`TenantRegistry::new`]; assembled by the
/// binary-level configuration loader from the environment variables listed
/// in the specification's external-interfaces section.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Raw value of `MAILERCLOUD_API_KEYS`: `tenant:key[,tenant:key]*`.
    pub packed_tenants: String,
    /// Additional single-tenant bindings discovered from `<NAME>_API_KEY`
    /// environment entries, already split into `(tenant_id, api_key)`
    /// pairs with `tenant_id` lowercased.
    pub extra_tenant_keys: Vec<(String, String)>,
    /// Tenant ids exempt from the daily event cap (`MAILERCLOUD_PREMIUM_TENANTS`).
    pub premium_tenants: Vec<String>,
    /// Base URL for the ESP's webhook-listing API, used by the best-effort
    /// sync in [`TenantRegistry::sync_webhook_bindings`].
    pub esp_api_base_url: String,
}

/// Parse a packed `tenant:key[,tenant:key]*` string into registrations.
///
/// Empty segments are skipped. A segment without a `:` separator is a
/// configuration-shape error, since a tenant without a key can never
/// authenticate.
pub fn parse_packed_tenants(packed: &str) -> Result<Vec<TenantRegistration>, ValidationError> {
    let mut out = Vec::new();
    for segment in packed.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (tenant_id, api_key) = segment.split_once(':').ok_or_else(|| {
            ValidationError::InvalidFormat {
                field: "MAILERCLOUD_API_KEYS".to_string(),
                message: format!("segment '{segment}' is not of the form tenant:key"),
            }
        })?;
        if tenant_id.is_empty() || api_key.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "MAILERCLOUD_API_KEYS".to_string(),
                message: format!("segment '{segment}' has an empty tenant id or key"),
            });
        }
        out.push(TenantRegistration {
            tenant_id: tenant_id.to_string(),
            api_key: api_key.to_string(),
        });
    }
    Ok(out)
}

/// Read-mostly lookup of `{tenant_id -> api_key}` and
/// `{webhook_id -> tenant_id}`, populated once at startup.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    key_to_tenant: HashMap<String, String>,
    webhook_to_tenant: HashMap<String, String>,
    tiers: HashMap<String, Tier>,
    registrations: Vec<TenantRegistration>,
    esp_api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct EspWebhookListResponse {
    #[serde(default)]
    webhooks: Vec<EspWebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct EspWebhookEntry {
    id: String,
}

impl TenantRegistry {
    /// Build the registry's API-key mapping and tier assignments from
    /// configuration. The webhook-to-tenant mapping starts empty; call
    /// [`Self::sync_webhook_bindings`] to populate it.
    pub fn new(config: &RegistryConfig) -> Result<Self, ValidationError> {
        let mut registrations = parse_packed_tenants(&config.packed_tenants)?;
        for (tenant_id, api_key) in &config.extra_tenant_keys {
            registrations.push(TenantRegistration {
                tenant_id: tenant_id.clone(),
                api_key: api_key.clone(),
            });
        }

        let mut key_to_tenant = HashMap::new();
        for registration in &registrations {
            key_to_tenant.insert(registration.api_key.clone(), registration.tenant_id.clone());
        }

        let mut tiers = HashMap::new();
        for tenant_id in &config.premium_tenants {
            tiers.insert(tenant_id.clone(), Tier::Premium);
        }

        Ok(Self {
            key_to_tenant,
            webhook_to_tenant: HashMap::new(),
            tiers,
            registrations,
            esp_api_base_url: config.esp_api_base_url.clone(),
        })
    }

    /// Resolve an `X-API-Key`-style header value to its owning tenant.
    pub fn lookup_tenant_by_key(&self, api_key: &str) -> Option<String> {
        self.key_to_tenant.get(api_key).cloned()
    }

    /// Resolve a vendor `Webhook-Id` header value to its owning tenant, as
    /// discovered by the ESP listing sync.
    pub fn lookup_tenant_by_webhook(&self, webhook_id: &str) -> Option<String> {
        self.webhook_to_tenant.get(webhook_id).cloned()
    }

    /// Rate-limiter tier for a tenant; tenants absent from the premium list
    /// default to [`Tier::Default`].
    pub fn tier(&self, tenant_id: &str) -> Tier {
        self.tiers.get(tenant_id).copied().unwrap_or(Tier::Default)
    }

    /// Directly bind a webhook id to a tenant. Exposed for tests and for
    /// manual overrides; the normal population path is
    /// [`Self::sync_webhook_bindings`].
    pub fn bind_webhook(&mut self, webhook_id: impl Into<String>, tenant_id: impl Into<String>) {
        self.webhook_to_tenant.insert(webhook_id.into(), tenant_id.into());
    }

    /// Best-effort sync against the ESP's webhook-listing endpoint, once
    /// per configured tenant. A failure to reach the ESP for a given tenant
    /// is logged at `warn` and does not abort the sync for other tenants or
    /// change the process exit code; the mapping for that tenant's webhooks
    /// simply stays empty and the ingress falls back to using the raw
    /// `Webhook-Id` header value as the tenant identifier (§4.3).
    pub async fn sync_webhook_bindings(&mut self, client: &reqwest::Client) {
        for registration in self.registrations.clone() {
            let url = format!("{}/webhooks", self.esp_api_base_url.trim_end_matches('/'));
            let result = client
                .get(&url)
                .query(&[("api_key", registration.api_key.as_str())])
                .timeout(Duration::from_secs(5))
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(error) => {
                    warn!(
                        tenant_id = %registration.tenant_id,
                        error = %error,
                        "failed to reach ESP webhook-listing endpoint; webhook bindings for this tenant remain empty"
                    );
                    continue;
                }
            };

            let parsed = match response.json::<EspWebhookListResponse>().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(
                        tenant_id = %registration.tenant_id,
                        error = %error,
                        "ESP webhook-listing response was not in the expected shape"
                    );
                    continue;
                }
            };

            for entry in parsed.webhooks {
                self.webhook_to_tenant
                    .insert(entry.id, registration.tenant_id.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
