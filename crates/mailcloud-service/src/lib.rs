//! # Mailcloud Service
//!
//! Shared startup sequencing, retry policy, and worker consume-loop for
//! the ingress and worker binaries (§4.7). The binaries themselves live
//! under `src/bin/`; this crate holds everything they share.

pub mod retry;
pub mod worker;

pub use retry::RetryPolicy;

use mailcloud_core::registry::RegistryConfig;
use mailcloud_core::TenantRegistry;

/// Build the tenant registry and, best-effort, sync its webhook bindings
/// against the ESP, per §4.1 and the startup sequencing in §4.7.
pub async fn build_registry(
    config: &RegistryConfig,
) -> Result<TenantRegistry, mailcloud_core::ValidationError> {
    let mut registry = TenantRegistry::new(config)?;
    let client = reqwest::Client::new();
    registry.sync_webhook_bindings(&client).await;
    Ok(registry)
}
