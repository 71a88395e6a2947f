//! Broker-facing error taxonomy.

/// Errors raised by [`crate::BrokerClient`]. All variants are surfaced to
/// callers as `mailcloud_core::PipelineError::TransientUpstream` at the
/// component boundary (ingress publish, worker consume) — the broker
/// crate itself stays free of HTTP/worker status-code concerns.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(#[from] lapin::Error),

    #[error("failed to serialize event for publication: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publish timed out after {timeout_secs}s")]
    PublishTimeout { timeout_secs: u64 },

    #[error("publish was not confirmed by the broker")]
    PublishNotConfirmed,
}

impl BrokerError {
    /// All broker failures are treated as transient: a dropped connection,
    /// a timed-out publish, or an unconfirmed delivery are all conditions
    /// the caller should retry or surface as a `500`, never a `4xx`.
    pub fn is_transient(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
