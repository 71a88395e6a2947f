//! Per-tenant rate limiting: a daily event cap on the default tier, no cap
//! on the premium tier.
//!
//! State is a small table guarded by a single mutex; the expected
//! contention is low enough that a single lock is simpler and sufficient
//! rather than sharding by tenant.

pub use crate::registry::Tier;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Events accepted per 24-hour rolling window on the default tier.
pub const DEFAULT_TIER_DAILY_CAP: u64 = 10_000;

/// Informational cap on concurrent webhook registrations per tenant on the
/// default tier. Not enforced at ingress (there is nothing in an inbound
/// HTTP request that counts as a "registration"); tracked here so the value
/// has one canonical home rather than being a magic number in documentation
/// only.
pub const DEFAULT_TIER_REGISTRATION_CAP: u32 = 20;

#[derive(Debug, Clone)]
struct TenantCounter {
    window_anchor: DateTime<Utc>,
    count: u64,
}

/// Per-tenant token/quota tracker enforcing the daily event cap described
/// in §4.2 of the specification.
#[derive(Debug, Default)]
pub struct RateLimiter {
    counters: Mutex<HashMap<String, TenantCounter>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether an event for `tenant_id` at the given `tier` may be
    /// accepted, incrementing the tenant's daily counter on acceptance.
    ///
    /// The window anchors to the first event seen for a tenant and rolls
    /// (resets to zero, re-anchors to now) once 24 hours have elapsed since
    /// the anchor. Premium tenants are always accepted; their counter is
    /// still tracked for observability but never blocks acceptance.
    pub fn allow(&self, tenant_id: &str, tier: Tier) -> bool {
        self.allow_at(tenant_id, tier, Utc::now())
    }

    /// Same as [`Self::allow`] but with an explicit "current time", so
    /// window-roll behavior can be tested without sleeping 24 hours.
    pub fn allow_at(&self, tenant_id: &str, tier: Tier, now: DateTime<Utc>) -> bool {
        let mut counters = self.counters.lock().expect("rate limiter mutex poisoned");

        let counter = counters
            .entry(tenant_id.to_string())
            .or_insert_with(|| TenantCounter {
                window_anchor: now,
                count: 0,
            });

        if now - counter.window_anchor >= ChronoDuration::hours(24) {
            counter.window_anchor = now;
            counter.count = 0;
        }

        let allowed = match tier {
            Tier::Premium => true,
            Tier::Default => counter.count < DEFAULT_TIER_DAILY_CAP,
        };

        if allowed {
            counter.count += 1;
        }

        allowed
    }

    /// Current count within the tenant's active window; `0` if the tenant
    /// has never been seen. Exposed for tests and operational inspection.
    pub fn current_count(&self, tenant_id: &str) -> u64 {
        self.counters
            .lock()
            .expect("rate limiter mutex poisoned")
            .get(tenant_id)
            .map(|counter| counter.count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "rate_limiter_tests.rs"]
mod tests;
