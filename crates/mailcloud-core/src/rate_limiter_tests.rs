use super::*;
use chrono::Duration as ChronoDuration;

#[test]
fn first_event_for_a_tenant_is_always_allowed() {
    let limiter = RateLimiter::new();
    assert!(limiter.allow("t1", Tier::Default));
    assert_eq!(limiter.current_count("t1"), 1);
}

#[test]
fn default_tier_rejects_after_exactly_ten_thousand_events() {
    let limiter = RateLimiter::new();
    let now = Utc::now();
    for _ in 0..DEFAULT_TIER_DAILY_CAP {
        assert!(limiter.allow_at("t1", Tier::Default, now));
    }
    assert_eq!(limiter.current_count("t1"), DEFAULT_TIER_DAILY_CAP);
    assert!(!limiter.allow_at("t1", Tier::Default, now));
}

#[test]
fn premium_tier_is_never_rejected() {
    let limiter = RateLimiter::new();
    let now = Utc::now();
    for _ in 0..(DEFAULT_TIER_DAILY_CAP + 5) {
        assert!(limiter.allow_at("premium-tenant", Tier::Premium, now));
    }
}

#[test]
fn window_rolls_and_resets_the_counter_after_24_hours() {
    let limiter = RateLimiter::new();
    let anchor = Utc::now();
    for _ in 0..DEFAULT_TIER_DAILY_CAP {
        assert!(limiter.allow_at("t1", Tier::Default, anchor));
    }
    assert!(!limiter.allow_at("t1", Tier::Default, anchor));

    let after_roll = anchor + ChronoDuration::hours(24);
    assert!(limiter.allow_at("t1", Tier::Default, after_roll));
    assert_eq!(limiter.current_count("t1"), 1);
}

#[test]
fn window_does_not_roll_before_24_hours_elapse() {
    let limiter = RateLimiter::new();
    let anchor = Utc::now();
    for _ in 0..DEFAULT_TIER_DAILY_CAP {
        assert!(limiter.allow_at("t1", Tier::Default, anchor));
    }
    let almost = anchor + ChronoDuration::hours(23) + ChronoDuration::minutes(59);
    assert!(!limiter.allow_at("t1", Tier::Default, almost));
}

#[test]
fn separate_tenants_have_independent_counters() {
    let limiter = RateLimiter::new();
    let now = Utc::now();
    for _ in 0..DEFAULT_TIER_DAILY_CAP {
        assert!(limiter.allow_at("t1", Tier::Default, now));
    }
    assert!(!limiter.allow_at("t1", Tier::Default, now));
    assert!(limiter.allow_at("t2", Tier::Default, now));
}
