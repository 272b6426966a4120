//! Decision Flow Integration Tests
//!
//! Quota boundaries, whitelist/blacklist short-circuits, counting
//! strategies, identity-scoped keys, and same-key concurrency.

use crate::{limiter, NOON};
use rate_guard::{
    AdaptiveLimiter, DenyReason, LimiterConfig, MemoryQuotaStore, RequestRecord, Strategy,
    ThreatLevel,
};
use std::collections::HashSet;
use std::sync::Arc;

fn record(ip: &str, ts: f64) -> RequestRecord {
    RequestRecord::new(ip, "/api/items", "GET")
        .with_timestamp(ts)
        .with_user_agent("Mozilla/5.0")
        .with_payload_size(100 + (ts as u64 % 13) * 29)
}

fn small_quota(strategy: Strategy) -> LimiterConfig {
    LimiterConfig {
        requests_per_minute: 5,
        requests_per_hour: 500,
        requests_per_day: 5_000,
        strategy,
        ..LimiterConfig::default()
    }
}

#[tokio::test]
async fn test_quota_boundary_remaining_counts_down() {
    let limiter = limiter(small_quota(Strategy::SlidingWindow));

    for expected_remaining in [4, 3, 2, 1, 0] {
        let decision = limiter
            .process_request(&record("203.0.113.50", NOON + (4 - expected_remaining) as f64), None)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.info.remaining, expected_remaining as u32);
    }

    let sixth = limiter.process_request(&record("203.0.113.50", NOON + 5.0), None).await;
    assert!(!sixth.allowed);
    assert!(sixth.info.blocked);
    assert_eq!(sixth.info.reason, Some(DenyReason::RateLimited));
    assert_eq!(sixth.info.current_count, 5);
    assert!(sixth.info.retry_after.is_some());
}

#[tokio::test]
async fn test_window_admits_again_after_oldest_ages_out() {
    let config = LimiterConfig {
        requests_per_minute: 2,
        ..small_quota(Strategy::SlidingWindow)
    };
    let limiter = limiter(config);

    assert!(limiter.process_request(&record("203.0.113.51", NOON), None).await.allowed);
    assert!(limiter.process_request(&record("203.0.113.51", NOON + 30.0), None).await.allowed);
    assert!(!limiter.process_request(&record("203.0.113.51", NOON + 59.0), None).await.allowed);
    // first request left the sliding window
    assert!(limiter.process_request(&record("203.0.113.51", NOON + 61.0), None).await.allowed);
}

#[tokio::test]
async fn test_fixed_window_resets_at_boundary() {
    let config = LimiterConfig {
        requests_per_minute: 2,
        ..small_quota(Strategy::FixedWindow)
    };
    let limiter = limiter(config);

    // NOON is an exact minute boundary
    assert!(limiter.process_request(&record("203.0.113.52", NOON + 1.0), None).await.allowed);
    assert!(limiter.process_request(&record("203.0.113.52", NOON + 2.0), None).await.allowed);
    assert!(!limiter.process_request(&record("203.0.113.52", NOON + 59.0), None).await.allowed);
    assert!(limiter.process_request(&record("203.0.113.52", NOON + 60.0), None).await.allowed);
}

#[tokio::test]
async fn test_token_bucket_never_refills_within_window() {
    let config = LimiterConfig {
        burst_limit: 3,
        ..small_quota(Strategy::TokenBucket)
    };
    let limiter = limiter(config);

    for i in 0..3 {
        let decision = limiter
            .process_request(&record("203.0.113.53", NOON + i as f64), None)
            .await;
        assert!(decision.allowed);
    }

    // pool exhausted; the passage of in-window time does not replenish it
    for ts in [NOON + 3.0, NOON + 30.0, NOON + 59.0] {
        let decision = limiter.process_request(&record("203.0.113.53", ts), None).await;
        assert!(!decision.allowed);
        assert_eq!(decision.info.reason, Some(DenyReason::RateLimited));
    }
}

#[tokio::test]
async fn test_whitelist_bypasses_any_volume() {
    let mut config = small_quota(Strategy::Adaptive);
    config.requests_per_minute = 2;
    config.whitelist_ips = HashSet::from(["198.51.100.99".to_string()]);
    let limiter = limiter(config);

    for i in 0..20 {
        let decision = limiter
            .process_request(&record("198.51.100.99", NOON + i as f64), None)
            .await;
        assert!(decision.allowed);
        assert!(decision.info.whitelisted);
    }
}

#[tokio::test]
async fn test_blacklist_always_denied() {
    let mut config = small_quota(Strategy::Adaptive);
    config.blacklist_ips = HashSet::from(["198.51.100.66".to_string()]);
    let limiter = limiter(config);

    for i in 0..5 {
        let decision = limiter
            .process_request(&record("198.51.100.66", NOON + i as f64), None)
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.info.reason, Some(DenyReason::Blacklisted));
    }
    assert_eq!(limiter.get_metrics().blocked_requests, 5);
}

#[tokio::test]
async fn test_list_membership_checks_idempotent() {
    let mut config = small_quota(Strategy::Adaptive);
    config.whitelist_ips = HashSet::from(["198.51.100.1".to_string()]);
    config.blacklist_ips = HashSet::from(["198.51.100.2".to_string()]);
    let limiter = limiter(config);

    for _ in 0..10 {
        assert!(limiter.is_whitelisted("198.51.100.1"));
        assert!(!limiter.is_whitelisted("198.51.100.2"));
        assert!(limiter.is_blacklisted("198.51.100.2"));
        assert!(!limiter.is_blacklisted("198.51.100.1"));
    }
}

#[tokio::test]
async fn test_identities_get_independent_quotas() {
    let config = LimiterConfig {
        requests_per_minute: 1,
        ..small_quota(Strategy::SlidingWindow)
    };
    let limiter = limiter(config);

    assert!(limiter.process_request(&record("203.0.113.54", NOON), None).await.allowed);
    assert!(!limiter.process_request(&record("203.0.113.54", NOON + 1.0), None).await.allowed);
    // same IP, authenticated: separate key, fresh quota
    assert!(
        limiter
            .process_request(&record("203.0.113.54", NOON + 2.0), Some("user-9"))
            .await
            .allowed
    );
}

#[tokio::test]
async fn test_hourly_ceiling_enforced() {
    let config = LimiterConfig {
        requests_per_minute: 100,
        requests_per_hour: 100,
        requests_per_day: 1_000,
        strategy: Strategy::SlidingWindow,
        ..LimiterConfig::default()
    };
    let limiter = limiter(config);

    // spread requests so the minute window never fills but the hour does
    let mut denied_at = None;
    for i in 0..120 {
        let decision = limiter
            .process_request(&record("203.0.113.55", NOON + i as f64 * 20.0), None)
            .await;
        if !decision.allowed {
            denied_at = Some(i);
            break;
        }
    }
    assert_eq!(denied_at, Some(100));
}

#[tokio::test]
async fn test_concurrent_same_key_admits_exactly_limit() {
    let config = LimiterConfig {
        requests_per_minute: 10,
        ..small_quota(Strategy::SlidingWindow)
    };
    let limiter = Arc::new(AdaptiveLimiter::new(
        config,
        Arc::new(MemoryQuotaStore::new()),
    )
    .unwrap());

    let mut handles = Vec::new();
    for _ in 0..25 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.process_request(&record("203.0.113.56", NOON), None).await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().allowed {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
}

#[tokio::test]
async fn test_allowed_decision_info_is_complete() {
    let limiter = limiter(small_quota(Strategy::Adaptive));
    let decision = limiter.process_request(&record("203.0.113.57", NOON), None).await;

    assert!(decision.allowed);
    assert_eq!(decision.info.ip, "203.0.113.57");
    assert_eq!(decision.info.endpoint, "/api/items");
    assert_eq!(decision.info.threat_level, ThreatLevel::Low);
    assert_eq!(decision.info.anomaly_score, 0.0);
    assert_eq!(decision.info.current_count, 1);
    assert!(decision.info.reset_time > NOON);
    assert!(!decision.info.blocked);
    assert!(decision.info.reason.is_none());
}
