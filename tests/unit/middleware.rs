//! Middleware Unit Tests
//!
//! The Tower layer mounts the limiter and surfaces denials as typed errors.

use rate_guard::middleware::{RateGuardLayer, RateLimitHeaders};
use rate_guard::{
    AdaptiveLimiter, LimiterConfig, MemoryQuotaStore, RateGuardError, RequestRecord,
};
use std::sync::Arc;
use tower::{service_fn, Layer, Service, ServiceExt};

const NOON: f64 = 1_700_049_600.0;

#[derive(Clone)]
struct FakeRequest {
    ip: &'static str,
    path: &'static str,
    ts: f64,
}

fn guarded_service(
    limit: u32,
) -> impl Service<FakeRequest, Response = &'static str, Error = RateGuardError> {
    let config = LimiterConfig {
        requests_per_minute: limit,
        ..LimiterConfig::default()
    };
    let limiter =
        Arc::new(AdaptiveLimiter::new(config, Arc::new(MemoryQuotaStore::new())).unwrap());

    let layer = RateGuardLayer::new(limiter, |req: &FakeRequest| {
        let record = RequestRecord::new(req.ip, req.path, "GET")
            .with_timestamp(req.ts)
            .with_user_agent("Mozilla/5.0");
        (record, None)
    });

    layer.layer(service_fn(|_req: FakeRequest| async {
        Ok::<_, RateGuardError>("handled")
    }))
}

#[tokio::test]
async fn test_allowed_request_passes_through() {
    let mut service = guarded_service(5);
    let response = service
        .ready()
        .await
        .unwrap()
        .call(FakeRequest {
            ip: "203.0.113.90",
            path: "/api",
            ts: NOON,
        })
        .await
        .unwrap();
    assert_eq!(response, "handled");
}

#[tokio::test]
async fn test_denied_request_surfaces_rate_limited() {
    let mut service = guarded_service(1);

    let first = service
        .ready()
        .await
        .unwrap()
        .call(FakeRequest {
            ip: "203.0.113.91",
            path: "/api",
            ts: NOON,
        })
        .await;
    assert!(first.is_ok());

    let second = service
        .ready()
        .await
        .unwrap()
        .call(FakeRequest {
            ip: "203.0.113.91",
            path: "/api",
            ts: NOON + 1.0,
        })
        .await;

    match second {
        Err(RateGuardError::RateLimited { retry_after, .. }) => {
            assert!(retry_after.as_secs() >= 1);
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[test]
fn test_rate_limit_header_values() {
    let headers = RateLimitHeaders {
        remaining: 42,
        limit: 100,
        reset: 1_700_049_660,
    };
    assert_eq!(headers.remaining_header(), "42");
    assert_eq!(headers.limit_header(), "100");
    assert_eq!(headers.reset_header(), "1700049660");
}
