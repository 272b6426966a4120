//! Request Record Unit Tests
//!
//! Key derivation and snapshot construction.

use rate_guard::{PatternKey, RequestRecord};

#[test]
fn test_authenticated_and_anonymous_keys_differ() {
    let record = RequestRecord::new("203.0.113.5", "/api/items", "POST");
    assert_eq!(record.client_key(Some("user-7")), "user-7:203.0.113.5");
    assert_eq!(record.client_key(None), "anonymous:203.0.113.5");
    assert_ne!(record.client_key(Some("user-7")), record.client_key(None));
}

#[test]
fn test_builder_setters() {
    let record = RequestRecord::new("203.0.113.5", "/api/items", "POST")
        .with_timestamp(1_700_000_000.0)
        .with_user_agent("curl/8.4")
        .with_payload_size(2048)
        .with_response(503, 0.25);

    assert_eq!(record.timestamp, 1_700_000_000.0);
    assert_eq!(record.user_agent, "curl/8.4");
    assert_eq!(record.payload_size, 2048);
    assert_eq!(record.status_code, 503);
    assert_eq!(record.response_time, 0.25);
}

#[test]
fn test_new_record_is_stamped() {
    let before = RequestRecord::now_timestamp();
    let record = RequestRecord::new("203.0.113.5", "/", "GET");
    let after = RequestRecord::now_timestamp();
    assert!(record.timestamp >= before && record.timestamp <= after);
}

#[test]
fn test_pattern_key_equality() {
    let a = RequestRecord::new("203.0.113.5", "/login", "POST").pattern_key();
    let b = PatternKey::new("203.0.113.5", "/login");
    assert_eq!(a, b);
}
