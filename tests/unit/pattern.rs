//! Pattern Detector Unit Tests
//!
//! Behavioral scoring signals and threat level mapping, driven through the
//! public detector API.

use rate_guard::{PatternDetector, RequestRecord, ThreatLevel};

// 2023-11-15 12:00:00 UTC, a daytime hour outside the night window
const NOON: f64 = 1_700_049_600.0;

fn benign_record(ts: f64) -> RequestRecord {
    RequestRecord::new("198.51.100.20", "/api/search", "GET")
        .with_timestamp(ts)
        .with_user_agent("Mozilla/5.0")
        .with_payload_size(100 + (ts as u64 % 23) * 31)
        .with_response(200, 0.02 + (ts % 7.0) * 0.05)
}

#[test]
fn test_score_zero_until_min_history() {
    let detector = PatternDetector::new();
    for i in 0..9 {
        let score = detector.add_request(&benign_record(NOON + i as f64 * 5.3));
        assert_eq!(score.composite, 0.0);
    }
    assert_eq!(detector.threat_level("198.51.100.20", "/api/search"), ThreatLevel::Low);
}

#[test]
fn test_identical_payloads_push_payload_subscore() {
    let detector = PatternDetector::new();
    // irregular spacing, same payload size every time
    let gaps = [0.0, 17.0, 23.0, 61.0, 64.0, 131.0, 150.0, 220.0, 245.0, 310.0];
    for gap in gaps {
        let record = RequestRecord::new("198.51.100.21", "/api/upload", "POST")
            .with_timestamp(NOON + gap)
            .with_user_agent("Mozilla/5.0")
            .with_payload_size(4096)
            .with_response(200, 0.02 + gap * 0.001);
        detector.add_request(&record);
    }

    let breakdown = detector.last_breakdown("198.51.100.21", "/api/upload").unwrap();
    assert!(breakdown.payload >= 0.8, "got {}", breakdown.payload);
}

#[test]
fn test_metronomic_spacing_pushes_frequency_subscore() {
    let detector = PatternDetector::new();
    for i in 0..15 {
        let record = RequestRecord::new("198.51.100.22", "/api/poll", "GET")
            .with_timestamp(NOON + i as f64)
            .with_user_agent("Mozilla/5.0")
            .with_payload_size(100 + i * 37)
            .with_response(200, 0.02 + i as f64 * 0.011);
        detector.add_request(&record);
    }

    let breakdown = detector.last_breakdown("198.51.100.22", "/api/poll").unwrap();
    assert!(breakdown.frequency > 0.5, "got {}", breakdown.frequency);
}

#[test]
fn test_benign_traffic_stays_low() {
    let detector = PatternDetector::new();
    for i in 0..30 {
        detector.add_request(&benign_record(NOON + i as f64 * 11.7 + (i % 5) as f64));
    }
    assert_eq!(detector.threat_level("198.51.100.20", "/api/search"), ThreatLevel::Low);
}

#[test]
fn test_bot_traffic_reaches_critical() {
    let detector = PatternDetector::new();
    // 03:00 UTC, perfectly spaced, templated payload, bot UA, all errors
    let night = 1_700_017_200.0;
    let mut last = ThreatLevel::Low;
    for i in 0..12 {
        let record = RequestRecord::new("198.51.100.23", "/login", "POST")
            .with_timestamp(night + i as f64 * 2.0)
            .with_user_agent("masscan-bot/1.0")
            .with_payload_size(512)
            .with_response(401, 0.0);
        let score = detector.add_request(&record);
        last = ThreatLevel::from_score(score.composite);
    }
    assert_eq!(last, ThreatLevel::Critical);
}

#[test]
fn test_scores_always_clamped() {
    let detector = PatternDetector::new();
    for i in 0..60 {
        let score = detector.add_request(
            &RequestRecord::new("198.51.100.24", "/x", "GET")
                .with_timestamp(1_700_017_200.0 + i as f64)
                .with_user_agent("bot")
                .with_payload_size(50_000)
                .with_response(500, 0.001),
        );
        assert!((0.0..=1.0).contains(&score.composite));
    }
}

#[test]
fn test_endpoints_scored_independently() {
    let detector = PatternDetector::new();
    for i in 0..15 {
        let record = RequestRecord::new("198.51.100.25", "/api/poll", "GET")
            .with_timestamp(NOON + i as f64)
            .with_user_agent("Mozilla/5.0")
            .with_payload_size(100 + i * 37)
            .with_response(200, 0.02 + i as f64 * 0.011);
        detector.add_request(&record);
    }

    assert!(detector.last_score("198.51.100.25", "/api/poll") > 0.0);
    assert_eq!(detector.last_score("198.51.100.25", "/api/other"), 0.0);
}
