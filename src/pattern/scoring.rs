//! Multi-signal anomaly scoring
//!
//! Five independent sub-scores over a window of recent requests, each in
//! [0, 1], combined as a weighted sum. The signals are heuristics for
//! automated traffic: metronomic spacing, always-on activity, templated
//! payloads, user-agent churn, and scripted response behavior.

use crate::record::RequestRecord;
use chrono::{DateTime, Timelike};
use serde::Serialize;
use std::collections::HashSet;

/// Weight of the frequency sub-score in the composite.
pub const WEIGHT_FREQUENCY: f64 = 0.30;
/// Weight of the time-of-day sub-score.
pub const WEIGHT_TIME_OF_DAY: f64 = 0.20;
/// Weight of the payload sub-score.
pub const WEIGHT_PAYLOAD: f64 = 0.20;
/// Weight of the user-agent sub-score.
pub const WEIGHT_USER_AGENT: f64 = 0.15;
/// Weight of the response sub-score.
pub const WEIGHT_RESPONSE: f64 = 0.15;

/// The five sub-scores behind a composite anomaly score.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreBreakdown {
    /// Inter-arrival regularity signal
    pub frequency: f64,
    /// Activity-hours signal
    pub time_of_day: f64,
    /// Payload-shape signal
    pub payload: f64,
    /// User-agent churn signal
    pub user_agent: f64,
    /// Response behavior signal
    pub response: f64,
}

impl ScoreBreakdown {
    /// Weighted composite, clamped to [0, 1].
    pub fn composite(&self) -> f64 {
        let score = WEIGHT_FREQUENCY * self.frequency
            + WEIGHT_TIME_OF_DAY * self.time_of_day
            + WEIGHT_PAYLOAD * self.payload
            + WEIGHT_USER_AGENT * self.user_agent
            + WEIGHT_RESPONSE * self.response;
        score.clamp(0.0, 1.0)
    }
}

/// Scores a window of records. Callers guarantee the window is the most
/// recent slice of the key's history.
pub fn score_window(window: &[RequestRecord]) -> ScoreBreakdown {
    ScoreBreakdown {
        frequency: frequency_score(window),
        time_of_day: time_of_day_score(window),
        payload: payload_score(window),
        user_agent: user_agent_score(window),
        response: response_score(window),
    }
}

/// Inter-arrival signal. Near-perfectly spaced traffic has vanishing
/// interval variance, which drives `regularity = 1/(1+variance)` toward 1.
fn frequency_score(window: &[RequestRecord]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let intervals: Vec<f64> = window
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).max(0.0))
        .collect();

    let regularity = 1.0 / (1.0 + variance(&intervals));
    let freq = (mean(&intervals) / 2.0).min(1.0);
    ((regularity + freq) / 2.0).clamp(0.0, 1.0)
}

/// Activity-hours signal. Clients active in more than 20 distinct hours of
/// the day look always-on; otherwise the signal is the fraction of traffic
/// in the 02:00-06:00 window.
fn time_of_day_score(window: &[RequestRecord]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let hours: Vec<u32> = window
        .iter()
        .filter_map(|r| DateTime::from_timestamp(r.timestamp as i64, 0))
        .map(|dt| dt.hour())
        .collect();
    if hours.is_empty() {
        return 0.0;
    }

    let distinct: HashSet<u32> = hours.iter().copied().collect();
    if distinct.len() > 20 {
        return 0.8;
    }

    let night = hours.iter().filter(|&&h| (2..6).contains(&h)).count();
    (night as f64 / hours.len() as f64).clamp(0.0, 1.0)
}

/// Payload-shape signal. Identical sizes across the window indicate a
/// templated payload; extreme mean sizes are weakly suspicious.
fn payload_score(window: &[RequestRecord]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let sizes: Vec<f64> = window.iter().map(|r| r.payload_size as f64).collect();

    let all_identical = sizes.windows(2).all(|pair| pair[0] == pair[1]);
    if all_identical && sizes.len() > 5 {
        return 0.9;
    }

    let mean_size = mean(&sizes);
    if mean_size > 10_000.0 || mean_size < 10.0 {
        return 0.6;
    }
    0.0
}

/// User-agent churn signal. Rotating UAs across most requests is an evasion
/// pattern; otherwise score the fraction of empty or self-declared bot UAs.
fn user_agent_score(window: &[RequestRecord]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let total = window.len() as f64;
    let distinct: HashSet<&str> = window.iter().map(|r| r.user_agent.as_str()).collect();
    if distinct.len() as f64 / total > 0.8 {
        return 0.7;
    }

    let automated = window
        .iter()
        .filter(|r| {
            let ua = r.user_agent.to_lowercase();
            ua.is_empty() || ua.contains("bot") || ua.contains("crawler")
        })
        .count();
    (automated as f64 / total).clamp(0.0, 1.0)
}

/// Response behavior signal. Suspiciously uniform response times indicate a
/// scripted client; otherwise score the error ratio. Records scored before a
/// response exists carry a zero response time and are excluded from the
/// uniformity check.
fn response_score(window: &[RequestRecord]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let times: Vec<f64> = window
        .iter()
        .map(|r| r.response_time)
        .filter(|&t| t > 0.0)
        .collect();
    if times.len() >= 5 && variance(&times) < 0.001 {
        return 0.8;
    }

    let errors = window.iter().filter(|r| r.status_code >= 400).count();
    (errors as f64 / window.len() as f64).clamp(0.0, 1.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}
