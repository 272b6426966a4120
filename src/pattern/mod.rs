//! Behavioral pattern detection
//!
//! Maintains a bounded per-(ip, endpoint) history of request records and
//! computes a composite anomaly score in [0, 1] plus a discrete threat
//! level. Histories for different keys are fully independent; same-key
//! updates are serialized by the shard guard of the concurrent map.

mod scoring;

pub use scoring::{
    ScoreBreakdown, WEIGHT_FREQUENCY, WEIGHT_PAYLOAD, WEIGHT_RESPONSE, WEIGHT_TIME_OF_DAY,
    WEIGHT_USER_AGENT,
};

use crate::record::{PatternKey, RequestRecord};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// History records kept per key before FIFO eviction.
pub const HISTORY_CAP: usize = 1000;
/// Most recent records considered by the scorer.
pub const ANALYSIS_WINDOW: usize = 50;
/// Records required before a key is scored at all.
pub const MIN_HISTORY: usize = 10;

/// Discretized anomaly score driving policy escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    /// No or benign signal
    Low,
    /// Score above 0.4
    Medium,
    /// Score above 0.6
    High,
    /// Score above 0.8
    Critical,
}

impl ThreatLevel {
    /// Maps a composite score onto a threat level with fixed thresholds.
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            Self::Critical
        } else if score > 0.6 {
            Self::High
        } else if score > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Stable string form used in decision info and alerts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite anomaly score with its sub-score breakdown.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnomalyScore {
    /// Weighted composite in [0, 1]
    pub composite: f64,
    /// The five sub-scores
    pub breakdown: ScoreBreakdown,
}

impl AnomalyScore {
    fn zero() -> Self {
        Self {
            composite: 0.0,
            breakdown: ScoreBreakdown::default(),
        }
    }
}

/// Per-key behavioral state.
#[derive(Debug)]
struct ClientPatternState {
    history: VecDeque<RequestRecord>,
    last_score: f64,
    last_breakdown: ScoreBreakdown,
    last_seen: f64,
}

impl ClientPatternState {
    fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(64),
            last_score: 0.0,
            last_breakdown: ScoreBreakdown::default(),
            last_seen: 0.0,
        }
    }
}

/// Behavioral scorer over bounded per-key request histories.
pub struct PatternDetector {
    states: DashMap<PatternKey, ClientPatternState>,
}

impl PatternDetector {
    /// Creates an empty detector.
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Appends a record to its key's history and rescores the key.
    ///
    /// Returns zero until the key has accumulated [`MIN_HISTORY`] records;
    /// afterwards scores the most recent [`ANALYSIS_WINDOW`] records.
    pub fn add_request(&self, record: &RequestRecord) -> AnomalyScore {
        let key = record.pattern_key();
        let mut state = self.states.entry(key.clone()).or_insert_with(ClientPatternState::new);

        if state.history.len() == HISTORY_CAP {
            state.history.pop_front();
        }
        state.history.push_back(record.clone());
        state.last_seen = record.timestamp;

        if state.history.len() < MIN_HISTORY {
            state.last_score = 0.0;
            state.last_breakdown = ScoreBreakdown::default();
            return AnomalyScore::zero();
        }

        let start = state.history.len().saturating_sub(ANALYSIS_WINDOW);
        let window: Vec<RequestRecord> = state.history.iter().skip(start).cloned().collect();
        let breakdown = scoring::score_window(&window);
        let composite = breakdown.composite();

        state.last_score = composite;
        state.last_breakdown = breakdown;

        if composite > 0.6 {
            debug!(
                ip = %key.ip,
                endpoint = %key.endpoint,
                score = composite,
                "Elevated anomaly score"
            );
        }

        AnomalyScore {
            composite,
            breakdown,
        }
    }

    /// Threat level for a key based on its stored score. Unknown keys are
    /// [`ThreatLevel::Low`].
    pub fn threat_level(&self, ip: &str, endpoint: &str) -> ThreatLevel {
        let key = PatternKey::new(ip, endpoint);
        self.states
            .get(&key)
            .map(|state| ThreatLevel::from_score(state.last_score))
            .unwrap_or(ThreatLevel::Low)
    }

    /// Last composite score stored for a key, zero for unknown keys.
    pub fn last_score(&self, ip: &str, endpoint: &str) -> f64 {
        let key = PatternKey::new(ip, endpoint);
        self.states.get(&key).map(|s| s.last_score).unwrap_or(0.0)
    }

    /// Last sub-score breakdown stored for a key.
    pub fn last_breakdown(&self, ip: &str, endpoint: &str) -> Option<ScoreBreakdown> {
        let key = PatternKey::new(ip, endpoint);
        self.states.get(&key).map(|s| s.last_breakdown)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// Drops keys idle since before `now - max_idle_secs`. Not required for
    /// correctness (histories are bounded per key); bounds total key
    /// cardinality under churning client populations.
    pub fn purge_idle(&self, now: f64, max_idle_secs: f64) -> usize {
        let before = self.states.len();
        self.states
            .retain(|_, state| now - state.last_seen <= max_idle_secs);
        before - self.states.len()
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}
