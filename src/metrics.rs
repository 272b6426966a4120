//! Limiter Metrics
//!
//! Two layers: lock-free atomic counters powering the structured
//! [`MetricsSnapshot`] (decision totals and derived rates), and
//! registry-scoped Prometheus collectors for scrape-based observability.

use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free decision counters updated on the hot path.
#[derive(Debug, Default)]
pub struct LimiterCounters {
    total: AtomicU64,
    blocked: AtomicU64,
    rate_limited: AtomicU64,
    anomalies: AtomicU64,
    alerts: AtomicU64,
    backend_errors: AtomicU64,
}

impl LimiterCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one processed request.
    pub fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one denial by block policy (blacklist, temp block, critical).
    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one denial by quota.
    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one check whose anomaly score cleared the threshold.
    pub fn record_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one emitted (post-dedup) alert.
    pub fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one quota backend failure.
    pub fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time snapshot with derived rates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let blocked = self.blocked.load(Ordering::Relaxed);
        let rate_limited = self.rate_limited.load(Ordering::Relaxed);
        let anomalies = self.anomalies.load(Ordering::Relaxed);
        let alerts = self.alerts.load(Ordering::Relaxed);
        let backend_errors = self.backend_errors.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: total,
            blocked_requests: blocked,
            rate_limited_requests: rate_limited,
            anomalies_detected: anomalies,
            alerts_sent: alerts,
            backend_errors,
            block_rate: rate(blocked, total),
            rate_limit_rate: rate(rate_limited, total),
            anomaly_rate: rate(anomalies, total),
            alert_rate: rate(alerts, total),
        }
    }
}

fn rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Point-in-time view of the limiter's counters and derived rates.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Requests processed
    pub total_requests: u64,
    /// Denials by block policy
    pub blocked_requests: u64,
    /// Denials by quota
    pub rate_limited_requests: u64,
    /// Checks whose anomaly score cleared the threshold
    pub anomalies_detected: u64,
    /// Alerts emitted after dedup
    pub alerts_sent: u64,
    /// Quota backend failures absorbed by the fail-open policy
    pub backend_errors: u64,
    /// `blocked_requests / total * 100`, 0 when no traffic
    pub block_rate: f64,
    /// `rate_limited_requests / total * 100`
    pub rate_limit_rate: f64,
    /// `anomalies_detected / total * 100`
    pub anomaly_rate: f64,
    /// `alerts_sent / total * 100`
    pub alert_rate: f64,
}

/// Prometheus collectors mirroring the limiter's decision events.
pub struct PrometheusMetrics {
    /// Decisions by outcome (allowed / blocked / rate_limited / failed_open)
    pub decisions: CounterVec,
    /// Currently blocked client IPs
    pub blocked_ips: Gauge,
    /// Distribution of computed anomaly scores
    pub anomaly_score: Histogram,
    /// Emitted alerts
    pub alerts: Counter,
    /// Quota backend failures
    pub backend_errors: Counter,
}

impl PrometheusMetrics {
    /// Creates and registers the limiter's collectors.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let decisions = CounterVec::new(
            Opts::new("decisions_total", "Total limiter decisions").namespace("rate_guard"),
            &["outcome"],
        )?;
        registry.register(Box::new(decisions.clone()))?;

        let blocked_ips = Gauge::with_opts(
            Opts::new("blocked_ips", "Currently blocked client IPs").namespace("rate_guard"),
        )?;
        registry.register(Box::new(blocked_ips.clone()))?;

        let anomaly_score = Histogram::with_opts(
            HistogramOpts::new("anomaly_score", "Computed anomaly scores")
                .namespace("rate_guard")
                .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]),
        )?;
        registry.register(Box::new(anomaly_score.clone()))?;

        let alerts = Counter::with_opts(
            Opts::new("alerts_total", "Security alerts emitted").namespace("rate_guard"),
        )?;
        registry.register(Box::new(alerts.clone()))?;

        let backend_errors = Counter::with_opts(
            Opts::new("backend_errors_total", "Quota backend failures").namespace("rate_guard"),
        )?;
        registry.register(Box::new(backend_errors.clone()))?;

        Ok(Self {
            decisions,
            blocked_ips,
            anomaly_score,
            alerts,
            backend_errors,
        })
    }

    /// Records a decision outcome label.
    pub fn record_decision(&self, outcome: &str) {
        self.decisions.with_label_values(&[outcome]).inc();
    }
}
