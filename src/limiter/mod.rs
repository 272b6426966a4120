//! Adaptive rate limiter
//!
//! Orchestrates the full decision pipeline for one inbound request:
//! whitelist/blacklist short-circuits, temporary block checks, behavioral
//! scoring, threat-based policy escalation, quota enforcement against the
//! pluggable store, alert dispatch, and metrics.

mod alerts;
mod block_list;

pub use alerts::{AlertDispatcher, AlertSink, SecurityAlert, TracingAlertSink};
pub use block_list::BlockList;

use crate::config::{LimiterConfig, ConfigError, Strategy};
use crate::error::QuotaBackendError;
use crate::metrics::{LimiterCounters, MetricsSnapshot, PrometheusMetrics};
use crate::pattern::{PatternDetector, ThreatLevel};
use crate::quota::{QuotaStore, QuotaWindowState};
use crate::record::RequestRecord;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use prometheus::Registry;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

/// Which policy rule denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Static deny list
    Blacklisted,
    /// Live temporary block entry
    TemporarilyBlocked,
    /// Critical threat verdict from the pattern detector
    CriticalThreat,
    /// Quota exhausted
    RateLimited,
}

impl DenyReason {
    /// Stable string form used in decision info.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklisted => "blacklisted",
            Self::TemporarilyBlocked => "temporarily_blocked",
            Self::CriticalThreat => "critical_threat",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one limiter decision.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Decision context for the caller (headers, logging, enforcement)
    pub info: DecisionInfo,
}

/// Context attached to every decision.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionInfo {
    /// Requests left in the window under the effective limit
    pub remaining: u32,
    /// Epoch seconds when the window resets
    pub reset_time: f64,
    /// Requests counted in the window, including this one if allowed
    pub current_count: u32,
    /// Threat level at decision time
    pub threat_level: ThreatLevel,
    /// Composite anomaly score at decision time
    pub anomaly_score: f64,
    /// Client IP
    pub ip: String,
    /// Endpoint
    pub endpoint: String,
    /// Set on whitelist short-circuit
    pub whitelisted: bool,
    /// Set on any denial
    pub blocked: bool,
    /// Which rule denied, absent on allow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Seconds until retry is worthwhile, on denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Limiter health report.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Whether the quota backend answered a ping
    pub backend_reachable: bool,
    /// IPs with a live block entry
    pub blocked_ips: usize,
}

/// Outcome of a quota window check.
#[derive(Debug, Clone, Copy)]
struct QuotaVerdict {
    allowed: bool,
    current_count: u32,
    remaining: u32,
    reset_time: f64,
}

/// Adaptive rate limiter over a pluggable quota store.
///
/// One instance is owned by the server lifecycle and shared by reference
/// across request handlers; there is no global state.
pub struct AdaptiveLimiter {
    config: LimiterConfig,
    store: Arc<dyn QuotaStore>,
    detector: PatternDetector,
    block_list: BlockList,
    alerts: AlertDispatcher,
    whitelist: ArcSwap<HashSet<String>>,
    blacklist: ArcSwap<HashSet<String>>,
    counters: LimiterCounters,
    prom: Option<PrometheusMetrics>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AdaptiveLimiter {
    /// Creates a limiter with the default tracing alert sink.
    ///
    /// Fails on invalid configuration. Must be called within a Tokio
    /// runtime (the alert worker is spawned here).
    pub fn new(
        config: LimiterConfig,
        store: Arc<dyn QuotaStore>,
    ) -> Result<Self, ConfigError> {
        Self::with_alert_sink(config, store, Arc::new(TracingAlertSink))
    }

    /// Creates a limiter delivering alerts to the given sink.
    pub fn with_alert_sink(
        config: LimiterConfig,
        store: Arc<dyn QuotaStore>,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let whitelist = ArcSwap::from_pointee(config.whitelist_ips.clone());
        let blacklist = ArcSwap::from_pointee(config.blacklist_ips.clone());
        let alerts = AlertDispatcher::new(config.alert_cooldown_secs, sink);

        Ok(Self {
            config,
            store,
            detector: PatternDetector::new(),
            block_list: BlockList::new(),
            alerts,
            whitelist,
            blacklist,
            counters: LimiterCounters::new(),
            prom: None,
            key_locks: DashMap::new(),
        })
    }

    /// Attaches Prometheus collectors registered on `registry`.
    pub fn with_prometheus(mut self, registry: &Registry) -> Result<Self, prometheus::Error> {
        self.prom = Some(PrometheusMetrics::new(registry)?);
        Ok(self)
    }

    /// Runs the decision pipeline with the fail-open policy applied:
    /// a quota backend failure is logged, counted, and the request allowed.
    ///
    /// Use [`Self::try_process_request`] to apply a different policy.
    pub async fn process_request(
        &self,
        record: &RequestRecord,
        user_id: Option<&str>,
    ) -> Decision {
        match self.try_process_request(record, user_id).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    error = %err,
                    ip = %record.client_ip,
                    "Quota backend unavailable, failing open"
                );
                self.counters.record_backend_error();
                if let Some(prom) = &self.prom {
                    prom.backend_errors.inc();
                    prom.record_decision("failed_open");
                }
                let threat = self
                    .detector
                    .threat_level(&record.client_ip, &record.endpoint);
                let score = self.detector.last_score(&record.client_ip, &record.endpoint);
                Decision {
                    allowed: true,
                    info: self.base_info(record, threat, score),
                }
            }
        }
    }

    /// Runs the decision pipeline, propagating quota backend failures so the
    /// caller decides the availability policy.
    pub async fn try_process_request(
        &self,
        record: &RequestRecord,
        user_id: Option<&str>,
    ) -> Result<Decision, QuotaBackendError> {
        let now = record.timestamp;
        let ip = record.client_ip.as_str();
        self.counters.record_total();

        if self.whitelist.load().contains(ip) {
            self.record_outcome("allowed");
            let mut info = self.base_info(record, ThreatLevel::Low, 0.0);
            info.whitelisted = true;
            info.remaining = self.config.requests_per_minute;
            return Ok(Decision {
                allowed: true,
                info,
            });
        }

        if self.blacklist.load().contains(ip) {
            self.counters.record_blocked();
            self.record_outcome("blocked");
            let threat = self.detector.threat_level(ip, &record.endpoint);
            let score = self.detector.last_score(ip, &record.endpoint);
            self.qualify_and_alert(record, threat, score);
            return Ok(self.deny(record, threat, score, DenyReason::Blacklisted, None));
        }

        if let Some(until) = self.block_list.check(ip, now) {
            self.counters.record_blocked();
            self.record_outcome("blocked");
            let threat = self.detector.threat_level(ip, &record.endpoint);
            let score = self.detector.last_score(ip, &record.endpoint);
            self.qualify_and_alert(record, threat, score);
            let retry_after = (until - now).ceil().max(1.0) as u64;
            return Ok(self.deny(
                record,
                threat,
                score,
                DenyReason::TemporarilyBlocked,
                Some(retry_after),
            ));
        }

        let score = self.detector.add_request(record);
        if let Some(prom) = &self.prom {
            prom.anomaly_score.observe(score.composite);
        }
        if score.composite > self.config.anomaly_threshold {
            self.counters.record_anomaly();
        }
        let threat = ThreatLevel::from_score(score.composite);

        if threat == ThreatLevel::Critical {
            let until = now + self.config.cooldown_period_secs as f64;
            self.block_list.block(ip, until);
            self.counters.record_blocked();
            self.record_outcome("blocked");
            self.emit_alert(record, threat, score.composite);
            if let Some(prom) = &self.prom {
                prom.blocked_ips.set(self.block_list.len(now) as f64);
            }
            return Ok(self.deny(
                record,
                threat,
                score.composite,
                DenyReason::CriticalThreat,
                Some(self.config.cooldown_period_secs),
            ));
        }

        let effective_limit = self.effective_limit(threat);
        let key = record.client_key(user_id);
        let verdict = self.check_quota(&key, effective_limit, now).await?;

        if !verdict.allowed {
            self.counters.record_rate_limited();
            self.record_outcome("rate_limited");
            self.qualify_and_alert(record, threat, score.composite);
            let retry_after = (verdict.reset_time - now).ceil().max(1.0) as u64;
            let mut decision = self.deny(
                record,
                threat,
                score.composite,
                DenyReason::RateLimited,
                Some(retry_after),
            );
            decision.info.current_count = verdict.current_count;
            decision.info.reset_time = verdict.reset_time;
            return Ok(decision);
        }

        self.record_outcome("allowed");
        let mut info = self.base_info(record, threat, score.composite);
        info.remaining = verdict.remaining;
        info.current_count = verdict.current_count;
        info.reset_time = verdict.reset_time;
        Ok(Decision {
            allowed: true,
            info,
        })
    }

    /// Point-in-time metrics snapshot.
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.counters.snapshot()
    }

    /// Backend reachability plus currently blocked IP count.
    pub async fn health_check(&self) -> Health {
        let deadline = self.backend_deadline();
        let backend_reachable = matches!(
            tokio::time::timeout(deadline, self.store.ping()).await,
            Ok(Ok(()))
        );
        Health {
            backend_reachable,
            blocked_ips: self.block_list.len(RequestRecord::now_timestamp()),
        }
    }

    /// IPs with a live block entry at `now`.
    pub fn blocked_count(&self, now: f64) -> usize {
        self.block_list.len(now)
    }

    /// Membership check against the live whitelist.
    pub fn is_whitelisted(&self, ip: &str) -> bool {
        self.whitelist.load().contains(ip)
    }

    /// Membership check against the live blacklist.
    pub fn is_blacklisted(&self, ip: &str) -> bool {
        self.blacklist.load().contains(ip)
    }

    /// Replaces the whitelist without locking readers.
    pub fn update_whitelist(&self, ips: HashSet<String>) {
        self.whitelist.store(Arc::new(ips));
    }

    /// Replaces the blacklist without locking readers.
    pub fn update_blacklist(&self, ips: HashSet<String>) {
        self.blacklist.store(Arc::new(ips));
    }

    /// The behavioral detector, for score introspection.
    pub fn detector(&self) -> &PatternDetector {
        &self.detector
    }

    /// Alerts dropped due to queue overflow.
    pub fn alerts_dropped(&self) -> u64 {
        self.alerts.dropped()
    }

    /// Sweeps idle pattern keys and released quota key locks.
    pub fn purge_idle(&self, now: f64, max_idle_secs: f64) -> usize {
        self.key_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.detector.purge_idle(now, max_idle_secs)
    }

    /// Per-decision effective limit. Threat tightening never mutates the
    /// shared configuration; it is a local value for this check only.
    fn effective_limit(&self, threat: ThreatLevel) -> u32 {
        let base = self.config.requests_per_minute;
        if !self.config.adaptive_enabled {
            return base;
        }
        match threat {
            ThreatLevel::High => (base / 10).max(5),
            ThreatLevel::Medium => (base / 5).max(10),
            _ => base,
        }
    }

    /// Quota read-modify-write under a per-key lock, so two concurrent
    /// requests for the same key cannot both pass as the Nth admit.
    async fn check_quota(
        &self,
        key: &str,
        limit: u32,
        now: f64,
    ) -> Result<QuotaVerdict, QuotaBackendError> {
        let lock = self
            .key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let window = self.config.window_secs_f64();
        let mut state = self
            .store_get(key)
            .await?
            .unwrap_or_else(|| QuotaWindowState::new(now));

        let cutoff = match self.config.strategy {
            Strategy::FixedWindow => (now / window).floor() * window,
            _ => now - window,
        };
        state.prune(cutoff, now);

        if state.over_ceiling(self.config.requests_per_hour, self.config.requests_per_day) {
            return Ok(QuotaVerdict {
                allowed: false,
                current_count: state.window_count(),
                remaining: 0,
                reset_time: state.ceiling_reset(self.config.requests_per_hour),
            });
        }

        if self.config.strategy == Strategy::TokenBucket {
            return self.check_token_bucket(key, state, now).await;
        }

        let count = state.window_count();
        let reset_time = match self.config.strategy {
            Strategy::FixedWindow => cutoff + window,
            _ => state.oldest().unwrap_or(now) + window,
        };

        if count >= limit {
            return Ok(QuotaVerdict {
                allowed: false,
                current_count: count,
                remaining: 0,
                reset_time,
            });
        }

        state.record(now);
        self.store_set(key, &state).await?;
        let count = state.window_count();
        Ok(QuotaVerdict {
            allowed: true,
            current_count: count,
            remaining: limit.saturating_sub(count),
            reset_time,
        })
    }

    /// Token pool check. Tokens only decrease while the key's state is
    /// live; the pool resets when the TTL lapses.
    async fn check_token_bucket(
        &self,
        key: &str,
        mut state: QuotaWindowState,
        now: f64,
    ) -> Result<QuotaVerdict, QuotaBackendError> {
        let burst = self.config.burst_limit as f64;
        let tokens = state.tokens.get_or_insert(burst);
        let reset_time = now + self.config.window_secs_f64();

        if *tokens < 1.0 {
            return Ok(QuotaVerdict {
                allowed: false,
                current_count: state.window_count(),
                remaining: 0,
                reset_time,
            });
        }

        *tokens -= 1.0;
        let remaining = *tokens as u32;
        state.record(now);
        self.store_set(key, &state).await?;
        Ok(QuotaVerdict {
            allowed: true,
            current_count: state.window_count(),
            remaining,
            reset_time,
        })
    }

    fn backend_deadline(&self) -> Duration {
        Duration::from_millis(self.config.backend_timeout_ms)
    }

    /// Deadline-bounded store read. The store gates the hot path, so a slow
    /// backend degrades into a timeout the fail-open policy can absorb.
    async fn store_get(&self, key: &str) -> Result<Option<QuotaWindowState>, QuotaBackendError> {
        let deadline = self.backend_deadline();
        tokio::time::timeout(deadline, self.store.get(key))
            .await
            .map_err(|_| QuotaBackendError::Timeout { duration: deadline })?
    }

    /// Deadline-bounded store write with the window TTL.
    async fn store_set(
        &self,
        key: &str,
        state: &QuotaWindowState,
    ) -> Result<(), QuotaBackendError> {
        let deadline = self.backend_deadline();
        let ttl = Duration::from_secs(self.config.window_size_secs);
        tokio::time::timeout(deadline, self.store.set(key, state, ttl))
            .await
            .map_err(|_| QuotaBackendError::Timeout { duration: deadline })?
    }

    fn base_info(&self, record: &RequestRecord, threat: ThreatLevel, score: f64) -> DecisionInfo {
        DecisionInfo {
            remaining: 0,
            reset_time: record.timestamp,
            current_count: 0,
            threat_level: threat,
            anomaly_score: score,
            ip: record.client_ip.clone(),
            endpoint: record.endpoint.clone(),
            whitelisted: false,
            blocked: false,
            reason: None,
            retry_after: None,
        }
    }

    fn deny(
        &self,
        record: &RequestRecord,
        threat: ThreatLevel,
        score: f64,
        reason: DenyReason,
        retry_after: Option<u64>,
    ) -> Decision {
        let mut info = self.base_info(record, threat, score);
        info.blocked = true;
        info.reason = Some(reason);
        info.retry_after = retry_after;
        Decision {
            allowed: false,
            info,
        }
    }

    /// Alerts on a non-critical denial when the score clears the gate.
    fn qualify_and_alert(&self, record: &RequestRecord, threat: ThreatLevel, score: f64) {
        if threat == ThreatLevel::Critical || score >= self.config.alert_threshold {
            self.emit_alert(record, threat, score);
        }
    }

    fn emit_alert(&self, record: &RequestRecord, threat: ThreatLevel, score: f64) {
        let alert = SecurityAlert {
            id: uuid::Uuid::new_v4(),
            client_ip: record.client_ip.clone(),
            threat_level: threat,
            anomaly_score: score,
            endpoint: record.endpoint.clone(),
            user_agent: record.user_agent.clone(),
            timestamp: record.timestamp,
        };
        if self.alerts.maybe_alert(alert) {
            self.counters.record_alert();
            if let Some(prom) = &self.prom {
                prom.alerts.inc();
            }
        }
    }

    fn record_outcome(&self, outcome: &str) {
        if let Some(prom) = &self.prom {
            prom.record_decision(outcome);
        }
    }
}
