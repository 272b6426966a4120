//! Security alert dispatch
//!
//! Fire-and-forget alerting with per-client dedup. Emission never blocks the
//! request path: qualified alerts go through a bounded channel drained by a
//! background worker; on overflow the alert is dropped and counted.

use crate::pattern::ThreatLevel;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Queue depth between the request path and the delivery worker.
const ALERT_QUEUE_CAPACITY: usize = 256;

/// One security alert event.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    /// Correlation id
    pub id: Uuid,
    /// Offending client IP
    pub client_ip: String,
    /// Threat level at emission time
    pub threat_level: ThreatLevel,
    /// Composite anomaly score at emission time
    pub anomaly_score: f64,
    /// Endpoint the client was hitting
    pub endpoint: String,
    /// Client's User-Agent
    pub user_agent: String,
    /// Epoch seconds of the triggering decision
    pub timestamp: f64,
}

/// Destination for delivered alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Delivers one alert. Failures are the sink's concern; the dispatcher
    /// never retries.
    async fn deliver(&self, alert: SecurityAlert);
}

/// Default sink: structured warn-level log events.
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn deliver(&self, alert: SecurityAlert) {
        warn!(
            alert_id = %alert.id,
            ip = %alert.client_ip,
            threat_level = %alert.threat_level,
            anomaly_score = alert.anomaly_score,
            endpoint = %alert.endpoint,
            user_agent = %alert.user_agent,
            "Security alert"
        );
    }
}

/// Deduplicating, non-blocking alert dispatcher.
pub struct AlertDispatcher {
    dedup: DashMap<String, f64>,
    cooldown_secs: f64,
    tx: mpsc::Sender<SecurityAlert>,
    dropped: AtomicU64,
}

impl AlertDispatcher {
    /// Creates a dispatcher and spawns its delivery worker.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(cooldown_secs: u64, sink: Arc<dyn AlertSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<SecurityAlert>(ALERT_QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                sink.deliver(alert).await;
            }
        });

        Self {
            dedup: DashMap::new(),
            cooldown_secs: cooldown_secs as f64,
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Emits the alert unless one for the same client fired inside the
    /// cooldown. Returns whether the alert was emitted (enqueued).
    pub fn maybe_alert(&self, alert: SecurityAlert) -> bool {
        let now = alert.timestamp;
        let mut suppressed = false;
        // entry API holds the shard guard: dedup check and stamp are atomic
        // per client
        self.dedup
            .entry(alert.client_ip.clone())
            .and_modify(|last| {
                if now - *last < self.cooldown_secs {
                    suppressed = true;
                } else {
                    *last = now;
                }
            })
            .or_insert(now);

        if suppressed {
            return false;
        }

        if self.tx.try_send(alert).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Alert queue full, alert dropped");
        }
        true
    }

    /// Alerts dropped due to queue overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
