//! Rate Guard - Adaptive rate limiting with behavioral anomaly detection.
//!
//! Protects a request-serving boundary from abusive traffic by combining
//! quota enforcement (fixed/sliding window, token bucket) with a
//! multi-signal behavioral scorer that escalates enforcement — tightened
//! limits, temporary IP blocks, deduplicated alerts — when traffic looks
//! automated or malicious.
//!
//! The limiter is constructed once at startup and shared by reference
//! across request handlers:
//!
//! ```no_run
//! use rate_guard::{AdaptiveLimiter, LimiterConfig, MemoryQuotaStore, RequestRecord};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), rate_guard::ConfigError> {
//! let limiter = Arc::new(AdaptiveLimiter::new(
//!     LimiterConfig::default(),
//!     Arc::new(MemoryQuotaStore::new()),
//! )?);
//!
//! let record = RequestRecord::new("203.0.113.9", "/api/items", "GET")
//!     .with_user_agent("Mozilla/5.0");
//! let decision = limiter.process_request(&record, None).await;
//! if !decision.allowed {
//!     // surface HTTP 429 with decision.info.retry_after
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod pattern;
pub mod quota;
pub mod record;

pub use config::{ConfigError, LimiterConfig, Strategy};
pub use error::{QuotaBackendError, RateGuardError};
pub use limiter::{
    AdaptiveLimiter, AlertSink, Decision, DecisionInfo, DenyReason, Health, SecurityAlert,
    TracingAlertSink,
};
pub use metrics::MetricsSnapshot;
pub use pattern::{AnomalyScore, PatternDetector, ScoreBreakdown, ThreatLevel};
pub use quota::{MemoryQuotaStore, QuotaStore, QuotaWindowState, RedisQuotaStore};
pub use record::{PatternKey, RequestRecord};
