//! Pluggable quota window storage
//!
//! The limiter talks to counter storage through [`QuotaStore`]: get/set with
//! TTL semantics, plus a reachability probe for health checks. Backends are
//! an in-memory map for single-process deployments and Redis for
//! distributed ones.

mod memory;
mod redis;

pub use memory::MemoryQuotaStore;
pub use redis::RedisQuotaStore;

use crate::error::QuotaBackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Seconds in the secondary hourly ceiling window.
const HOUR_SECS: f64 = 3600.0;
/// Seconds in the secondary daily ceiling window.
const DAY_SECS: f64 = 86_400.0;

/// Counter/window storage consumed by the limiter.
///
/// Implementations only need faithful get/set-with-TTL semantics; atomicity
/// of read-modify-write cycles is provided by the limiter's per-key locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Fetches the stored state for a key, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<QuotaWindowState>, QuotaBackendError>;

    /// Stores the state for a key with a time-to-live.
    async fn set(
        &self,
        key: &str,
        state: &QuotaWindowState,
        ttl: Duration,
    ) -> Result<(), QuotaBackendError>;

    /// Removes a key.
    async fn delete(&self, key: &str) -> Result<(), QuotaBackendError>;

    /// Probes backend reachability.
    async fn ping(&self) -> Result<(), QuotaBackendError>;
}

/// Per-client quota accounting state.
///
/// Holds the primary window's timestamps, coarse counters for the hourly and
/// daily ceilings, and the token pool for the token-bucket strategy. The
/// whole struct is the unit of storage: one serialized value per client key,
/// expiring after the window TTL of inactivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaWindowState {
    /// Timestamps of counted requests inside the primary window
    pub timestamps: Vec<f64>,
    /// Requests counted in the current hour window
    pub hour_count: u32,
    /// Start of the current hour window
    pub hour_start: f64,
    /// Requests counted in the current day window
    pub day_count: u32,
    /// Start of the current day window
    pub day_start: f64,
    /// Remaining token pool, `None` until the token-bucket strategy
    /// initializes it
    pub tokens: Option<f64>,
}

impl QuotaWindowState {
    /// Fresh state for a key first seen at `now`.
    pub fn new(now: f64) -> Self {
        Self {
            timestamps: Vec::new(),
            hour_count: 0,
            hour_start: now,
            day_count: 0,
            day_start: now,
            tokens: None,
        }
    }

    /// Drops primary-window timestamps older than `cutoff` and rolls the
    /// hour/day counters when their windows have lapsed.
    pub fn prune(&mut self, cutoff: f64, now: f64) {
        self.timestamps.retain(|&t| t >= cutoff);
        if now - self.hour_start >= HOUR_SECS {
            self.hour_count = 0;
            self.hour_start = now;
        }
        if now - self.day_start >= DAY_SECS {
            self.day_count = 0;
            self.day_start = now;
        }
    }

    /// Requests currently counted in the primary window.
    pub fn window_count(&self) -> u32 {
        self.timestamps.len() as u32
    }

    /// Counts a request at `now` against all windows.
    pub fn record(&mut self, now: f64) {
        self.timestamps.push(now);
        self.hour_count += 1;
        self.day_count += 1;
    }

    /// Oldest timestamp still inside the primary window.
    pub fn oldest(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    /// True when a secondary ceiling is exhausted.
    pub fn over_ceiling(&self, hourly: u32, daily: u32) -> bool {
        self.hour_count >= hourly || self.day_count >= daily
    }

    /// When the tightest exhausted secondary window resets.
    pub fn ceiling_reset(&self, hourly: u32) -> f64 {
        if self.hour_count >= hourly {
            self.hour_start + HOUR_SECS
        } else {
            self.day_start + DAY_SECS
        }
    }
}
