//! Temporary IP block list
//!
//! Tracks temporarily banned client IPs with expiry timestamps. Entries are
//! purged lazily on access: an expired entry is equivalent to a non-blocked
//! state, so no sweep thread is needed.

use dashmap::DashMap;
use tracing::info;

/// Expiring per-IP block entries.
#[derive(Debug, Default)]
pub struct BlockList {
    entries: DashMap<String, f64>,
}

impl BlockList {
    /// Creates an empty block list.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns `blocked_until` when the IP is still blocked at `now`;
    /// purges the entry and returns `None` once it has expired.
    pub fn check(&self, ip: &str, now: f64) -> Option<f64> {
        let until = self.entries.get(ip).map(|entry| *entry)?;
        if now < until {
            Some(until)
        } else {
            self.entries.remove(ip);
            info!(ip = %ip, "Block expired, client unblocked");
            None
        }
    }

    /// Creates or refreshes a block entry.
    pub fn block(&self, ip: &str, until: f64) {
        self.entries.insert(ip.to_string(), until);
        info!(ip = %ip, blocked_until = until, "Client temporarily blocked");
    }

    /// Removes a block entry regardless of expiry.
    pub fn unblock(&self, ip: &str) -> bool {
        self.entries.remove(ip).is_some()
    }

    /// Number of IPs with a live block entry at `now`.
    pub fn len(&self, now: f64) -> usize {
        self.entries.iter().filter(|entry| now < *entry.value()).count()
    }

    /// True when no live entries exist at `now`.
    pub fn is_empty(&self, now: f64) -> bool {
        self.len(now) == 0
    }
}
