//! In-memory quota storage
//!
//! Process-local backend for single-instance deployments and tests. TTL
//! expiry is checked lazily on access; an expired entry is equivalent to an
//! absent one.

use super::{QuotaStore, QuotaWindowState};
use crate::error::QuotaBackendError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct StoredEntry {
    state: QuotaWindowState,
    expires_at: Instant,
}

/// Sharded in-memory [`QuotaStore`].
pub struct MemoryQuotaStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryQuotaStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// True when no live keys exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries eagerly. Lazy expiry on `get` keeps results
    /// correct without this; calling it bounds memory between accesses.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

impl Default for MemoryQuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn get(&self, key: &str) -> Result<Option<QuotaWindowState>, QuotaBackendError> {
        // the read guard must drop before the same-shard remove below
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.state.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        state: &QuotaWindowState,
        ttl: Duration,
    ) -> Result<(), QuotaBackendError> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                state: state.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), QuotaBackendError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), QuotaBackendError> {
        Ok(())
    }
}
