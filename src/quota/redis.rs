//! Redis-backed quota storage
//!
//! Distributed backend for multi-instance deployments. Values are JSON with
//! `SET EX` TTL semantics. Every call is deadline-bounded: the store gates
//! the hot request path, so a slow backend must surface as
//! [`QuotaBackendError::Timeout`] quickly enough for the fail-open policy to
//! keep latency flat.

use super::{QuotaStore, QuotaWindowState};
use crate::error::QuotaBackendError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Redis [`QuotaStore`] over a managed connection.
pub struct RedisQuotaStore {
    conn: Arc<RwLock<ConnectionManager>>,
    call_timeout: Duration,
    key_prefix: String,
}

impl RedisQuotaStore {
    /// Connects to Redis and wraps the connection in a reconnecting manager.
    pub async fn connect(
        redis_url: &str,
        call_timeout: Duration,
    ) -> Result<Self, QuotaBackendError> {
        let client = redis::Client::open(redis_url).map_err(QuotaBackendError::from)?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(QuotaBackendError::from)?;

        Ok(Self {
            conn: Arc::new(RwLock::new(conn)),
            call_timeout,
            key_prefix: "rate_guard:quota".to_string(),
        })
    }

    /// Overrides the key namespace prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, QuotaBackendError>
    where
        F: Future<Output = Result<T, QuotaBackendError>>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| QuotaBackendError::Timeout {
                duration: self.call_timeout,
            })?
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn get(&self, key: &str) -> Result<Option<QuotaWindowState>, QuotaBackendError> {
        let key = self.namespaced(key);
        let value: Option<String> = self
            .bounded(async {
                let mut conn = self.conn.write().await;
                conn.get(&key).await.map_err(QuotaBackendError::from)
            })
            .await?;

        match value {
            Some(v) => {
                let state: QuotaWindowState = serde_json::from_str(&v)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        state: &QuotaWindowState,
        ttl: Duration,
    ) -> Result<(), QuotaBackendError> {
        let key = self.namespaced(key);
        let value = serde_json::to_string(state)?;
        let ttl_secs = ttl.as_secs().max(1);

        self.bounded(async {
            let mut conn = self.conn.write().await;
            conn.set_ex::<_, _, ()>(&key, &value, ttl_secs)
                .await
                .map_err(QuotaBackendError::from)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), QuotaBackendError> {
        let key = self.namespaced(key);
        self.bounded(async {
            let mut conn = self.conn.write().await;
            conn.del::<_, ()>(&key).await.map_err(QuotaBackendError::from)
        })
        .await
    }

    async fn ping(&self) -> Result<(), QuotaBackendError> {
        self.bounded(async {
            let mut conn = self.conn.write().await;
            let _pong: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(QuotaBackendError::from)?;
            Ok(())
        })
        .await
    }
}
