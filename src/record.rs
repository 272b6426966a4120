//! Request snapshot and key derivation
//!
//! A [`RequestRecord`] is an immutable snapshot of one inbound request's
//! observable attributes, created by the calling layer once per request.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Immutable snapshot of one inbound request.
///
/// `response_time` and `status_code` may still be zero when the record is
/// scored before the response exists; the pattern detector accounts for that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Source IP as reported by the calling layer
    pub client_ip: String,
    /// User-Agent header value, empty if absent
    pub user_agent: String,
    /// Request path
    pub endpoint: String,
    /// HTTP method
    pub method: String,
    /// Response latency in seconds, 0.0 when scored pre-response
    pub response_time: f64,
    /// Response status, 0 when scored pre-response
    pub status_code: u16,
    /// Request body size in bytes
    pub payload_size: u64,
}

impl RequestRecord {
    /// Creates a record stamped with the current wall clock.
    pub fn new(
        client_ip: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Self::now_timestamp(),
            client_ip: client_ip.into(),
            user_agent: String::new(),
            endpoint: endpoint.into(),
            method: method.into(),
            response_time: 0.0,
            status_code: 0,
            payload_size: 0,
        }
    }

    /// Overrides the timestamp (seconds since epoch).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the User-Agent header value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the request payload size in bytes.
    #[must_use]
    pub fn with_payload_size(mut self, payload_size: u64) -> Self {
        self.payload_size = payload_size;
        self
    }

    /// Fills the response attributes once the response exists.
    #[must_use]
    pub fn with_response(mut self, status_code: u16, response_time: f64) -> Self {
        self.status_code = status_code;
        self.response_time = response_time;
        self
    }

    /// Quota accounting key: `{user_id}:{ip}` for authenticated callers,
    /// `anonymous:{ip}` otherwise. The same IP gets independent quotas per
    /// identity.
    pub fn client_key(&self, user_id: Option<&str>) -> String {
        match user_id {
            Some(id) => format!("{}:{}", id, self.client_ip),
            None => format!("anonymous:{}", self.client_ip),
        }
    }

    /// Pattern history key for this record.
    pub fn pattern_key(&self) -> PatternKey {
        PatternKey {
            ip: self.client_ip.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    /// Current wall clock as fractional epoch seconds.
    pub fn now_timestamp() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Key for per-client behavioral history: one history per (ip, endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternKey {
    /// Client IP
    pub ip: String,
    /// Request path
    pub endpoint: String,
}

impl PatternKey {
    /// Builds a key from its parts.
    pub fn new(ip: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            endpoint: endpoint.into(),
        }
    }
}
