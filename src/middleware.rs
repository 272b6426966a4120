//! Rate Guard Tower Layer
//!
//! Mounts the limiter in any Tower stack. The calling layer supplies an
//! extractor that turns its request type into a [`RequestRecord`] (plus the
//! authenticated user id, if any); denied requests surface as
//! [`RateGuardError::RateLimited`] with retry information.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use tower::{Layer, Service};

use crate::error::RateGuardError;
use crate::limiter::{AdaptiveLimiter, DecisionInfo, DenyReason};
use crate::record::RequestRecord;

type Extractor<Req> = Arc<dyn Fn(&Req) -> (RequestRecord, Option<String>) + Send + Sync>;

/// Rate guard layer for Tower.
pub struct RateGuardLayer<Req> {
    limiter: Arc<AdaptiveLimiter>,
    extractor: Extractor<Req>,
}

impl<Req> RateGuardLayer<Req> {
    /// Creates a layer around a shared limiter and a record extractor.
    pub fn new<F>(limiter: Arc<AdaptiveLimiter>, extractor: F) -> Self
    where
        F: Fn(&Req) -> (RequestRecord, Option<String>) + Send + Sync + 'static,
    {
        Self {
            limiter,
            extractor: Arc::new(extractor),
        }
    }
}

impl<Req> Clone for RateGuardLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, Req> Layer<S> for RateGuardLayer<Req> {
    type Service = RateGuardService<S, Req>;

    fn layer(&self, inner: S) -> Self::Service {
        RateGuardService {
            inner,
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

/// Rate guard service wrapper.
pub struct RateGuardService<S, Req> {
    inner: S,
    limiter: Arc<AdaptiveLimiter>,
    extractor: Extractor<Req>,
}

impl<S: Clone, Req> Clone for RateGuardService<S, Req> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, Req> Service<Req> for RateGuardService<S, Req>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<RateGuardError> + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = RateGuardError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        let extractor = self.extractor.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (record, user_id) = extractor(&req);
            let decision = limiter.process_request(&record, user_id.as_deref()).await;

            if !decision.allowed {
                let reason = decision.info.reason.unwrap_or(DenyReason::RateLimited);
                let retry_after =
                    Duration::from_secs(decision.info.retry_after.unwrap_or(1));
                return Err(RateGuardError::RateLimited {
                    reason,
                    retry_after,
                });
            }

            inner.call(req).await.map_err(Into::into)
        })
    }
}

/// Rate limit response header values derived from a decision.
pub struct RateLimitHeaders {
    /// X-RateLimit-Remaining
    pub remaining: u32,
    /// X-RateLimit-Limit
    pub limit: u32,
    /// X-RateLimit-Reset (epoch seconds)
    pub reset: u64,
}

impl RateLimitHeaders {
    /// Builds header values from decision info and the configured limit.
    pub fn from_info(info: &DecisionInfo, limit: u32) -> Self {
        Self {
            remaining: info.remaining,
            limit,
            reset: info.reset_time.max(0.0) as u64,
        }
    }

    /// Returns the X-RateLimit-Remaining header value.
    pub fn remaining_header(&self) -> String {
        self.remaining.to_string()
    }

    /// Returns the X-RateLimit-Limit header value.
    pub fn limit_header(&self) -> String {
        self.limit.to_string()
    }

    /// Returns the X-RateLimit-Reset header value.
    pub fn reset_header(&self) -> String {
        self.reset.to_string()
    }
}
