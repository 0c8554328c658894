//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use shorthub_common::errors::{AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Process-wide limiter plus the quota it enforces
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

impl RateLimit {
    pub fn new(requests_per_second: u32, burst: u32) -> Result<Self> {
        let per_second = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
            message: "rate_limit.requests_per_second must be greater than zero".to_string(),
        })?;
        // A burst below the sustained rate would starve the quota
        let burst = NonZeroU32::new(burst.max(requests_per_second)).unwrap_or(per_second);

        Ok(Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst))),
            requests_per_second,
        })
    }

    fn check(&self) -> Result<()> {
        self.limiter.check().map_err(|_| AppError::RateLimited {
            limit: self.requests_per_second,
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Err(e) = limit.check() {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limit = RateLimit::new(100, 200).unwrap();
        assert!(limit.check().is_ok());
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(matches!(
            RateLimit::new(0, 10),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_burst_exhaustion_is_rate_limited() {
        let limit = RateLimit::new(1, 1).unwrap();
        assert!(limit.check().is_ok());
        assert!(matches!(
            limit.check(),
            Err(AppError::RateLimited { limit: 1 })
        ));
    }
}
