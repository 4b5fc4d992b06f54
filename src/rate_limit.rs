/// Rate limiting
///
/// Two global buckets: privileged callers presenting a valid API key, and
/// the public bucket everyone else shares.
use crate::{
    api::API_KEY_HEADER,
    config::RateLimitConfig,
    context::AppContext,
    error::{ArcIdError, ArcIdResult},
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    public_rps: u32,
    privileged_rps: u32,
    public: Arc<DirectLimiter>,
    privileged: Arc<DirectLimiter>,
}

fn quota(rps: u32, burst: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN))
}

fn check(limiter: &DirectLimiter) -> ArcIdResult<()> {
    limiter.check().map_err(|not_until| ArcIdError::RateLimitExceeded {
        retry_after: not_until.wait_time_from(DefaultClock::default().now()),
    })
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let public_rps = config.requests_per_second.max(1);
        let privileged_rps = public_rps.saturating_mul(10);

        Self {
            enabled: config.enabled,
            public_rps,
            privileged_rps,
            public: Arc::new(GovernorLimiter::direct(quota(public_rps, config.burst_size))),
            privileged: Arc::new(GovernorLimiter::direct(quota(
                privileged_rps,
                config.burst_size.saturating_mul(2),
            ))),
        }
    }

    pub fn check_public(&self) -> ArcIdResult<()> {
        if !self.enabled {
            return Ok(());
        }
        check(&self.public)
    }

    pub fn check_privileged(&self) -> ArcIdResult<()> {
        if !self.enabled {
            return Ok(());
        }
        check(&self.privileged)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ArcIdError> {
    // Only a key that actually matches earns the privileged bucket
    let privileged = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|key| ctx.orchestrator.is_privileged_key(key));

    let limit = if privileged {
        ctx.rate_limiter.check_privileged()?;
        ctx.rate_limiter.privileged_rps
    } else {
        ctx.rate_limiter.check_public()?;
        ctx.rate_limiter.public_rps
    };

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert("X-RateLimit-Limit", HeaderValue::from(limit));

    Ok(response)
}
