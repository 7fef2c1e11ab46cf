//! Rate limiting for the login and sign-up endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::{extract_client_ip, json_error};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Request budgets per client IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// Sustained login attempts per second.
    pub login_per_second: u32,
    /// Login attempts allowed in a burst.
    pub login_burst: u32,
    /// Sign-ups per minute.
    pub sign_up_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login_per_second: 1,
            login_burst: 5,
            sign_up_per_minute: 3,
        }
    }
}

impl RateLimits {
    /// Limits high enough to never trigger in tests.
    pub fn unlimited() -> Self {
        Self {
            login_per_second: 10_000,
            login_burst: 10_000,
            sign_up_per_minute: 10_000,
        }
    }
}

pub struct RateLimitConfig {
    pub login: IpLimiter,
    pub sign_up: IpLimiter,
    /// Key clients by the first `X-Forwarded-For` entry instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    pub fn new(limits: RateLimits, trust_forwarded_for: bool) -> Self {
        Self {
            login: RateLimiter::keyed(
                Quota::per_second(non_zero(limits.login_per_second))
                    .allow_burst(non_zero(limits.login_burst)),
            ),
            sign_up: RateLimiter::keyed(Quota::per_minute(non_zero(limits.sign_up_per_minute))),
            trust_forwarded_for,
        }
    }

    /// Drop state for clients whose buckets have fully refilled.
    pub fn retain_recent(&self) {
        self.login.retain_recent();
        self.sign_up.retain_recent();
    }
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

async fn limit(
    limiter: &IpLimiter,
    trust_forwarded_for: bool,
    message: &str,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, trust_forwarded_for) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, "Unable to determine client IP");
            return json_error(StatusCode::FORBIDDEN, "Unable to determine client IP.");
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => json_error(StatusCode::TOO_MANY_REQUESTS, message),
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    limit(
        &config.login,
        config.trust_forwarded_for,
        "Too many authentication attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting sign-ups.
pub async fn rate_limit_sign_up(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    limit(
        &config.sign_up,
        config.trust_forwarded_for,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}
