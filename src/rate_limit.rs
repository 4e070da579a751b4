/// Rate Limiting System
///
/// Two process-wide limiters: a strict one for the credential entry points and
/// a general one for everything else.
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Paths that accept credentials or create sessions
const CREDENTIAL_PATHS: &[&str] = &[
    "/api/sign-in",
    "/api/sign-up",
    "/api/sign-in-domain",
    "/api/google-callback",
];

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    auth: Arc<DirectLimiter>,
    general: Arc<DirectLimiter>,
}

fn non_zero(value: u32, fallback: NonZeroU32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(fallback)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let burst = non_zero(config.burst_size, NonZeroU32::MIN);

        let auth_quota = Quota::per_second(non_zero(config.auth_requests_per_second, NonZeroU32::MIN))
            .allow_burst(burst);
        let general_quota =
            Quota::per_second(non_zero(config.general_requests_per_second, NonZeroU32::MIN))
                .allow_burst(burst);

        Self {
            enabled: config.enabled,
            auth: Arc::new(GovernorLimiter::direct(auth_quota)),
            general: Arc::new(GovernorLimiter::direct(general_quota)),
        }
    }

    fn check(limiter: &DirectLimiter) -> ApiResult<()> {
        limiter.check().map_err(|not_until| ApiError::RateLimitExceeded {
            retry_after: not_until.wait_time_from(DefaultClock::default().now()),
        })
    }

    /// Check the limiter that applies to `path`
    pub fn check_path(&self, path: &str) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if CREDENTIAL_PATHS.contains(&path) {
            Self::check(&self.auth)
        } else {
            Self::check(&self.general)
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path();

    if let Err(e) = ctx.rate_limiter.check_path(path) {
        tracing::warn!(path, "Rate limit exceeded");
        return Err(match e {
            ApiError::RateLimitExceeded { retry_after } => ApiError::RateLimitExceeded {
                retry_after: retry_after.max(Duration::from_secs(1)),
            },
            other => other,
        });
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            auth_requests_per_second: 1,
            general_requests_per_second: 100,
            burst_size: 3,
        }
    }

    #[test]
    fn test_credential_paths_hit_strict_limit() {
        let limiter = RateLimiter::new(&config(true));

        for _ in 0..3 {
            assert!(limiter.check_path("/api/sign-in").is_ok());
        }
        assert!(matches!(
            limiter.check_path("/api/sign-in"),
            Err(ApiError::RateLimitExceeded { .. })
        ));

        // General quota is separate
        assert!(limiter.check_path("/api/session").is_ok());
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(&config(false));

        for _ in 0..50 {
            assert!(limiter.check_path("/api/sign-in").is_ok());
        }
    }
}
