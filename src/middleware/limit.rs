//! Per-client rate limiting.
//!
//! Each peer IP gets `limit` requests per `window`. Capacity refills evenly
//! across the window (GCRA), so a client that spent its burst regains one
//! request every `window / limit`. A rejected request is `429`.
//!
//! The router applies the limit outside [`Environment::Development`]
//! (see [`Router::rate_limit`]). Requests without a peer address, i.e. those
//! built in-process, are never limited.
//!
//! [`Environment::Development`]: crate::Environment::Development
//! [`Router::rate_limit`]: crate::Router::rate_limit

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::warn;

use crate::error::AppError;

const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// A keyed limiter over peer IPs.
///
/// ```rust
/// use std::num::NonZeroU32;
/// use std::time::Duration;
/// use tally::middleware::limit::RateLimit;
///
/// let limit = RateLimit::new(NonZeroU32::new(2).unwrap(), Duration::from_secs(60));
/// let client = "203.0.113.9".parse().ok();
///
/// assert!(limit.check(client).is_ok());
/// assert!(limit.check(client).is_ok());
/// assert_eq!(limit.check(client).unwrap_err().status().code(), 429);
/// ```
pub struct RateLimit {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl RateLimit {
    pub fn new(limit: NonZeroU32, window: Duration) -> Self {
        let quota = Quota::with_period(window / limit.get())
            .unwrap_or_else(|| Quota::per_second(limit))
            .allow_burst(limit);
        Self { limiter: RateLimiter::keyed(quota) }
    }

    /// Spends one request for `client`.
    pub fn check(&self, client: Option<IpAddr>) -> Result<(), AppError> {
        let Some(ip) = client else {
            return Ok(());
        };

        // TODO: evict idle clients with `retain_recent` from a periodic task;
        // the keyed store currently grows with every distinct peer.
        self.limiter.check_key(&ip).map_err(|_| {
            warn!(%ip, "rate limit exceeded");
            AppError::too_many_requests("Too many requests from this IP, please try again later.")
        })
    }
}

/// 100 requests per 15 minutes.
impl Default for RateLimit {
    fn default() -> Self {
        Self::new(NonZeroU32::MIN.saturating_add(99), DEFAULT_WINDOW)
    }
}
