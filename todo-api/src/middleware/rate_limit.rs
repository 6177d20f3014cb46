/// Per-user rate limiting
///
/// Each authenticated user gets a token bucket held in process memory.
/// The bucket holds `RATE_LIMIT_PER_MINUTE` tokens and refills continuously
/// at that rate; every request takes one token. A value of 0 disables the
/// limiter.
///
/// # Algorithm
///
/// Uses token bucket algorithm:
/// - Tokens refill at constant rate
/// - Each request consumes 1 token
/// - Request blocked if bucket empty
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Requests allowed per minute
/// - `X-RateLimit-Remaining`: Tokens remaining, 0 on 429 responses
/// - `Retry-After`: Seconds to wait (429 responses only)

use crate::{app::AppState, error::ApiError, middleware::auth::AuthUser};
use axum::{
    extract::{Extension, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Buckets kept before idle ones are dropped
const MAX_TRACKED_USERS: usize = 10_000;

/// A bucket untouched this long has refilled completely
const IDLE_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a new full bucket
    fn new(capacity: u32) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: Instant::now(),
        }
    }

    /// Refills tokens based on elapsed time
    fn refill(&mut self, rate: f64, capacity: u32) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed_secs * rate).min(capacity as f64);
        self.last_refill = now;
    }

    /// Attempts to consume N tokens
    fn try_consume(&mut self, count: f64) -> bool {
        if self.tokens >= count {
            self.tokens -= count;
            true
        } else {
            false
        }
    }

    /// Calculates seconds until N tokens available
    fn seconds_until_available(&self, count: f64, rate: f64) -> u64 {
        let deficit = count - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }
}

/// Outcome of [`RateLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
}

pub struct RateLimiter {
    requests_per_minute: u32,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.requests_per_minute > 0
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Takes one token from `key`'s bucket
    pub fn check(&self, key: &str) -> RateLimitDecision {
        if !self.is_enabled() {
            return RateLimitDecision::Allowed { remaining: 0 };
        }

        let capacity = self.requests_per_minute;
        let rate = capacity as f64 / 60.0;

        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if buckets.len() >= MAX_TRACKED_USERS && !buckets.contains_key(key) {
            buckets.retain(|_, bucket| bucket.last_refill.elapsed() < IDLE_AFTER);
        }

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(capacity));
        bucket.refill(rate, capacity);

        if bucket.try_consume(1.0) {
            RateLimitDecision::Allowed {
                remaining: bucket.tokens.floor() as u32,
            }
        } else {
            RateLimitDecision::Limited {
                retry_after: bucket.seconds_until_available(1.0, rate).max(1),
            }
        }
    }
}

/// Rate limiting middleware layer
///
/// Runs after authentication. Returns 429 once the caller's bucket is empty.
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limiter = &state.rate_limiter;
    if !limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let remaining = match limiter.check(&user.user_id) {
        RateLimitDecision::Allowed { remaining } => remaining,
        RateLimitDecision::Limited { retry_after } => {
            tracing::warn!(user_id = %user.user_id, retry_after, "Rate limit exceeded");
            return Err(ApiError::RateLimited {
                limit: limiter.requests_per_minute(),
                retry_after,
            });
        }
    };

    let mut response = next.run(request).await;

    response.headers_mut().insert(
        "X-RateLimit-Limit",
        HeaderValue::from(limiter.requests_per_minute()),
    );
    response
        .headers_mut()
        .insert("X-RateLimit-Remaining", HeaderValue::from(remaining));

    Ok(response)
}
