use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::observability;

use super::{ApiError, AppState};

pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

/// Booking requests: 10 per minute per IP.
pub const BOOKINGS: RateLimitConfig = RateLimitConfig {
    max_requests: 10,
    window: Duration::from_secs(60),
};

struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter, one window per (store, client IP).
/// Windows reset lazily on the first request after expiry; state lives in
/// memory and resets on restart, which is fine for abuse protection.
pub struct RateLimiter {
    windows: DashMap<(&'static str, String), WindowEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// True if this request pushes the client over the store's limit.
    pub fn is_limited(&self, store: &'static str, ip: &str, config: &RateLimitConfig) -> bool {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((store, ip.to_string()))
            .or_insert(WindowEntry {
                count: 0,
                reset_at: now + config.window,
            });

        if now > entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + config.window;
            return false;
        }
        if entry.count >= config.max_requests {
            return true;
        }
        entry.count += 1;
        false
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Client IP for rate limiting: first hop of X-Forwarded-For, set by the
/// reverse proxy in front of us.
fn client_ip(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub(super) async fn limit_bookings(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.rate_limit_disabled {
        return Ok(next.run(req).await);
    }
    let ip = client_ip(&req);
    if state.rate.is_limited("bookings", &ip, &BOOKINGS) {
        metrics::counter!(observability::PUBLIC_REJECTED_TOTAL, "reason" => "rate_limited")
            .increment(1);
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(req).await)
}
