//! Per-IP fixed-window rate limiting. Donor has no HTTP surface to ground
//! this on directly; the counter shape (dashmap keyed by client IP, reset on
//! window expiry) follows the crate's existing dashmap-backed style used
//! elsewhere for concurrent maps.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::error::ApiError;

use super::AppState;

pub struct RateLimiter {
    limit_per_minute: u32,
    window: Duration,
    counters: DashMap<IpAddr, (Instant, u32)>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        RateLimiter { limit_per_minute, window: Duration::from_secs(60), counters: DashMap::new() }
    }

    fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut entry = self.counters.entry(ip).or_insert((now, 0));
        if now.duration_since(entry.0) > self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.limit_per_minute
    }
}

pub async fn similarity_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.similarity_rate_limiter.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}

pub async fn embedding_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.embedding_rate_limiter.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}
