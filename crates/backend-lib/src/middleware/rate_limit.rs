// ============================
// crates/backend-lib/src/middleware/rate_limit.rs
// ============================
//! Fixed-window rate limiting keyed by the `x-real-ip` header.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use metrics::counter;
use tracing::debug;

use crate::config::RateLimitSettings;
use crate::error::AppError;
use crate::metrics::HTTP_RATE_LIMITED;
use crate::AppState;

/// Per-client request counters
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: DashMap<String, RateLimitEntry>,
    started: Instant,
    /// Milliseconds since `started` at the last stale-entry sweep
    last_sweep: AtomicU64,
}

/// Rate limit entry for a client
#[derive(Debug)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            clients: DashMap::new(),
            started: Instant::now(),
            last_sweep: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(Duration::from_secs(settings.window_secs), settings.max_requests)
    }

    /// Count a request from `client`; false once the window's budget is spent
    pub fn check(&self, client: &str) -> bool {
        // must run before the entry guard below is taken
        self.sweep_expired();

        let mut entry = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| RateLimitEntry {
                requests: 0,
                window_start: Instant::now(),
            });

        if entry.window_start.elapsed() >= self.window {
            entry.requests = 0;
            entry.window_start = Instant::now();
        }

        if entry.requests >= self.max_requests {
            return false;
        }
        entry.requests += 1;
        true
    }

    /// Drop clients whose window has lapsed, at most once per window
    fn sweep_expired(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.window.as_millis() as u64 {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let before = self.clients.len();
        self.clients
            .retain(|_, entry| entry.window_start.elapsed() < self.window);
        let swept = before.saturating_sub(self.clients.len());
        if swept > 0 {
            debug!(swept, "expired rate limit entries dropped");
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Rate limiter middleware
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if !state.rate_limiter.check(&client_ip) {
        debug!(%client_ip, path = %request.uri().path(), "rate limit exceeded");
        counter!(HTTP_RATE_LIMITED).increment(1);
        return Err(AppError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}
