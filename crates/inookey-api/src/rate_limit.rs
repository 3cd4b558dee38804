//! Fixed-window rate limiter middleware, keyed by client address.
//!
//! Each client gets `max_requests` per window; the window restarts on the
//! first request after it expires. Applied to the `/api` routes only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use inookey_core::config::ServerConfig;

use crate::client::client_ip;
use crate::error::ApiError;

/// Expired windows are pruned once this many clients are tracked.
const PRUNE_THRESHOLD: usize = 1024;

/// Key shared by requests that carry no address at all.
const UNKNOWN_CLIENT: &str = "unknown";

struct Window {
    started: Instant,
    count: u64,
}

/// Shared state for the rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u64,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// Try to acquire a permit for `key`. Returns true if the request is allowed.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }
}

/// Axum middleware that enforces the rate limit.
pub async fn rate_limit_middleware(
    axum::extract::Extension(limiter): axum::extract::Extension<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_ip(req.headers(), req.extensions())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    if limiter.try_acquire(&key) {
        next.run(req).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        ApiError::TooManyRequests.into_response()
    }
}
