//! Admission rate limiting: a global quota and a per-origin quota.
//!
//! Both limiters count requests in fixed one-second windows and never queue:
//! a request over quota is rejected on the spot.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

const WINDOW: Duration = Duration::from_secs(1);

/// Windows idle this long are dropped when the keyed map grows large.
const PRUNE_THRESHOLD: usize = 10_000;

/// Counter for one fixed window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self { started: now, count: 0 }
    }

    fn try_admit(&mut self, quota: u64, now: Instant) -> bool {
        if now.duration_since(self.started) >= WINDOW {
            self.started = now;
            self.count = 0;
        }
        if self.count < quota {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// One quota shared by all traffic.
#[derive(Debug)]
pub struct GlobalLimiter {
    quota: u64,
    window: Mutex<Window>,
}

impl GlobalLimiter {
    /// A quota of 0 disables the limiter.
    pub fn new(quota: u64) -> Self {
        Self {
            quota,
            window: Mutex::new(Window::new(Instant::now())),
        }
    }

    pub fn check(&self) -> bool {
        if self.quota == 0 {
            return true;
        }
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.try_admit(self.quota, Instant::now())
    }
}

/// One quota per key (caller origin).
#[derive(Debug)]
pub struct KeyedLimiter {
    quota: u64,
    windows: DashMap<String, Window>,
    last_prune: Mutex<Instant>,
}

impl KeyedLimiter {
    /// A quota of 0 disables the limiter.
    pub fn new(quota: u64) -> Self {
        Self {
            quota,
            windows: DashMap::new(),
            last_prune: Mutex::new(Instant::now()),
        }
    }

    /// Whether `key` still has quota in its current window. Never records
    /// anything, so unknown keys leave no state behind.
    pub fn has_capacity(&self, key: &str) -> bool {
        if self.quota == 0 {
            return true;
        }
        let now = Instant::now();
        match self.windows.get(key) {
            Some(window) => now.duration_since(window.started) >= WINDOW || window.count < self.quota,
            None => true,
        }
    }

    pub fn check(&self, key: &str) -> bool {
        if self.quota == 0 {
            return true;
        }
        let now = Instant::now();
        self.prune(now);

        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(now));
        window.try_admit(self.quota, now)
    }

    /// Drop idle windows, at most once per window length.
    fn prune(&self, now: Instant) {
        if self.windows.len() <= PRUNE_THRESHOLD {
            return;
        }
        {
            let mut last = self.last_prune.lock().unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last) < WINDOW {
                return;
            }
            *last = now;
        }
        self.windows
            .retain(|_, w| now.duration_since(w.started) < WINDOW);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Both limiters, evaluated per origin first, then globally. An origin is
/// only charged once the global limiter has admitted the request.
#[derive(Debug)]
pub struct AdmissionController {
    global: GlobalLimiter,
    per_origin: KeyedLimiter,
}

impl AdmissionController {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            global: GlobalLimiter::new(config.global_per_second),
            per_origin: KeyedLimiter::new(config.per_ip_per_second),
        }
    }

    pub fn admit(&self, origin: &str) -> GatewayResult<()> {
        if !self.per_origin.has_capacity(origin) {
            tracing::warn!(origin = %origin, "Per-origin rate limit exceeded");
            return Err(GatewayError::rate_limited());
        }
        if !self.global.check() {
            tracing::warn!("Global rate limit exceeded");
            return Err(GatewayError::rate_limited());
        }
        if !self.per_origin.check(origin) {
            tracing::warn!(origin = %origin, "Per-origin rate limit exceeded");
            return Err(GatewayError::rate_limited());
        }
        Ok(())
    }

    pub fn tracked_origins(&self) -> usize {
        self.per_origin.tracked_keys()
    }
}

/// Caller origin: `X-Real-IP`, then the first `X-Forwarded-For` hop, then
/// the socket peer.
pub fn client_origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header_value("x-real-ip") {
        return ip.to_string();
    }
    if let Some(hop) = header_value("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return hop.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting requests over either quota with 429.
pub async fn admission_middleware(
    State(admission): State<Arc<AdmissionController>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let origin = client_origin(request.headers(), peer);

    match admission.admit(&origin) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            metrics::record_admission_rejected("rate_limited");
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test(start_paused = true)]
    async fn test_global_quota_then_next_window() {
        let limiter = GlobalLimiter::new(3);

        assert!(limiter.check());
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check(), "fourth call in the same window");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.check(), "next window admits again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyed_limiters_are_independent() {
        let limiter = KeyedLimiter::new(1);

        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_quota_disables() {
        let limiter = GlobalLimiter::new(0);
        for _ in 0..1_000 {
            assert!(limiter.check());
        }
        let keyed = KeyedLimiter::new(0);
        assert!(keyed.check("a"));
        assert_eq!(keyed.tracked_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_limiters_must_pass() {
        let admission = AdmissionController::new(&RateLimitConfig {
            global_per_second: 2,
            per_ip_per_second: 5,
        });

        assert!(admission.admit("a").is_ok());
        assert!(admission.admit("b").is_ok());
        assert_eq!(admission.admit("c"), Err(GatewayError::rate_limited()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_globally_rejected_origins_are_not_tracked() {
        let admission = AdmissionController::new(&RateLimitConfig {
            global_per_second: 1,
            per_ip_per_second: 100,
        });

        let mut rejected = 0;
        for i in 0..20_000 {
            if admission.admit(&format!("10.{}.{}.{}", i >> 16, (i >> 8) & 0xff, i & 0xff)).is_err() {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 19_999);
        assert_eq!(admission.tracked_origins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_origin_does_not_spend_global_quota() {
        let admission = AdmissionController::new(&RateLimitConfig {
            global_per_second: 3,
            per_ip_per_second: 1,
        });

        assert!(admission.admit("a").is_ok());
        assert!(admission.admit("a").is_err());
        assert!(admission.admit("a").is_err());
        assert!(admission.admit("b").is_ok());
        assert!(admission.admit("c").is_ok());
        assert!(admission.admit("d").is_err(), "global quota of 3 used by a, b and c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_windows_are_pruned() {
        let limiter = KeyedLimiter::new(1);
        for i in 0..=PRUNE_THRESHOLD {
            assert!(limiter.check(&i.to_string()));
        }
        assert_eq!(limiter.tracked_keys(), PRUNE_THRESHOLD + 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.check("fresh"));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_client_origin_precedence() {
        let peer: SocketAddr = "192.168.1.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_origin(&headers, Some(peer)), "192.168.1.9");
        assert_eq!(client_origin(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1, 2.2.2.2"));
        assert_eq!(client_origin(&headers, Some(peer)), "1.1.1.1");

        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));
        assert_eq!(client_origin(&headers, Some(peer)), "3.3.3.3");
    }
}
