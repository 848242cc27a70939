//! Per-client rate limiting.
//!
//! Each (client IP, tier) pair gets a fixed budget per window. The budget is
//! restored in full once the window has elapsed, never before.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

/// Rate limit tier for different endpoint types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Every API request
    Api,
    /// `POST /auth/login`
    Login,
    /// `POST /auth/register`
    Register,
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    tokens: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new(max_tokens: u32) -> Self {
        Self {
            tokens: max_tokens,
            window_start: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<(IpAddr, RateLimitTier), RateLimitEntry>,
    config: RateLimitConfig,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window_duration: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    /// Consume a token for this client and tier.
    /// Returns the remaining budget, or the seconds to wait when exhausted.
    pub fn check_rate_limit(&self, ip: IpAddr, tier: RateLimitTier) -> Result<RateLimitInfo, u64> {
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                remaining: u32::MAX,
                limit: u32::MAX,
                reset_after: 0,
            });
        }

        let max_tokens = self.max_tokens(tier);
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry((ip, tier))
            .or_insert_with(|| RateLimitEntry::new(max_tokens));

        if now.duration_since(entry.window_start) >= self.window_duration {
            entry.tokens = max_tokens;
            entry.window_start = now;
        }

        let elapsed = now.duration_since(entry.window_start);
        if entry.tokens > 0 {
            entry.tokens -= 1;
            Ok(RateLimitInfo {
                remaining: entry.tokens,
                limit: max_tokens,
                reset_after: self.window_duration.saturating_sub(elapsed).as_secs(),
            })
        } else {
            Err(self.window_duration.saturating_sub(elapsed).as_secs().max(1))
        }
    }

    pub fn max_tokens(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Login => self.config.login_requests_per_window,
            RateLimitTier::Register => self.config.register_requests_per_window,
        }
    }

    /// Drop buckets idle for two full windows.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window_duration * 2;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    pub fn trusts_proxy_headers(&self) -> bool {
        self.config.trust_proxy_headers
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub limit: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
}

/// Client IP. Forwarded headers (first `X-Forwarded-For` hop, then
/// `X-Real-IP`) count only when `trust_proxy` is set; otherwise the peer
/// address is used. Falls back to loopback when none is available.
fn client_ip(request: &Request<Body>, trust_proxy: bool) -> IpAddr {
    let headers = request.headers();
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
            })
    };
    let peer = || {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };

    trust_proxy
        .then(forwarded)
        .flatten()
        .or_else(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_login(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(state, request, next, RateLimitTier::Login).await
}

pub async fn rate_limit_register(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(state, request, next, RateLimitTier::Register).await
}

async fn rate_limit_with_tier(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let ip = client_ip(&request, state.rate_limiter.trusts_proxy_headers());

    match state.rate_limiter.check_rate_limit(ip, tier) {
        Ok(info) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(info.reset_after));
            response
        }
        Err(retry_after) => {
            tracing::warn!(client = %ip, tier = ?tier, "Rate limit exceeded");
            let mut response = ApiError::rate_limited(format!(
                "Too many requests. Try again in {} seconds.",
                retry_after
            ))
            .into_response();
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert(
                "X-RateLimit-Limit",
                HeaderValue::from(state.rate_limiter.max_tokens(tier)),
            );
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(retry_after));
            response
        }
    }
}

/// Periodically prune idle buckets.
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                "Rate limiter cleanup complete, {} entries remaining",
                rate_limiter.entry_count()
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            api_requests_per_window: 10,
            login_requests_per_window: 3,
            register_requests_per_window: 2,
            window_seconds: 60,
            cleanup_interval: 300,
            trust_proxy_headers: false,
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_blocks_after_budget_is_spent() {
        let limiter = RateLimiter::new(test_config());
        for i in 0..10 {
            assert!(
                limiter.check_rate_limit(ip(1), RateLimitTier::Api).is_ok(),
                "request {} should pass",
                i
            );
        }
        let retry_after = limiter.check_rate_limit(ip(1), RateLimitTier::Api).unwrap_err();
        assert!(retry_after >= 1);
    }

    #[test]
    fn test_clients_and_tiers_are_isolated() {
        let limiter = RateLimiter::new(test_config());
        for _ in 0..3 {
            limiter.check_rate_limit(ip(1), RateLimitTier::Login).unwrap();
        }
        assert!(limiter.check_rate_limit(ip(1), RateLimitTier::Login).is_err());
        assert!(limiter.check_rate_limit(ip(2), RateLimitTier::Login).is_ok());
        assert!(limiter.check_rate_limit(ip(1), RateLimitTier::Register).is_ok());
        assert!(limiter.check_rate_limit(ip(1), RateLimitTier::Api).is_ok());
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let mut config = test_config();
        config.enabled = false;
        let limiter = RateLimiter::new(config);
        for _ in 0..100 {
            assert!(limiter.check_rate_limit(ip(1), RateLimitTier::Register).is_ok());
        }
    }

    #[test]
    fn test_cleanup_keeps_recent_entries() {
        let limiter = RateLimiter::new(test_config());
        limiter.check_rate_limit(ip(1), RateLimitTier::Api).unwrap();
        limiter.check_rate_limit(ip(1), RateLimitTier::Login).unwrap();
        limiter.cleanup_expired();
        assert_eq!(limiter.entry_count(), 2);
    }

    #[test]
    fn test_budget_is_not_restored_mid_window() {
        let mut config = test_config();
        config.window_seconds = 2;
        let limiter = RateLimiter::new(config);
        for _ in 0..3 {
            limiter.check_rate_limit(ip(1), RateLimitTier::Login).unwrap();
        }
        // Over a third of the window has passed, still nothing back
        std::thread::sleep(Duration::from_millis(1100));
        assert!(limiter.check_rate_limit(ip(1), RateLimitTier::Login).is_err());
    }

    #[test]
    fn test_budget_resets_after_window() {
        let mut config = test_config();
        config.window_seconds = 1;
        let limiter = RateLimiter::new(config);
        for _ in 0..3 {
            limiter.check_rate_limit(ip(1), RateLimitTier::Login).unwrap();
        }
        assert!(limiter.check_rate_limit(ip(1), RateLimitTier::Login).is_err());

        std::thread::sleep(Duration::from_millis(1100));
        let info = limiter.check_rate_limit(ip(1), RateLimitTier::Login).unwrap();
        assert_eq!(info.remaining, 2);
    }

    fn request_from(peer: [u8; 4], forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder();
        if let Some(value) = forwarded_for {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 5000))));
        request
    }

    #[test]
    fn test_client_ip_uses_peer_by_default() {
        let request = request_from([198, 51, 100, 4], Some("203.0.113.7"));
        assert_eq!(client_ip(&request, false), "198.51.100.4".parse::<IpAddr>().unwrap());

        let request = Request::builder()
            .header("x-real-ip", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request, false), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_client_ip_behind_trusted_proxy() {
        let request = request_from([10, 0, 0, 1], Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&request, true), "203.0.113.7".parse::<IpAddr>().unwrap());

        let request = Request::builder()
            .header("x-real-ip", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request, true), "203.0.113.9".parse::<IpAddr>().unwrap());

        let request = request_from([10, 0, 0, 1], Some("not-an-ip"));
        assert_eq!(client_ip(&request, true), "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_rotating_forwarded_for_does_not_escape_login_budget() {
        let limiter = RateLimiter::new(test_config());
        let mut blocked = 0;
        for i in 0..50u8 {
            let request = request_from([198, 51, 100, 4], Some(&format!("203.0.113.{}", i)));
            let ip = client_ip(&request, limiter.trusts_proxy_headers());
            if limiter.check_rate_limit(ip, RateLimitTier::Login).is_err() {
                blocked += 1;
            }
        }
        assert_eq!(blocked, 47);
    }
}
