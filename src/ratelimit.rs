use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Fixed-window request counter per client key.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    trust_proxy: bool,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window, trust_proxy: false, windows: DashMap::new() }
    }

    /// Key clients by `X-Forwarded-For` instead of the socket peer.
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { started: now, hits: 0 });
        let w = entry.value_mut();
        if now.duration_since(w.started) >= self.window {
            *w = Window { started: now, hits: 0 };
        }
        if w.hits >= self.max {
            let retry_after = self.window.saturating_sub(now.duration_since(w.started));
            return Decision::Limited { retry_after };
        }
        w.hits += 1;
        Decision::Allowed { remaining: self.max - w.hits }
    }

    /// Drops windows that have fully elapsed; returns how many went.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before - self.windows.len()
    }
}

/// The peer address, or the first `X-Forwarded-For` hop behind a trusted
/// proxy.
pub fn client_key(req: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

pub async fn limit(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
    let key = client_key(&req, limiter.trust_proxy);
    match limiter.check(&key) {
        Decision::Allowed { remaining } => {
            let mut res = next.run(req).await;
            let headers = res.headers_mut();
            headers.insert("ratelimit-limit", HeaderValue::from(limiter.max()));
            headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
            res
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(client = %key, "rate limit exceeded");
            let mut res = AppError::TooManyRequests { retry_after: retry_after.as_secs().max(1) }.into_response();
            res.headers_mut().insert("ratelimit-limit", HeaderValue::from(limiter.max()));
            res.headers_mut().insert("ratelimit-remaining", HeaderValue::from(0u32));
            res
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_after_max_hits_in_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.check_at("1.2.3.4", t0), Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.check_at("1.2.3.4", t0), Decision::Allowed { remaining: 0 });
        match limiter.check_at("1.2.3.4", t0 + Duration::from_secs(10)) {
            Decision::Limited { retry_after } => assert_eq!(retry_after, Duration::from_secs(50)),
            other => panic!("expected limit, got {other:?}"),
        }
        // other clients are independent
        assert_eq!(limiter.check_at("5.6.7.8", t0), Decision::Allowed { remaining: 1 });
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(matches!(limiter.check_at("k", t0), Decision::Allowed { .. }));
        assert!(matches!(limiter.check_at("k", t0), Decision::Limited { .. }));
        assert!(matches!(
            limiter.check_at("k", t0 + Duration::from_secs(61)),
            Decision::Allowed { remaining: 0 }
        ));
    }

    #[test]
    fn prune_keeps_live_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.check("live");
        assert_eq!(limiter.prune(), 0);
        let expired = RateLimiter::new(5, Duration::ZERO);
        expired.check("gone");
        assert_eq!(expired.prune(), 1);
    }

    fn request_from(peer: [u8; 4], forwarded: Option<&str>) -> Request {
        let mut builder = Request::builder();
        if let Some(forwarded) = forwarded {
            builder = builder.header("x-forwarded-for", forwarded);
        }
        let mut req = builder.body(axum::body::Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 4000))));
        req
    }

    #[test]
    fn client_key_ignores_forwarded_for_by_default() {
        let req = request_from([198, 51, 100, 7], Some("203.0.113.9"));
        assert_eq!(client_key(&req, false), "198.51.100.7");
        let bare = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&bare, false), "unknown");
    }

    #[test]
    fn client_key_uses_first_hop_behind_trusted_proxy() {
        let req = request_from([10, 0, 0, 2], Some("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_key(&req, true), "203.0.113.9");
        let direct = request_from([10, 0, 0, 2], None);
        assert_eq!(client_key(&direct, true), "10.0.0.2");
    }
}
