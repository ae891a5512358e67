//! Rate Limiting Module
//!
//! Fixed-window request counting keyed by client address and endpoint.
//! The counter lives behind [`WindowCounter`]; production uses Redis with a
//! single Lua round trip so the increment and the expiry happen atomically.

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::{
    collections::HashMap,
    convert::Infallible,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::core::config::AppEnv;

pub const SUBMIT_TICKET_ENDPOINT: &str = "submit-ticket";
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";

const WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Counter state after one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub count: u64,
    pub ttl: Duration,
}

#[async_trait]
pub trait WindowCounter: Send + Sync {
    /// Increment the counter for `key`, starting a new window of length
    /// `window` if none is running.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError>;
}

pub struct RedisWindowCounter {
    client: Arc<redis::Client>,
    script: redis::Script,
}

impl RedisWindowCounter {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self {
            client,
            script: redis::Script::new(WINDOW_SCRIPT),
        }
    }
}

impl std::fmt::Debug for RedisWindowCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisWindowCounter").finish_non_exhaustive()
    }
}

#[async_trait]
impl WindowCounter for RedisWindowCounter {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let window_ms = window.as_millis().max(1) as u64;
        let (count, ttl): (i64, i64) = self
            .script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(WindowHit {
            count: count.max(0) as u64,
            ttl: Duration::from_millis(ttl.max(0) as u64),
        })
    }
}

const DEFAULT_PRUNE_THRESHOLD: usize = 1024;

/// Process-local counter, used in tests and single-node development.
///
/// Expired windows are dropped once the map reaches the prune threshold.
#[derive(Debug)]
pub struct InMemoryWindowCounter {
    windows: Mutex<HashMap<String, (u64, Instant)>>,
    prune_threshold: usize,
}

impl InMemoryWindowCounter {
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            prune_threshold,
        }
    }
}

impl Default for InMemoryWindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowCounter for InMemoryWindowCounter {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        if windows.len() >= self.prune_threshold {
            windows.retain(|_, (_, expires)| *expires > now);
        }
        let entry = windows.entry(key.to_string()).or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(WindowHit {
            count: entry.0,
            ttl: entry.1.saturating_duration_since(now),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub endpoint: &'static str,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    /// 5 submissions per 5 minutes, relaxed to 100 in development.
    pub fn submit_ticket(env: AppEnv) -> Self {
        Self {
            endpoint: SUBMIT_TICKET_ENDPOINT,
            limit: if env.is_development() { 100 } else { 5 },
            window: Duration::from_secs(5 * 60),
        }
    }
}

pub fn rate_limit_key(ip: &str, endpoint: &str) -> String {
    format!("ratelimit:{}:{}", ip, endpoint)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub limit: u32,
    pub remaining: u32,
    pub success: bool,
    /// Epoch milliseconds at which the window resets.
    pub reset: i64,
}

impl RateLimitResult {
    pub fn from_hit(limit: u32, hit: WindowHit, now_ms: i64) -> Self {
        let remaining = u64::from(limit).saturating_sub(hit.count) as u32;
        Self {
            limit,
            remaining,
            success: hit.count <= u64::from(limit),
            reset: now_ms + hit.ttl.as_millis() as i64,
        }
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(self.reset));
    }

    pub fn with_headers(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        self.apply_headers(response.headers_mut());
        response
    }

    pub fn too_many_requests(&self, now_ms: i64) -> Response {
        let retry_after = ((self.reset - now_ms).max(0) + 999) / 1000;
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": RATE_LIMITED_MESSAGE })),
        )
            .into_response();
        self.apply_headers(response.headers_mut());
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

pub async fn check_rate_limit(
    counter: &dyn WindowCounter,
    ip: &str,
    policy: &RateLimitPolicy,
) -> Result<RateLimitResult, RateLimitError> {
    let key = rate_limit_key(ip, policy.endpoint);
    let hit = counter.hit(&key, policy.window).await?;
    let result =
        RateLimitResult::from_hit(policy.limit, hit, chrono::Utc::now().timestamp_millis());
    if !result.success {
        log::warn!(
            "Rate limit exceeded for {} on {} ({} hits)",
            ip,
            policy.endpoint,
            hit.count
        );
    }
    Ok(result)
}

/// Client address as seen through reverse proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn from_parts(parts: &Parts) -> Self {
        if let Some(forwarded) = parts.headers.get("x-forwarded-for") {
            if let Ok(value) = forwarded.to_str() {
                if let Some(ip) = value.split(',').next().map(str::trim) {
                    if !ip.is_empty() {
                        return Self(ip.to_string());
                    }
                }
            }
        }

        if let Some(real_ip) = parts.headers.get("x-real-ip") {
            if let Ok(value) = real_ip.to_str() {
                let value = value.trim();
                if !value.is_empty() {
                    return Self(value.to_string());
                }
            }
        }

        Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        )
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
