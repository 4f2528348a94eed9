use crate::auth::{bearer_token, ApiKeyStore};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Bucket shared by callers with neither a valid key nor a known peer address
const ANONYMOUS: &str = "anonymous";

/// Rate limiter configuration
pub struct RateLimiterConfig {
    /// Maximum requests per minute per caller
    pub requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
        }
    }
}

/// One bucket per caller
pub type KeyedRateLimiter = Arc<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>;

pub fn create_rate_limiter(config: RateLimiterConfig) -> KeyedRateLimiter {
    let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

/// Drop buckets that have refilled completely. Returns the buckets left.
pub fn prune_rate_limiter(limiter: &KeyedRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// Limiter plus the key store used to tell real callers apart
#[derive(Clone)]
pub struct CallerRateLimit {
    limiter: KeyedRateLimiter,
    keys: Arc<ApiKeyStore>,
}

impl CallerRateLimit {
    pub fn new(limiter: KeyedRateLimiter, keys: Arc<ApiKeyStore>) -> Self {
        Self { limiter, keys }
    }

    /// Bucket of a request: its API key when the key is valid, otherwise the
    /// peer IP. Unverified bearer tokens never get a bucket of their own.
    fn caller(&self, request: &Request) -> String {
        if let Some(token) = bearer_token(request.headers()).filter(|t| self.keys.is_valid(t)) {
            return format!("key:{}", token);
        }
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }
}

/// Middleware to apply rate limiting, keyed by caller
pub async fn rate_limit_middleware(
    State(gate): State<CallerRateLimit>,
    request: Request,
    next: Next,
) -> Response {
    let caller = gate.caller(&request);

    match gate.limiter.check_key(&caller) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!("Rate limit exceeded on {}", request.uri().path());
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please try again later.",
            )
                .into_response()
        }
    }
}
