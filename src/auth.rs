use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Minimum accepted key length (256 bits as base64 or hex)
pub const MIN_KEY_LENGTH: usize = 32;

/// Static API keys that gate mutating requests
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashSet<String>,
}

impl ApiKeyStore {
    /// Build the store from configured keys
    ///
    /// Keys shorter than [`MIN_KEY_LENGTH`] are rejected with an error log
    /// instead of weakening the gate. An empty store disables gating.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut accepted = HashSet::new();
        for key in keys {
            let key = key.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            if key.len() < MIN_KEY_LENGTH {
                tracing::error!(
                    "Ignoring weak API key (length: {}, minimum: {})",
                    key.len(),
                    MIN_KEY_LENGTH
                );
                continue;
            }
            accepted.insert(key.to_string());
        }

        if accepted.is_empty() {
            tracing::warn!("No API keys configured, mutating routes are open");
        } else {
            tracing::info!("API key gating enabled with {} key(s)", accepted.len());
        }
        Self { keys: accepted }
    }

    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// Token of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware requiring a valid bearer key on state-changing requests.
/// Safe methods (GET, HEAD, OPTIONS) always pass.
pub async fn require_auth(
    State(store): State<Arc<ApiKeyStore>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !store.is_enabled() || request.method().is_safe() {
        return Ok(next.run(request).await);
    }

    if !request.headers().contains_key("Authorization") {
        tracing::warn!(
            "Missing Authorization header on {} {}",
            request.method(),
            request.uri().path()
        );
        return Err(StatusCode::UNAUTHORIZED);
    }

    let authorized = match bearer_token(request.headers()) {
        Some(key) => store.is_valid(key),
        None => {
            tracing::warn!("Invalid Authorization header format (expected Bearer token)");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    if !authorized {
        tracing::warn!("Invalid API key attempted");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
