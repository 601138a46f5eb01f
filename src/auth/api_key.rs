//! The shared API key that every route except the probe requires.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::Error;

/// The header clients send the API key in.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The API key configured for the server.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl ApiKey {
    /// Wrap the configured key.
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }

    /// Compare `candidate` with the key in constant time.
    ///
    /// Only the contents are compared in constant time. A candidate of the
    /// wrong length is rejected straight away, so the key's length may leak.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

/// Middleware that rejects requests without the correct `X-API-Key` header.
///
/// This runs before the token check, so a request with neither reports the
/// missing API key.
pub async fn api_key_guard(State(api_key): State<ApiKey>, request: Request, next: Next) -> Response {
    let Some(header) = request.headers().get(API_KEY_HEADER) else {
        return Error::MissingApiKey.into_response();
    };

    match header.to_str() {
        Ok(candidate) if api_key.matches(candidate) => next.run(request).await,
        _ => {
            tracing::warn!("Rejected request to {} with invalid API key", request.uri().path());
            Error::InvalidApiKey.into_response()
        }
    }
}
