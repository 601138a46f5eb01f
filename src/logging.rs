//! Middleware for logging requests and responses.
//!
//! Credentials never reach the logs: the auth headers are replaced with
//! `[REDACTED]`, and so are the `password` and `token` fields of JSON bodies.

use axum::{
    body::{Body, Bytes, to_bytes},
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;

use crate::{Error, auth::API_KEY_HEADER};

/// Bodies longer than this many characters are truncated in `info` logs.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Requests with a larger body, in bytes, are refused with `413 Payload Too Large`.
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_HEADERS: &[&str] = &["authorization", API_KEY_HEADER, "cookie", "set-cookie"];

const SENSITIVE_FIELDS: &[&str] = &["password", "token"];

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] characters, it is
/// truncated and the full body is logged at the `debug` level.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body_bytes = match Limited::new(body, MAX_BODY_SIZE).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(error) if error.is::<LengthLimitError>() => {
            tracing::warn!("Refused request body larger than {MAX_BODY_SIZE} bytes");
            return Error::PayloadTooLarge.into_response();
        }
        Err(error) => {
            tracing::warn!("Could not read request body: {error}");
            return Error::MalformedInput("Invalid request body".to_owned()).into_response();
        }
    };

    log_body(
        &format!(
            "Received request: {} {} {:?}",
            parts.method,
            parts.uri,
            redact_headers(&parts.headers)
        ),
        &redact_body(&body_bytes),
    );

    let response = next
        .run(Request::from_parts(parts, Body::from(body_bytes)))
        .await;

    // Responses are built by this server, so their size is not capped.
    let (parts, body) = response.into_parts();
    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("Could not read response body: {error}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    log_body(
        &format!(
            "Sending response: {} {:?}",
            parts.status,
            redact_headers(&parts.headers)
        ),
        &redact_body(&body_bytes),
    );

    Response::from_parts(parts, Body::from(body_bytes))
}

fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED.to_owned()
            } else {
                value.to_str().unwrap_or("[non-utf8]").to_owned()
            };

            (name.as_str().to_owned(), value)
        })
        .collect()
}

fn redact_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                let key = key.to_lowercase();

                if SENSITIVE_FIELDS.iter().any(|field| key.contains(field)) {
                    *value = Value::String(REDACTED.to_owned());
                } else {
                    redact_json(value);
                }
            }
        }
        Value::Array(values) => values.iter_mut().for_each(redact_json),
        _ => {}
    }
}

/// Render `body` for the logs with any credentials removed.
fn redact_body(body: &Bytes) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(mut json) => {
            redact_json(&mut json);
            json.to_string()
        }
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

fn truncate(text: &str, limit: usize) -> Option<&str> {
    text.char_indices()
        .nth(limit)
        .map(|(byte_index, _)| &text[..byte_index])
}

fn log_body(message: &str, body: &str) {
    match truncate(body, LOG_BODY_LENGTH_LIMIT) {
        Some(truncated) => {
            tracing::info!("{message}\nbody: {truncated}...");
            tracing::debug!("Full body: {body:?}");
        }
        None => tracing::info!("{message}\nbody: {body:?}"),
    }
}
