//! # Authentication Module
//!
//! Bearer API key authentication. When a key is configured every route
//! except `/health` requires
//!
//! ```text
//! Authorization: Bearer <api-key>
//! ```

use super::types::ErrorResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The configured key, shared with the middleware.
pub type ApiKey = Arc<str>;

/// Compare keys in time independent of where they differ.
///
/// Both sides are padded to the same length so the comparison always covers
/// the same number of bytes; lengths are checked separately.
#[must_use]
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

/// Reject requests without the configured key. `/health` always passes.
pub async fn api_key_auth_middleware(
    State(expected): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let verdict = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| keys_match(v.strip_prefix("Bearer ").unwrap_or(v), &expected));

    let reason = match verdict {
        Some(true) => return next.run(request).await,
        Some(false) => "invalid_api_key",
        None => "missing_authorization_header",
    };
    tracing::warn!(event = "auth_failure", reason, path = %request.uri().path(), "request rejected");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(ErrorResponse::new("missing or invalid API key")),
    )
        .into_response()
}

// =============================================================================
// TESTS
// =============================================================================
