//! Identity extraction.
//!
//! Authentication happens upstream (a reverse proxy or SSO gateway); the
//! daemon only reads the username it forwards in the configured header.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use super::error::ApiError;
use super::AppState;

/// The username supplied with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_user(&parts.headers, &state.config.server.auth_header, None).map(AuthUser)
    }
}

/// Read the username from `header`, falling back to `fallback` (used by the
/// event-stream route, where browsers cannot set headers).
///
/// Surrounding whitespace is ignored; an empty value counts as missing.
pub fn resolve_user(
    headers: &HeaderMap,
    header: &str,
    fallback: Option<&str>,
) -> Result<String, ApiError> {
    let from_header = headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let username = from_header.or_else(|| fallback.map(str::trim).filter(|value| !value.is_empty()));

    match username {
        Some(username) => Ok(username.to_string()),
        None => {
            tracing::debug!(header = %header, "Request without user identity");
            Err(ApiError::Unauthorized)
        }
    }
}
