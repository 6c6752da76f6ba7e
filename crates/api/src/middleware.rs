//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use neighborly_core::{IdentityService, PollService, Voter};

/// Header carrying a guest device token.
pub const DEVICE_TOKEN_HEADER: &str = "x-device-token";

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub poll_service: PollService,
    pub identity_service: IdentityService,
}

/// Resolve the caller from request headers.
///
/// A bearer token wins over a device token. Invalid credentials leave the
/// request unauthenticated; endpoints that need an identity reject it.
fn resolve_voter(identity: &IdentityService, headers: &HeaderMap) -> Option<Voter> {
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return identity.authenticate_bearer(token.trim()).ok();
    }

    if identity.allows_guests()
        && let Some(device) = headers.get(DEVICE_TOKEN_HEADER)
        && let Ok(device) = device.to_str()
    {
        return identity
            .guest(device)
            .inspect_err(|e| tracing::debug!(error = %e, "Ignoring device token"))
            .ok();
    }

    None
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(voter) = resolve_voter(&state.identity_service, req.headers()) {
        req.extensions_mut().insert(voter);
    }

    next.run(req).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_no_credentials() {
        let identity = IdentityService::new("secret", true);
        assert!(resolve_voter(&identity, &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_device_token_when_guests_enabled() {
        let identity = IdentityService::new("secret", true);
        let mut headers = HeaderMap::new();
        headers.insert(
            DEVICE_TOKEN_HEADER,
            HeaderValue::from_static("device-0123456789abcdef"),
        );

        let voter = resolve_voter(&identity, &headers).unwrap();
        assert_eq!(voter.id(), "guest:device-0123456789abcdef");
    }

    #[test]
    fn test_device_token_ignored_when_guests_disabled() {
        let identity = IdentityService::new("secret", false);
        let mut headers = HeaderMap::new();
        headers.insert(
            DEVICE_TOKEN_HEADER,
            HeaderValue::from_static("device-0123456789abcdef"),
        );

        assert!(resolve_voter(&identity, &headers).is_none());
    }

    #[test]
    fn test_invalid_bearer_does_not_fall_back_to_guest() {
        let identity = IdentityService::new("secret", true);
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer garbage"));
        headers.insert(
            DEVICE_TOKEN_HEADER,
            HeaderValue::from_static("device-0123456789abcdef"),
        );

        assert!(resolve_voter(&identity, &headers).is_none());
    }
}
