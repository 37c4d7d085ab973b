use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::gateway::{
    state::AppState,
    types::{ApiError, error_codes},
};
use crate::token::TokenError;

const BEARER: &str = "bearer";

/// Require `Authorization: Bearer <token>`; injects the verified `Payload`
pub async fn bearer_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract Authorization header
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized(error_codes::MISSING_AUTH, "Missing Authorization header")
        })?;

    let mut parts = auth_header.split_whitespace();
    let (scheme, token) = match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) => (scheme, token),
        _ => {
            return Err(ApiError::unauthorized(
                error_codes::AUTH_FAILED,
                "Invalid authorization header format",
            ));
        }
    };

    if !scheme.eq_ignore_ascii_case(BEARER) {
        return Err(ApiError::unauthorized(
            error_codes::AUTH_FAILED,
            format!("Unsupported authorization type {}", scheme),
        ));
    }

    // 2. Verify token
    match state.user_auth.verify_token(token) {
        Ok(payload) => {
            // 3. Inject payload
            request.extensions_mut().insert(payload);
            Ok(next.run(request).await)
        }
        Err(TokenError::Expired) => Err(ApiError::unauthorized(
            error_codes::TOKEN_EXPIRED,
            "Token has expired",
        )),
        Err(e) => {
            tracing::debug!("Token rejected: {}", e);
            Err(ApiError::unauthorized(
                error_codes::AUTH_FAILED,
                "Invalid token",
            ))
        }
    }
}
