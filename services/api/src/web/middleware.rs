//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting operator routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::web::state::AppState;

/// The token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Middleware that checks the bearer token against the access gate. Both
/// configured tokens and tokens issued by `/v1/auth/login` are accepted.
///
/// If the header is missing or the gate refuses the token, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;

    if !state.gate.is_authorized(token).await {
        debug!(path = %req.uri().path(), "Rejected operator token");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}
