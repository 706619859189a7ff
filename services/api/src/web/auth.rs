//! services/api/src/web/auth.rs
//!
//! Operator login and logout.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    response::{IntoResponse, Json},
};
use engagement_core::ports::PortError;
use engagement_core::EngagementError;
use std::sync::Arc;
use tracing::warn;

use crate::error::ApiError;
use crate::web::middleware::bearer_token;
use crate::web::protocol::{Envelope, ErrorBody, LoginData, LoginRequest};
use crate::web::state::AppState;

/// POST /v1/auth/login - Exchange operator credentials for a session token
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Operator",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginData),
        (status = 400, description = "Email or password missing", body = ErrorBody),
        (status = 401, description = "Invalid email or password", body = ErrorBody)
    )
)]
pub async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let issued = app_state
        .gate
        .login(&payload.email, &payload.password)
        .await
        .map_err(|e: PortError| ApiError::from(EngagementError::from(e)))?
        .ok_or_else(|| {
            warn!("Operator login rejected");
            ApiError::InvalidCredentials
        })?;

    Ok(Json(Envelope::with_message(
        "Login successful",
        LoginData {
            token: issued.token,
            expires_at: issued.expires_at,
        },
    )))
}

/// POST /v1/auth/logout - Revoke the session token used for this request
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Operator",
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Missing or invalid operator token", body = ErrorBody)
    ),
    security(("operator_token" = []))
)]
pub async fn logout_handler(
    State(app_state): State<Arc<AppState>>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    app_state
        .gate
        .logout(token)
        .await
        .map_err(|e| ApiError::from(EngagementError::from(e)))?;
    Ok(Json(Envelope::with_message("Logged out", ())))
}
