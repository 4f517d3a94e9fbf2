//! Login and password-reset endpoints.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::gateway::AccessGateway;

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordResetRequest {
    email: String,
}

#[derive(ToSchema, Deserialize)]
pub struct PasswordResetConfirm {
    token: String,
    new_password: String,
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Login successful", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Invalid credentials"),
        (status = 423, description = "Account locked; see Retry-After"),
        (status = 429, description = "Too many login attempts"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    gateway: Extension<Arc<AccessGateway>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let secret = SecretString::from(request.password);
    match gateway.login(&request.email, &secret).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(LoginResponse {
                token: issued.token,
                token_type: "Bearer".to_string(),
                expires_at: issued.expires_at,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/request-password-reset",
    request_body = PasswordResetRequest,
    responses (
        (status = 202, description = "Reset instructions sent if the account exists"),
        (status = 400, description = "Malformed request"),
        (status = 429, description = "Too many reset requests"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn request_password_reset(
    gateway: Extension<Arc<AccessGateway>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match gateway.request_password_reset(&request.email).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            "If the account exists, a password reset token has been sent.",
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = PasswordResetConfirm,
    responses (
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid or expired reset token"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    gateway: Extension<Arc<AccessGateway>>,
    payload: Option<Json<PasswordResetConfirm>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let secret = SecretString::from(request.new_password);
    match gateway.reset_password(&request.token, &secret).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
