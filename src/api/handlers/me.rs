use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::require_principal;
use crate::gateway::{AccessGateway, GatewayError, OrgContext, Role};

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub subject: String,
    pub roles: Vec<Role>,
    pub organization: Option<OrgContext>,
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The authenticated principal.", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token."),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
#[instrument(skip_all)]
pub async fn me(headers: HeaderMap, gateway: Extension<Arc<AccessGateway>>) -> impl IntoResponse {
    let principal = match require_principal(&headers, &gateway) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let organization = match principal.org_context().await {
        Ok(context) => context.cloned(),
        Err(err) => return GatewayError::Collaborator(err).into_response(),
    };

    let response = MeResponse {
        subject: principal.subject().to_string(),
        roles: principal.roles().to_vec(),
        organization,
    };
    (StatusCode::OK, Json(response)).into_response()
}
