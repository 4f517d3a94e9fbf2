use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::require_principal;
use crate::gateway::{AccessGateway, ResourceDescriptor};

#[utoipa::path(
    post,
    path = "/api/authorize",
    request_body = ResourceDescriptor,
    responses(
        (status = 204, description = "Access allowed."),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "Access denied."),
    ),
    security(("bearer" = [])),
    tag = "authorize"
)]
#[instrument(skip_all)]
pub async fn authorize(
    headers: HeaderMap,
    gateway: Extension<Arc<AccessGateway>>,
    payload: Option<Json<ResourceDescriptor>>,
) -> impl IntoResponse {
    let principal = match require_principal(&headers, &gateway) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let Some(Json(descriptor)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let requirement = descriptor.into_requirement();
    match gateway.authorize(&principal, &requirement).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
