#![allow(clippy::needless_for_each)]

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::gateway::{AccessGateway, OrgContext, ResourceDescriptor, Role};

pub mod error;
pub(crate) mod handlers;

use handlers::{
    auth::{self, __path_login, __path_request_password_reset, __path_reset_password},
    authorize::__path_authorize,
    health::{self, __path_health},
    me::{self, __path_me},
};

const REQUEST_ID: &str = "x-request-id";

#[derive(OpenApi)]
#[openapi(
    paths(health, login, request_password_reset, reset_password, me, authorize),
    components(schemas(
        health::Health,
        auth::LoginRequest,
        auth::LoginResponse,
        auth::PasswordResetRequest,
        auth::PasswordResetConfirm,
        me::MeResponse,
        OrgContext,
        ResourceDescriptor,
        Role
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "campusgate", description = "College portal access control gateway")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router around a gateway.
///
/// The database pool is optional so the router can run against in-memory
/// collaborators; `/health` then reports the database as disabled.
pub fn router(gateway: Arc<AccessGateway>, pool: Option<PgPool>) -> Router {
    let app = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route(
            "/api/auth/request-password-reset",
            post(handlers::auth::request_password_reset),
        )
        .route("/api/auth/reset-password", post(handlers::auth::reset_password))
        .route("/api/me", get(handlers::me::me))
        .route("/api/authorize", post(handlers::authorize::authorize))
        .route("/health", get(handlers::health::health).options(handlers::health::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()));

    let app = match pool {
        Some(pool) => app.layer(Extension(pool)),
        None => app,
    };

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(gateway)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn serve(port: u16, gateway: Arc<AccessGateway>, pool: PgPool) -> Result<()> {
    let app = router(gateway, Some(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests;
