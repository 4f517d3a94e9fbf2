//! Router tests against in-memory collaborators.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use chrono::TimeDelta;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use super::router;
use crate::gateway::{
    directory::MemoryDirectory,
    testing::{CapturingMailer, PlainVerifier},
    AccessGateway, GatewayConfig, ManualClock,
};

struct TestApp {
    clock: Arc<ManualClock>,
    mailer: Arc<CapturingMailer>,
    router: Router,
}

fn app() -> Result<TestApp> {
    let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
    let directory = Arc::new(MemoryDirectory::new());
    directory.insert("root@x.com", "pw", &["ADMIN"], None, None);
    directory.insert("f@x.com", "pw", &["FACULTY"], Some(3), Some(11));
    directory.insert("s7@x.com", "pw", &["STUDENT"], Some(7), Some(11));
    let mailer = Arc::new(CapturingMailer::default());
    let gateway = AccessGateway::new(
        GatewayConfig::new(),
        SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
        directory,
        Arc::new(PlainVerifier::default()),
        clock.clone(),
    )?
    .with_mailer(mailer.clone());
    Ok(TestApp {
        clock,
        mailer,
        router: router(Arc::new(gateway), None),
    })
}

async fn send(router: &Router, request: Request<Body>) -> Result<Response> {
    Ok(router.clone().oneshot(request).await?)
}

fn post_json(uri: &str, body: &Value, token: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    Ok(builder.body(Body::from(body.to_string()))?)
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn login(router: &Router, email: &str, password: &str) -> Result<Response> {
    send(
        router,
        post_json(
            "/api/auth/login",
            &json!({ "email": email, "password": password }),
            None,
        )?,
    )
    .await
}

async fn token_for(router: &Router, email: &str) -> Result<String> {
    let response = login(router, email, "pw").await?;
    anyhow::ensure!(response.status() == StatusCode::OK, "login failed");
    let body = json_body(response).await?;
    body["token"]
        .as_str()
        .map(str::to_string)
        .context("missing token")
}

#[tokio::test]
async fn login_returns_bearer_token() -> Result<()> {
    let app = app()?;
    let response = login(&app.router, "f@x.com", "pw").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await?;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["token"].as_str().map(|t| t.split('.').count()), Some(3));
    assert!(body["expires_at"].is_string());
    Ok(())
}

#[tokio::test]
async fn login_statuses_distinguish_failure_kinds() -> Result<()> {
    let app = app()?;
    for _ in 0..5 {
        let response = login(&app.router, "s7@x.com", "wrong").await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = login(&app.router, "s7@x.com", "pw").await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    app.clock.advance(TimeDelta::minutes(1));
    let response = login(&app.router, "s7@x.com", "pw").await?;
    assert_eq!(response.status(), StatusCode::LOCKED);
    assert_eq!(
        response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
        Some("840")
    );
    Ok(())
}

#[tokio::test]
async fn missing_payload_is_bad_request() -> Result<()> {
    let app = app()?;
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .body(Body::empty())?;
    let response = send(&app.router, request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn me_requires_a_valid_token() -> Result<()> {
    let app = app()?;
    let request = Request::builder().uri("/api/me").body(Body::empty())?;
    let response = send(&app.router, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/me")
        .header(AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())?;
    let response = send(&app.router, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn me_returns_principal_and_organization() -> Result<()> {
    let app = app()?;
    let token = token_for(&app.router, "f@x.com").await?;
    let request = Request::builder()
        .uri("/api/me")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())?;
    let response = send(&app.router, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["subject"], "f@x.com");
    assert_eq!(body["roles"], json!(["FACULTY"]));
    assert_eq!(body["organization"]["numeric_id"], 3);
    assert_eq!(body["organization"]["branch_id"], 11);
    Ok(())
}

#[tokio::test]
async fn authorize_answers_allow_or_deny() -> Result<()> {
    let app = app()?;
    let student = token_for(&app.router, "s7@x.com").await?;
    let faculty = token_for(&app.router, "f@x.com").await?;
    let admin = token_for(&app.router, "root@x.com").await?;

    let own_record = json!({ "owner_id": 7, "branch_id": 11 });
    let other_record = json!({ "owner_id": 8, "branch_id": 12 });

    let cases = [
        (&student, &own_record, StatusCode::NO_CONTENT),
        (&student, &other_record, StatusCode::FORBIDDEN),
        (&faculty, &own_record, StatusCode::NO_CONTENT),
        (&faculty, &other_record, StatusCode::FORBIDDEN),
        (&admin, &other_record, StatusCode::NO_CONTENT),
    ];
    for (token, descriptor, expected) in cases {
        let response = send(
            &app.router,
            post_json("/api/authorize", descriptor, Some(token.as_str()))?,
        )
        .await?;
        assert_eq!(response.status(), expected, "{descriptor}");
    }

    let response = send(
        &app.router,
        post_json(
            "/api/authorize",
            &json!({ "required_roles": ["ADMIN"] }),
            Some(faculty.as_str()),
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"Forbidden");
    Ok(())
}

#[tokio::test]
async fn password_reset_flow() -> Result<()> {
    let app = app()?;
    let response = send(
        &app.router,
        post_json(
            "/api/auth/request-password-reset",
            &json!({ "email": "s7@x.com" }),
            None,
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let unknown = send(
        &app.router,
        post_json(
            "/api/auth/request-password-reset",
            &json!({ "email": "ghost@x.com" }),
            None,
        )?,
    )
    .await?;
    assert_eq!(unknown.status(), StatusCode::ACCEPTED);

    let token = app.mailer.last_token().context("no reset token")?;
    let confirm = json!({ "token": token, "new_password": "new-pw" });
    let response = send(
        &app.router,
        post_json("/api/auth/reset-password", &confirm, None)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(
        &app.router,
        post_json("/api/auth/reset-password", &confirm, None)?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = login(&app.router, "s7@x.com", "new-pw").await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn health_reports_disabled_database() -> Result<()> {
    let app = app()?;
    let request = Request::builder().uri("/health").body(Body::empty())?;
    let response = send(&app.router, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    let body = json_body(response).await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["database"], "disabled");
    Ok(())
}

#[test]
fn openapi_documents_every_route() {
    let doc = super::openapi();
    for path in [
        "/health",
        "/api/auth/login",
        "/api/auth/request-password-reset",
        "/api/auth/reset-password",
        "/api/me",
        "/api/authorize",
    ] {
        assert!(doc.paths.paths.contains_key(path), "missing {path}");
    }
}
