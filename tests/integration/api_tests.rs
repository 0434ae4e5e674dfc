//! API integration tests
//!
//! Health, security headers and account endpoints.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use keyvault::models::{AuthResponse, SecurityEvent};

use crate::common::{ips, TestApp, UserFactory};

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new().await;
    let response = app.get("/health").await;

    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_readiness_reports_each_dependency() {
    let app = TestApp::new().await;
    let response = app.get("/health/ready").await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "ready");
    assert_eq!(json["database"], "ready");
    assert_eq!(json["cipher"], "ready");
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = TestApp::new().await;

    for response in [app.get("/health").await, app.get("/apikeys/list").await] {
        assert_eq!(response.headers["x-content-type-options"], "nosniff");
        assert_eq!(response.headers["x-frame-options"], "DENY");
        assert_eq!(response.headers["referrer-policy"], "strict-origin-when-cross-origin");
        assert_eq!(
            response.headers["permissions-policy"],
            "camera=(), microphone=(), geolocation=()"
        );
        // Plain HTTP without a forwarded proto
        assert!(!response.headers.contains_key("strict-transport-security"));
    }

    let api = app.get("/apikeys/list").await;
    assert_eq!(api.headers["cache-control"], "no-store");
}

#[tokio::test]
async fn test_cors_preflight_carries_security_headers() {
    let app = TestApp::new().await;
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/apikeys/reveal")
        .header("Origin", "https://vault.example.com")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "authorization,content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.request(preflight).await;
    response.assert_ok();
    assert!(response.headers.contains_key("access-control-allow-origin"));
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert_eq!(response.headers["x-frame-options"], "DENY");
    assert_eq!(response.headers["referrer-policy"], "strict-origin-when-cross-origin");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new().await;

    let response = app.get("/apikeys/list").await;
    response.assert_unauthorized();
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn test_signup_login_and_change_password() {
    let app = TestApp::new().await;
    let user = UserFactory::new().create();

    let session = app.register(&user, ips::ALICE).await;

    let response = app.post_json("/auth/login", user.login_body()).await;
    response.assert_ok();
    let auth: AuthResponse = response.json();
    assert_eq!(auth.id, session.id);
    assert_eq!(auth.email, user.email);
    assert_eq!(auth.full_name, user.full_name);

    let response = app
        .post_as(
            &session,
            "/auth/change-password",
            serde_json::json!({
                "currentPassword": user.password,
                "newPassword": "An0ther-Strong-One",
            }),
        )
        .await;
    response.assert_ok();
    assert_eq!(response.json::<serde_json::Value>()["success"], true);

    app.post_json("/auth/login", user.login_body())
        .await
        .assert_unauthorized();
    app.post_json(
        "/auth/login",
        serde_json::json!({ "email": user.email, "password": "An0ther-Strong-One" }),
    )
    .await
    .assert_ok();
}

#[tokio::test]
async fn test_signup_validation_and_duplicates() {
    let app = TestApp::new().await;
    let user = UserFactory::new().create();

    let mut weak = user.signup_body();
    weak["password"] = "password".into();
    app.post_json("/auth/signup", weak)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    app.register(&user, ips::ALICE).await;
    app.post_json("/auth/signup", user.signup_body())
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_failed_login_is_audited_without_password() {
    let app = TestApp::new().await;
    let user = UserFactory::new().create();
    app.register(&user, ips::ALICE).await;

    let response = app
        .post_json_from(
            "/auth/login",
            serde_json::json!({ "email": user.email, "password": "Wrong-Passw0rd" }),
            ips::ATTACKER,
        )
        .await;
    response.assert_unauthorized();
    assert!(response.text().contains("Invalid email or password"));

    let failures = app.audit_events(SecurityEvent::FailedLogin).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].ip_address.as_deref(), Some(ips::ATTACKER));
    assert_eq!(
        failures[0].user_agent.as_deref(),
        Some("keyvault-integration-tests")
    );
    assert!(!failures[0].details.to_string().contains("Wrong-Passw0rd"));
}
