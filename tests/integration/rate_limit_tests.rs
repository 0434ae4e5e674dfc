//! Rate limiting integration tests

use axum::http::{header, StatusCode};
use keyvault::{
    config::{RateLimitBackend, TierConfig},
    models::{SecurityEvent, Severity},
};
use serde_json::json;

use crate::common::{ips, test_config, TestApp, UserFactory};

fn login_attempt() -> serde_json::Value {
    json!({ "email": "nobody@example.com", "password": "guessing-again" })
}

#[tokio::test]
async fn test_login_brute_force_is_throttled() {
    let app = TestApp::new().await;

    for attempt in 1..=20 {
        let response = app
            .post_json_from("/auth/login", login_attempt(), ips::ATTACKER)
            .await;
        assert_eq!(
            response.status,
            StatusCode::UNAUTHORIZED,
            "attempt {} should reach the credential check",
            attempt
        );
    }

    let response = app
        .post_json_from("/auth/login", login_attempt(), ips::ATTACKER)
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.text(), "Rate limit exceeded");
    let retry_after: u64 = response.headers[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 300);

    let denials = app.audit_events(SecurityEvent::RateLimitExceeded).await;
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].severity, Some(Severity::High));
    assert_eq!(denials[0].details["tier"], "sensitive");
    assert_eq!(denials[0].details["identifier"], "sensitive:198.51.100.66");
    assert_eq!(denials[0].ip_address.as_deref(), Some(ips::ATTACKER));

    // Attempts under the limit reached the credential check
    assert_eq!(app.audit_events(SecurityEvent::FailedLogin).await.len(), 20);

    // Budgets are per client address
    app.post_json_from("/auth/login", login_attempt(), ips::BOB)
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let mut config = test_config();
    config.rate_limit.general = TierConfig {
        window_secs: 60,
        max_requests: 1,
    };
    let app = TestApp::with_config(config).await;

    for _ in 0..5 {
        app.get("/health").await.assert_ok();
    }
}

#[tokio::test]
async fn test_general_tier_guards_resources_before_auth() {
    let mut config = test_config();
    config.rate_limit.backend = RateLimitBackend::Database;
    config.rate_limit.general = TierConfig {
        window_secs: 60,
        max_requests: 2,
    };
    let app = TestApp::with_config(config).await;

    app.get("/apikeys/list").await.assert_unauthorized();
    app.get("/apikeys/list").await.assert_unauthorized();
    app.get("/apikeys/list")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    let denials = app.audit_events(SecurityEvent::RateLimitExceeded).await;
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].severity, Some(Severity::Medium));
    assert_eq!(denials[0].details["tier"], "general");
    assert_eq!(denials[0].details["path"], "/apikeys/list");
}

#[tokio::test]
async fn test_reveal_draws_on_sensitive_budget() {
    let mut config = test_config();
    config.rate_limit.sensitive = TierConfig {
        window_secs: 300,
        max_requests: 3,
    };
    let app = TestApp::with_config(config).await;

    // Signup spends the first sensitive request
    let alice = app.register(&UserFactory::new().create(), ips::ALICE).await;
    app.store_key(&alice, "aws", "AKIA-example").await;

    for _ in 0..2 {
        app.post_as(&alice, "/apikeys/reveal", json!({ "name": "aws" }))
            .await
            .assert_ok();
    }
    let response = app
        .post_as(&alice, "/apikeys/reveal", json!({ "name": "aws" }))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(!response.text().contains("AKIA-example"));

    let denials = app.audit_events(SecurityEvent::RateLimitExceeded).await;
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].actor_user_id, Some(alice.id));
    assert_eq!(denials[0].details["identifier"], "sensitive:203.0.113.10");
}
