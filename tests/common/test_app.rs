//! Test application setup utilities
//!
//! Provides utilities for setting up test instances of the application
//! with in-memory databases.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;

use keyvault::{
    api,
    config::{AppConfig, Argon2Settings, DatabaseConfig},
    db::{self, AuditRepository},
    models::{AuditEntry, AuthResponse, SecurityEvent},
    AppState,
};

use super::fixtures::{ips, TestUser};

pub const TEST_MASTER_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// A signed-in test user
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub token: String,
    pub ip: &'static str,
}

impl TestApp {
    /// Create a new test application with in-memory SQLite database
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a new test application with custom configuration
    pub async fn with_config(config: AppConfig) -> Self {
        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        let state = AppState::new(config, db).expect("Failed to build application state");
        let router = api::router(state.clone());

        Self { router, state }
    }

    /// Make a GET request without authentication
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.call(Method::GET, uri, None, None, ips::ALICE).await
    }

    /// Make a POST request with JSON body and no authentication
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> TestResponse {
        self.call(Method::POST, uri, Some(body), None, ips::ALICE).await
    }

    /// Make a POST request from a specific client address
    pub async fn post_json_from(&self, uri: &str, body: serde_json::Value, ip: &str) -> TestResponse {
        self.call(Method::POST, uri, Some(body), None, ip).await
    }

    /// Make an authenticated GET request
    pub async fn get_as(&self, session: &Session, uri: &str) -> TestResponse {
        self.call(Method::GET, uri, None, Some(&session.token), session.ip)
            .await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_as(&self, session: &Session, uri: &str, body: serde_json::Value) -> TestResponse {
        self.call(Method::POST, uri, Some(body), Some(&session.token), session.ip)
            .await
    }

    /// Make an authenticated DELETE request with JSON body
    pub async fn delete_as(&self, session: &Session, uri: &str, body: serde_json::Value) -> TestResponse {
        self.call(Method::DELETE, uri, Some(body), Some(&session.token), session.ip)
            .await
    }

    /// Register a user through the API and keep its token
    pub async fn register(&self, user: &TestUser, ip: &'static str) -> Session {
        let response = self.post_json_from("/auth/signup", user.signup_body(), ip).await;
        response.assert_created();
        let auth: AuthResponse = response.json();

        Session {
            id: auth.id,
            token: auth.token,
            ip,
        }
    }

    /// Store an API key for a session
    pub async fn store_key(&self, session: &Session, name: &str, key: &str) -> serde_json::Value {
        let response = self
            .post_as(session, "/apikeys", serde_json::json!({ "name": name, "key": key }))
            .await;
        response.assert_created();
        response.json()
    }

    /// Audit entries recorded for a security event, oldest first
    pub async fn audit_events(&self, event: SecurityEvent) -> Vec<AuditEntry> {
        AuditRepository::new(&self.state.db)
            .list_by_event(event)
            .await
            .expect("Failed to read audit log")
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
        token: Option<&str>,
        ip: &str,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Forwarded-For", ip)
            .header("User-Agent", "keyvault-integration-tests");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.request(request).await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Assert the response status is Created (201)
    pub fn assert_created(&self) -> &Self {
        self.assert_status(StatusCode::CREATED)
    }

    /// Assert the response status is Unauthorized (401)
    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    /// Assert the response status is Forbidden (403)
    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    /// Assert the response status is Not Found (404)
    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }
}

/// Test configuration: in-memory database, cheap hashing, trusted proxy
/// headers so each test can pick its client address
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.trust_proxy_headers = true;
    config.database = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout_secs: 5,
    };
    config.auth.jwt_secret = "test_secret_key_that_is_at_least_32_bytes_long".to_string();
    config.auth.argon2 = Argon2Settings {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config.vault.master_key = TEST_MASTER_KEY.to_string();
    config
}
