//! Test fixtures for common test data
//!
//! Fixtures provide pre-defined test data; the factory produces unique
//! accounts for tests that need more than one.

use std::sync::atomic::{AtomicU64, Ordering};

use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;

/// Password satisfying the strength rules
pub const STRONG_PASSWORD: &str = "Corr3ct-Horse-Battery";

/// Fixed addresses for rate limit keys
pub mod ips {
    pub const ALICE: &str = "203.0.113.10";
    pub const BOB: &str = "203.0.113.20";
    pub const ATTACKER: &str = "198.51.100.66";
}

/// Account to register through the API
#[derive(Debug, Clone)]
pub struct TestUser {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl TestUser {
    pub fn signup_body(&self) -> serde_json::Value {
        serde_json::json!({
            "fullName": self.full_name,
            "email": self.email,
            "password": self.password,
        })
    }

    pub fn login_body(&self) -> serde_json::Value {
        serde_json::json!({ "email": self.email, "password": self.password })
    }
}

/// Factory for creating unique test users
pub struct UserFactory {
    counter: AtomicU64,
}

impl Default for UserFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserFactory {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Create a unique test user with a strong password
    pub fn create(&self) -> TestUser {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let first: String = FirstName().fake();
        let last: String = LastName().fake();
        let email: String = SafeEmail().fake();

        TestUser {
            full_name: format!("{} {}", first, last),
            email: format!("u{}.{}", n, email.to_lowercase()),
            password: STRONG_PASSWORD.to_string(),
        }
    }
}
