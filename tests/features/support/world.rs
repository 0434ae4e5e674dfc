//! Test world for Cucumber scenarios

use std::collections::HashMap;

use cucumber::World;
use serde_json::Value;

use crate::common::{ips, Session, TestApp, TestResponse, UserFactory};

/// Test world that maintains state across scenario steps
#[derive(Default, World)]
pub struct TestWorld {
    /// Application under test, started by the first step that needs it
    app: Option<TestApp>,

    users: UserFactory,

    /// Signed-in users by scenario name
    pub sessions: HashMap<String, Session>,

    /// Team ids by team name
    pub teams: HashMap<String, String>,

    /// Owning user name by team name
    pub team_owners: HashMap<String, String>,

    /// Stored key metadata by key name
    pub keys: HashMap<String, Value>,

    /// Response from last API call
    pub last_response: Option<TestResponse>,
}

impl std::fmt::Debug for TestWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestWorld")
            .field("started", &self.app.is_some())
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .field("teams", &self.teams)
            .field("last_response", &self.last_response.as_ref().map(|r| r.status))
            .finish()
    }
}

impl TestWorld {
    /// Start a fresh application, dropping any previous one
    pub async fn start(&mut self) {
        self.app = Some(TestApp::new().await);
        self.sessions.clear();
        self.teams.clear();
        self.team_owners.clear();
        self.keys.clear();
        self.last_response = None;
    }

    pub async fn app(&mut self) -> &TestApp {
        if self.app.is_none() {
            self.app = Some(TestApp::new().await);
        }
        self.app.as_ref().expect("application started")
    }

    /// Register a user under a scenario name
    pub async fn register(&mut self, name: &str) {
        let user = self.users.create();
        let ip = address_of(name);
        let session = self.app().await.register(&user, ip).await;
        self.sessions.insert(name.to_string(), session);
    }

    pub fn session(&self, name: &str) -> Session {
        self.sessions
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("No user registered as '{}'", name))
    }

    pub fn team_id(&self, name: &str) -> String {
        self.teams
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("No team named '{}'", name))
    }

    pub fn team_owner(&self, team: &str) -> String {
        self.team_owners
            .get(team)
            .cloned()
            .unwrap_or_else(|| panic!("No owner recorded for team '{}'", team))
    }

    pub fn key_id(&self, name: &str) -> Value {
        self.keys
            .get(name)
            .map(|key| key["id"].clone())
            .unwrap_or_else(|| panic!("No API key stored as '{}'", name))
    }

    pub fn response(&self) -> &TestResponse {
        self.last_response
            .as_ref()
            .expect("No response available")
    }
}

/// Each scenario user calls from its own address
fn address_of(name: &str) -> &'static str {
    match name {
        "alice" => ips::ALICE,
        "bob" => ips::BOB,
        _ => ips::ATTACKER,
    }
}
