//! Common step definitions used across features

use cucumber::{given, then};
use keyvault::models::SecurityEvent;

use crate::features::support::TestWorld;

#[given("a fresh vault")]
async fn fresh_vault(world: &mut TestWorld) {
    world.start().await;
}

#[given(expr = "a registered user {string}")]
async fn registered_user(world: &mut TestWorld, name: String) {
    world.register(&name).await;
}

#[then(expr = "the response status should be {int}")]
async fn response_status(world: &mut TestWorld, status: u16) {
    assert_eq!(
        world.response().status.as_u16(),
        status,
        "Body: {}",
        world.response().text()
    );
}

#[then("the response should contain an error")]
async fn response_contains_error(world: &mut TestWorld) {
    let body: serde_json::Value = world.response().json();
    assert!(body.get("error").is_some());
}

#[then(expr = "the audit log should contain {int} {string} event(s)")]
async fn audit_event_count(world: &mut TestWorld, count: usize, event: String) {
    let event: SecurityEvent = event.parse().expect("known security event");
    let entries = world.app().await.audit_events(event).await;
    assert_eq!(entries.len(), count);
}
