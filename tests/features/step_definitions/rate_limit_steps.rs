//! Rate limiting step definitions

use cucumber::when;
use serde_json::json;

use crate::features::support::TestWorld;

async fn failed_login(world: &mut TestWorld, ip: &str) {
    let response = world
        .app()
        .await
        .post_json_from(
            "/auth/login",
            json!({ "email": "nobody@example.com", "password": "not-the-password" }),
            ip,
        )
        .await;
    world.last_response = Some(response);
}

#[when(expr = "{int} failed logins are attempted from {string}")]
async fn failed_logins(world: &mut TestWorld, count: usize, ip: String) {
    for _ in 0..count {
        failed_login(world, &ip).await;
    }
}

#[when(expr = "a failed login is attempted from {string}")]
async fn one_failed_login(world: &mut TestWorld, ip: String) {
    failed_login(world, &ip).await;
}
