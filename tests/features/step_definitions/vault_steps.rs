//! API key step definitions

use cucumber::{given, then, when};
use serde_json::{json, Value};

use crate::features::support::TestWorld;

async fn store(world: &mut TestWorld, user: &str, name: &str, value: &str) {
    let session = world.session(user);
    let response = world
        .app()
        .await
        .post_as(&session, "/apikeys", json!({ "name": name, "key": value }))
        .await;
    if response.status.is_success() {
        world.keys.insert(name.to_string(), response.json());
    }
    world.last_response = Some(response);
}

#[given(expr = "{string} has stored the API key {string} with value {string}")]
async fn has_stored_key(world: &mut TestWorld, user: String, name: String, value: String) {
    store(world, &user, &name, &value).await;
    world.response().assert_created();
}

#[when(expr = "{string} stores the API key {string} with value {string}")]
async fn stores_key(world: &mut TestWorld, user: String, name: String, value: String) {
    store(world, &user, &name, &value).await;
}

#[when(expr = "{string} reveals the API key {string}")]
async fn reveals_key(world: &mut TestWorld, user: String, name: String) {
    let session = world.session(&user);
    let response = world
        .app()
        .await
        .post_as(&session, "/apikeys/reveal", json!({ "name": name }))
        .await;
    world.last_response = Some(response);
}

#[when(expr = "{string} reveals the API key {string} owned by {string}")]
async fn reveals_owned_key(world: &mut TestWorld, user: String, name: String, owner: String) {
    let session = world.session(&user);
    let owner_id = world.session(&owner).id;
    let response = world
        .app()
        .await
        .post_as(
            &session,
            "/apikeys/reveal",
            json!({ "name": name, "ownerId": owner_id }),
        )
        .await;
    world.last_response = Some(response);
}

#[when(expr = "{string} deletes the API key {string}")]
async fn deletes_key(world: &mut TestWorld, user: String, name: String) {
    let session = world.session(&user);
    let response = world
        .app()
        .await
        .delete_as(&session, "/apikeys/delete", json!({ "name": name }))
        .await;
    world.last_response = Some(response);
}

#[then(expr = "the revealed value should be {string}")]
async fn revealed_value(world: &mut TestWorld, value: String) {
    let body: Value = world.response().json();
    assert_eq!(body["key"], value);
}

#[then(expr = "{string} should see {int} API key(s)")]
async fn sees_key_count(world: &mut TestWorld, user: String, count: usize) {
    let session = world.session(&user);
    let listed: Vec<Value> = world
        .app()
        .await
        .get_as(&session, "/apikeys/list")
        .await
        .json();
    assert_eq!(listed.len(), count);
}

