//! Stored key, team sharing and dashboard integration tests

use axum::http::StatusCode;
use keyvault::models::SecurityEvent;
use serde_json::{json, Value};

use crate::common::{ips, Session, TestApp, UserFactory};

async fn two_users(app: &TestApp) -> (Session, Session) {
    let factory = UserFactory::new();
    let alice = app.register(&factory.create(), ips::ALICE).await;
    let bob = app.register(&factory.create(), ips::BOB).await;
    (alice, bob)
}

/// Team owned by `owner` with `member` active in `role`
async fn team_with_member(app: &TestApp, owner: &Session, member: &Session, role: &str) -> String {
    let response = app
        .post_as(owner, "/teams", json!({ "name": "platform", "description": "Platform team" }))
        .await;
    response.assert_created();
    let team_id = response.json::<Value>()["id"].as_str().unwrap().to_string();

    app.post_as(
        owner,
        "/team-memberships",
        json!({ "teamId": team_id, "userId": member.id, "role": role }),
    )
    .await
    .assert_created();
    app.post_as(member, "/team-memberships/accept", json!({ "teamId": team_id }))
        .await
        .assert_ok();

    team_id
}

#[tokio::test]
async fn test_store_list_reveal_delete() {
    let app = TestApp::new().await;
    let (alice, _) = two_users(&app).await;

    let response = app
        .post_as(
            &alice,
            "/apikeys",
            json!({
                "name": "stripe-prod",
                "key": "sk_live_abc123",
                "description": "Stripe live key",
                "tags": "payments, prod",
            }),
        )
        .await;
    response.assert_created();
    let created: Value = response.json();
    assert_eq!(created["name"], "stripe-prod");
    assert_eq!(created["tags"], json!(["payments", "prod"]));
    assert!(created.get("key").is_none());
    assert!(!response.text().contains("sk_live_abc123"));

    let listed: Vec<Value> = app.get_as(&alice, "/apikeys/list").await.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["access"], "owner");
    assert!(!listed[0].to_string().contains("sk_live_abc123"));

    let response = app
        .post_as(&alice, "/apikeys/reveal", json!({ "name": "stripe-prod" }))
        .await;
    response.assert_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({ "name": "stripe-prod", "key": "sk_live_abc123" })
    );

    app.delete_as(&alice, "/apikeys/delete", json!({ "name": "stripe-prod" }))
        .await
        .assert_ok();
    app.post_as(&alice, "/apikeys/reveal", json!({ "name": "stripe-prod" }))
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_duplicate_and_invalid_names() {
    let app = TestApp::new().await;
    let (alice, bob) = two_users(&app).await;

    app.store_key(&alice, "openai", "sk-1").await;
    app.post_as(&alice, "/apikeys", json!({ "name": "openai", "key": "sk-2" }))
        .await
        .assert_status(StatusCode::CONFLICT);
    app.post_as(&alice, "/apikeys", json!({ "name": "bad/name", "key": "sk-2" }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Names are per owner
    app.store_key(&bob, "openai", "sk-bob").await;
}

#[tokio::test]
async fn test_stranger_cannot_reveal() {
    let app = TestApp::new().await;
    let (alice, bob) = two_users(&app).await;
    app.store_key(&alice, "github", "ghp_secret").await;

    // Without an owner the name is resolved in the caller's own space
    app.post_as(&bob, "/apikeys/reveal", json!({ "name": "github" }))
        .await
        .assert_not_found();

    let response = app
        .post_as(
            &bob,
            "/apikeys/reveal",
            json!({ "name": "github", "ownerId": alice.id }),
        )
        .await;
    response.assert_forbidden();
    assert!(!response.text().contains("ghp_secret"));

    let denials = app.audit_events(SecurityEvent::UnauthorizedAccess).await;
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].actor_user_id, Some(bob.id));
    assert_eq!(denials[0].details["required"], "reveal");
    assert_eq!(denials[0].ip_address.as_deref(), Some(ips::BOB));
}

#[tokio::test]
async fn test_team_member_reveals_shared_key() {
    let app = TestApp::new().await;
    let (alice, bob) = two_users(&app).await;
    let created = app.store_key(&alice, "sendgrid", "SG.key").await;
    let team_id = team_with_member(&app, &alice, &bob, "member").await;

    app.post_as(
        &alice,
        "/apikey-teams",
        json!({ "teamId": team_id, "apiKeyId": created["id"] }),
    )
    .await
    .assert_created();

    let grants: Vec<Value> = app
        .get_as(&bob, &format!("/apikey-teams/list?teamId={}", team_id))
        .await
        .json();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["apiKeyId"], created["id"]);

    let listed: Vec<Value> = app.get_as(&bob, "/apikeys/list").await.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "sendgrid");

    let response = app
        .post_as(&bob, "/apikeys/reveal", json!({ "name": "sendgrid" }))
        .await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["key"], "SG.key");

    // Sharing stops as soon as the grant is withdrawn
    app.delete_as(
        &alice,
        "/apikey-teams/delete",
        json!({ "teamId": team_id, "apiKeyId": created["id"] }),
    )
    .await
    .assert_ok();
    app.post_as(&bob, "/apikeys/reveal", json!({ "name": "sendgrid" }))
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_viewer_can_list_but_not_reveal() {
    let app = TestApp::new().await;
    let (alice, bob) = two_users(&app).await;
    let created = app.store_key(&alice, "twilio", "AC-token").await;
    let team_id = team_with_member(&app, &alice, &bob, "viewer").await;
    app.post_as(
        &alice,
        "/apikey-teams",
        json!({ "teamId": team_id, "apiKeyId": created["id"] }),
    )
    .await
    .assert_created();

    let listed: Vec<Value> = app.get_as(&bob, "/apikeys/list").await.json();
    assert_eq!(listed.len(), 1);

    app.post_as(&bob, "/apikeys/reveal", json!({ "name": "twilio" }))
        .await
        .assert_forbidden();
    app.delete_as(&bob, "/apikeys/delete", json!({ "name": "twilio", "ownerId": alice.id }))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_membership_listing_and_removal() {
    let app = TestApp::new().await;
    let (alice, bob) = two_users(&app).await;
    let team_id = team_with_member(&app, &alice, &bob, "member").await;

    let members: Vec<Value> = app
        .get_as(&bob, &format!("/team-memberships/list?teamId={}", team_id))
        .await
        .json();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m["status"] == "active"));

    // Members cannot invite
    app.post_as(
        &bob,
        "/team-memberships",
        json!({ "teamId": team_id, "email": "someone@example.com" }),
    )
    .await
    .assert_forbidden();

    app.delete_as(
        &alice,
        "/team-memberships/delete",
        json!({ "teamId": team_id, "userId": bob.id }),
    )
    .await
    .assert_ok();
    app.get_as(&bob, &format!("/team-memberships/list?teamId={}", team_id))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_activity_dashboard() {
    let app = TestApp::new().await;
    let (alice, _) = two_users(&app).await;
    app.store_key(&alice, "k1", "v1").await;
    app.store_key(&alice, "k2", "v2").await;
    app.post_as(&alice, "/apikeys/reveal", json!({ "name": "k1" }))
        .await
        .assert_ok();

    let dashboard: Value = app
        .get_as(&alice, "/dashboard/activity?limit=2&offset=0")
        .await
        .json();
    // signup, two creates and one reveal
    assert_eq!(dashboard["summary"]["totalActions"], 4);
    assert_eq!(dashboard["records"].as_array().unwrap().len(), 2);
    assert_eq!(dashboard["records"][0]["action"], "read");

    let detail: Value = app.get_as(&alice, "/dashboard/activity/detail").await.json();
    assert_eq!(detail["totalActivities"], 4);
    assert_eq!(detail["activityTypes"]["create:secret"], 2);
    assert_eq!(detail["activityTypes"]["create:user"], 1);
    assert_eq!(detail["securityEvents"], 0);
}

#[tokio::test]
async fn test_overview_dashboard() {
    let app = TestApp::new().await;
    let (alice, bob) = two_users(&app).await;
    for name in ["k1", "k2", "k3", "k4", "k5", "k6"] {
        app.store_key(&alice, name, "v").await;
    }
    app.post_as(&alice, "/apikeys/reveal", json!({ "name": "k2" }))
        .await
        .assert_ok();
    team_with_member(&app, &alice, &bob, "member").await;

    let response = app.get_as(&alice, "/dashboard").await;
    response.assert_ok();
    let overview: Value = response.json();
    assert_eq!(overview["totalApiKeys"], 6);
    assert_eq!(overview["totalTeams"], 1);
    assert_eq!(overview["recentApiKeys"].as_array().unwrap().len(), 5);
    assert_eq!(overview["recentApiKeys"][0]["name"], "k6");
    assert_eq!(overview["recentlyUsedKeys"][0]["name"], "k2");
    assert!(overview["activitiesThisWeek"].as_i64().unwrap() >= 8);
    assert!(!response.text().contains("ciphertext"));

    let empty: Value = app.get_as(&bob, "/dashboard").await.json();
    assert_eq!(empty["totalApiKeys"], 0);
    assert_eq!(empty["recentlyUsedKeys"], json!([]));

    app.get("/dashboard").await.assert_unauthorized();
}

#[tokio::test]
async fn test_invitee_finds_team_on_teams_dashboard() {
    let app = TestApp::new().await;
    let (alice, bob) = two_users(&app).await;
    let response = app
        .post_as(&alice, "/teams", json!({ "name": "payments" }))
        .await;
    response.assert_created();
    let team_id = response.json::<Value>()["id"].as_str().unwrap().to_string();
    app.post_as(
        &alice,
        "/team-memberships",
        json!({ "teamId": team_id, "userId": bob.id, "role": "viewer" }),
    )
    .await
    .assert_created();

    let dashboard: Value = app.get_as(&bob, "/dashboard/teams").await.json();
    assert_eq!(dashboard["totalTeams"], 0);
    assert_eq!(dashboard["pendingInvitations"], 1);
    let invitation = &dashboard["teams"][0];
    assert_eq!(invitation["status"], "pending");
    assert_eq!(invitation["role"], "viewer");
    assert_eq!(invitation["name"], "payments");
    assert!(invitation.get("memberCount").is_none());

    // The listed id is all an invitee needs to accept
    let discovered = invitation["id"].as_str().unwrap();
    assert_eq!(discovered, team_id);
    app.post_as(&bob, "/team-memberships/accept", json!({ "teamId": discovered }))
        .await
        .assert_ok();

    let dashboard: Value = app.get_as(&bob, "/dashboard/teams").await.json();
    assert_eq!(dashboard["totalTeams"], 1);
    assert_eq!(dashboard["teamsOwnedCount"], 0);
    assert_eq!(dashboard["totalMembers"], 2);
    assert_eq!(dashboard["teams"][0]["status"], "active");
    assert_eq!(dashboard["teams"][0]["memberCount"], 2);

    let owner: Value = app.get_as(&alice, "/dashboard/teams").await.json();
    assert_eq!(owner["teamsOwnedCount"], 1);
    assert_eq!(owner["teams"][0]["role"], "owner");
}
