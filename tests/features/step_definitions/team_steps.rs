//! Team and sharing step definitions

use cucumber::{given, when};
use serde_json::{json, Value};

use crate::features::support::TestWorld;

async fn invite(world: &mut TestWorld, user: &str, team: &str, role: &str) {
    let team_id = world.team_id(team);
    let owner = world.session(&world.team_owner(team));
    let user_id = world.session(user).id;

    world
        .app()
        .await
        .post_as(
            &owner,
            "/team-memberships",
            json!({ "teamId": team_id, "userId": user_id, "role": role }),
        )
        .await
        .assert_created();
}

async fn accept(world: &mut TestWorld, user: &str, team: &str) {
    let session = world.session(user);
    let team_id = world.team_id(team);
    let response = world
        .app()
        .await
        .post_as(&session, "/team-memberships/accept", json!({ "teamId": team_id }))
        .await;
    world.last_response = Some(response);
}

#[given(expr = "{string} owns the team {string}")]
async fn owns_team(world: &mut TestWorld, owner: String, team: String) {
    let session = world.session(&owner);
    let response = world
        .app()
        .await
        .post_as(&session, "/teams", json!({ "name": team }))
        .await;
    response.assert_created();
    let id = response.json::<Value>()["id"]
        .as_str()
        .expect("team id")
        .to_string();
    world.teams.insert(team.clone(), id);
    world.team_owners.insert(team, owner);
}

#[given(expr = "{string} has been invited to team {string} as {string}")]
async fn invited_to_team(world: &mut TestWorld, user: String, team: String, role: String) {
    invite(world, &user, &team, &role).await;
}

#[given(expr = "{string} is an active {string} of team {string}")]
async fn active_member(world: &mut TestWorld, user: String, role: String, team: String) {
    invite(world, &user, &team, &role).await;
    accept(world, &user, &team).await;
    world.response().assert_ok();
}

#[when(expr = "{string} accepts the invitation to team {string}")]
async fn accepts_invitation(world: &mut TestWorld, user: String, team: String) {
    accept(world, &user, &team).await;
}

#[when(expr = "{string} shares the API key {string} with team {string}")]
async fn shares_key(world: &mut TestWorld, user: String, key: String, team: String) {
    let session = world.session(&user);
    let body = json!({ "teamId": world.team_id(&team), "apiKeyId": world.key_id(&key) });
    let response = world
        .app()
        .await
        .post_as(&session, "/apikey-teams", body)
        .await;
    world.last_response = Some(response);
}

#[when(expr = "{string} stops sharing the API key {string} with team {string}")]
async fn stops_sharing_key(world: &mut TestWorld, user: String, key: String, team: String) {
    let session = world.session(&user);
    let body = json!({ "teamId": world.team_id(&team), "apiKeyId": world.key_id(&key) });
    let response = world
        .app()
        .await
        .delete_as(&session, "/apikey-teams/delete", body)
        .await;
    world.last_response = Some(response);
}
