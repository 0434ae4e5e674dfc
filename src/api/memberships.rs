//! Team membership endpoints
//!
//! Invitations are created pending and become effective once the invitee
//! accepts them.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    middleware::AuthUser,
    models::{AddMemberRequest, ClientMeta, RemoveMemberRequest, TeamMembership, TeamRef},
    services::{MemberRef, RequestContext},
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(add_member))
        .route("/accept", post(accept_membership))
        .route("/list", get(list_members))
        .route("/delete", delete(remove_member))
}

/// Invitee named by id or, failing that, by email
fn member_ref(payload: &AddMemberRequest) -> Result<MemberRef, AppError> {
    match (payload.user_id, payload.email.as_deref().map(str::trim)) {
        (Some(id), _) => Ok(MemberRef::Id(id)),
        (None, Some(email)) if !email.is_empty() => Ok(MemberRef::Email(email.to_string())),
        _ => Err(AppError::ValidationError(
            "Either userId or email is required".to_string(),
        )),
    }
}

async fn add_member(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<TeamMembership>), AppError> {
    let member = member_ref(&payload)?;
    let ctx = RequestContext::new(auth_user.id, client);
    let membership = state
        .services
        .teams
        .add_member(&ctx, payload.team_id, member, payload.role)
        .await?;

    Ok((StatusCode::CREATED, Json(membership)))
}

async fn accept_membership(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<TeamRef>,
) -> Result<Json<TeamMembership>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    let membership = state
        .services
        .teams
        .accept_membership(&ctx, payload.team_id)
        .await?;

    Ok(Json(membership))
}

async fn list_members(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Query(query): Query<TeamRef>,
) -> Result<Json<Vec<TeamMembership>>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    Ok(Json(
        state.services.teams.list_members(&ctx, query.team_id).await?,
    ))
}

async fn remove_member(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<RemoveMemberRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    state
        .services
        .teams
        .remove_member(&ctx, payload.team_id, payload.user_id)
        .await?;

    Ok(Json(json!({ "success": true })))
}
