//! Sharing stored API keys with teams

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    middleware::AuthUser,
    models::{ClientMeta, SecretTeamGrant, TeamGrantRequest, TeamRef},
    services::RequestContext,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(attach))
        .route("/list", get(list_grants))
        .route("/delete", delete(detach))
}

async fn attach(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<TeamGrantRequest>,
) -> Result<(StatusCode, Json<SecretTeamGrant>), AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    let grant = state
        .services
        .vault
        .attach_to_team(&ctx, payload.api_key_id, payload.team_id)
        .await?;

    Ok((StatusCode::CREATED, Json(grant)))
}

async fn list_grants(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Query(query): Query<TeamRef>,
) -> Result<Json<Vec<SecretTeamGrant>>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    Ok(Json(
        state
            .services
            .teams
            .list_team_secrets(&ctx, query.team_id)
            .await?,
    ))
}

async fn detach(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<TeamGrantRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    state
        .services
        .vault
        .detach_from_team(&ctx, payload.api_key_id, payload.team_id)
        .await?;

    Ok(Json(json!({ "success": true })))
}
