//! Team endpoints

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::{
    middleware::AuthUser,
    models::{ClientMeta, CreateTeamRequest, Team},
    services::RequestContext,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(create_team))
}

/// POST /teams
async fn create_team(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<Team>), AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    let team = state
        .services
        .teams
        .create_team(&ctx, &payload.name, payload.description)
        .await?;

    Ok((StatusCode::CREATED, Json(team)))
}
