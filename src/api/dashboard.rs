//! Dashboard endpoints: overview, teams and activity

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::{
    middleware::AuthUser,
    models::{
        ActivityDashboard, ActivityDetail, ActivityQuery, ClientMeta, DashboardOverview,
        TeamsDashboard,
    },
    services::RequestContext,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(overview))
        .route("/teams", get(teams))
        .route("/activity", get(activity))
        .route("/activity/detail", get(activity_detail))
}

/// GET /dashboard
async fn overview(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
) -> Result<Json<DashboardOverview>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    Ok(Json(state.services.vault.overview(&ctx).await?))
}

/// GET /dashboard/teams
async fn teams(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
) -> Result<Json<TeamsDashboard>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    Ok(Json(state.services.teams.dashboard(&ctx).await?))
}

/// GET /dashboard/activity?limit=&offset=
async fn activity(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityDashboard>, AppError> {
    let dashboard = state
        .services
        .audit
        .dashboard(auth_user.id, &query)
        .await?;

    Ok(Json(dashboard))
}

/// GET /dashboard/activity/detail
async fn activity_detail(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ActivityDetail>, AppError> {
    Ok(Json(state.services.audit.detail(auth_user.id).await?))
}
