//! Authentication API endpoints
//!
//! Provides signup, login and password change endpoints.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    middleware::AuthUser,
    models::{AuthResponse, ChangePasswordRequest, ClientMeta, LoginRequest, SignupRequest},
    services::RequestContext,
    utils::AppError,
    AppState,
};

/// Create public routes for authentication endpoints (no auth required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

/// Create protected routes for authentication endpoints (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/change-password", post(change_password))
}

/// Signup handler
///
/// POST /auth/signup
async fn signup(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.validate()?;

    let response = state
        .services
        .accounts
        .signup(&client, &payload.full_name, &payload.email, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login handler
///
/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let response = state
        .services
        .accounts
        .login(&client, &payload.email, &payload.password)
        .await?;

    Ok(Json(response))
}

/// Change password handler
///
/// POST /auth/change-password
async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    state
        .services
        .accounts
        .change_password(&ctx, &payload.current_password, &payload.new_password)
        .await?;

    Ok(Json(json!({ "success": true })))
}
