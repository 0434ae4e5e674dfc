//! Stored API key endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use serde_json::{json, Value};

use crate::{
    middleware::AuthUser,
    models::{ClientMeta, CreateSecretRequest, RevealedSecret, SecretMetadata, SecretRef},
    services::RequestContext,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_api_key))
        .route("/list", get(list_api_keys))
        .route("/reveal", post(reveal_api_key))
        .route("/delete", delete(delete_api_key))
}

/// Plaintext key returned by reveal, serialized straight from the
/// zeroizing buffer into the response body
struct RevealResponse(RevealedSecret);

impl Serialize for RevealResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut body = serializer.serialize_struct("RevealResponse", 2)?;
        body.serialize_field("name", &self.0.name)?;
        body.serialize_field("key", self.0.key.as_str())?;
        body.end()
    }
}

async fn create_api_key(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<CreateSecretRequest>,
) -> Result<(StatusCode, Json<SecretMetadata>), AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    let created = state.services.vault.create_secret(&ctx, payload.into()).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_api_keys(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
) -> Result<Json<Vec<SecretMetadata>>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    Ok(Json(state.services.vault.list_secrets(&ctx).await?))
}

async fn reveal_api_key(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<SecretRef>,
) -> Result<Json<RevealResponse>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    let revealed = state.services.vault.reveal_secret(&ctx, &payload).await?;

    Ok(Json(RevealResponse(revealed)))
}

async fn delete_api_key(
    State(state): State<AppState>,
    auth_user: AuthUser,
    client: ClientMeta,
    Json(payload): Json<SecretRef>,
) -> Result<Json<Value>, AppError> {
    let ctx = RequestContext::new(auth_user.id, client);
    state.services.vault.delete_secret(&ctx, &payload).await?;

    Ok(Json(json!({ "success": true })))
}
