//! Health endpoints for load balancers and orchestrators

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{db, AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness of the parts a request depends on
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cipher: &'static str,
}

fn verdict(ok: bool) -> &'static str {
    if ok {
        "ready"
    } else {
        "unavailable"
    }
}

/// Liveness; never touches the database
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness: the database answers and the master key can seal and open
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match db::check_health(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Readiness database check failed: {:#}", e);
            false
        }
    };
    let cipher = state.services.vault.cipher_ready();
    if !cipher {
        tracing::error!("Readiness cipher check failed");
    }

    let ready = database && cipher;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: verdict(ready),
            database: verdict(database),
            cipher: verdict(cipher),
        }),
    )
}
