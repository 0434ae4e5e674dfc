//! Rate limiting middleware
//!
//! Charges each request to a tier keyed by client IP. Denials are audited
//! and answered with a plain-text 429 carrying `Retry-After`.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::models::ClientMeta;
use crate::services::{AuditLog, RateLimiter, Tier};
use crate::utils::error::AppError;

/// State for one rate limited route group
#[derive(Clone)]
pub struct RateLimitGate {
    limiter: RateLimiter,
    audit: AuditLog,
    tier: Tier,
}

impl RateLimitGate {
    pub fn new(limiter: RateLimiter, audit: AuditLog, tier: Tier) -> Self {
        Self { limiter, audit, tier }
    }
}

/// Rate limiting middleware
///
/// Expects [`ClientMeta`] in the request extensions; without it the request
/// is charged to the shared unknown-client key.
pub async fn rate_limit_middleware(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ClientMeta>()
        .cloned()
        .unwrap_or_else(|| {
            ClientMeta::new(
                ClientMeta::UNKNOWN_IP,
                request.method().as_str(),
                request.uri().path(),
            )
        });

    let check = gate.limiter.check(gate.tier, &client.ip).await;
    if check.allowed {
        return next.run(request).await;
    }

    warn!(
        ip = %client.ip,
        path = %client.path,
        tier = gate.tier.as_str(),
        "Rate limit exceeded"
    );
    gate.audit.record(gate.tier.denial_entry(&client)).await;

    AppError::TooManyRequests {
        retry_after_secs: check.retry_after_secs,
    }
    .into_response()
}
