//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    middleware::{
        api_cache_control_middleware, auth_middleware, client_meta_middleware,
        rate_limit_middleware, security_headers_middleware, ProxyPolicy, RateLimitGate,
        TransportPolicy,
    },
    services::Tier,
    AppState,
};

mod api_key_teams;
mod api_keys;
mod auth;
mod dashboard;
mod health;
mod memberships;
mod teams;

pub use health::*;

/// Authentication routes, all charged to the sensitive tier
fn auth_routes(state: &AppState) -> Router<AppState> {
    auth::public_routes()
        .merge(
            auth::protected_routes()
                .route_layer(from_fn_with_state(state.clone(), auth_middleware)),
        )
        .route_layer(from_fn_with_state(
            RateLimitGate::new(
                state.services.limiter.clone(),
                state.services.audit.clone(),
                Tier::Sensitive,
            ),
            rate_limit_middleware,
        ))
}

/// Protected resource routes, charged to the general tier before
/// authentication runs
fn resource_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/apikeys", api_keys::routes())
        .nest("/teams", teams::routes())
        .nest("/team-memberships", memberships::routes())
        .nest("/apikey-teams", api_key_teams::routes())
        .nest("/dashboard", dashboard::routes())
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
        .route_layer(from_fn_with_state(
            RateLimitGate::new(
                state.services.limiter.clone(),
                state.services.audit.clone(),
                Tier::General,
            ),
            rate_limit_middleware,
        ))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the application router with all routes and middleware
pub fn router(state: AppState) -> Router {
    let server = &state.config.server;
    let proxy = ProxyPolicy::new(server.trust_proxy_headers);
    let transport = TransportPolicy::new(server.tls.is_some(), server.trust_proxy_headers);
    let cors = cors_layer(&server.cors_origins);

    // Configure tracing for HTTP requests
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api = Router::new()
        .nest("/auth", auth_routes(&state))
        .merge(resource_routes(&state))
        .layer(from_fn(api_cache_control_middleware));

    // Client metadata must be resolved before any rate limit gate runs.
    // Security headers wrap CORS so preflight answers carry them too.
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .merge(api)
        .layer(from_fn_with_state(proxy, client_meta_middleware))
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .layer(cors)
        .layer(from_fn_with_state(transport, security_headers_middleware))
        .with_state(state)
}
