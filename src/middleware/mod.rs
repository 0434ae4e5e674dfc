//! Middleware components
//!
//! This module contains middleware for:
//! - Authentication (JWT)
//! - Client address and user agent resolution
//! - Rate limiting
//! - Security headers

pub mod auth;
pub mod client_meta;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{auth_middleware, AuthUser, Claims};
pub use client_meta::{client_meta_middleware, ProxyPolicy};
pub use rate_limit::{rate_limit_middleware, RateLimitGate};
pub use security_headers::{
    api_cache_control_middleware, security_headers_middleware, TransportPolicy,
};
