//! Client metadata middleware
//!
//! Resolves the caller's address and user agent once per request and stores
//! a [`ClientMeta`] in the request extensions for the audit log and the rate
//! limiter.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{HeaderMapExt, UserAgent};

use crate::models::ClientMeta;

/// Headers consulted, in order, when proxy headers are trusted
const FORWARDED_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// How the client address is resolved
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyPolicy {
    pub trust_proxy_headers: bool,
}

impl ProxyPolicy {
    pub fn new(trust_proxy_headers: bool) -> Self {
        Self { trust_proxy_headers }
    }

    /// Build the metadata for a request
    pub fn resolve(&self, parts: &Parts) -> ClientMeta {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let ip = self
            .trust_proxy_headers
            .then(|| forwarded_ip(&parts.headers))
            .flatten()
            .or(peer)
            .unwrap_or_else(|| ClientMeta::UNKNOWN_IP.to_string());

        let mut meta = ClientMeta::new(ip, parts.method.as_str(), parts.uri.path());
        if let Some(agent) = parts.headers.typed_get::<UserAgent>() {
            meta = meta.with_user_agent(agent.as_str());
        }
        meta
    }
}

/// First address named by a proxy header
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    FORWARDED_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    })
}

/// Middleware inserting [`ClientMeta`] into the request extensions
pub async fn client_meta_middleware(
    State(policy): State<ProxyPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let meta = policy.resolve(&parts);
    parts.extensions.insert(meta);

    next.run(Request::from_parts(parts, body)).await
}

/// Falls back to the socket peer when the middleware did not run
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientMeta>()
            .cloned()
            .unwrap_or_else(|| ProxyPolicy::default().resolve(parts)))
    }
}
