//! Security headers middleware
//!
//! Adds security headers to all responses. HSTS is only sent when the
//! connection is known to be HTTPS.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// When the request counts as HTTPS
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportPolicy {
    /// The server terminates TLS itself
    pub tls_enabled: bool,
    /// Honour `X-Forwarded-Proto` from the fronting proxy
    pub trust_proxy_headers: bool,
}

impl TransportPolicy {
    pub fn new(tls_enabled: bool, trust_proxy_headers: bool) -> Self {
        Self {
            tls_enabled,
            trust_proxy_headers,
        }
    }

    fn is_https(&self, headers: &HeaderMap) -> bool {
        self.tls_enabled
            || (self.trust_proxy_headers
                && headers
                    .get("x-forwarded-proto")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https")))
    }
}

/// Middleware that adds security headers to all responses
pub async fn security_headers_middleware(
    State(policy): State<TransportPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let https = policy.is_https(request.headers());
    let mut response = next.run(request).await;

    let headers = response.headers_mut();

    if https {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    // Nothing here is meant to be framed
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );

    response
}

/// Middleware for API routes that forbids caching of responses
pub async fn api_cache_control_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));

    response
}
