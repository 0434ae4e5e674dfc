//! JWT Authentication Middleware
//!
//! This module provides JWT-based authentication for the API.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{utils::error::ErrorResponse, AppState};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User email
    pub email: String,
    /// Full name
    pub name: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Not before timestamp
    pub nbf: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// Authenticated user information extracted from JWT
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
}

impl TryFrom<Claims> for AuthUser {
    type Error = &'static str;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;
        Ok(Self {
            id,
            email: claims.email,
            full_name: claims.name,
        })
    }
}

/// Extractor for AuthUser from request extensions
///
/// This allows using AuthUser as a handler parameter after auth middleware has run.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "Authentication required")),
            )
        })
    }
}

/// Create a new JWT access token (HS256)
pub fn create_access_token(
    user_id: &Uuid,
    email: &str,
    full_name: &str,
    secret: &str,
    expiry_minutes: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(i64::try_from(expiry_minutes).unwrap_or(i64::MAX / 60_000));

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: full_name.to_string(),
        iat: now.timestamp(),
        nbf: now.timestamp(),
        exp: exp.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate and decode a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<TokenData<Claims>, AuthError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })
}

/// Authentication error types
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Missing authentication token",
            AuthError::InvalidToken => "Invalid authentication token",
            AuthError::TokenExpired => "Authentication token has expired",
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("unauthorized", message)),
        )
            .into_response()
    }
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}

/// Authentication middleware
///
/// Validates the bearer token and injects the AuthUser into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)
        .and_then(|h| extract_bearer_token(h).ok_or(AuthError::InvalidToken))?;

    let token_data = validate_token(token, &state.config.auth.jwt_secret)?;
    let auth_user: AuthUser = token_data
        .claims
        .try_into()
        .map_err(|_| AuthError::InvalidToken)?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
