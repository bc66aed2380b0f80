//! Authentication middleware

use axum::{
    extract::{State, Request},
    middleware::Next,
    response::Response,
    http::{header::AUTHORIZATION, HeaderMap},
};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use uuid::Uuid;

use crate::{AppState, AppError, AppResult};
use crate::models::Session;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // User ID
    pub email: String,
    pub jti: String,      // Session ID
    pub iat: usize,
    pub exp: usize,
}

/// User context extracted from JWT
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: Uuid,
}

/// Issue an access token bound to `session_id`
pub fn generate_jwt(
    user_id: Uuid,
    email: &str,
    session_id: Uuid,
    secret: &str,
    expiration_minutes: i64,
) -> AppResult<(String, DateTime<Utc>)> {
    let now = Utc::now();
    let exp = now + Duration::minutes(expiration_minutes);

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        jti: session_id.to_string(),
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes())
    ).map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok((token, exp))
}

/// Verify signature and expiry, and parse the ids carried by the token
pub fn decode_jwt(token: &str, secret: &str) -> AppResult<UserContext> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default()
    )?.claims;

    Ok(UserContext {
        user_id: Uuid::parse_str(&claims.sub).map_err(|_| AppError::TokenInvalid)?,
        email: claims.email,
        session_id: Uuid::parse_str(&claims.jti).map_err(|_| AppError::TokenInvalid)?,
    })
}

/// Decode a token and check that its session is still active
pub async fn authenticate(state: &AppState, token: &str) -> AppResult<UserContext> {
    let user_ctx = decode_jwt(token, &state.config.jwt_secret)?;

    Session::find_active(&state.pool, user_ctx.session_id, user_ctx.user_id)
        .await?
        .ok_or(AppError::TokenInvalid)?;

    Ok(user_ctx)
}

/// Middleware: Require user JWT authentication
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(req.headers())?;
    let user_ctx = authenticate(&state, &token).await?;

    if let Err(e) = Session::touch(&state.pool, user_ctx.session_id).await {
        tracing::warn!("Failed to update session activity: {}", e);
    }

    req.extensions_mut().insert(user_ctx);

    Ok(next.run(req).await)
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// Implement FromRequestParts for UserContext
#[axum::async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<UserContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_jwt_round_trip() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let (token, exp) = generate_jwt(user_id, "ada@example.com", session_id, SECRET, 30).unwrap();

        let ctx = decode_jwt(&token, SECRET).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.session_id, session_id);
        assert_eq!(ctx.email, "ada@example.com");
        assert!(exp > Utc::now());
    }

    #[test]
    fn test_jwt_rejects_wrong_secret_and_expiry() {
        let (token, _) = generate_jwt(Uuid::new_v4(), "a@b.io", Uuid::new_v4(), SECRET, 30).unwrap();
        assert!(matches!(decode_jwt(&token, "other"), Err(AppError::TokenInvalid)));

        // Well past the default 60s leeway
        let (expired, _) = generate_jwt(Uuid::new_v4(), "a@b.io", Uuid::new_v4(), SECRET, -10).unwrap();
        assert!(matches!(decode_jwt(&expired, SECRET), Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
