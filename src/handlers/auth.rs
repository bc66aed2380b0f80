//! Authentication handlers

use axum::{extract::State, http::{HeaderMap, StatusCode}, Json};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::middleware::auth::{generate_jwt, hash_token, UserContext};
use crate::models::{
    CreateLog, CreateUser, Log, LogSeverity, LoginRequest, LoginResponse, NewSession, Session, User,
};

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: &'static str,
}

/// Register endpoint
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    req.validate()?;

    // Check if email already exists
    if User::find_by_email(&state.pool, &req.email).await?.is_some() {
        return Err(AppError::AlreadyExists("Email already registered".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    // A concurrent registration can still win the race to the unique index
    let user = User::create(&state.pool, &req, password_hash)
        .await
        .map_err(registration_error)?;

    tracing::info!("New user registered: {} ({})", user.email, user.id);
    audit(&state, user.id, "USER_REGISTER", format!("User registered: {}", user.email), &HeaderMap::new()).await;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Login endpoint
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    req.validate()?;

    // Find user by email
    let user = User::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    verify_password(&req.password, &user.password_hash)?;

    let session_id = Uuid::new_v4();
    let (token, expires_at) = generate_jwt(
        user.id,
        &user.email,
        session_id,
        &state.config.jwt_secret,
        state.config.jwt_expiration_minutes,
    )?;

    Session::create(
        &state.pool,
        NewSession {
            id: session_id,
            user_id: user.id,
            token_hash: hash_token(&token),
            ip_address: client_ip(&headers),
            user_agent: user_agent(&headers),
            expires_at,
        },
    )
    .await?;

    tracing::info!("User logged in: {}", user.email);
    audit(&state, user.id, "USER_LOGIN", format!("User logged in: {}", user.email), &headers).await;

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "bearer",
        user: user.to_info(),
    }))
}

/// Current user
pub async fn me(
    State(state): State<AppState>,
    user: UserContext,
) -> AppResult<Json<User>> {
    let user = User::find_by_id(&state.pool, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Logout endpoint - deactivates the session behind the token
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: UserContext,
) -> AppResult<Json<LogoutResponse>> {
    Session::deactivate(&state.pool, user.session_id).await?;

    tracing::info!("User logged out: {}", user.email);
    audit(&state, user.user_id, "USER_LOGOUT", format!("User logged out: {}", user.email), &headers).await;

    Ok(Json(LogoutResponse {
        message: "Successfully logged out",
    }))
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::InternalError(e.to_string()))
}

fn verify_password(password: &str, password_hash: &str) -> AppResult<()> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::InternalError("Invalid password hash".to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::InvalidCredentials)
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Record an auth audit log; failures are logged, never surfaced
async fn audit(state: &AppState, user_id: Uuid, action: &str, message: String, headers: &HeaderMap) {
    let mut entry = CreateLog::system("auth", "audit", LogSeverity::Info, message)
        .with_action(action)
        .with_target(user_id);
    entry.ip_address = client_ip(headers);
    entry.user_agent = user_agent(headers);

    if let Err(e) = Log::create(&state.pool, entry, Some(user_id)).await {
        tracing::warn!("Failed to write audit log for {}: {}", action, e);
    }
}

fn registration_error(err: sqlx::Error) -> AppError {
    let duplicate = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if duplicate {
        AppError::AlreadyExists("Email already registered".to_string())
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[derive(Debug)]
    struct FakeDbError {
        unique: bool,
    }

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "database rejected the row")
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "database rejected the row"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            if self.unique {
                sqlx::error::ErrorKind::UniqueViolation
            } else {
                sqlx::error::ErrorKind::Other
            }
        }
    }

    #[test]
    fn test_duplicate_email_insert_is_conflict() {
        let err = sqlx::Error::Database(Box::new(FakeDbError { unique: true }));
        let mapped = registration_error(err);
        assert_eq!(mapped.status(), StatusCode::CONFLICT);
        assert!(matches!(mapped, AppError::AlreadyExists(_)));

        let err = sqlx::Error::Database(Box::new(FakeDbError { unique: false }));
        assert!(matches!(registration_error(err), AppError::DatabaseError(_)));
        assert!(matches!(registration_error(sqlx::Error::RowNotFound), AppError::DatabaseError(_)));
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_client_ip_takes_first_forwarded() {
        let mut headers = HeaderMap::new();
        assert!(client_ip(&headers).is_none());

        headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
