//! User model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

/// Registered user. Key material is opaque to the server: the client derives
/// a key from the password with `key_salt` and uses it to unwrap
/// `encrypted_master_key`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub key_salt: String,
    pub encrypted_master_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(min = 8, max = 100))]
    pub password: String,
    #[validate(length(min = 1))]
    pub key_salt: String,
    #[validate(length(min = 1))]
    pub encrypted_master_key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
}

impl User {
    pub async fn create(pool: &PgPool, data: &CreateUser, password_hash: String) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, full_name, password_hash, key_salt, encrypted_master_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#
        )
        .bind(&data.email)
        .bind(&data.full_name)
        .bind(&password_hash)
        .bind(&data.key_salt)
        .bind(&data.encrypted_master_key)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub fn to_info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(email: &str, password: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            full_name: "Ada Analyst".to_string(),
            password: password.to_string(),
            key_salt: "c2FsdA==".to_string(),
            encrypted_master_key: "a2V5".to_string(),
        }
    }

    #[test]
    fn test_registration_validation() {
        assert!(registration("ada@example.com", "correct horse").validate().is_ok());
        assert!(registration("not-an-email", "correct horse").validate().is_err());
        assert!(registration("ada@example.com", "short").validate().is_err());
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            full_name: "Ada".into(),
            password_hash: "$argon2id$secret".into(),
            key_salt: "salt".into(),
            encrypted_master_key: "key".into(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["encrypted_master_key"], "key");
    }
}
