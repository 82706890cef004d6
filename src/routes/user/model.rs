use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::utils::{generate_recovery_code, hash_password, verify_password};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub nickname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub recovery_code: String,
    pub is_premium: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub nickname: String,
    pub token: String,
    pub expires_at: i64,
    // 注册时返回找回码，客户端提示用户保存
    pub recovery_code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub nickname: String,
    pub is_premium: bool,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNicknameRequest {
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub recovery_code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckTokenResponse {
    pub user_id: String,
    pub is_premium: bool,
}

impl User {
    pub async fn create(pool: &PgPool, req: RegisterRequest) -> Result<Self, sqlx::Error> {
        let user_id = Uuid::new_v4().to_string();
        let password_hash = hash_password(&req.password)
            .map_err(|e| sqlx::Error::Protocol(format!("Failed to hash password: {}", e)))?;
        let recovery_code = generate_recovery_code(&user_id, &req.password);

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, nickname, password_hash, recovery_code, is_premium, created_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, NOW())
            RETURNING user_id, email, nickname, password_hash, recovery_code, is_premium, created_at
            "#,
        )
        .bind(&user_id)
        .bind(&req.email)
        .bind(&req.nickname)
        .bind(&password_hash)
        .bind(&recovery_code)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, nickname, password_hash, recovery_code, is_premium, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, nickname, password_hash, recovery_code, is_premium, created_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn verify_login(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        verify_password(password, &self.password_hash)
    }

    pub async fn update_nickname(
        pool: &PgPool,
        user_id: &str,
        nickname: String,
    ) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET nickname = $1
            WHERE user_id = $2
            RETURNING user_id, email, nickname, password_hash, recovery_code, is_premium, created_at
            "#,
        )
        .bind(&nickname)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn update_password(
        pool: &PgPool,
        user_id: &str,
        password: String,
    ) -> Result<Self, sqlx::Error> {
        let password_hash = hash_password(&password)
            .map_err(|e| sqlx::Error::Protocol(format!("Failed to hash password: {}", e)))?;
        let recovery_code = generate_recovery_code(user_id, &password);

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = $1, recovery_code = $2
            WHERE user_id = $3
            RETURNING user_id, email, nickname, password_hash, recovery_code, is_premium, created_at
            "#,
        )
        .bind(&password_hash)
        .bind(&recovery_code)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn reset_password(
        pool: &PgPool,
        req: ResetPasswordRequest,
    ) -> Result<Self, sqlx::Error> {
        let user = Self::find_by_email(pool, &req.email)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        if user.recovery_code != req.recovery_code {
            return Err(sqlx::Error::Protocol("Invalid recovery code".into()));
        }

        Self::update_password(pool, &user.user_id, req.new_password).await
    }
}
