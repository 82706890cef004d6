use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // 用户ID
    pub exp: i64,     // 过期时间
    pub iat: i64,     // 签发时间
    pub premium: bool, // 订阅等级标识
}

pub fn generate_token(
    user_id: &str,
    is_premium: bool,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::seconds(config.jwt_expiration().as_secs() as i64))
        .expect("valid timestamp")
        .timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
        iat: Utc::now().timestamp(),
        premium: is_premium,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn generate_recovery_code(user_id: &str, password: &str) -> String {
    let uuid = Uuid::new_v4();
    let recovery_string = format!("{}:{}:{}", user_id, password, uuid);
    hash_password(&recovery_string).unwrap_or_else(|_| String::new())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub resp_data: Option<T>,
}

// 所有 handler 统一返回 Json<ApiResponse<T>>
pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

// 带负载的错误响应，用于需要告知调用方上限等信息的校验错误
pub fn error_with_data_to_api_response<T: Serialize>(
    code: i32,
    msg: String,
    data: T,
) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: Some(data),
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const MESSAGE_TOO_LONG: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            jwt_secret: "test-secret".into(),
            jwt_expiration_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            standard_message_limit: 2000,
            premium_message_limit: 10000,
            feed_dedup_epsilon: 0.01,
            stats_refresh_secs: 30,
            geolocation_url: String::new(),
            geolocation_timeout_secs: 5,
            default_latitude: 40.7128,
            default_longitude: -74.0060,
        }
    }

    #[test]
    fn token_roundtrip_preserves_claims() {
        let config = test_config();
        let (token, exp) = generate_token("user-1", true, &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.premium);
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = test_config();
        let (token, _) = generate_token("user-1", false, &config).unwrap();
        let mut other = test_config();
        other.jwt_secret = "other-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn message_limit_follows_tier() {
        let config = test_config();
        assert_eq!(config.message_limit(false), 2000);
        assert_eq!(config.message_limit(true), 10000);
    }
}
