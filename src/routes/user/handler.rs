use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    utils::{Claims, error_codes, error_to_api_response, generate_token, success_to_api_response},
};

use super::model::{
    CheckTokenResponse, LoginRequest, LoginResponse, RefreshTokenResponse, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, ResetPasswordResponse, UpdateNicknameRequest,
    UpdatePasswordRequest, User,
};

// 注册邮箱的最低限度格式检查，完整校验交给邮箱验证流程
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if !is_plausible_email(&req.email) {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(error_codes::VALIDATION_ERROR, "邮箱格式无效".to_string()),
        );
    }

    // 验证昵称长度
    if req.nickname.chars().count() < 2 || req.nickname.chars().count() > 24 {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "昵称长度必须在2到24个字符之间".to_string(),
            ),
        );
    }

    // 验证密码长度
    if req.password.len() < 6 || req.password.len() > 24 {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "密码长度必须在6到24个字符之间".to_string(),
            ),
        );
    }

    match User::create(&state.pool, req).await {
        Ok(user) => match generate_token(&user.user_id, user.is_premium, &state.config) {
            Ok((token, expires_at)) => (
                StatusCode::OK,
                success_to_api_response(RegisterResponse {
                    user_id: user.user_id,
                    nickname: user.nickname,
                    token,
                    expires_at,
                    recovery_code: user.recovery_code,
                }),
            ),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
            ),
        },
        Err(e) => {
            if e.to_string().contains("unique constraint") {
                (
                    StatusCode::OK,
                    error_to_api_response(error_codes::USER_EXISTS, "邮箱已被注册".to_string()),
                )
            } else {
                tracing::error!("Failed to create user: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_to_api_response(error_codes::INTERNAL_ERROR, "创建用户失败".to_string()),
                )
            }
        }
    }
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = match User::find_by_email(&state.pool, &req.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::AUTH_FAILED, "邮箱或密码错误".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("Login lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    };

    // 验证密码
    match user.verify_login(&req.password).await {
        Ok(true) => (),
        Ok(false) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::AUTH_FAILED, "邮箱或密码错误".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("Password verification failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    }

    match generate_token(&user.user_id, user.is_premium, &state.config) {
        Ok((token, expires_at)) => (
            StatusCode::OK,
            success_to_api_response(LoginResponse {
                user_id: user.user_id,
                nickname: user.nickname,
                is_premium: user.is_premium,
                token,
                expires_at,
            }),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn update_nickname(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdateNicknameRequest>,
) -> impl IntoResponse {
    // 验证昵称长度
    if req.nickname.chars().count() < 2 || req.nickname.chars().count() > 24 {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "昵称长度必须在2到24个字符之间".to_string(),
            ),
        );
    }

    match User::update_nickname(&state.pool, &claims.sub, req.nickname).await {
        Ok(user) => (StatusCode::OK, success_to_api_response(user)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn update_password(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdatePasswordRequest>,
) -> impl IntoResponse {
    // 验证密码长度
    if req.password.len() < 6 || req.password.len() > 24 {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "密码长度必须在6到24个字符之间".to_string(),
            ),
        );
    }

    match User::update_password(&state.pool, &claims.sub, req.password).await {
        Ok(user) => (StatusCode::OK, success_to_api_response(user)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    match User::reset_password(&state.pool, req).await {
        Ok(_) => (
            StatusCode::OK,
            success_to_api_response(ResetPasswordResponse {}),
        ),
        Err(e) => {
            let status = if e.to_string().contains("Invalid recovery code") {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn refresh_token(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // 会员状态可能在令牌有效期内变化，刷新时从数据库重新读取
    let is_premium = match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(user)) => user.is_premium,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                error_to_api_response(error_codes::AUTH_FAILED, "用户不存在".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("Refresh lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    };

    match generate_token(&claims.sub, is_premium, &state.config) {
        Ok((token, expires_at)) => (
            StatusCode::OK,
            success_to_api_response(RefreshTokenResponse { token, expires_at }),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, "刷新令牌失败".to_string()),
        ),
    }
}

/// 检查token是否有效，如果有效返回成功，否则返回失败
#[axum::debug_handler]
pub async fn check_token(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    // 认证中间件已验证token有效，所以直接返回成功
    (
        StatusCode::OK,
        success_to_api_response(CheckTokenResponse {
            user_id: claims.sub,
            is_premium: claims.premium,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility_check() {
        assert!(is_plausible_email("user@example.com"));
        assert!(!is_plausible_email("userexample.com"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("user@nodot"));
        assert!(!is_plausible_email("user@.com"));
    }
}
