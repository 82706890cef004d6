use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    utils::{error_codes, error_to_api_response, verify_token},
};

// 受保护路由的认证中间件：校验 Bearer token 并将 Claims 注入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(error_codes::AUTH_FAILED, "缺少认证令牌".to_string()),
            )
                .into_response());
        }
    };

    match verify_token(token, &state.config) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::debug!("Token verification failed: {}", e);
            Err((
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(
                    error_codes::AUTH_FAILED,
                    "认证令牌无效或已过期".to_string(),
                ),
            )
                .into_response())
        }
    }
}
