use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    routes::mood::model::message_exceeds_limit,
    utils::{
        Claims, error_codes, error_to_api_response, error_with_data_to_api_response,
        success_to_api_response,
    },
};

use super::model::{
    ConversationRequest, PRIVATE_MESSAGE_LIMIT, PrivateMessage, SendMessageRequest,
};

// 发送私信，仅限高级会员
#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    if !claims.premium {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response::<()>(
                error_codes::PERMISSION_DENIED,
                "私信功能仅对高级会员开放".to_string(),
            ),
        )
            .into_response();
    }

    if req.recipient_id == claims.sub {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response::<()>(
                error_codes::VALIDATION_ERROR,
                "不能给自己发送私信".to_string(),
            ),
        )
            .into_response();
    }

    if req.content.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response::<()>(
                error_codes::VALIDATION_ERROR,
                "私信内容不能为空".to_string(),
            ),
        )
            .into_response();
    }

    if message_exceeds_limit(&req.content, PRIVATE_MESSAGE_LIMIT) {
        return (
            StatusCode::BAD_REQUEST,
            error_with_data_to_api_response(
                error_codes::MESSAGE_TOO_LONG,
                format!("私信长度超出上限（最多{}个字符）", PRIVATE_MESSAGE_LIMIT),
                serde_json::json!({ "max_message_length": PRIVATE_MESSAGE_LIMIT }),
            ),
        )
            .into_response();
    }

    match PrivateMessage::send(
        &state.pool,
        &state.redis,
        &claims.sub,
        &req.recipient_id,
        &req.content,
    )
    .await
    {
        Ok(message) => (StatusCode::CREATED, success_to_api_response(message)).into_response(),
        Err(e) => {
            tracing::error!("Failed to send private message: {}", e);
            if e.to_string().contains("foreign key") {
                (
                    StatusCode::NOT_FOUND,
                    error_to_api_response::<()>(error_codes::NOT_FOUND, "接收者不存在".to_string()),
                )
                    .into_response()
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_to_api_response::<()>(
                        error_codes::INTERNAL_ERROR,
                        "发送私信失败".to_string(),
                    ),
                )
                    .into_response()
            }
        }
    }
}

// 读取与某个用户的会话
#[axum::debug_handler]
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConversationRequest>,
) -> impl IntoResponse {
    match PrivateMessage::conversation(
        &state.pool,
        &state.redis,
        &claims.sub,
        &req.peer_id,
        req.limit,
    )
    .await
    {
        Ok(messages) => (StatusCode::OK, success_to_api_response(messages)),
        Err(e) => {
            tracing::error!("Failed to fetch conversation: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "获取会话失败".to_string()),
            )
        }
    }
}

// 未读私信数量
#[axum::debug_handler]
pub async fn get_unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match PrivateMessage::unread_count(&state.pool, &claims.sub).await {
        Ok(count) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({ "unread": count })),
        ),
        Err(e) => {
            tracing::error!("Failed to count unread messages: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "获取未读数量失败".to_string()),
            )
        }
    }
}
