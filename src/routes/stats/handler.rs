use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    routes::mood::model::MoodRecord,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::MoodStats;

// 全局心情统计（最近30天窗口），零条记录是合法的空统计而不是错误
#[axum::debug_handler]
pub async fn get_global_stats(State(state): State<AppState>) -> impl IntoResponse {
    match MoodStats::fetch_global(&state.pool, &state.redis).await {
        Ok(stats) => (StatusCode::OK, success_to_api_response(stats)),
        Err(e) => {
            tracing::error!("Failed to fetch global stats: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "获取全局统计失败".to_string()),
            )
        }
    }
}

// 当前用户自己的心情统计
#[axum::debug_handler]
pub async fn get_my_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match MoodRecord::mood_counts_for_user(&state.pool, &claims.sub).await {
        Ok(counts) => {
            let stats = MoodStats::from_counts(counts.into_iter().map(|row| (row.mood, row.count)));
            (StatusCode::OK, success_to_api_response(stats))
        }
        Err(e) => {
            tracing::error!("Failed to fetch personal stats: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "获取个人统计失败".to_string()),
            )
        }
    }
}
