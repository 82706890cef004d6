use axum::{
    extract::{ConnectInfo, Extension, Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::{
    AppState, geo,
    utils::{
        Claims, error_codes, error_to_api_response, error_with_data_to_api_response,
        success_to_api_response,
    },
};

use super::model::{
    MoodRecord, NewMoodEntry, SubmitMoodRequest, message_exceeds_limit, valid_coordinates,
};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

// 提交新的心情记录
// 校验顺序：认证（中间件完成）、消息长度、坐标；定位失败不阻塞提交
#[axum::debug_handler]
pub async fn submit_mood(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<SubmitMoodRequest>,
) -> Response {
    let limit = state.config.message_limit(claims.premium);
    if let Some(message) = &req.message {
        if message_exceeds_limit(message, limit) {
            return (
                StatusCode::BAD_REQUEST,
                error_with_data_to_api_response(
                    error_codes::MESSAGE_TOO_LONG,
                    format!("消息长度超出上限（最多{}个字符）", limit),
                    serde_json::json!({ "max_message_length": limit }),
                ),
            )
                .into_response();
        }
    }

    let location = match (req.latitude, req.longitude) {
        (Some(latitude), Some(longitude)) => {
            if !valid_coordinates(latitude, longitude) {
                return (
                    StatusCode::BAD_REQUEST,
                    error_to_api_response::<()>(
                        error_codes::VALIDATION_ERROR,
                        "经纬度超出有效范围".to_string(),
                    ),
                )
                    .into_response();
            }
            geo::ResolvedLocation {
                latitude,
                longitude,
                city: req.city.clone(),
                country: req.country.clone(),
            }
        }
        (None, None) => {
            // 客户端未提供坐标时按IP定位，定位不可用则使用默认坐标
            let resolved = geo::locate_by_ip(
                &state.http,
                &state.config.geolocation_url,
                &addr.ip().to_string(),
                state.config.geolocation_timeout(),
            )
            .await
            .unwrap_or_else(|| {
                tracing::warn!("Geolocation unavailable, using default location");
                geo::ResolvedLocation::fallback(&state.config)
            });
            geo::ResolvedLocation {
                latitude: resolved.latitude,
                longitude: resolved.longitude,
                // 客户端显式提供的城市/国家优先于IP解析结果
                city: req.city.clone().or(resolved.city),
                country: req.country.clone().or(resolved.country),
            }
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response::<()>(
                    error_codes::VALIDATION_ERROR,
                    "经纬度必须同时提供".to_string(),
                ),
            )
                .into_response();
        }
    };

    let entry = NewMoodEntry {
        user_id: claims.sub,
        mood: req.mood,
        message: req.message,
        latitude: location.latitude,
        longitude: location.longitude,
        city: location.city,
        country: location.country,
    };

    match MoodRecord::insert(&state.pool, entry).await {
        Ok(record) => (StatusCode::CREATED, success_to_api_response(record)).into_response(),
        Err(e) => {
            tracing::error!("Failed to store mood entry: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(
                    error_codes::INTERNAL_ERROR,
                    "存储心情记录失败，请重试".to_string(),
                ),
            )
                .into_response()
        }
    }
}

// 查询自己的心情历史，按时间倒序
#[axum::debug_handler]
pub async fn get_my_moods(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);

    match MoodRecord::find_by_user(&state.pool, &claims.sub, limit).await {
        Ok(records) => (StatusCode::OK, success_to_api_response(records)),
        Err(e) => {
            tracing::error!("Failed to fetch mood history: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "获取心情历史失败".to_string()),
            )
        }
    }
}
