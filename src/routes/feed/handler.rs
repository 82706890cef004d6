use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    AppState,
    routes::mood::model::MoodRecord,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response, verify_token},
};

use super::model::{fetch_public_buckets, merge_feed, project_grid};

// 实时推送只覆盖用户自己的新增记录，本地最多保留最近100条
const OWN_HISTORY_LIMIT: i64 = 100;

// 公开路由上的可选认证：令牌缺失或无效都按匿名处理
fn optional_claims(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    state: &AppState,
) -> Option<Claims> {
    bearer.and_then(|TypedHeader(auth)| verify_token(auth.token(), &state.config).ok())
}

// 获取用户自己的记录；失败时降级为仅公开数据，不让整个信息流报错
async fn own_records(state: &AppState, claims: Option<Claims>) -> Vec<MoodRecord> {
    let Some(claims) = claims else {
        return Vec::new();
    };
    match MoodRecord::find_by_user(&state.pool, &claims.sub, OWN_HISTORY_LIMIT).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("Failed to fetch own history, degrading to public feed: {}", e);
            Vec::new()
        }
    }
}

// 合并后的心情信息流：自己的详细记录在前，匿名聚合在后
#[axum::debug_handler]
pub async fn get_feed(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let buckets = match fetch_public_buckets(&state.pool, &state.redis).await {
        Ok(buckets) => buckets,
        Err(e) => {
            tracing::error!("Failed to fetch public buckets: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(
                    error_codes::INTERNAL_ERROR,
                    "获取公开心情数据失败".to_string(),
                ),
            )
                .into_response();
        }
    };

    let claims = optional_claims(bearer, &state);
    let own = own_records(&state, claims).await;

    let entries = merge_feed(own, buckets, state.config.feed_dedup_epsilon);
    (StatusCode::OK, success_to_api_response(entries)).into_response()
}

// 信息流的密度网格投影，供地图可视化渲染
#[axum::debug_handler]
pub async fn get_feed_grid(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let buckets = match fetch_public_buckets(&state.pool, &state.redis).await {
        Ok(buckets) => buckets,
        Err(e) => {
            tracing::error!("Failed to fetch public buckets: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(
                    error_codes::INTERNAL_ERROR,
                    "获取公开心情数据失败".to_string(),
                ),
            )
                .into_response();
        }
    };

    let claims = optional_claims(bearer, &state);
    let own = own_records(&state, claims).await;

    let entries = merge_feed(own, buckets, state.config.feed_dedup_epsilon);
    let grid = project_grid(&entries);
    (StatusCode::OK, success_to_api_response(grid)).into_response()
}
