use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use moodmaps_backend::{
    AppState,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'moodmaps_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 应用数据库迁移
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // IP定位用的HTTP客户端，连接层面的超时独立于定位流程的整体等待上限
    let http = reqwest::Client::builder()
        .timeout(config.geolocation_timeout())
        .build()
        .expect("Failed to create HTTP client");

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        http,
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        // 用户公开路由
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login))
        .route("/users/reset-password", post(routes::user::reset_password))
        // 公开心情数据：匿名可访问，带令牌时合并个人记录
        .route("/moods/feed", get(routes::feed::get_feed))
        .route("/moods/feed/grid", get(routes::feed::get_feed_grid))
        .route("/moods/stats", get(routes::stats::get_global_stats));

    let protected_routes = Router::new()
        // 需要认证的用户路由
        .route("/users/update-nickname", put(routes::user::update_nickname))
        .route("/users/update-password", put(routes::user::update_password))
        .route("/users/refresh-token", post(routes::user::refresh_token))
        .route("/users/check-token", get(routes::user::check_token))
        // 心情路由
        .route("/moods", post(routes::mood::submit_mood))
        .route("/moods/mine", get(routes::mood::get_my_moods))
        .route("/moods/stats/mine", get(routes::stats::get_my_stats))
        // 私信路由
        .route("/messages/send", post(routes::message::send_message))
        .route(
            "/messages/conversation",
            post(routes::message::get_conversation),
        )
        .route("/messages/unread", get(routes::message::get_unread_count))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        // 设置开发环境的CORS，允许所有来源
        let cors = CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 后台统计刷新任务，每个进程只允许一个实例
    let stats_worker = tokio::spawn(routes::stats::refresh_stats_loop(state.clone()));

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // 停机时确定地终止后台任务，而不是依赖进程退出时的回收
    stats_worker.abort();
    tracing::info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
