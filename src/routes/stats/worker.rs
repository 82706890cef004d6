use crate::AppState;

use super::model::MoodStats;

// 后台定时刷新全局统计缓存。每个进程只跑一个实例，
// 由 main 持有 JoinHandle，在优雅停机时 abort 掉，不依赖析构顺序
pub async fn refresh_stats_loop(state: AppState) {
    let mut interval = tokio::time::interval(state.config.stats_refresh_interval());
    // 错过的周期不追赶，下一轮重新计时
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match MoodStats::compute_global(&state.pool).await {
            Ok(stats) => {
                MoodStats::store_cache(&state.redis, &stats).await;
                tracing::debug!("Refreshed global mood stats, total={}", stats.total);
            }
            Err(e) => {
                // 刷新失败时保留旧缓存直到过期，读取端会回退到直接查库
                tracing::warn!("Global stats refresh failed: {}", e);
            }
        }
    }
}
