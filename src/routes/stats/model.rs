use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::routes::feed::model::PUBLIC_WINDOW_DAYS;
use crate::routes::mood::model::{MoodCategory, MoodCountRow};

// 缓存相关常量
const STATS_CACHE_KEY: &str = "mood:stats:global"; // 全局统计缓存键
const STATS_CACHE_EXPIRE: u64 = 90; // 比刷新周期长，保证后台任务能接续覆盖

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodStats {
    pub total: i64,
    pub breakdown: BTreeMap<MoodCategory, i64>,
    pub top_mood: MoodCategory,
}

impl MoodStats {
    // 从各类别计数构造统计值。六个类别始终全部出现在breakdown中；
    // top_mood 并列时按类别声明顺序取先出现者，保证结果确定
    pub fn from_counts(counts: impl IntoIterator<Item = (MoodCategory, i64)>) -> Self {
        let mut breakdown: BTreeMap<MoodCategory, i64> =
            MoodCategory::ALL.iter().map(|m| (*m, 0)).collect();
        for (mood, count) in counts {
            if let Some(slot) = breakdown.get_mut(&mood) {
                *slot += count;
            }
        }

        let total = breakdown.values().sum();

        let mut top_mood = MoodCategory::ALL[0];
        let mut top_count = breakdown[&top_mood];
        for mood in MoodCategory::ALL {
            let count = breakdown[&mood];
            if count > top_count {
                top_mood = mood;
                top_count = count;
            }
        }

        MoodStats {
            total,
            breakdown,
            top_mood,
        }
    }

    // 对一串心情记录做归约，个人统计与测试都走这里
    pub fn reduce(moods: impl IntoIterator<Item = MoodCategory>) -> Self {
        Self::from_counts(moods.into_iter().map(|m| (m, 1)))
    }

    // 全局统计：最近30天窗口内按类别计数
    pub async fn compute_global(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let counts = sqlx::query_as::<_, MoodCountRow>(
            r#"
            SELECT mood, COUNT(*) AS count
            FROM mood_entries
            WHERE created_at >= NOW() - make_interval(days => $1)
            GROUP BY mood
            "#,
        )
        .bind(PUBLIC_WINDOW_DAYS)
        .fetch_all(pool)
        .await?;

        Ok(Self::from_counts(
            counts.into_iter().map(|row| (row.mood, row.count)),
        ))
    }

    // 读取全局统计，优先走后台任务维护的缓存
    pub async fn fetch_global(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
    ) -> Result<Self, sqlx::Error> {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(STATS_CACHE_KEY).await;
            if let Ok(json_str) = cached {
                if let Ok(stats) = serde_json::from_str::<MoodStats>(&json_str) {
                    tracing::debug!("Get global stats from cache");
                    return Ok(stats);
                }
            }
        }

        let stats = Self::compute_global(pool).await?;
        Self::store_cache(redis, &stats).await;
        Ok(stats)
    }

    pub async fn store_cache(redis: &Arc<RedisClient>, stats: &MoodStats) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(stats) {
                let _: Result<(), redis::RedisError> =
                    conn.set_ex(STATS_CACHE_KEY, json_str, STATS_CACHE_EXPIRE).await;
                tracing::debug!("Set global stats to cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_equals_breakdown_sum_and_all_categories_present() {
        let stats = MoodStats::reduce(vec![
            MoodCategory::Happy,
            MoodCategory::Happy,
            MoodCategory::Sad,
        ]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.breakdown.len(), 6);
        assert_eq!(stats.total, stats.breakdown.values().sum::<i64>());
        assert_eq!(stats.breakdown[&MoodCategory::Happy], 2);
        assert_eq!(stats.breakdown[&MoodCategory::Sad], 1);
        // 未出现的类别计数为0而不是缺失
        assert_eq!(stats.breakdown[&MoodCategory::Anxious], 0);
    }

    #[test]
    fn empty_input_yields_zero_stats() {
        let stats = MoodStats::reduce(Vec::new());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.breakdown.len(), 6);
        assert_eq!(stats.top_mood, MoodCategory::Happy);
    }

    #[test]
    fn top_mood_tie_breaks_by_declaration_order() {
        // happy 与 calm 各2条，按声明顺序 happy 优先
        let stats = MoodStats::reduce(vec![
            MoodCategory::Calm,
            MoodCategory::Happy,
            MoodCategory::Calm,
            MoodCategory::Happy,
        ]);
        assert_eq!(stats.top_mood, MoodCategory::Happy);

        // 重复调用结果一致
        for _ in 0..10 {
            let again = MoodStats::reduce(vec![
                MoodCategory::Calm,
                MoodCategory::Happy,
                MoodCategory::Calm,
                MoodCategory::Happy,
            ]);
            assert_eq!(again.top_mood, MoodCategory::Happy);
        }

        // 非并列时取计数最大者
        let stats = MoodStats::reduce(vec![
            MoodCategory::Anxious,
            MoodCategory::Anxious,
            MoodCategory::Happy,
        ]);
        assert_eq!(stats.top_mood, MoodCategory::Anxious);
    }

    #[test]
    fn from_counts_accepts_aggregated_input() {
        let stats = MoodStats::from_counts(vec![
            (MoodCategory::Excited, 5),
            (MoodCategory::Stressed, 2),
        ]);
        assert_eq!(stats.total, 7);
        assert_eq!(stats.top_mood, MoodCategory::Excited);
        assert_eq!(stats.breakdown[&MoodCategory::Calm], 0);
    }

    #[test]
    fn breakdown_serializes_with_category_keys() {
        let stats = MoodStats::reduce(vec![MoodCategory::Happy]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["breakdown"]["happy"], 1);
        assert_eq!(json["breakdown"]["anxious"], 0);
        assert_eq!(json["top_mood"], "happy");
    }
}
