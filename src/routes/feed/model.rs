use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::routes::mood::model::{MoodCategory, MoodRecord, PublicMoodRow};

// 公开视图相关常量
pub const PUBLIC_WINDOW_DAYS: i32 = 30; // 只聚合最近30天的记录
pub const MIN_BUCKET_ENTRIES: i64 = 3; // k匿名下限，低于3条的分组不对外暴露
pub const MAX_PUBLIC_BUCKETS: usize = 1000; // 公开聚合结果上限
pub const UNKNOWN_PLACE: &str = "unknown"; // 城市/国家缺失时的分组哨兵值
pub const GRID_CELLS: usize = 64; // 密度网格固定为8x8
const TOOLTIP_MESSAGE_LIMIT: usize = 100; // 网格提示框中消息的截断长度

// 缓存相关常量
const FEED_CACHE_KEY: &str = "mood:public:buckets"; // 公开聚合缓存键
const FEED_CACHE_EXPIRE: u64 = 30; // 缓存过期时间，单位秒，公开视图允许滞后

// 匿名聚合桶：按（心情、国家、城市、日期）分组，不携带消息和用户ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizedBucket {
    pub mood: MoodCategory,
    pub country: String,
    pub city: String,
    pub date: NaiveDate,
    pub approx_lat: f64,
    pub approx_lng: f64,
    pub entry_count: i64,
}

impl AnonymizedBucket {
    // 伪记录的合成ID，仅在分组键内唯一
    pub fn synthetic_id(&self) -> String {
        format!("{}|{}|{}", self.mood.as_str(), self.city, self.date)
    }
}

// 合并后的展示条目：自己的记录保留详情，公开伪记录只有聚合信息
#[derive(Debug, Clone, Serialize)]
pub struct DisplayEntry {
    pub entry_id: String,
    pub mood: MoodCategory,
    pub message: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
    pub date: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
    pub entry_count: i64,
    pub is_own: bool,
}

impl DisplayEntry {
    pub fn from_own(record: &MoodRecord) -> Self {
        Self {
            entry_id: record.entry_id.clone(),
            mood: record.mood,
            message: record.message.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            city: record.city.clone(),
            country: record.country.clone(),
            date: record.created_at.date_naive(),
            created_at: Some(record.created_at),
            entry_count: 1,
            is_own: true,
        }
    }

    pub fn from_bucket(bucket: &AnonymizedBucket) -> Self {
        Self {
            entry_id: bucket.synthetic_id(),
            mood: bucket.mood,
            message: None,
            latitude: bucket.approx_lat,
            longitude: bucket.approx_lng,
            city: (bucket.city != UNKNOWN_PLACE).then(|| bucket.city.clone()),
            country: (bucket.country != UNKNOWN_PLACE).then(|| bucket.country.clone()),
            date: bucket.date,
            created_at: None,
            entry_count: bucket.entry_count,
            is_own: false,
        }
    }
}

// 保留两位小数，0.5按远离零方向进位
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// 把原始公开行聚合成匿名桶：分组、坐标取均值并舍入、应用k匿名下限、
// 按日期倒序排序并截断。窗口边界含当天往前第30天。
pub fn aggregate_buckets(rows: &[PublicMoodRow], today: NaiveDate) -> Vec<AnonymizedBucket> {
    let cutoff = today - Duration::days(PUBLIC_WINDOW_DAYS as i64);

    let mut groups: BTreeMap<(NaiveDate, MoodCategory, String, String), (f64, f64, i64)> =
        BTreeMap::new();

    for row in rows {
        let date = row.created_at.date_naive();
        if date < cutoff || date > today {
            continue;
        }
        let country = row.country.clone().unwrap_or_else(|| UNKNOWN_PLACE.into());
        let city = row.city.clone().unwrap_or_else(|| UNKNOWN_PLACE.into());
        let acc = groups
            .entry((date, row.mood, country, city))
            .or_insert((0.0, 0.0, 0));
        acc.0 += row.latitude;
        acc.1 += row.longitude;
        acc.2 += 1;
    }

    let mut buckets: Vec<AnonymizedBucket> = groups
        .into_iter()
        .filter(|(_, (_, _, count))| *count >= MIN_BUCKET_ENTRIES)
        .map(|((date, mood, country, city), (lat_sum, lng_sum, count))| AnonymizedBucket {
            mood,
            country,
            city,
            date,
            approx_lat: round2(lat_sum / count as f64),
            approx_lng: round2(lng_sum / count as f64),
            entry_count: count,
        })
        .collect();

    // 日期倒序；同日期时按数量、地点、心情排序保证结果稳定
    buckets.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then(b.entry_count.cmp(&a.entry_count))
            .then(a.country.cmp(&b.country))
            .then(a.city.cmp(&b.city))
            .then(a.mood.cmp(&b.mood))
    });
    buckets.truncate(MAX_PUBLIC_BUCKETS);
    buckets
}

// 读取公开聚合，优先走缓存；数据库不可用时向调用方返回错误而不是陈旧数据
pub async fn fetch_public_buckets(
    pool: &PgPool,
    redis: &Arc<RedisClient>,
) -> Result<Vec<AnonymizedBucket>, sqlx::Error> {
    if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
        let cached: redis::RedisResult<String> = conn.get(FEED_CACHE_KEY).await;
        if let Ok(json_str) = cached {
            if let Ok(buckets) = serde_json::from_str::<Vec<AnonymizedBucket>>(&json_str) {
                tracing::debug!("Get public buckets from cache");
                return Ok(buckets);
            }
        }
    }

    let rows = PublicMoodRow::fetch_window(pool, PUBLIC_WINDOW_DAYS).await?;
    let buckets = aggregate_buckets(&rows, Utc::now().date_naive());

    if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
        if let Ok(json_str) = serde_json::to_string(&buckets) {
            let _: Result<(), redis::RedisError> =
                conn.set_ex(FEED_CACHE_KEY, json_str, FEED_CACHE_EXPIRE).await;
            tracing::debug!("Set public buckets to cache");
        }
    }

    Ok(buckets)
}

// 比较前把差值归一到1e-6度，避免二进制浮点误差把恰好等于阈值的差判成小于
fn within_epsilon(a: f64, b: f64, epsilon: f64) -> bool {
    let delta = ((a - b).abs() * 1e6).round() / 1e6;
    delta < epsilon
}

// 合并个人记录与公开聚合：自己的记录排在前面（时间倒序），
// 与自己某条记录心情相同且坐标足够接近的伪记录被去重掉。
// 这是近似去重而不是精确匹配，阈值可配置。
pub fn merge_feed(
    mut own: Vec<MoodRecord>,
    buckets: Vec<AnonymizedBucket>,
    epsilon: f64,
) -> Vec<DisplayEntry> {
    own.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut entries: Vec<DisplayEntry> = own.iter().map(DisplayEntry::from_own).collect();

    entries.extend(
        buckets
            .iter()
            .filter(|bucket| {
                !own.iter().any(|record| {
                    record.mood == bucket.mood
                        && within_epsilon(record.latitude, bucket.approx_lat, epsilon)
                        && within_epsilon(record.longitude, bucket.approx_lng, epsilon)
                })
            })
            .map(DisplayEntry::from_bucket),
    );

    entries
}

// 密度网格单元：空位用占位单元表示，动画延迟纯装饰
#[derive(Debug, Serialize)]
pub struct MoodGridCell {
    pub index: usize,
    pub entry_id: Option<String>,
    pub mood: Option<MoodCategory>,
    pub color: Option<&'static str>,
    pub emoji: Option<&'static str>,
    pub city: Option<String>,
    pub message_preview: Option<String>,
    pub entry_count: i64,
    pub is_own: bool,
    pub animation_delay_ms: u32,
}

fn truncate_preview(message: &str) -> String {
    if message.chars().count() > TOOLTIP_MESSAGE_LIMIT {
        let truncated: String = message.chars().take(TOOLTIP_MESSAGE_LIMIT).collect();
        format!("{}…", truncated)
    } else {
        message.to_string()
    }
}

// 把展示条目投影到固定64格的网格上。条目不足时补空位，
// 超出容量时静默截断——输入按时间倒序，因此丢弃的是最旧的条目。
pub fn project_grid(entries: &[DisplayEntry]) -> Vec<MoodGridCell> {
    let mut rng = rand::thread_rng();

    (0..GRID_CELLS)
        .map(|index| match entries.get(index) {
            Some(entry) => MoodGridCell {
                index,
                entry_id: Some(entry.entry_id.clone()),
                mood: Some(entry.mood),
                color: Some(entry.mood.color()),
                emoji: Some(entry.mood.emoji()),
                city: entry.city.clone(),
                message_preview: entry.message.as_deref().map(truncate_preview),
                entry_count: entry.entry_count,
                is_own: entry.is_own,
                animation_delay_ms: rng.gen_range(0..2000),
            },
            None => MoodGridCell {
                index,
                entry_id: None,
                mood: None,
                color: None,
                emoji: None,
                city: None,
                message_preview: None,
                entry_count: 0,
                is_own: false,
                animation_delay_ms: 0,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn row(
        mood: MoodCategory,
        latitude: f64,
        longitude: f64,
        city: Option<&str>,
        country: Option<&str>,
        days_ago: i64,
    ) -> PublicMoodRow {
        let date = today() - Duration::days(days_ago);
        PublicMoodRow {
            mood,
            latitude,
            longitude,
            city: city.map(String::from),
            country: country.map(String::from),
            created_at: date.and_hms_opt(12, 0, 0).unwrap().and_utc(),
        }
    }

    fn own_record(mood: MoodCategory, latitude: f64, longitude: f64) -> MoodRecord {
        MoodRecord {
            entry_id: "own-1".into(),
            user_id: "user-1".into(),
            mood,
            message: Some("great day".into()),
            latitude,
            longitude,
            city: Some("New York".into()),
            country: Some("US".into()),
            created_at: Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn bucket_floor_is_inclusive_at_three() {
        let mut rows = vec![
            row(MoodCategory::Happy, 40.0, -74.0, Some("NYC"), Some("US"), 1),
            row(MoodCategory::Happy, 40.0, -74.0, Some("NYC"), Some("US"), 1),
        ];
        // 两条记录的分组不暴露
        assert!(aggregate_buckets(&rows, today()).is_empty());

        rows.push(row(
            MoodCategory::Happy,
            40.0,
            -74.0,
            Some("NYC"),
            Some("US"),
            1,
        ));
        // 第三条让分组达到k匿名下限
        let buckets = aggregate_buckets(&rows, today());
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].entry_count, 3);
    }

    #[test]
    fn window_excludes_records_older_than_thirty_days() {
        let make = |days_ago| {
            vec![
                row(MoodCategory::Calm, 10.0, 10.0, Some("Oslo"), Some("NO"), days_ago),
                row(MoodCategory::Calm, 10.0, 10.0, Some("Oslo"), Some("NO"), days_ago),
                row(MoodCategory::Calm, 10.0, 10.0, Some("Oslo"), Some("NO"), days_ago),
            ]
        };
        assert_eq!(aggregate_buckets(&make(29), today()).len(), 1);
        assert!(aggregate_buckets(&make(31), today()).is_empty());
    }

    #[test]
    fn coordinates_are_mean_rounded_half_away_from_zero() {
        // 10.125 可被二进制浮点精确表示，均值恰好落在0.005的一半处
        let rows = vec![
            row(MoodCategory::Happy, 10.125, 20.0, Some("A"), Some("B"), 1),
            row(MoodCategory::Happy, 10.125, 20.0, Some("A"), Some("B"), 1),
            row(MoodCategory::Happy, 10.125, 20.0, Some("A"), Some("B"), 1),
        ];
        let buckets = aggregate_buckets(&rows, today());
        // 0.5向远离零的方向进位
        assert_eq!(buckets[0].approx_lat, 10.13);
        assert_eq!(buckets[0].approx_lng, 20.0);

        let negative = vec![
            row(MoodCategory::Sad, -10.125, -20.0, Some("C"), Some("D"), 1),
            row(MoodCategory::Sad, -10.125, -20.0, Some("C"), Some("D"), 1),
            row(MoodCategory::Sad, -10.125, -20.0, Some("C"), Some("D"), 1),
        ];
        let buckets = aggregate_buckets(&negative, today());
        assert_eq!(buckets[0].approx_lat, -10.13);
    }

    #[test]
    fn missing_place_groups_under_unknown_and_keeps_floor() {
        let rows = vec![
            row(MoodCategory::Anxious, 0.0, 0.0, None, None, 2),
            row(MoodCategory::Anxious, 0.0, 0.0, None, None, 2),
        ];
        // 哨兵分组同样受k匿名下限约束
        assert!(aggregate_buckets(&rows, today()).is_empty());

        let mut rows = rows;
        rows.push(row(MoodCategory::Anxious, 0.0, 0.0, None, None, 2));
        let buckets = aggregate_buckets(&rows, today());
        assert_eq!(buckets[0].city, UNKNOWN_PLACE);
        assert_eq!(buckets[0].country, UNKNOWN_PLACE);
        // 哨兵分组的伪记录不把“unknown”当成真实城市展示
        let entry = DisplayEntry::from_bucket(&buckets[0]);
        assert!(entry.city.is_none());
        assert!(entry.country.is_none());
    }

    #[test]
    fn buckets_are_date_descending_and_capped() {
        let mut rows = Vec::new();
        for i in 0..(MAX_PUBLIC_BUCKETS + 5) {
            let city = format!("city-{}", i);
            let days_ago = (i % 20) as i64;
            for _ in 0..3 {
                rows.push(row(
                    MoodCategory::Excited,
                    1.0,
                    1.0,
                    Some(&city),
                    Some("X"),
                    days_ago,
                ));
            }
        }
        let buckets = aggregate_buckets(&rows, today());
        assert_eq!(buckets.len(), MAX_PUBLIC_BUCKETS);
        for pair in buckets.windows(2) {
            assert!(pair[0].date >= pair[1].date);
        }
    }

    #[test]
    fn merge_suppresses_nearby_same_mood_pseudo_records() {
        let own = vec![own_record(MoodCategory::Happy, 40.0000, -74.0000)];
        let bucket = |lat, lng, mood| AnonymizedBucket {
            mood,
            country: "US".into(),
            city: "NYC".into(),
            date: today(),
            approx_lat: lat,
            approx_lng: lng,
            entry_count: 4,
        };

        // 两个维度都在阈值内且心情相同：去重
        let merged = merge_feed(
            own.clone(),
            vec![bucket(40.0099, -73.9901, MoodCategory::Happy)],
            0.01,
        );
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_own);

        // 纬度差超过阈值：保留
        let merged = merge_feed(
            own.clone(),
            vec![bucket(40.0101, -74.0000, MoodCategory::Happy)],
            0.01,
        );
        assert_eq!(merged.len(), 2);

        // 差值恰好等于阈值：保留（严格小于才算接近）
        let merged = merge_feed(
            own.clone(),
            vec![bucket(40.01, -74.01, MoodCategory::Happy)],
            0.01,
        );
        assert_eq!(merged.len(), 2);

        // 坐标接近但心情不同：保留
        let merged = merge_feed(
            own,
            vec![bucket(40.0000, -74.0000, MoodCategory::Sad)],
            0.01,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_ranks_own_records_first_most_recent_first() {
        let mut older = own_record(MoodCategory::Calm, 1.0, 1.0);
        older.entry_id = "own-older".into();
        older.created_at = Utc.with_ymd_and_hms(2025, 6, 14, 9, 0, 0).unwrap();
        let newer = own_record(MoodCategory::Happy, 50.0, 50.0);

        let bucket = AnonymizedBucket {
            mood: MoodCategory::Excited,
            country: "FR".into(),
            city: "Paris".into(),
            date: today(),
            approx_lat: 48.86,
            approx_lng: 2.35,
            entry_count: 5,
        };

        let merged = merge_feed(vec![older, newer], vec![bucket], 0.01);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].entry_id, "own-1");
        assert_eq!(merged[1].entry_id, "own-older");
        assert!(!merged[2].is_own);
        assert_eq!(merged[2].entry_id, "excited|Paris|2025-06-15");
    }

    #[test]
    fn anonymous_merge_returns_public_slice_only() {
        let bucket = AnonymizedBucket {
            mood: MoodCategory::Calm,
            country: "JP".into(),
            city: "Tokyo".into(),
            date: today(),
            approx_lat: 35.68,
            approx_lng: 139.69,
            entry_count: 7,
        };
        let merged = merge_feed(Vec::new(), vec![bucket], 0.01);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_own);
        assert!(merged[0].message.is_none());
    }

    #[test]
    fn grid_is_always_sixty_four_cells() {
        let own = own_record(MoodCategory::Happy, 40.0, -74.0);
        let entries = vec![DisplayEntry::from_own(&own); 3];

        let grid = project_grid(&entries);
        assert_eq!(grid.len(), GRID_CELLS);
        assert!(grid[0].mood.is_some());
        assert!(grid[2].mood.is_some());
        // 超出条目数的格子是空占位
        assert!(grid[3].mood.is_none());
        assert_eq!(grid[3].entry_count, 0);
        assert_eq!(grid[63].animation_delay_ms, 0);
    }

    #[test]
    fn grid_truncates_excess_entries_keeping_head() {
        let mut entries = Vec::new();
        for i in 0..80 {
            let mut record = own_record(MoodCategory::Happy, 40.0, -74.0);
            record.entry_id = format!("own-{}", i);
            entries.push(DisplayEntry::from_own(&record));
        }
        let grid = project_grid(&entries);
        assert_eq!(grid.len(), GRID_CELLS);
        // 输入按时间倒序，截断丢弃的是尾部（最旧）的条目
        assert_eq!(grid[0].entry_id.as_deref(), Some("own-0"));
        assert_eq!(grid[63].entry_id.as_deref(), Some("own-63"));
    }

    #[test]
    fn grid_cell_color_is_deterministic_per_mood() {
        let own = own_record(MoodCategory::Stressed, 0.0, 0.0);
        let entries = vec![DisplayEntry::from_own(&own)];
        let grid_a = project_grid(&entries);
        let grid_b = project_grid(&entries);
        assert_eq!(grid_a[0].color, grid_b[0].color);
        assert_eq!(grid_a[0].color, Some(MoodCategory::Stressed.color()));
        assert!(grid_a[0].animation_delay_ms < 2000);
    }

    #[test]
    fn tooltip_message_is_truncated_with_ellipsis() {
        assert_eq!(truncate_preview("short"), "short");

        let exact: String = "a".repeat(100);
        assert_eq!(truncate_preview(&exact), exact);

        let long: String = "b".repeat(150);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), 101);
        assert!(preview.ends_with('…'));

        // 截断按字符而不是字节，多字节消息不会被截成半个字符
        let wide: String = "安".repeat(150);
        let preview = truncate_preview(&wide);
        assert_eq!(preview.chars().count(), 101);
    }
}
