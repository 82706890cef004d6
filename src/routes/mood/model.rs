use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

// 心情类别是封闭集合，新增类别需要同步修改数据库枚举
// 声明顺序同时作为统计并列时的优先顺序
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "mood_category", rename_all = "lowercase")]
pub enum MoodCategory {
    Happy,
    Calm,
    Excited,
    Sad,
    Stressed,
    Anxious,
}

impl MoodCategory {
    pub const ALL: [MoodCategory; 6] = [
        MoodCategory::Happy,
        MoodCategory::Calm,
        MoodCategory::Excited,
        MoodCategory::Sad,
        MoodCategory::Stressed,
        MoodCategory::Anxious,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodCategory::Happy => "happy",
            MoodCategory::Calm => "calm",
            MoodCategory::Excited => "excited",
            MoodCategory::Sad => "sad",
            MoodCategory::Stressed => "stressed",
            MoodCategory::Anxious => "anxious",
        }
    }

    // 前端展示用的固定颜色
    pub fn color(&self) -> &'static str {
        match self {
            MoodCategory::Happy => "#fbbf24",
            MoodCategory::Calm => "#34d399",
            MoodCategory::Excited => "#f472b6",
            MoodCategory::Sad => "#60a5fa",
            MoodCategory::Stressed => "#f87171",
            MoodCategory::Anxious => "#a78bfa",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            MoodCategory::Happy => "😊",
            MoodCategory::Calm => "😌",
            MoodCategory::Excited => "🤩",
            MoodCategory::Sad => "😢",
            MoodCategory::Stressed => "😫",
            MoodCategory::Anxious => "😰",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MoodRecord {
    pub entry_id: String,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub mood: MoodCategory,
    pub message: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitMoodRequest {
    pub mood: MoodCategory,
    pub message: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug)]
pub struct NewMoodEntry {
    pub user_id: String,
    pub mood: MoodCategory,
    pub message: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

// 匿名聚合只读取不含消息和用户ID的列
#[derive(Debug, Clone, FromRow)]
pub struct PublicMoodRow {
    pub mood: MoodCategory,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct MoodCountRow {
    pub mood: MoodCategory,
    pub count: i64,
}

// 消息长度按 Unicode 字符计数，与前端的输入框计数一致
pub fn message_exceeds_limit(message: &str, limit: usize) -> bool {
    message.chars().count() > limit
}

pub fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

impl MoodRecord {
    pub async fn insert(pool: &PgPool, entry: NewMoodEntry) -> Result<Self, sqlx::Error> {
        let entry_id = Uuid::new_v4().to_string();

        let record = sqlx::query_as::<_, MoodRecord>(
            r#"
            INSERT INTO mood_entries (entry_id, user_id, mood, message, latitude, longitude, city, country, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING entry_id, user_id, mood, message, latitude, longitude, city, country, created_at
            "#,
        )
        .bind(&entry_id)
        .bind(&entry.user_id)
        .bind(entry.mood)
        .bind(&entry.message)
        .bind(entry.latitude)
        .bind(entry.longitude)
        .bind(&entry.city)
        .bind(&entry.country)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_user(
        pool: &PgPool,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let records = sqlx::query_as::<_, MoodRecord>(
            r#"
            SELECT entry_id, user_id, mood, message, latitude, longitude, city, country, created_at
            FROM mood_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    pub async fn mood_counts_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Vec<MoodCountRow>, sqlx::Error> {
        let counts = sqlx::query_as::<_, MoodCountRow>(
            r#"
            SELECT mood, COUNT(*) AS count
            FROM mood_entries
            WHERE user_id = $1
            GROUP BY mood
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(counts)
    }
}

impl PublicMoodRow {
    // 公开视图只取窗口内的行，消息和用户ID从不离开数据库
    pub async fn fetch_window(pool: &PgPool, window_days: i32) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PublicMoodRow>(
            r#"
            SELECT mood, latitude, longitude, city, country, created_at
            FROM mood_entries
            WHERE created_at >= NOW() - make_interval(days => $1)
            "#,
        )
        .bind(window_days)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_limit_boundary_is_inclusive() {
        let at_limit: String = "a".repeat(2000);
        let over_limit: String = "a".repeat(2001);
        assert!(!message_exceeds_limit(&at_limit, 2000));
        assert!(message_exceeds_limit(&over_limit, 2000));
        // 同一内容对高级会员的上限放宽
        assert!(!message_exceeds_limit(&over_limit, 10000));
        let premium_max: String = "好".repeat(10000);
        assert!(!message_exceeds_limit(&premium_max, 10000));
        let premium_over: String = "好".repeat(10001);
        assert!(message_exceeds_limit(&premium_over, 10000));
    }

    #[test]
    fn message_limit_counts_chars_not_bytes() {
        // 多字节字符按字符数而不是字节数计
        let message: String = "心".repeat(100);
        assert!(!message_exceeds_limit(&message, 100));
        assert!(message_exceeds_limit(&message, 99));
    }

    #[test]
    fn coordinate_ranges_are_validated() {
        assert!(valid_coordinates(0.0, 0.0));
        assert!(valid_coordinates(90.0, 180.0));
        assert!(valid_coordinates(-90.0, -180.0));
        assert!(!valid_coordinates(90.01, 0.0));
        assert!(!valid_coordinates(0.0, -180.01));
    }

    #[test]
    fn category_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MoodCategory::Anxious).unwrap(),
            "\"anxious\""
        );
        let parsed: MoodCategory = serde_json::from_str("\"happy\"").unwrap();
        assert_eq!(parsed, MoodCategory::Happy);
        // 封闭集合之外的类别直接拒绝
        assert!(serde_json::from_str::<MoodCategory>("\"angry\"").is_err());
    }

    #[test]
    fn category_metadata_is_total() {
        for mood in MoodCategory::ALL {
            assert!(mood.color().starts_with('#'));
            assert!(!mood.emoji().is_empty());
            assert!(!mood.as_str().is_empty());
        }
    }
}
