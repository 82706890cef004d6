use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    // 心情消息长度按订阅等级限制
    pub standard_message_limit: usize,
    pub premium_message_limit: usize,
    // 合并公开心情时的近邻去重阈值，单位为度
    pub feed_dedup_epsilon: f64,
    pub stats_refresh_secs: u64,
    // 定位相关配置
    pub geolocation_url: String,
    pub geolocation_timeout_secs: u64,
    pub default_latitude: f64,
    pub default_longitude: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")?
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")?.parse().unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")?.parse().unwrap_or(100),
            standard_message_limit: env_or("STANDARD_MESSAGE_LIMIT", 2000),
            premium_message_limit: env_or("PREMIUM_MESSAGE_LIMIT", 10000),
            feed_dedup_epsilon: env_or("FEED_DEDUP_EPSILON", 0.01),
            stats_refresh_secs: env_or("STATS_REFRESH_INTERVAL", 30),
            geolocation_url: env::var("GEOLOCATION_URL")
                .unwrap_or_else(|_| "http://ip-api.com/json".into()),
            geolocation_timeout_secs: env_or("GEOLOCATION_TIMEOUT", 5),
            default_latitude: env_or("DEFAULT_LATITUDE", 40.7128),
            default_longitude: env_or("DEFAULT_LONGITUDE", -74.0060),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn stats_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.stats_refresh_secs)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    pub fn message_limit(&self, is_premium: bool) -> usize {
        if is_premium {
            self.premium_message_limit
        } else {
            self.standard_message_limit
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
