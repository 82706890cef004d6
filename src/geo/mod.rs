use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;

// 定位结果：坐标必填，城市/国家可能解析不出来
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl ResolvedLocation {
    // 定位失败时使用配置中的默认坐标，提交流程不因定位失败而中断
    pub fn fallback(config: &Config) -> Self {
        Self {
            latitude: config.default_latitude,
            longitude: config.default_longitude,
            city: None,
            country: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

// 按客户端IP查询地理位置，整体等待时间有上限，超时或失败返回 None
pub async fn locate_by_ip(
    http: &reqwest::Client,
    base_url: &str,
    ip: &str,
    timeout: Duration,
) -> Option<ResolvedLocation> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), ip);

    let resp = match tokio::time::timeout(timeout, http.get(&url).send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            tracing::warn!("Geolocation request failed: {}", e);
            return None;
        }
        Err(_) => {
            tracing::warn!("Geolocation request timed out after {:?}", timeout);
            return None;
        }
    };

    let body: IpApiResponse = match resp.json().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Geolocation response malformed: {}", e);
            return None;
        }
    };

    if body.status != "success" {
        tracing::debug!("Geolocation lookup returned status {}", body.status);
        return None;
    }

    match (body.lat, body.lon) {
        (Some(latitude), Some(longitude)) => Some(ResolvedLocation {
            latitude,
            longitude,
            city: body.city,
            country: body.country,
        }),
        _ => None,
    }
}
