//! Daily horoscope lookup

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of daily horoscope text
#[async_trait]
pub trait HoroscopeService: Send + Sync {
    /// Today's horoscope for a star sign
    async fn daily_horoscope(&self, sign: &str) -> Result<String>;
}

/// Client for the public horoscope app API
pub struct HoroscopeApiService {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HoroscopeResponse {
    data: Option<HoroscopeData>,
}

#[derive(Debug, Deserialize)]
struct HoroscopeData {
    horoscope_data: Option<String>,
}

impl HoroscopeApiService {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn fallback(sign: &str) -> String {
        format!("Unable to retrieve horoscope for {} today.", sign)
    }
}

#[async_trait]
impl HoroscopeService for HoroscopeApiService {
    async fn daily_horoscope(&self, sign: &str) -> Result<String> {
        let url = format!(
            "{}/api/v1/get-horoscope/daily",
            self.base_url.trim_end_matches('/')
        );
        debug!("Fetching daily horoscope for {}", sign);

        let response = self
            .client
            .get(&url)
            .query(&[("sign", sign.to_lowercase())])
            .send()
            .await
            .with_context(|| format!("Failed to reach horoscope service at {}", url))?;

        let body = response
            .error_for_status()
            .with_context(|| format!("Horoscope service rejected request for {}", sign))?
            .text()
            .await
            .context("Failed to read horoscope response")?;

        // An empty body or missing data gets the stock answer; anything else
        // must decode
        let horoscope = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Option<HoroscopeResponse>>(&body)
                .context("Failed to decode horoscope response")?
                .and_then(|body| body.data)
                .and_then(|data| data.horoscope_data)
        };

        Ok(horoscope.unwrap_or_else(|| {
            warn!("Horoscope service had no reading for {}", sign);
            Self::fallback(sign)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_daily_horoscope_lowercases_sign() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/get-horoscope/daily"))
            .and(query_param("sign", "scorpio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "status": 200,
                "data": {"date": "Oct 19, 2026", "horoscope_data": "You will be chased by wolves"}
            })))
            .mount(&server)
            .await;

        let service = HoroscopeApiService::new(server.uri()).unwrap();
        let horoscope = service.daily_horoscope("Scorpio").await.unwrap();
        assert_eq!(horoscope, "You will be chased by wolves");
    }

    #[tokio::test]
    async fn test_missing_data_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "status": 404,
                "data": null
            })))
            .mount(&server)
            .await;

        let service = HoroscopeApiService::new(server.uri()).unwrap();
        assert_eq!(
            service.daily_horoscope("Leo").await.unwrap(),
            "Unable to retrieve horoscope for Leo today."
        );
    }

    #[tokio::test]
    async fn test_empty_body_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let service = HoroscopeApiService::new(server.uri()).unwrap();
        assert_eq!(
            service.daily_horoscope("Virgo").await.unwrap(),
            "Unable to retrieve horoscope for Virgo today."
        );
    }

    #[tokio::test]
    async fn test_error_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let service = HoroscopeApiService::new(format!("{}/", server.uri())).unwrap();
        let err = service.daily_horoscope("Scorpio").await.unwrap_err();
        assert!(format!("{:#}", err).contains("503"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let service = HoroscopeApiService::new(server.uri()).unwrap();
        let err = service.daily_horoscope("Aries").await.unwrap_err();
        assert!(err.to_string().contains("Failed to decode horoscope response"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_error() {
        let service = HoroscopeApiService::new("http://127.0.0.1:9").unwrap();
        assert!(service.daily_horoscope("Leo").await.is_err());
    }
}
