use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::WeatherConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("OPENWEATHER_API_KEY missing. Set it in backend .env and restart.")]
    MissingApiKey,
    #[error("OpenWeather error")]
    Upstream { status: u16, body: Value },
    #[error("Weather service unreachable: {0}")]
    Unreachable(String),
}

impl ResponseError for WeatherError {
    fn status_code(&self) -> StatusCode {
        match self {
            WeatherError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
            WeatherError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            WeatherError::Unreachable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            WeatherError::Upstream { body, .. } => {
                json!({ "success": false, "message": self.to_string(), "error": body })
            }
            WeatherError::Unreachable(_) => {
                log::warn!("{}", self);
                json!({ "success": false, "message": "Weather service unreachable" })
            }
            WeatherError::MissingApiKey => json!({ "success": false, "message": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Current conditions and the 5 day forecast for one place, as OpenWeather
/// returned them.
#[derive(Debug, Serialize)]
pub struct WeatherSummary {
    pub success: bool,
    pub city: String,
    pub current: Value,
    pub forecast: Value,
}

/// "Name, CC" from an OpenWeather place object, when both parts are there.
fn place_name(place: Option<&Value>, country: Option<&Value>) -> Option<String> {
    let name = place?.as_str()?;
    let country = country?.as_str()?;
    Some(format!("{}, {}", name, country))
}

pub struct WeatherClient {
    http: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherClient {
    pub fn new(config: WeatherConfig) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WeatherError::Unreachable(e.to_string()))?;
        if config.api_key.is_none() {
            log::warn!("OPENWEATHER_API_KEY is not set; weather summaries are disabled");
        }
        Ok(Self { http, config })
    }

    async fn fetch(&self, endpoint: &str, city: &str, api_key: &str) -> Result<Value, WeatherError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let response = self
            .http
            .get(&url)
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .map_err(|e| WeatherError::Unreachable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .json::<Value>()
                .await
                .unwrap_or_else(|e| json!({ "message": e.without_url().to_string() }));
            log::warn!("OpenWeather {} for '{}' returned {}", endpoint, city, status);
            return Err(WeatherError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| WeatherError::Unreachable(e.without_url().to_string()))
    }

    pub async fn summary(&self, city: &str) -> Result<WeatherSummary, WeatherError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(WeatherError::MissingApiKey)?;

        let current = self.fetch("weather", city, api_key).await?;
        let forecast = self.fetch("forecast", city, api_key).await?;

        let city = place_name(forecast["city"].get("name"), forecast["city"].get("country"))
            .or_else(|| place_name(current.get("name"), current["sys"].get("country")))
            .unwrap_or_else(|| city.to_string());
        log::debug!("Weather summary for {}", city);

        Ok(WeatherSummary {
            success: true,
            city,
            current,
            forecast,
        })
    }
}
