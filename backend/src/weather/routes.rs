use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::{WeatherClient, WeatherError};

pub const DEFAULT_CITY: &str = "Bengaluru";

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub q: Option<String>,
    pub city: Option<String>,
}

impl SummaryQuery {
    fn place(&self) -> &str {
        [&self.q, &self.city]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CITY)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/weather").route("/summary/", web::get().to(summary)));
}

pub async fn summary(
    weather: web::Data<WeatherClient>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, WeatherError> {
    let summary = weather.summary(query.place()).await?;
    Ok(HttpResponse::Ok().json(summary))
}
