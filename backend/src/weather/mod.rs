pub mod client;
pub mod routes;

pub use client::{WeatherClient, WeatherError};
