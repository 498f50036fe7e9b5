//! Outdoor humidity from the Open-Meteo forecast API.
//!
//! The hourly series is requested with one past day and one forecast day,
//! so the sample for the current local hour sits at index `hour + 24`. The
//! fan controller only needs that single number; everything else in the
//! response is discarded.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, Timelike};
use log::{debug, warn};
use serde::Deserialize;

use crate::config::WeatherCfg;

/// A source of the current outdoor relative humidity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Outdoor relative humidity percent for the current hour, or `None`
    /// when the service has no usable sample.
    async fn outdoor_humidity(&self) -> Result<Option<f64>>;
}

#[derive(Debug, Deserialize)]
struct Forecast {
    hourly: Hourly,
}

#[derive(Debug, Deserialize)]
struct Hourly {
    relative_humidity_2m: Vec<Option<f64>>,
}

/// Open-Meteo HTTP client, configured with the site coordinates.
pub struct OpenMeteoClient {
    client: reqwest::Client,
    url: String,
}

impl OpenMeteoClient {
    pub fn new(cfg: &WeatherCfg) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: forecast_url(cfg.latitude, cfg.longitude),
        }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn outdoor_humidity(&self) -> Result<Option<f64>> {
        debug!("Requesting forecast: {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("weather request failed")?;

        if !response.status().is_success() {
            warn!("Weather service returned {}", response.status());
            return Ok(None);
        }

        let forecast: Forecast = response
            .json()
            .await
            .context("weather response is not a forecast")?;

        let hour = Local::now().hour();
        match humidity_at_hour(&forecast, hour) {
            Some(humidity) => {
                debug!("Outdoor humidity at hour {hour}: {humidity}%");
                Ok(Some(humidity))
            }
            None => {
                warn!("Forecast has no humidity sample for hour {hour}");
                Ok(None)
            }
        }
    }
}

fn forecast_url(latitude: f64, longitude: f64) -> String {
    format!(
        "https://api.open-meteo.com/v1/forecast\
         ?latitude={latitude}&longitude={longitude}\
         &hourly=relative_humidity_2m&current_weather=false\
         &past_days=1&forecast_days=1\
         &windspeed_unit=kn&timezone=GB&timeformat=unixtime"
    )
}

/// Picks the sample for local `hour` out of the past-day + forecast-day
/// series. The past day occupies the first 24 entries.
fn humidity_at_hour(forecast: &Forecast, hour: u32) -> Option<f64> {
    forecast
        .hourly
        .relative_humidity_2m
        .get(hour as usize + 24)
        .copied()
        .flatten()
}
